pub mod batch;
pub mod client;
pub mod config;
pub mod error;
pub mod server;
pub mod submit;
pub mod upstream;

use std::sync::Arc;

use anyhow::Result;
use prism_contracts::extract::OutputExtractor;
use prism_contracts::models::ModelRegistry;

use crate::config::ProxyConfig;
use crate::server::AppState;
use crate::submit::Submitter;
use crate::upstream::{OpenAiClient, ReplicateClient};

/// Wires the default registry and the real upstream clients from `config`.
pub fn build_state(config: &ProxyConfig) -> Result<AppState> {
    let submitter = Submitter::new(
        Arc::new(ModelRegistry::default()),
        Arc::new(ReplicateClient::new(config)?),
        Arc::new(OpenAiClient::new(config)?),
        OutputExtractor::new(config.asset_host.clone()),
    );
    Ok(AppState {
        submitter,
        replicate_configured: config.has_replicate(),
        openai_configured: config.has_openai(),
    })
}
