use std::env;
use std::time::Duration;

use prism_contracts::extract::DEFAULT_ASSET_HOST;

pub const DEFAULT_REPLICATE_API_BASE: &str = "https://api.replicate.com/v1";
pub const DEFAULT_OPENAI_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 120;

/// Upstream credentials and endpoints, read once at startup.
///
/// Missing credentials are not an error here; the proxy still serves the
/// model list and each call that needs a token fails on its own.
#[derive(Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub replicate_token: Option<String>,
    pub replicate_api_base: String,
    pub openai_api_key: Option<String>,
    pub openai_api_base: String,
    pub asset_host: String,
    pub http_timeout: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            replicate_token: None,
            replicate_api_base: DEFAULT_REPLICATE_API_BASE.to_string(),
            openai_api_key: None,
            openai_api_base: DEFAULT_OPENAI_API_BASE.to_string(),
            asset_host: DEFAULT_ASSET_HOST.to_string(),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        }
    }
}

impl std::fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("replicate_token", &self.replicate_token.as_ref().map(|_| "<set>"))
            .field("replicate_api_base", &self.replicate_api_base)
            .field("openai_api_key", &self.openai_api_key.as_ref().map(|_| "<set>"))
            .field("openai_api_base", &self.openai_api_base)
            .field("asset_host", &self.asset_host)
            .field("http_timeout", &self.http_timeout)
            .finish()
    }
}

impl ProxyConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(non_empty_env)
    }

    /// Same rules as [`ProxyConfig::from_env`] against an arbitrary source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let http_timeout = lookup("PRISM_HTTP_TIMEOUT_SECS")
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.http_timeout);
        Self {
            replicate_token: lookup("REPLICATE_API_TOKEN").or_else(|| lookup("REPLICATE_API_KEY")),
            replicate_api_base: lookup("REPLICATE_API_BASE")
                .map(|raw| raw.trim_end_matches('/').to_string())
                .unwrap_or(defaults.replicate_api_base),
            openai_api_key: lookup("OPENAI_API_KEY"),
            openai_api_base: lookup("OPENAI_API_BASE")
                .map(|raw| raw.trim_end_matches('/').to_string())
                .unwrap_or(defaults.openai_api_base),
            asset_host: lookup("PRISM_ASSET_HOST")
                .map(|raw| raw.trim_end_matches('/').to_string())
                .unwrap_or(defaults.asset_host),
            http_timeout,
        }
    }

    pub fn has_replicate(&self) -> bool {
        self.replicate_token.is_some()
    }

    pub fn has_openai(&self) -> bool {
        self.openai_api_key.is_some()
    }
}

pub(crate) fn non_empty_env(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
