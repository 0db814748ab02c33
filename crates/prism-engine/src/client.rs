use std::time::Duration;

use anyhow::{bail, Context, Result};
use prism_contracts::poller::StatusSource;
use prism_contracts::predictions::{GenerateResponse, PredictionHandle, StatusReport};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::batch::PredictionClient;
use crate::upstream::truncate_text;

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:3000";

/// Blocking client for a running prism proxy.
#[derive(Debug, Clone)]
pub struct ProxyClient {
    base_url: String,
    http: HttpClient,
}

impl ProxyClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .context("failed to build proxy HTTP client")?;
        Ok(Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn predict(&self, model_key: &str, input: &Value) -> Result<PredictionHandle> {
        let endpoint = format!("{}/predict", self.base_url);
        let response = self
            .http
            .post(&endpoint)
            .json(&json!({ "modelKey": model_key, "input": input }))
            .send()
            .with_context(|| format!("proxy request failed ({endpoint})"))?;
        parse_response(response)
    }

    pub fn status(&self, id: &str, wait: Option<u32>) -> Result<StatusReport> {
        let mut endpoint = format!("{}/status/{}", self.base_url, id);
        if let Some(wait) = wait {
            endpoint.push_str(&format!("?wait={wait}"));
        }
        let response = self
            .http
            .get(&endpoint)
            .send()
            .with_context(|| format!("proxy request failed ({endpoint})"))?;
        parse_response(response)
    }

    pub fn generate(&self, model_key: &str, input: &Value) -> Result<GenerateResponse> {
        let endpoint = format!("{}/generate", self.base_url);
        let response = self
            .http
            .post(&endpoint)
            .json(&json!({ "modelKey": model_key, "input": input }))
            .send()
            .with_context(|| format!("proxy request failed ({endpoint})"))?;
        parse_response(response)
    }

    pub fn models(&self) -> Result<Value> {
        let endpoint = format!("{}/models", self.base_url);
        let response = self
            .http
            .get(&endpoint)
            .send()
            .with_context(|| format!("proxy request failed ({endpoint})"))?;
        parse_response(response)
    }
}

impl StatusSource for ProxyClient {
    fn fetch_status(&self, id: &str) -> Result<StatusReport> {
        self.status(id, None)
    }
}

impl PredictionClient for ProxyClient {
    fn submit(&self, model_key: &str, input: &Value) -> Result<PredictionHandle> {
        self.predict(model_key, input)
    }
}

fn parse_response<T: DeserializeOwned>(response: HttpResponse) -> Result<T> {
    let status = response.status();
    let body = response.text().context("proxy response body read failed")?;
    if !status.is_success() {
        bail!(
            "proxy request failed ({}): {}",
            status.as_u16(),
            error_message(&body)
        );
    }
    serde_json::from_str(&body).context("proxy returned invalid JSON payload")
}

/// Prefers the `{error}` field; falls back to the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|parsed| parsed.get("error").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| truncate_text(body, 512))
}
