//! Blocking HTTP clients for the two upstream providers.
//!
//! Both sit behind small traits so the submitter and router can be exercised
//! against in-memory fakes.

mod openai;
mod replicate;

use std::time::Duration;

use prism_contracts::models::UpstreamPayload;
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{Map, Value};

use crate::error::ProxyError;

pub use openai::OpenAiClient;
pub use replicate::{ReplicateClient, MAX_WAIT_SECS};

/// Replicate-style asynchronous predictions.
pub trait PredictionApi: Send + Sync {
    /// `model` is `owner/name`, optionally pinned as `owner/name:version`.
    fn create_prediction(
        &self,
        model: &str,
        input: &UpstreamPayload,
        stream: bool,
    ) -> Result<Value, ProxyError>;

    /// `wait` asks the upstream to hold the request open for up to that many
    /// seconds before answering.
    fn get_prediction(&self, id: &str, wait: Option<u32>) -> Result<Value, ProxyError>;
}

/// OpenAI-style synchronous image endpoints.
pub trait ImageApi: Send + Sync {
    fn generate(&self, body: &Map<String, Value>) -> Result<Value, ProxyError>;

    /// `images` and `mask` are http(s) URLs or `data:` URIs; `fields` carries
    /// every other form field.
    fn edit(
        &self,
        fields: &Map<String, Value>,
        images: &[String],
        mask: Option<&str>,
    ) -> Result<Value, ProxyError>;

    fn fetch_image(&self, url: &str) -> Result<Vec<u8>, ProxyError>;
}

pub(crate) fn build_http_client(timeout: Duration) -> anyhow::Result<HttpClient> {
    Ok(HttpClient::builder().timeout(timeout).build()?)
}

pub(crate) fn response_json_or_error(
    provider: &'static str,
    response: HttpResponse,
) -> Result<Value, ProxyError> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .map_err(|err| ProxyError::transport(&format!("{provider} response body read failed"), err))?;
    if !status.is_success() {
        return Err(ProxyError::upstream(provider, code, &body));
    }
    serde_json::from_str(&body).map_err(|_| {
        ProxyError::InvalidResponse(format!("{provider} returned invalid JSON payload"))
    })
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

pub(crate) fn json_value_to_form_text(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(raw) => raw.to_string(),
        Value::Number(raw) => raw.to_string(),
        Value::String(raw) => raw.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{json_value_to_form_text, truncate_text};

    #[test]
    fn truncate_keeps_short_text() {
        assert_eq!(truncate_text("short", 10), "short");
        assert_eq!(truncate_text("abcdef", 3), "abc…");
    }

    #[test]
    fn form_text_unquotes_strings() {
        assert_eq!(json_value_to_form_text(&json!("high")), "high");
        assert_eq!(json_value_to_form_text(&json!(2)), "2");
        assert_eq!(json_value_to_form_text(&json!(["a"])), "[\"a\"]");
    }
}
