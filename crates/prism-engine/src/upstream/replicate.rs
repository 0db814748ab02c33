use anyhow::Context;
use prism_contracts::models::UpstreamPayload;
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};

use super::{build_http_client, response_json_or_error, PredictionApi};
use crate::config::ProxyConfig;
use crate::error::ProxyError;

const PROVIDER: &str = "Replicate";
const TOKEN_VARIABLE: &str = "REPLICATE_API_TOKEN";
pub const MAX_WAIT_SECS: u32 = 60;

pub struct ReplicateClient {
    api_base: String,
    token: Option<String>,
    http: HttpClient,
}

impl ReplicateClient {
    pub fn new(config: &ProxyConfig) -> anyhow::Result<Self> {
        Ok(Self {
            api_base: config.replicate_api_base.clone(),
            token: config.replicate_token.clone(),
            http: build_http_client(config.http_timeout)
                .context("failed to build Replicate HTTP client")?,
        })
    }

    fn token(&self) -> Result<&str, ProxyError> {
        self.token
            .as_deref()
            .ok_or_else(|| ProxyError::missing_credential(TOKEN_VARIABLE))
    }

    /// Official models are addressed by path; a pinned `:version` goes
    /// through the generic endpoint instead.
    fn create_request(&self, model: &str, input: &UpstreamPayload, stream: bool) -> (String, Value) {
        match model.split_once(':') {
            Some((_, version)) => (
                format!("{}/predictions", self.api_base),
                json!({ "version": version, "input": input, "stream": stream }),
            ),
            None => (
                format!("{}/models/{}/predictions", self.api_base, model.trim_matches('/')),
                json!({ "input": input, "stream": stream }),
            ),
        }
    }
}

impl PredictionApi for ReplicateClient {
    fn create_prediction(
        &self,
        model: &str,
        input: &UpstreamPayload,
        stream: bool,
    ) -> Result<Value, ProxyError> {
        let token = self.token()?;
        let (endpoint, body) = self.create_request(model, input, stream);
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(token)
            .json(&body)
            .send()
            .map_err(|err| {
                ProxyError::transport(&format!("Replicate request failed ({endpoint})"), err)
            })?;
        response_json_or_error(PROVIDER, response)
    }

    fn get_prediction(&self, id: &str, wait: Option<u32>) -> Result<Value, ProxyError> {
        let token = self.token()?;
        let endpoint = format!("{}/predictions/{}", self.api_base, id);
        let mut request = self.http.get(&endpoint).bearer_auth(token);
        if let Some(wait) = wait {
            request = request.header("Prefer", format!("wait={}", wait.clamp(1, MAX_WAIT_SECS)));
        }
        let response = request.send().map_err(|err| {
            ProxyError::transport(&format!("Replicate poll request failed ({endpoint})"), err)
        })?;
        response_json_or_error(PROVIDER, response)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Map};

    use super::ReplicateClient;
    use crate::config::ProxyConfig;
    use crate::error::ProxyError;
    use crate::upstream::PredictionApi;

    fn client(token: Option<&str>) -> ReplicateClient {
        let config = ProxyConfig {
            replicate_token: token.map(str::to_string),
            replicate_api_base: "http://127.0.0.1:9/v1".to_string(),
            ..ProxyConfig::default()
        };
        ReplicateClient::new(&config).unwrap()
    }

    #[test]
    fn official_models_use_model_path() {
        let mut input = Map::new();
        input.insert("prompt".to_string(), json!("a cat"));
        let (endpoint, body) = client(None).create_request("black-forest-labs/flux-2-pro", &input, false);
        assert_eq!(
            endpoint,
            "http://127.0.0.1:9/v1/models/black-forest-labs/flux-2-pro/predictions"
        );
        assert_eq!(body, json!({"input": {"prompt": "a cat"}, "stream": false}));
    }

    #[test]
    fn pinned_versions_use_generic_endpoint() {
        let (endpoint, body) =
            client(None).create_request("datacte/proteus-v0.3:b28b79d7", &Map::new(), true);
        assert_eq!(endpoint, "http://127.0.0.1:9/v1/predictions");
        assert_eq!(body["version"], json!("b28b79d7"));
        assert_eq!(body["stream"], json!(true));
    }

    #[test]
    fn missing_token_fails_before_any_request() {
        let err = client(None)
            .create_prediction("owner/model", &Map::new(), false)
            .unwrap_err();
        assert!(matches!(err, ProxyError::Configuration(_)));
        let err = client(None).get_prediction("abc", Some(5)).unwrap_err();
        assert!(matches!(err, ProxyError::Configuration(_)));
    }
}
