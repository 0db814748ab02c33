use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use prism_contracts::models::{RegistryError, ValidationError};
use serde_json::json;

use crate::upstream::truncate_text;

const MAX_UPSTREAM_BODY_CHARS: usize = 512;

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("{0}")]
    Validation(#[from] ValidationError),
    #[error("{0}")]
    NotFound(#[from] RegistryError),
    #[error("Malformed request body: {0}")]
    MalformedRequest(String),
    #[error("Model {model} uses the {provider} provider, which {route} does not serve")]
    UnsupportedProvider {
        model: String,
        provider: &'static str,
        route: &'static str,
    },
    #[error("{0}")]
    Configuration(String),
    #[error("{provider} request failed ({status}): {body}")]
    Upstream {
        provider: &'static str,
        status: u16,
        body: String,
    },
    #[error("{0}")]
    Transport(String),
    #[error("{0}")]
    InvalidResponse(String),
}

impl ProxyError {
    pub fn missing_credential(variable: &str) -> Self {
        Self::Configuration(format!("{variable} is not configured"))
    }

    pub fn upstream(provider: &'static str, status: u16, body: &str) -> Self {
        Self::Upstream {
            provider,
            status,
            body: truncate_text(body, MAX_UPSTREAM_BODY_CHARS),
        }
    }

    pub fn transport(context: &str, err: impl std::fmt::Display) -> Self {
        Self::Transport(format!("{context}: {err}"))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_)
            | Self::NotFound(_)
            | Self::MalformedRequest(_)
            | Self::UnsupportedProvider { .. } => {
                StatusCode::BAD_REQUEST
            }
            Self::Configuration(_)
            | Self::Upstream { .. }
            | Self::Transport(_)
            | Self::InvalidResponse(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::warn!(error = %self, "proxy request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use prism_contracts::models::{RegistryError, ValidationError};

    use super::ProxyError;

    #[test]
    fn caller_mistakes_map_to_bad_request() {
        assert_eq!(
            ProxyError::from(ValidationError::MissingPrompt).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ProxyError::from(RegistryError::NotFound("nope".to_string())).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn upstream_body_is_truncated() {
        let body = "x".repeat(2000);
        let err = ProxyError::upstream("Replicate", 502, &body);
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        let ProxyError::Upstream { body, status, .. } = &err else {
            panic!("expected upstream error");
        };
        assert_eq!(*status, 502);
        assert_eq!(body.chars().count(), 513);
        assert!(err.to_string().starts_with("Replicate request failed (502): xxx"));
    }

    #[test]
    fn missing_credential_names_the_variable() {
        let err = ProxyError::missing_credential("REPLICATE_API_TOKEN");
        assert_eq!(err.to_string(), "REPLICATE_API_TOKEN is not configured");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
