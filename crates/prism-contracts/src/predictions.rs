use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionStatus {
    Starting,
    Processing,
    Succeeded,
    Failed,
    Canceled,
    /// Placeholder the proxy reports when it could not reach the upstream.
    Error,
}

impl PredictionStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "starting" => Some(Self::Starting),
            "processing" => Some(Self::Processing),
            "succeeded" => Some(Self::Succeeded),
            "failed" => Some(Self::Failed),
            "canceled" | "cancelled" => Some(Self::Canceled),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Processing => "processing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
            Self::Error => "error",
        }
    }

    /// Upstream terminal states. `Error` is handled as a failure by callers
    /// but never comes from the upstream itself.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }
}

/// What the client holds after a successful submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionHandle {
    pub id: String,
    pub status: PredictionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_url: Option<String>,
}

impl PredictionHandle {
    /// Maps a Replicate prediction object. Unknown statuses read as
    /// `starting` since the prediction exists but has not reported progress.
    pub fn from_upstream(payload: &Value) -> Option<Self> {
        let id = payload.get("id").and_then(Value::as_str)?.to_string();
        let status = payload
            .get("status")
            .and_then(Value::as_str)
            .and_then(PredictionStatus::parse)
            .unwrap_or(PredictionStatus::Starting);
        let urls = payload.get("urls");
        let url = |key: &str| {
            urls.and_then(|urls| urls.get(key))
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        Some(Self {
            id,
            status,
            stream_url: url("stream"),
            web_url: url("web"),
        })
    }
}

/// One status fetch, enriched with the image URLs extracted from `output`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub id: String,
    pub status: PredictionStatus,
    #[serde(default)]
    pub output: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_urls: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs: Option<String>,
}

impl StatusReport {
    pub fn from_upstream(payload: &Value) -> Option<Self> {
        let handle = PredictionHandle::from_upstream(payload)?;
        let error = match payload.get("error") {
            Some(Value::String(message)) if !message.is_empty() => Some(message.clone()),
            Some(Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        };
        Some(Self {
            id: handle.id,
            status: handle.status,
            output: payload.get("output").cloned().unwrap_or(Value::Null),
            image_url: None,
            image_urls: None,
            error,
            logs: payload
                .get("logs")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }

    /// Fills `imageUrl`/`imageUrls`; an empty list leaves both unset.
    pub fn with_images(mut self, urls: Vec<String>) -> Self {
        if !urls.is_empty() {
            self.image_url = urls.first().cloned();
            self.image_urls = Some(urls);
        }
        self
    }
}

/// One image returned from an OpenAI-style generate/edit call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedImage {
    pub b64_json: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revised_prompt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub success: bool,
    pub images: Vec<GeneratedImage>,
    pub created: i64,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{PredictionHandle, PredictionStatus, StatusReport};

    #[test]
    fn handle_maps_replicate_urls() {
        let handle = PredictionHandle::from_upstream(&json!({
            "id": "p1",
            "status": "starting",
            "urls": {
                "get": "https://api.replicate.com/v1/predictions/p1",
                "stream": "https://stream.replicate.com/p1",
                "web": "https://replicate.com/p/p1",
            }
        }))
        .unwrap();
        assert_eq!(handle.stream_url.as_deref(), Some("https://stream.replicate.com/p1"));
        assert_eq!(handle.web_url.as_deref(), Some("https://replicate.com/p/p1"));
        let wire = serde_json::to_value(&handle).unwrap();
        assert_eq!(wire["streamUrl"], json!("https://stream.replicate.com/p1"));
        assert_eq!(wire["status"], json!("starting"));
    }

    #[test]
    fn handle_requires_id() {
        assert!(PredictionHandle::from_upstream(&json!({"status": "starting"})).is_none());
    }

    #[test]
    fn terminal_statuses() {
        assert!(PredictionStatus::Succeeded.is_terminal());
        assert!(PredictionStatus::Canceled.is_terminal());
        assert!(!PredictionStatus::Processing.is_terminal());
        assert!(!PredictionStatus::Error.is_terminal());
        assert_eq!(PredictionStatus::parse("cancelled"), Some(PredictionStatus::Canceled));
    }

    #[test]
    fn report_skips_empty_image_list() {
        let report = StatusReport::from_upstream(&json!({
            "id": "p1",
            "status": "failed",
            "error": "NSFW content detected",
            "output": null,
        }))
        .unwrap()
        .with_images(Vec::new());
        let wire = serde_json::to_value(&report).unwrap();
        assert!(wire.get("imageUrl").is_none());
        assert_eq!(wire["error"], json!("NSFW content detected"));
    }
}
