use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Provider {
    #[serde(rename = "replicate")]
    Replicate,
    #[serde(rename = "openai")]
    OpenAi,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Replicate => "replicate",
            Self::OpenAi => "openai",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub supports_image_reference: bool,
    pub supports_edit: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelMetadata {
    pub display_name: &'static str,
    pub description: &'static str,
    pub cost_per_image_cents: f64,
    pub default_size_or_aspect: &'static str,
}

/// Static identity of one upstream model. Built once when the registry is
/// populated and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDescriptor {
    pub key: &'static str,
    pub provider: Provider,
    /// `owner/name` for Replicate, the model id for OpenAI.
    pub upstream_path: &'static str,
    pub category: &'static str,
    pub capabilities: Capabilities,
    pub metadata: ModelMetadata,
}

impl ModelDescriptor {
    pub fn supports_image_reference(&self) -> bool {
        self.capabilities.supports_image_reference
    }
}
