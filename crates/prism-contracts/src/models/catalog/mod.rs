mod flux;
mod google;
mod ideogram;
mod openai;
mod other;

use super::adapter::{ModelAdapter, ValidateFn};
use super::descriptor::{Capabilities, ModelDescriptor, ModelMetadata, Provider};

pub const FLUX_CATEGORY: &str = "FLUX Models (Black Forest Labs)";
pub const GOOGLE_CATEGORY: &str = "Google Models (Imagen)";
pub const IDEOGRAM_CATEGORY: &str = "Ideogram Models";
pub const OPENAI_CATEGORY: &str = "OpenAI Models";
pub const OTHER_CATEGORY: &str = "Other Models";

/// Every built-in adapter, grouped by category in display order.
pub fn default_adapters() -> Vec<ModelAdapter> {
    let mut adapters = Vec::new();
    adapters.extend(flux::adapters());
    adapters.extend(google::adapters());
    adapters.extend(ideogram::adapters());
    adapters.extend(openai::adapters());
    adapters.extend(other::adapters());
    adapters
}

struct Entry {
    key: &'static str,
    provider: Provider,
    upstream_path: &'static str,
    category: &'static str,
    image_reference: bool,
    edit: bool,
    display_name: &'static str,
    description: &'static str,
    cost_cents: f64,
    default_size: &'static str,
}

impl Entry {
    fn adapter(self, validate: ValidateFn) -> ModelAdapter {
        ModelAdapter::new(
            ModelDescriptor {
                key: self.key,
                provider: self.provider,
                upstream_path: self.upstream_path,
                category: self.category,
                capabilities: Capabilities {
                    supports_image_reference: self.image_reference,
                    supports_edit: self.edit,
                },
                metadata: ModelMetadata {
                    display_name: self.display_name,
                    description: self.description,
                    cost_per_image_cents: self.cost_cents,
                    default_size_or_aspect: self.default_size,
                },
            },
            validate,
        )
    }
}
