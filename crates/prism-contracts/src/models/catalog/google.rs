use serde_json::{Map, Value};

use super::{Entry, GOOGLE_CATEGORY};
use crate::models::adapter::ModelAdapter;
use crate::models::descriptor::Provider;
use crate::models::params::{Fields, InputReader};

const IMAGEN_ASPECTS: &[&str] = &["1:1", "4:3", "3:4", "16:9", "9:16", "3:2", "2:3", "5:4", "4:5"];
pub(super) const SAFETY_FILTER_LEVELS: &[&str] = &[
    "block_low_and_above",
    "block_medium_and_above",
    "block_only_high",
];
const IMAGEN_FORMATS: &[&str] = &["jpg", "png", "webp"];

pub(super) fn adapters() -> Vec<ModelAdapter> {
    vec![
        Entry {
            key: "imagen4_fast",
            provider: Provider::Replicate,
            upstream_path: "google/imagen-4-fast",
            category: GOOGLE_CATEGORY,
            image_reference: false,
            edit: false,
            display_name: "Imagen 4 Fast",
            description: "Google's fast image generation model - speed over quality",
            cost_cents: 2.0,
            default_size: "1024x1024",
        }
        .adapter(validate_imagen),
        Entry {
            key: "imagen4",
            provider: Provider::Replicate,
            upstream_path: "google/imagen-4",
            category: GOOGLE_CATEGORY,
            image_reference: false,
            edit: false,
            display_name: "Imagen 4",
            description: "Google's flagship Imagen 4 model with superior detail rendering, style versatility, and enhanced typography capabilities",
            cost_cents: 4.0,
            default_size: "1:1",
        }
        .adapter(validate_imagen),
        Entry {
            key: "imagen4_ultra",
            provider: Provider::Replicate,
            upstream_path: "google/imagen-4-ultra",
            category: GOOGLE_CATEGORY,
            image_reference: false,
            edit: false,
            display_name: "Imagen 4 Ultra",
            description: "Use this ultra version of Imagen 4 when quality matters more than speed and cost",
            cost_cents: 6.0,
            default_size: "1:1",
        }
        .adapter(validate_imagen),
    ]
}

/// All three Imagen 4 tiers share one schema and always send every field.
fn validate_imagen(input: &InputReader<'_>) -> Map<String, Value> {
    let mut fields = Fields::new();
    fields
        .set("aspect_ratio", input.choice("aspect_ratio", IMAGEN_ASPECTS, "1:1"))
        .set(
            "safety_filter_level",
            input.choice("safety_filter_level", SAFETY_FILTER_LEVELS, "block_only_high"),
        )
        .set(
            "output_format",
            input.choice("output_format", IMAGEN_FORMATS, "jpg"),
        );
    fields.into_map()
}
