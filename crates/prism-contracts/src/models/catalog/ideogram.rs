use serde_json::{Map, Value};

use super::{Entry, IDEOGRAM_CATEGORY};
use crate::models::adapter::ModelAdapter;
use crate::models::descriptor::Provider;
use crate::models::params::{Fields, InputReader};

const IDEOGRAM_ASPECTS: &[&str] = &["1:1", "16:9", "21:9", "2:3", "3:2", "4:5", "5:4", "9:16", "9:21"];
const MAGIC_PROMPT_OPTIONS: &[&str] = &["Auto", "On", "Off"];
const MAX_STYLE_REFERENCES: usize = 3;
const MAX_SEED: i64 = 2_147_483_647;

pub(super) fn adapters() -> Vec<ModelAdapter> {
    vec![
        Entry {
            key: "ideogram_v3_quality",
            provider: Provider::Replicate,
            upstream_path: "ideogram-ai/ideogram-v3-quality",
            category: IDEOGRAM_CATEGORY,
            image_reference: true,
            edit: true,
            display_name: "Ideogram v3 Quality",
            description: "The highest quality Ideogram v3 model. v3 creates images with stunning realism, creative designs, and consistent styles. Premium quality for professional applications.",
            cost_cents: 9.0,
            default_size: "1:1",
        }
        .adapter(validate_ideogram_v3),
        Entry {
            key: "ideogram_v3_turbo",
            provider: Provider::Replicate,
            upstream_path: "ideogram-ai/ideogram-v3-turbo",
            category: IDEOGRAM_CATEGORY,
            image_reference: true,
            edit: true,
            display_name: "Ideogram v3 Turbo",
            description: "The fastest and cheapest Ideogram v3 model. Same styles and inpainting support as Quality, tuned for quick iteration.",
            cost_cents: 3.0,
            default_size: "1:1",
        }
        .adapter(validate_ideogram_v3),
    ]
}

/// Quality and Turbo accept the same schema.
fn validate_ideogram_v3(input: &InputReader<'_>) -> Map<String, Value> {
    let mut fields = Fields::new();
    fields
        .set(
            "aspect_ratio",
            input.choice("aspect_ratio", IDEOGRAM_ASPECTS, "1:1"),
        )
        .set(
            "magic_prompt_option",
            input.choice("magic_prompt_option", MAGIC_PROMPT_OPTIONS, "Auto"),
        )
        .set_opt("resolution", not_none(input, "resolution"));

    // Inpainting needs both halves; one without the other is dropped.
    if let (Some(image), Some(mask)) = (input.text("image"), input.text("mask")) {
        fields.set("image", image).set("mask", mask);
    }

    fields
        .set_opt("style_type", not_none(input, "style_type"))
        .set_list(
            "style_reference_images",
            input.references("style_reference_images", MAX_STYLE_REFERENCES),
        )
        .set_opt("seed", input.seed("seed", MAX_SEED))
        .set_opt("style_preset", not_none(input, "style_preset"));
    fields.into_map()
}

/// Ideogram uses the literal string "None" to mean unset.
fn not_none(input: &InputReader<'_>, key: &str) -> Option<String> {
    input.text(key).filter(|value| value != "None")
}
