use serde_json::{Map, Value};

use super::{Entry, OPENAI_CATEGORY};
use crate::models::adapter::{passthrough, ModelAdapter, UpstreamPayload, ValidatedInput};
use crate::models::descriptor::Provider;
use crate::models::params::{Fields, InputReader};

/// gpt-image-1 edits accept up to sixteen source images.
const MAX_GPT_IMAGE_REFERENCES: usize = 16;

pub(super) fn adapters() -> Vec<ModelAdapter> {
    vec![
        Entry {
            key: "gpt_image_1",
            provider: Provider::OpenAi,
            upstream_path: "gpt-image-1",
            category: OPENAI_CATEGORY,
            image_reference: true,
            edit: true,
            display_name: "GPT Image 1",
            description: "OpenAI's GPT Image - Superior instruction following, text rendering, detailed editing, real-world knowledge",
            cost_cents: 5.0,
            default_size: "1024x1024",
        }
        .adapter(validate_gpt_image_1)
        .with_transform(transform_gpt_image_1),
        Entry {
            key: "dall_e_3",
            provider: Provider::OpenAi,
            upstream_path: "dall-e-3",
            category: OPENAI_CATEGORY,
            image_reference: false,
            edit: false,
            display_name: "DALL-E 3",
            description: "Higher image quality than DALL-E 2, support for larger resolutions",
            cost_cents: 2.0,
            default_size: "1024x1024",
        }
        .adapter(validate_dall_e_3),
        Entry {
            key: "dall_e_2",
            provider: Provider::OpenAi,
            upstream_path: "dall-e-2",
            category: OPENAI_CATEGORY,
            image_reference: true,
            edit: true,
            display_name: "DALL-E 2",
            description: "Lower cost, concurrent requests, inpainting (image editing with a mask)",
            cost_cents: 1.0,
            default_size: "1024x1024",
        }
        .adapter(validate_dall_e_2),
    ]
}

fn validate_gpt_image_1(input: &InputReader<'_>) -> Map<String, Value> {
    let mut fields = Fields::new();
    fields
        .set(
            "size",
            input.choice(
                "size",
                &["1024x1024", "1536x1024", "1024x1536", "auto"],
                "1024x1024",
            ),
        )
        .set(
            "quality",
            input.choice("quality", &["low", "medium", "high", "auto"], "auto"),
        )
        .set(
            "output_format",
            input.choice("output_format", &["png", "jpeg", "webp"], "png"),
        )
        .set(
            "background",
            input.choice("background", &["transparent", "opaque", "auto"], "auto"),
        )
        .set(
            "input_fidelity",
            input.choice("input_fidelity", &["low", "high"], "low"),
        )
        .set_opt("output_compression", input.int_in("output_compression", 0, 100))
        .set_list(
            "image_input",
            input.references("image_input", MAX_GPT_IMAGE_REFERENCES),
        )
        .set_opt("mask", input.text("mask"));
    fields.into_map()
}

/// OpenAI treats `png` and `auto` as implicit; leave them off the wire.
fn transform_gpt_image_1(validated: &ValidatedInput) -> UpstreamPayload {
    let mut payload = passthrough(validated);
    for (key, implicit) in [("output_format", "png"), ("background", "auto")] {
        if payload.get(key).and_then(Value::as_str) == Some(implicit) {
            payload.remove(key);
        }
    }
    if !payload.contains_key("image_input") {
        payload.remove("input_fidelity");
    }
    payload
}

fn validate_dall_e_3(input: &InputReader<'_>) -> Map<String, Value> {
    let mut fields = Fields::new();
    fields
        .set(
            "size",
            input.choice("size", &["1024x1024", "1792x1024", "1024x1792"], "1024x1024"),
        )
        .set(
            "quality",
            input.choice("quality", &["standard", "hd"], "standard"),
        )
        .set("style", input.choice("style", &["vivid", "natural"], "vivid"));
    fields.into_map()
}

fn validate_dall_e_2(input: &InputReader<'_>) -> Map<String, Value> {
    let mut fields = Fields::new();
    fields
        .set(
            "size",
            input.choice("size", &["256x256", "512x512", "1024x1024"], "1024x1024"),
        )
        .set_list("image_input", input.references("image_input", 1))
        .set_opt("mask", input.text("mask"));
    fields.into_map()
}
