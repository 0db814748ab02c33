use serde_json::{Map, Value};

use super::{Entry, FLUX_CATEGORY};
use crate::models::adapter::ModelAdapter;
use crate::models::descriptor::Provider;
use crate::models::params::{Fields, InputReader};

const LEGACY_ASPECTS: &[&str] = &["1:1", "16:9", "21:9", "2:3", "3:2", "4:5", "5:4", "9:16", "9:21"];
const FLUX_2_ASPECTS: &[&str] = &[
    "1:1",
    "16:9",
    "9:16",
    "2:3",
    "3:2",
    "3:4",
    "4:3",
    "4:5",
    "5:4",
    "21:9",
    "match_input_image",
    "custom",
];
const FLUX_2_RESOLUTIONS: &[&str] = &["0.5 MP", "1 MP", "2 MP", "4 MP"];
const KONTEXT_FORMATS: &[&str] = &["png", "jpg", "jpeg", "webp"];
const MAX_FLUX_2_REFERENCES: usize = 8;

pub(super) fn adapters() -> Vec<ModelAdapter> {
    vec![
        Entry {
            key: "flux_1_1_pro_ultra",
            provider: Provider::Replicate,
            upstream_path: "black-forest-labs/flux-1.1-pro-ultra",
            category: FLUX_CATEGORY,
            image_reference: true,
            edit: true,
            display_name: "FLUX 1.1 Pro Ultra",
            description: "Ultra high-resolution FLUX model (up to 4MP) with raw mode for authentic photography. 2.5x faster than comparable high-res models.",
            cost_cents: 6.0,
            default_size: "1:1",
        }
        .adapter(validate_flux_1_1_pro_ultra),
        Entry {
            key: "flux_1_1_pro",
            provider: Provider::Replicate,
            upstream_path: "black-forest-labs/flux-1.1-pro",
            category: FLUX_CATEGORY,
            image_reference: true,
            edit: true,
            display_name: "FLUX 1.1 Pro",
            description: "Faster, better FLUX Pro. Text-to-image model with excellent image quality, prompt adherence, and output diversity.",
            cost_cents: 4.0,
            default_size: "1:1",
        }
        .adapter(validate_flux_1_1_pro),
        Entry {
            key: "flux_2_pro",
            provider: Provider::Replicate,
            upstream_path: "black-forest-labs/flux-2-pro",
            category: FLUX_CATEGORY,
            image_reference: true,
            edit: true,
            display_name: "FLUX 2 Pro",
            description: "High quality text-to-image & image-editing model from Black Forest Labs with support for eight reference images.",
            cost_cents: 12.0,
            default_size: "1 MP",
        }
        .adapter(validate_flux_2_pro),
        Entry {
            key: "flux_kontext",
            provider: Provider::Replicate,
            upstream_path: "black-forest-labs/flux-kontext",
            category: FLUX_CATEGORY,
            image_reference: true,
            edit: true,
            display_name: "FLUX Kontext",
            description: "A text-based image editing model that excels at transforming images through natural language prompts with consistent quality",
            cost_cents: 4.0,
            default_size: "match_input_image",
        }
        .adapter(validate_flux_kontext),
    ]
}

fn validate_flux_1_1_pro_ultra(input: &InputReader<'_>) -> Map<String, Value> {
    let mut fields = Fields::new();
    fields
        .set("aspect_ratio", input.choice("aspect_ratio", LEGACY_ASPECTS, "1:1"))
        .set(
            "output_format",
            input.choice("output_format", &["jpg", "png", "webp"], "jpg"),
        )
        .set_opt("image_prompt", input.reference("image_prompt"))
        .set_float_opt(
            "image_prompt_strength",
            input.float_or("image_prompt_strength", 0.0, 1.0, 0.1),
        )
        .set_opt(
            "safety_tolerance",
            input.int_or("safety_tolerance", 1, 6, 2),
        )
        .set_opt("seed", input.seed("seed", i64::MAX))
        .set_opt("raw", input.flag("raw"));
    fields.into_map()
}

fn validate_flux_1_1_pro(input: &InputReader<'_>) -> Map<String, Value> {
    let mut aspects = LEGACY_ASPECTS.to_vec();
    aspects.push("custom");
    let aspect_ratio = input.choice("aspect_ratio", &aspects, "1:1");

    let mut fields = Fields::new();
    fields
        .set(
            "output_format",
            input.choice("output_format", &["webp", "jpg", "png"], "webp"),
        )
        .set_opt("image_prompt", input.reference("image_prompt"));
    if aspect_ratio == "custom" {
        fields
            .set("width", custom_side(input, "width"))
            .set("height", custom_side(input, "height"));
    }
    fields
        .set("aspect_ratio", aspect_ratio)
        .set_opt(
            "safety_tolerance",
            input.int_or("safety_tolerance", 1, 6, 2),
        )
        .set_opt("seed", input.seed("seed", i64::MAX))
        .set_opt("prompt_upsampling", input.flag("prompt_upsampling"))
        .set_opt("output_quality", input.int_or("output_quality", 0, 100, 80));
    fields.into_map()
}

/// 256..=1440 and a multiple of 32, otherwise 1024.
fn custom_side(input: &InputReader<'_>, key: &str) -> i64 {
    input
        .int_in(key, 256, 1440)
        .filter(|side| side % 32 == 0)
        .unwrap_or(1024)
}

fn validate_flux_2_pro(input: &InputReader<'_>) -> Map<String, Value> {
    let mut fields = Fields::new();
    fields
        .set_opt(
            "aspect_ratio",
            input.choice_or("aspect_ratio", FLUX_2_ASPECTS, "1:1"),
        )
        .set_opt(
            "resolution",
            input.choice_or("resolution", FLUX_2_RESOLUTIONS, "1 MP"),
        )
        .set_number_opt("seed", input.float("seed"))
        .set_opt("width", snapped_side(input, "width"))
        .set_opt("height", snapped_side(input, "height"))
        .set_opt(
            "output_format",
            input.choice_or("output_format", &["jpg", "png", "webp"], "webp"),
        )
        .set_opt("output_quality", input.int_or("output_quality", 0, 100, 80))
        .set_opt(
            "safety_tolerance",
            input.int_or("safety_tolerance", 1, 6, 2),
        )
        .set_opt("prompt_upsampling", input.flag("prompt_upsampling"))
        .set_list(
            "input_images",
            input.references("input_images", MAX_FLUX_2_REFERENCES),
        );
    fields.into_map()
}

/// 256..=2048, rounded to the nearest multiple of 32; dropped otherwise.
fn snapped_side(input: &InputReader<'_>, key: &str) -> Option<i64> {
    input
        .float_in(key, 256.0, 2048.0)
        .map(|side| (side / 32.0).round() as i64 * 32)
}

fn validate_flux_kontext(input: &InputReader<'_>) -> Map<String, Value> {
    let input_image = input
        .text("input_image")
        .or_else(|| input.reference("image_prompt"));

    let mut aspects = LEGACY_ASPECTS.to_vec();
    aspects.push("match_input_image");
    let mut aspect_ratio = input.choice("aspect_ratio", &aspects, "match_input_image");
    if input_image.is_none() && aspect_ratio == "match_input_image" {
        aspect_ratio = "1:1".to_string();
    }

    let output_format = input
        .text("output_format")
        .map(|format| format.to_ascii_lowercase())
        .filter(|format| KONTEXT_FORMATS.contains(&format.as_str()))
        .unwrap_or_else(|| "png".to_string());

    let mut safety_tolerance = input
        .int_or("safety_tolerance", 0, 6, 2)
        .unwrap_or(2);
    if input_image.is_some() && safety_tolerance > 2 {
        safety_tolerance = 2;
    }

    let mut fields = Fields::new();
    fields
        .set("aspect_ratio", aspect_ratio)
        .set("output_format", output_format)
        .set("safety_tolerance", safety_tolerance)
        .set_opt("input_image", input_image)
        .set_opt("prompt_upsampling", input.flag("prompt_upsampling"))
        .set_opt("seed", input.seed("seed", i64::MAX));
    fields.into_map()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::models::ModelRegistry;

    #[test]
    fn flux_2_pro_caps_reference_images_at_eight() {
        let registry = ModelRegistry::default();
        let adapter = registry.get("flux_2_pro").unwrap();
        let images = (0..12)
            .map(|idx| format!("https://cdn.example/{idx}.png"))
            .collect::<Vec<_>>();
        let payload = adapter
            .prepare(&json!({"prompt": "p", "input_images": images}))
            .unwrap()
            .1;
        assert_eq!(payload["input_images"].as_array().unwrap().len(), 8);
        assert_eq!(payload["input_images"][7], json!("https://cdn.example/7.png"));
    }

    #[test]
    fn flux_2_pro_replaces_invalid_values_with_fallbacks() {
        let registry = ModelRegistry::default();
        let adapter = registry.get("flux_2_pro").unwrap();
        let payload = adapter
            .prepare(&json!({
                "prompt": "p",
                "aspect_ratio": "7:3",
                "resolution": "8 MP",
                "output_format": "tiff",
                "width": 1000,
                "height": 4000,
            }))
            .unwrap()
            .1;
        assert_eq!(payload["aspect_ratio"], json!("1:1"));
        assert_eq!(payload["resolution"], json!("1 MP"));
        assert_eq!(payload["output_format"], json!("webp"));
        assert_eq!(payload["width"], json!(992));
        assert!(payload.get("height").is_none());
    }

    #[test]
    fn flux_kontext_without_image_generates_square() {
        let registry = ModelRegistry::default();
        let adapter = registry.get("flux_kontext").unwrap();
        let payload = adapter.prepare(&json!({"prompt": "p"})).unwrap().1;
        assert_eq!(payload["aspect_ratio"], json!("1:1"));
        assert_eq!(payload["output_format"], json!("png"));
        assert_eq!(payload["safety_tolerance"], json!(2));
    }

    #[test]
    fn flux_kontext_accepts_image_prompt_and_limits_tolerance() {
        let registry = ModelRegistry::default();
        let adapter = registry.get("flux_kontext").unwrap();
        let payload = adapter
            .prepare(&json!({
                "prompt": "p",
                "image_prompt": "https://cdn.example/in.png",
                "safety_tolerance": 5,
                "output_format": "JPG",
            }))
            .unwrap()
            .1;
        assert_eq!(payload["input_image"], json!("https://cdn.example/in.png"));
        assert_eq!(payload["aspect_ratio"], json!("match_input_image"));
        assert_eq!(payload["safety_tolerance"], json!(2));
        assert_eq!(payload["output_format"], json!("jpg"));
        assert!(payload.get("image_prompt").is_none());
    }

    #[test]
    fn flux_1_1_pro_custom_aspect_validates_dimensions() {
        let registry = ModelRegistry::default();
        let adapter = registry.get("flux_1_1_pro").unwrap();
        let payload = adapter
            .prepare(&json!({
                "prompt": "p",
                "aspect_ratio": "custom",
                "width": 1000,
                "height": 512,
            }))
            .unwrap()
            .1;
        assert_eq!(payload["width"], json!(1024));
        assert_eq!(payload["height"], json!(512));
    }

    #[test]
    fn reference_alias_maps_to_image_prompt() {
        let registry = ModelRegistry::default();
        let adapter = registry.get("flux_1_1_pro_ultra").unwrap();
        let payload = adapter
            .prepare(&json!({
                "prompt": "p",
                "reference_images": ["https://cdn.example/a.png", "https://cdn.example/b.png"],
                "image_prompt_strength": 4,
            }))
            .unwrap()
            .1;
        assert_eq!(payload["image_prompt"], json!("https://cdn.example/a.png"));
        assert_eq!(payload["image_prompt_strength"], json!(0.1));
        assert!(payload.get("reference_images").is_none());
    }
}
