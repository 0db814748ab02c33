use serde_json::{Map, Value};

use super::google::SAFETY_FILTER_LEVELS;
use super::{Entry, OTHER_CATEGORY};
use crate::models::adapter::{passthrough, ModelAdapter, UpstreamPayload, ValidatedInput};
use crate::models::descriptor::Provider;
use crate::models::params::{Fields, InputReader};

const NANO_BANANA_PRO_ASPECTS: &[&str] = &[
    "match_input_image",
    "1:1",
    "2:3",
    "3:2",
    "3:4",
    "4:3",
    "4:5",
    "5:4",
    "9:16",
    "16:9",
    "21:9",
];
const NANO_BANANA_2_ASPECTS: &[&str] = &[
    "match_input_image",
    "1:1",
    "1:4",
    "1:8",
    "2:3",
    "3:2",
    "3:4",
    "4:1",
    "4:3",
    "4:5",
    "5:4",
    "8:1",
    "9:16",
    "16:9",
    "21:9",
];
const QWEN_ASPECTS: &[&str] = &["1:1", "16:9", "9:16", "21:9", "9:21", "2:3", "3:2", "4:5", "5:4"];
const SEEDREAM_5_ASPECTS: &[&str] = &["1:1", "4:3", "3:4", "16:9", "9:16", "3:2", "2:3", "21:9"];
const Z_IMAGE_RATIOS: &[(&str, f64)] = &[
    ("1:1", 1.0),
    ("16:9", 16.0 / 9.0),
    ("9:16", 9.0 / 16.0),
    ("21:9", 21.0 / 9.0),
    ("9:21", 9.0 / 21.0),
    ("2:3", 2.0 / 3.0),
    ("3:2", 3.0 / 2.0),
    ("3:4", 3.0 / 4.0),
    ("4:3", 4.0 / 3.0),
    ("4:5", 4.0 / 5.0),
    ("5:4", 5.0 / 4.0),
];
const MAX_NANO_BANANA_PRO_REFERENCES: usize = 14;
const MAX_SEEDREAM_4_REFERENCES: usize = 10;
const MAX_SEEDREAM_5_REFERENCES: usize = 14;
const MAX_SAFE_INTEGER: i64 = 9_007_199_254_740_991;

pub(super) fn adapters() -> Vec<ModelAdapter> {
    vec![
        Entry {
            key: "nano_banana",
            provider: Provider::Replicate,
            upstream_path: "google/nano-banana",
            category: OTHER_CATEGORY,
            image_reference: true,
            edit: true,
            display_name: "Nano Banana",
            description: "Google's image editing model in Gemini 2.5",
            cost_cents: 3.9,
            default_size: "1024x1024",
        }
        .adapter(validate_nano_banana),
        Entry {
            key: "nano_banana_pro",
            provider: Provider::Replicate,
            upstream_path: "google/nano-banana-pro",
            category: OTHER_CATEGORY,
            image_reference: true,
            edit: true,
            display_name: "Nano Banana Pro",
            description: "Google's Gemini 3 Pro-powered text-to-image and editing model with high fidelity text rendering",
            cost_cents: 14.0,
            default_size: "1K",
        }
        .adapter(validate_nano_banana_pro),
        Entry {
            key: "nano_banana_2",
            provider: Provider::Replicate,
            upstream_path: "google/nano-banana-2",
            category: OTHER_CATEGORY,
            image_reference: true,
            edit: true,
            display_name: "Nano Banana 2",
            description: "Google's Gemini 3.1 Flash Image: fast, high-fidelity generation with accurate text rendering and up to 4K output",
            cost_cents: 4.0,
            default_size: "1K",
        }
        .adapter(validate_nano_banana_2),
        Entry {
            key: "qwen_image",
            provider: Provider::Replicate,
            upstream_path: "qwen/qwen-image",
            category: OTHER_CATEGORY,
            image_reference: true,
            edit: true,
            display_name: "Qwen Image",
            description: "An image generation foundation model in the Qwen series that achieves significant advances in complex text rendering, especially Chinese text.",
            cost_cents: 2.5,
            default_size: "16:9",
        }
        .adapter(validate_qwen_image),
        Entry {
            key: "seedream4",
            provider: Provider::Replicate,
            upstream_path: "bytedance/seedream-4",
            category: OTHER_CATEGORY,
            image_reference: true,
            edit: true,
            display_name: "SeeDream-4",
            description: "Unified text-to-image generation and precise single-sentence editing at up to 4K resolution",
            cost_cents: 3.0,
            default_size: "2K",
        }
        .adapter(validate_seedream4),
        Entry {
            key: "seedream5_lite",
            provider: Provider::Replicate,
            upstream_path: "bytedance/seedream-5-lite",
            category: OTHER_CATEGORY,
            image_reference: true,
            edit: true,
            display_name: "SeeDream 5.0 Lite",
            description: "ByteDance lightweight text-to-image & editing model with text rendering, multi-image blending, and batch generation at up to 3K",
            cost_cents: 2.5,
            default_size: "2K",
        }
        .adapter(validate_seedream5_lite),
        Entry {
            key: "proteus_v0_3",
            provider: Provider::Replicate,
            upstream_path: "datacte/proteus-v0.3",
            category: OTHER_CATEGORY,
            image_reference: true,
            edit: true,
            display_name: "Proteus v0.3",
            description: "ProteusV0.3: The Anime Update - Specialized anime and artistic image generation model with enhanced anime capabilities",
            cost_cents: 0.0,
            default_size: "1024x1024",
        }
        .adapter(validate_proteus),
        Entry {
            key: "z_image_turbo",
            provider: Provider::Replicate,
            upstream_path: "prunaai/z-image-turbo",
            category: OTHER_CATEGORY,
            image_reference: false,
            edit: false,
            display_name: "Z-Image Turbo",
            description: "A fast 6B-parameter text-to-image model developed by Tongyi-MAI.",
            cost_cents: 2.0,
            default_size: "1024x1024",
        }
        .adapter(validate_z_image_turbo)
        .with_transform(transform_z_image_turbo),
    ]
}

fn validate_nano_banana(input: &InputReader<'_>) -> Map<String, Value> {
    let mut fields = Fields::new();
    fields
        .set(
            "output_format",
            input.choice("output_format", &["jpg", "png"], "jpg"),
        )
        .set_list("image_input", input.references("image_input", usize::MAX));
    fields.into_map()
}

fn validate_nano_banana_pro(input: &InputReader<'_>) -> Map<String, Value> {
    nano_banana_gen3(input, &["1K", "2K", "4K"], NANO_BANANA_PRO_ASPECTS)
}

fn validate_nano_banana_2(input: &InputReader<'_>) -> Map<String, Value> {
    nano_banana_gen3(input, &["512", "1K", "2K", "4K"], NANO_BANANA_2_ASPECTS)
}

fn nano_banana_gen3(
    input: &InputReader<'_>,
    resolutions: &[&str],
    aspects: &[&str],
) -> Map<String, Value> {
    let mut fields = Fields::new();
    fields
        .set("resolution", input.choice("resolution", resolutions, "1K"))
        .set(
            "output_format",
            input.choice("output_format", &["jpg", "png"], "jpg"),
        )
        .set_opt(
            "safety_filter_level",
            input.choice_opt("safety_filter_level", SAFETY_FILTER_LEVELS),
        )
        .set_list(
            "image_input",
            input.references("image_input", MAX_NANO_BANANA_PRO_REFERENCES),
        )
        .set_opt("aspect_ratio", input.choice_opt("aspect_ratio", aspects));
    fields.into_map()
}

fn validate_qwen_image(input: &InputReader<'_>) -> Map<String, Value> {
    let image = input.reference("image");
    let strength = input
        .float_or("strength", 0.0, 1.0, 0.9)
        .or(image.as_ref().map(|_| 0.9));
    let lora_weights = input.text("lora_weights");
    let lora_scale = if input.has("lora_scale") {
        Some(input.float("lora_scale").unwrap_or(1.0))
    } else {
        lora_weights.as_ref().map(|_| 1.0)
    };

    let mut fields = Fields::new();
    fields
        .set(
            "negative_prompt",
            input.text("negative_prompt").unwrap_or_else(|| " ".to_string()),
        )
        .set("aspect_ratio", input.choice("aspect_ratio", QWEN_ASPECTS, "16:9"))
        .set(
            "image_size",
            input
                .text("image_size")
                .unwrap_or_else(|| "optimize_for_quality".to_string()),
        )
        .set(
            "num_inference_steps",
            input.int_default("num_inference_steps", 1, 50, 30),
        )
        .set_number_opt("guidance", Some(input.float_default("guidance", 0.0, 10.0, 3.0)))
        .set("go_fast", input.flag("go_fast").unwrap_or(true))
        .set(
            "output_format",
            input.choice("output_format", &["webp", "jpg", "png"], "webp"),
        )
        .set("output_quality", input.int_default("output_quality", 0, 100, 80))
        .set_opt("image", image)
        .set_number_opt("strength", strength)
        .set_opt("enhance_prompt", input.flag("enhance_prompt"))
        .set_opt("seed", input.seed("seed", MAX_SAFE_INTEGER))
        .set_opt("lora_weights", lora_weights)
        .set_number_opt("lora_scale", lora_scale)
        .set_opt("disable_safety_checker", input.flag("disable_safety_checker"));
    fields.into_map()
}

fn validate_seedream4(input: &InputReader<'_>) -> Map<String, Value> {
    let size = input.choice("size", &["1K", "2K", "4K", "custom"], "2K");

    let mut fields = Fields::new();
    fields.set_list(
        "image_input",
        input.references("image_input", MAX_SEEDREAM_4_REFERENCES),
    );
    if size == "custom" {
        fields
            .set("width", input.int_in("width", 1024, 4096).unwrap_or(2048))
            .set("height", input.int_in("height", 1024, 4096).unwrap_or(2048));
    }
    if size != "2K" {
        fields.set("size", size);
    }
    fields.set_opt("aspect_ratio", input.text("aspect_ratio"));
    sequential_batch(input, &mut fields);
    fields.into_map()
}

fn validate_seedream5_lite(input: &InputReader<'_>) -> Map<String, Value> {
    let size = input.choice("size", &["2K", "3K"], "2K");

    let mut fields = Fields::new();
    fields
        .set(
            "output_format",
            input.choice("output_format", &["png", "jpg"], "png"),
        )
        .set_list(
            "image_input",
            input.references("image_input", MAX_SEEDREAM_5_REFERENCES),
        );
    if size != "2K" {
        fields.set("size", size);
    }
    fields.set_opt(
        "aspect_ratio",
        input.choice_opt("aspect_ratio", SEEDREAM_5_ASPECTS),
    );
    sequential_batch(input, &mut fields);
    fields.into_map()
}

/// Both SeeDream tiers only send the batch controls when they change
/// upstream behaviour.
fn sequential_batch(input: &InputReader<'_>, fields: &mut Fields) {
    if input.choice_opt("sequential_image_generation", &["auto"]).is_some() {
        fields.set("sequential_image_generation", "auto");
    }
    let max_images = input.int("max_images").map(|count| count.clamp(1, 15));
    fields.set_opt("max_images", max_images.filter(|count| *count > 1));
}

fn validate_proteus(input: &InputReader<'_>) -> Map<String, Value> {
    let image = input.reference("image");
    let mask = input.text("mask");
    let prompt_strength = input
        .float_or("prompt_strength", 0.0, 1.0, 0.8)
        .or((image.is_some() || mask.is_some()).then_some(0.8));

    let mut fields = Fields::new();
    fields
        .set(
            "negative_prompt",
            input
                .text("negative_prompt")
                .unwrap_or_else(|| "worst quality, low quality".to_string()),
        )
        .set("width", input.int_in("width", 1, i64::MAX).unwrap_or(1024))
        .set("height", input.int_in("height", 1, i64::MAX).unwrap_or(1024))
        .set("num_outputs", input.int_default("num_outputs", 1, 4, 1))
        .set(
            "scheduler",
            input
                .text("scheduler")
                .unwrap_or_else(|| "DPM++2MSDE".to_string()),
        )
        .set(
            "num_inference_steps",
            input.int_default("num_inference_steps", 1, 100, 20),
        )
        .set_number_opt(
            "guidance_scale",
            Some(input.float_default("guidance_scale", 1.0, 50.0, 7.5)),
        )
        .set(
            "apply_watermark",
            input.flag("apply_watermark").unwrap_or(true),
        )
        .set_opt("image", image)
        .set_opt("mask", mask)
        .set_number_opt("prompt_strength", prompt_strength)
        .set_opt("seed", input.seed("seed", i64::MAX))
        .set_opt("disable_safety_checker", input.flag("disable_safety_checker"));
    fields.into_map()
}

fn validate_z_image_turbo(input: &InputReader<'_>) -> Map<String, Value> {
    let (width, height) = z_image_dimensions(input);
    let output_format = input
        .text("output_format")
        .map(|format| format.to_ascii_lowercase())
        .filter(|format| format == "jpg" || format == "png")
        .unwrap_or_else(|| "jpg".to_string());

    let mut fields = Fields::new();
    fields
        .set("width", width)
        .set("height", height)
        .set("output_format", output_format)
        .set(
            "output_quality",
            input.int_clamped("output_quality", 0, 100).unwrap_or(80),
        )
        .set(
            "num_inference_steps",
            input.int_clamped("num_inference_steps", 1, 50).unwrap_or(8),
        )
        .set_opt("seed", input.int_clamped("seed", 0, MAX_SAFE_INTEGER));
    fields.into_map()
}

/// Explicit width and height win; otherwise height follows the aspect ratio
/// against a 1024 wide base.
fn z_image_dimensions(input: &InputReader<'_>) -> (i64, i64) {
    let width = input.int_clamped("width", 64, 1440);
    let height = input.int_clamped("height", 64, 1440);
    if let (Some(width), Some(height)) = (width, height) {
        return (width, height);
    }
    let ratio = input
        .text("aspect_ratio")
        .and_then(|aspect| {
            Z_IMAGE_RATIOS
                .iter()
                .find(|(label, _)| *label == aspect)
                .map(|(_, ratio)| *ratio)
        })
        .unwrap_or(1.0);
    let height = ((1024.0 / ratio).round() as i64).clamp(64, 1440);
    (1024, height)
}

/// The turbo distillation runs without classifier-free guidance.
fn transform_z_image_turbo(validated: &ValidatedInput) -> UpstreamPayload {
    let mut payload = passthrough(validated);
    payload.insert("guidance_scale".to_string(), Value::from(0));
    payload
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::models::ModelRegistry;

    #[test]
    fn nano_banana_pro_caps_at_fourteen() {
        let registry = ModelRegistry::default();
        let images = (0..20).map(|idx| format!("ref-{idx}")).collect::<Vec<_>>();
        for key in ["nano_banana_pro", "nano_banana_2"] {
            let payload = registry
                .get(key)
                .unwrap()
                .prepare(&json!({"prompt": "p", "image_input": images}))
                .unwrap()
                .1;
            assert_eq!(payload["image_input"].as_array().unwrap().len(), 14, "{key}");
            assert_eq!(payload["resolution"], json!("1K"));
        }
    }

    #[test]
    fn nano_banana_2_accepts_extreme_aspects() {
        let registry = ModelRegistry::default();
        let raw = json!({"prompt": "p", "aspect_ratio": "8:1", "resolution": "512"});
        let payload = registry.get("nano_banana_2").unwrap().prepare(&raw).unwrap().1;
        assert_eq!(payload["aspect_ratio"], json!("8:1"));
        assert_eq!(payload["resolution"], json!("512"));

        let payload = registry.get("nano_banana_pro").unwrap().prepare(&raw).unwrap().1;
        assert!(payload.get("aspect_ratio").is_none());
        assert_eq!(payload["resolution"], json!("1K"));
    }

    #[test]
    fn nano_banana_omits_empty_reference_list() {
        let registry = ModelRegistry::default();
        let payload = registry
            .get("nano_banana")
            .unwrap()
            .prepare(&json!({"prompt": "p", "image_input": []}))
            .unwrap()
            .1;
        assert!(payload.get("image_input").is_none());
        assert_eq!(payload["output_format"], json!("jpg"));
    }

    #[test]
    fn seedream4_custom_size_and_batch_controls() {
        let registry = ModelRegistry::default();
        let images = (0..12).map(|idx| format!("ref-{idx}")).collect::<Vec<_>>();
        let payload = registry
            .get("seedream4")
            .unwrap()
            .prepare(&json!({
                "prompt": "p",
                "image_input": images,
                "size": "custom",
                "width": 800,
                "height": 3000,
                "sequential_image_generation": "sometimes",
                "max_images": 40,
            }))
            .unwrap()
            .1;
        assert_eq!(payload["image_input"].as_array().unwrap().len(), 10);
        assert_eq!(payload["size"], json!("custom"));
        assert_eq!(payload["width"], json!(2048));
        assert_eq!(payload["height"], json!(3000));
        assert!(payload.get("sequential_image_generation").is_none());
        assert_eq!(payload["max_images"], json!(15));
    }

    #[test]
    fn seedream_default_size_is_not_sent() {
        let registry = ModelRegistry::default();
        let payload = registry
            .get("seedream5_lite")
            .unwrap()
            .prepare(&json!({"prompt": "p", "size": "2K", "max_images": 1}))
            .unwrap()
            .1;
        assert!(payload.get("size").is_none());
        assert!(payload.get("max_images").is_none());
        assert_eq!(payload["output_format"], json!("png"));
    }

    #[test]
    fn qwen_image_defaults_strength_for_img2img() {
        let registry = ModelRegistry::default();
        let payload = registry
            .get("qwen_image")
            .unwrap()
            .prepare(&json!({
                "prompt": "p",
                "image": "https://cdn.example/in.png",
                "go_fast": "maybe",
                "lora_weights": "owner/lora",
                "guidance": 0,
            }))
            .unwrap()
            .1;
        assert_eq!(payload["strength"], json!(0.9));
        assert_eq!(payload["go_fast"], json!(true));
        assert_eq!(payload["lora_scale"], json!(1));
        assert_eq!(payload["guidance"], json!(3));
        assert_eq!(payload["negative_prompt"], json!(" "));
        assert_eq!(payload["num_inference_steps"], json!(30));
    }

    #[test]
    fn z_image_turbo_derives_height_from_aspect() {
        let registry = ModelRegistry::default();
        let payload = registry
            .get("z_image_turbo")
            .unwrap()
            .prepare(&json!({"prompt": "p", "aspect_ratio": "16:9", "width": 900}))
            .unwrap()
            .1;
        assert_eq!(payload["width"], json!(1024));
        assert_eq!(payload["height"], json!(576));
        assert_eq!(payload["guidance_scale"], json!(0));
        assert_eq!(payload["num_inference_steps"], json!(8));
    }

    #[test]
    fn proteus_defaults_prompt_strength_with_mask() {
        let registry = ModelRegistry::default();
        let payload = registry
            .get("proteus_v0_3")
            .unwrap()
            .prepare(&json!({"prompt": "p", "mask": "https://cdn.example/m.png", "num_outputs": 9}))
            .unwrap()
            .1;
        assert_eq!(payload["prompt_strength"], json!(0.8));
        assert_eq!(payload["num_outputs"], json!(1));
        assert_eq!(payload["guidance_scale"], json!(7.5));
        assert_eq!(payload["scheduler"], json!("DPM++2MSDE"));
    }
}
