use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use prism_contracts::extract::OutputExtractor;
use prism_contracts::models::{ModelAdapter, ModelRegistry, Provider};
use prism_contracts::predictions::{
    GenerateResponse, GeneratedImage, PredictionHandle, PredictionStatus, StatusReport,
};
use serde_json::{Map, Value};

use crate::error::ProxyError;
use crate::upstream::{truncate_text, ImageApi, PredictionApi};

const PREDICT_ROUTE: &str = "/predict";
const GENERATE_ROUTE: &str = "/generate";
const IMAGE_INPUT_KEY: &str = "image_input";
const MASK_KEY: &str = "mask";

/// Resolves a model key, validates and transforms the input, and makes the
/// single upstream call. Never retries: creation is not idempotent.
#[derive(Clone)]
pub struct Submitter {
    registry: Arc<ModelRegistry>,
    predictions: Arc<dyn PredictionApi>,
    images: Arc<dyn ImageApi>,
    extractor: OutputExtractor,
}

impl Submitter {
    pub fn new(
        registry: Arc<ModelRegistry>,
        predictions: Arc<dyn PredictionApi>,
        images: Arc<dyn ImageApi>,
        extractor: OutputExtractor,
    ) -> Self {
        Self {
            registry,
            predictions,
            images,
            extractor,
        }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn submit(&self, model_key: &str, raw: &Value) -> Result<PredictionHandle, ProxyError> {
        let adapter = self.adapter_for(model_key, Provider::Replicate, PREDICT_ROUTE)?;
        let (_, payload) = adapter.prepare(raw)?;
        let upstream_path = adapter.descriptor.upstream_path;
        tracing::info!(model = model_key, upstream = upstream_path, "creating prediction");

        let created = self
            .predictions
            .create_prediction(upstream_path, &payload, true)?;
        let handle = PredictionHandle::from_upstream(&created).ok_or_else(|| {
            ProxyError::InvalidResponse("Replicate response is missing a prediction id".to_string())
        })?;
        tracing::info!(
            model = model_key,
            prediction_id = %handle.id,
            status = handle.status.as_str(),
            "prediction created"
        );
        Ok(handle)
    }

    /// One status fetch. Succeeded predictions come back with their image
    /// URLs already extracted.
    pub fn status(&self, id: &str, wait: Option<u32>) -> Result<StatusReport, ProxyError> {
        if !is_prediction_id(id) {
            return Err(ProxyError::MalformedRequest(format!(
                "invalid prediction id '{}'",
                truncate_text(id, 64)
            )));
        }
        let payload = self.predictions.get_prediction(id, wait)?;
        let report = StatusReport::from_upstream(&payload).ok_or_else(|| {
            ProxyError::InvalidResponse("Replicate response is missing a prediction id".to_string())
        })?;
        if report.status != PredictionStatus::Succeeded {
            return Ok(report);
        }
        let urls = self.extractor.extract_all(&report.output);
        Ok(report.with_images(urls))
    }

    /// Synchronous OpenAI-style generation; switches to the edit endpoint
    /// when reference images are present.
    pub fn generate(&self, model_key: &str, raw: &Value) -> Result<GenerateResponse, ProxyError> {
        let adapter = self.adapter_for(model_key, Provider::OpenAi, GENERATE_ROUTE)?;
        let (_, mut payload) = adapter.prepare(raw)?;
        let upstream_path = adapter.descriptor.upstream_path;

        let images: Vec<String> = match payload.shift_remove(IMAGE_INPUT_KEY) {
            Some(Value::Array(items)) => items
                .into_iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        };
        let mask = payload
            .shift_remove(MASK_KEY)
            .and_then(|value| value.as_str().map(str::to_string));

        let mut body = Map::new();
        body.insert("model".to_string(), Value::String(upstream_path.to_string()));
        body.extend(payload);
        if upstream_path.starts_with("dall-e") {
            body.insert(
                "response_format".to_string(),
                Value::String("b64_json".to_string()),
            );
        }

        let response = if images.is_empty() {
            tracing::info!(model = model_key, "requesting image generation");
            self.images.generate(&body)?
        } else {
            tracing::info!(
                model = model_key,
                images = images.len(),
                masked = mask.is_some(),
                "requesting image edit"
            );
            self.images.edit(&body, &images, mask.as_deref())?
        };
        self.collect_images(&response)
    }

    fn adapter_for(
        &self,
        model_key: &str,
        provider: Provider,
        route: &'static str,
    ) -> Result<&ModelAdapter, ProxyError> {
        let adapter = self.registry.get(model_key)?;
        if adapter.descriptor.provider != provider {
            return Err(ProxyError::UnsupportedProvider {
                model: model_key.to_string(),
                provider: adapter.descriptor.provider.as_str(),
                route,
            });
        }
        Ok(adapter)
    }

    fn collect_images(&self, response: &Value) -> Result<GenerateResponse, ProxyError> {
        let rows = response
            .get("data")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let mut images = Vec::new();
        for row in rows {
            let Some(obj) = row.as_object() else {
                continue;
            };
            let revised_prompt = obj
                .get("revised_prompt")
                .and_then(Value::as_str)
                .map(str::to_string);
            if let Some(b64) = obj.get("b64_json").and_then(Value::as_str) {
                images.push(GeneratedImage {
                    b64_json: b64.to_string(),
                    revised_prompt,
                });
                continue;
            }
            if let Some(url) = obj.get("url").and_then(Value::as_str) {
                let bytes = self.images.fetch_image(url)?;
                images.push(GeneratedImage {
                    b64_json: BASE64.encode(bytes),
                    revised_prompt,
                });
            }
        }
        if images.is_empty() {
            return Err(ProxyError::InvalidResponse(
                "OpenAI response returned no images".to_string(),
            ));
        }
        let created = response
            .get("created")
            .and_then(Value::as_i64)
            .unwrap_or_else(unix_now);
        Ok(GenerateResponse {
            success: true,
            images,
            created,
        })
    }
}

/// Upstream ids are opaque tokens; anything else could escape the
/// predictions path once joined into the URL.
fn is_prediction_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
pub(crate) mod fakes {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use prism_contracts::models::UpstreamPayload;
    use serde_json::{json, Map, Value};

    use crate::error::ProxyError;
    use crate::upstream::{ImageApi, PredictionApi};

    /// Records every call; answers from a queue, then from `fallback`.
    #[derive(Default)]
    pub struct FakePredictions {
        pub created: Mutex<Vec<(String, UpstreamPayload, bool)>>,
        pub fetched: Mutex<Vec<(String, Option<u32>)>>,
        pub create_replies: Mutex<VecDeque<Result<Value, ProxyError>>>,
        pub status_replies: Mutex<VecDeque<Result<Value, ProxyError>>>,
    }

    impl PredictionApi for FakePredictions {
        fn create_prediction(
            &self,
            model: &str,
            input: &UpstreamPayload,
            stream: bool,
        ) -> Result<Value, ProxyError> {
            let mut created = self.created.lock().unwrap();
            created.push((model.to_string(), input.clone(), stream));
            let index = created.len();
            self.create_replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(json!({"id": format!("pred-{index}"), "status": "starting"})))
        }

        fn get_prediction(&self, id: &str, wait: Option<u32>) -> Result<Value, ProxyError> {
            self.fetched.lock().unwrap().push((id.to_string(), wait));
            self.status_replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(json!({"id": id, "status": "processing"})))
        }
    }

    #[derive(Default)]
    pub struct FakeImages {
        pub generated: Mutex<Vec<Map<String, Value>>>,
        pub edited: Mutex<Vec<(Map<String, Value>, Vec<String>, Option<String>)>>,
        pub reply: Mutex<Option<Value>>,
    }

    impl FakeImages {
        fn reply(&self) -> Value {
            self.reply
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| json!({"created": 1700000000, "data": [{"b64_json": "QUJD"}]}))
        }
    }

    impl ImageApi for FakeImages {
        fn generate(&self, body: &Map<String, Value>) -> Result<Value, ProxyError> {
            self.generated.lock().unwrap().push(body.clone());
            Ok(self.reply())
        }

        fn edit(
            &self,
            fields: &Map<String, Value>,
            images: &[String],
            mask: Option<&str>,
        ) -> Result<Value, ProxyError> {
            self.edited.lock().unwrap().push((
                fields.clone(),
                images.to_vec(),
                mask.map(str::to_string),
            ));
            Ok(self.reply())
        }

        fn fetch_image(&self, _url: &str) -> Result<Vec<u8>, ProxyError> {
            Ok(b"XYZ".to_vec())
        }
    }
}
