use serde_json::{Map, Value};

use super::descriptor::ModelDescriptor;
use super::params::{InputReader, ValidationError};

/// Exact JSON body handed to the upstream provider.
pub type UpstreamPayload = Map<String, Value>;

/// Reads the model's optional fields. Must never fail: out-of-range or
/// wrong-typed values are corrected, not rejected.
pub type ValidateFn = fn(&InputReader<'_>) -> Map<String, Value>;
pub type TransformFn = fn(&ValidatedInput) -> UpstreamPayload;

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedInput {
    pub prompt: String,
    /// Every entry is acceptable to the upstream as-is.
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct ModelAdapter {
    pub descriptor: ModelDescriptor,
    validate: ValidateFn,
    transform: TransformFn,
}

impl ModelAdapter {
    pub fn new(descriptor: ModelDescriptor, validate: ValidateFn) -> Self {
        Self {
            descriptor,
            validate,
            transform: passthrough,
        }
    }

    pub fn with_transform(mut self, transform: TransformFn) -> Self {
        self.transform = transform;
        self
    }

    pub fn key(&self) -> &'static str {
        self.descriptor.key
    }

    pub fn validate(&self, raw: &Value) -> Result<ValidatedInput, ValidationError> {
        let reader = InputReader::new(raw)?;
        let prompt = reader.prompt()?;
        let fields = (self.validate)(&reader);
        Ok(ValidatedInput { prompt, fields })
    }

    pub fn transform(&self, validated: &ValidatedInput) -> UpstreamPayload {
        (self.transform)(validated)
    }

    pub fn prepare(&self, raw: &Value) -> Result<(ValidatedInput, UpstreamPayload), ValidationError> {
        let validated = self.validate(raw)?;
        let payload = self.transform(&validated);
        Ok((validated, payload))
    }
}

/// Prompt first, then the validated fields in the order they were produced.
pub fn passthrough(validated: &ValidatedInput) -> UpstreamPayload {
    let mut payload = Map::new();
    payload.insert("prompt".to_string(), Value::String(validated.prompt.clone()));
    for (key, value) in &validated.fields {
        payload.insert(key.clone(), value.clone());
    }
    payload
}
