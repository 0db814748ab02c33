use serde_json::{Map, Number, Value};

/// Provider-neutral alias every image-capable adapter accepts for its native
/// reference-image field.
pub const REFERENCE_IMAGES_KEY: &str = "reference_images";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("prompt is required and must be a string")]
    MissingPrompt,
    #[error("input must be a JSON object")]
    NotAnObject,
}

/// Read-only view over a loosely typed request payload.
///
/// Every accessor is permissive: wrong types and out-of-range values come back
/// as `None` or as the caller's fallback, never as an error. `null` is treated
/// the same as a missing key.
#[derive(Debug, Clone, Copy)]
pub struct InputReader<'a> {
    raw: &'a Map<String, Value>,
}

impl<'a> InputReader<'a> {
    pub fn new(raw: &'a Value) -> Result<Self, ValidationError> {
        raw.as_object()
            .map(|raw| Self { raw })
            .ok_or(ValidationError::NotAnObject)
    }

    pub fn prompt(&self) -> Result<String, ValidationError> {
        match self.raw.get("prompt") {
            Some(Value::String(prompt)) if !prompt.trim().is_empty() => Ok(prompt.clone()),
            _ => Err(ValidationError::MissingPrompt),
        }
    }

    pub fn has(&self, key: &str) -> bool {
        self.value(key).is_some()
    }

    fn value(&self, key: &str) -> Option<&'a Value> {
        self.raw.get(key).filter(|value| !value.is_null())
    }

    /// Non-empty string value.
    pub fn text(&self, key: &str) -> Option<String> {
        self.value(key)
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }

    /// `key` if it is one of `allowed`, otherwise `default`.
    pub fn choice(&self, key: &str, allowed: &[&str], default: &str) -> String {
        self.choice_opt(key, allowed)
            .unwrap_or_else(|| default.to_string())
    }

    /// `key` if it is one of `allowed`, otherwise nothing.
    pub fn choice_opt(&self, key: &str, allowed: &[&str]) -> Option<String> {
        self.value(key)
            .and_then(Value::as_str)
            .filter(|value| allowed.contains(value))
            .map(str::to_string)
    }

    /// Nothing when `key` is absent or empty, `fallback` when it is present
    /// but not one of `allowed`.
    pub fn choice_or(&self, key: &str, allowed: &[&str], fallback: &str) -> Option<String> {
        match self.value(key) {
            None => None,
            Some(Value::String(value)) if value.is_empty() => None,
            Some(_) => Some(self.choice(key, allowed, fallback)),
        }
    }

    pub fn float(&self, key: &str) -> Option<f64> {
        self.value(key)
            .and_then(parse_value_to_f64)
            .filter(|value| value.is_finite())
    }

    pub fn int(&self, key: &str) -> Option<i64> {
        self.float(key).map(|value| value.round() as i64)
    }

    pub fn float_in(&self, key: &str, min: f64, max: f64) -> Option<f64> {
        self.float(key).filter(|value| (min..=max).contains(value))
    }

    pub fn int_in(&self, key: &str, min: i64, max: i64) -> Option<i64> {
        self.int(key).filter(|value| (min..=max).contains(value))
    }

    /// Nothing when absent, `fallback` when present but unusable or out of
    /// range.
    pub fn float_or(&self, key: &str, min: f64, max: f64, fallback: f64) -> Option<f64> {
        if !self.has(key) {
            return None;
        }
        Some(self.float_in(key, min, max).unwrap_or(fallback))
    }

    pub fn int_or(&self, key: &str, min: i64, max: i64, fallback: i64) -> Option<i64> {
        if !self.has(key) {
            return None;
        }
        Some(self.int_in(key, min, max).unwrap_or(fallback))
    }

    /// Always yields a value; zero counts as unset.
    pub fn float_default(&self, key: &str, min: f64, max: f64, default: f64) -> f64 {
        self.float_in(key, min, max)
            .filter(|value| *value != 0.0)
            .unwrap_or(default)
    }

    pub fn int_default(&self, key: &str, min: i64, max: i64, default: i64) -> i64 {
        self.int_in(key, min, max)
            .filter(|value| *value != 0)
            .unwrap_or(default)
    }

    /// Floors and clamps into `[min, max]` instead of rejecting.
    pub fn int_clamped(&self, key: &str, min: i64, max: i64) -> Option<i64> {
        self.float(key)
            .map(|value| (value.floor() as i64).clamp(min, max))
    }

    /// Non-negative whole number no larger than `max`.
    pub fn seed(&self, key: &str, max: i64) -> Option<i64> {
        self.float(key)
            .filter(|value| value.fract() == 0.0)
            .map(|value| value as i64)
            .filter(|value| (0..=max).contains(value))
    }

    pub fn flag(&self, key: &str) -> Option<bool> {
        self.value(key).and_then(value_as_bool)
    }

    /// String list from either an array or a single string, dropping blank
    /// and non-string entries and keeping at most `cap`.
    pub fn images(&self, key: &str, cap: usize) -> Vec<String> {
        match self.value(key) {
            Some(Value::Array(rows)) => rows
                .iter()
                .filter_map(Value::as_str)
                .filter(|row| !row.trim().is_empty())
                .take(cap)
                .map(str::to_string)
                .collect(),
            Some(Value::String(row)) if !row.trim().is_empty() && cap > 0 => {
                vec![row.clone()]
            }
            _ => Vec::new(),
        }
    }

    /// Native list field, falling back to the neutral `reference_images` alias.
    pub fn references(&self, native_key: &str, cap: usize) -> Vec<String> {
        if self.has(native_key) {
            return self.images(native_key, cap);
        }
        self.images(REFERENCE_IMAGES_KEY, cap)
    }

    /// Native single-image field, falling back to the first alias entry.
    pub fn reference(&self, native_key: &str) -> Option<String> {
        if self.has(native_key) {
            return self.text(native_key);
        }
        self.images(REFERENCE_IMAGES_KEY, 1).into_iter().next()
    }
}

/// Ordered builder for validated fields.
#[derive(Debug, Clone, Default)]
pub struct Fields {
    inner: Map<String, Value>,
}

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> &mut Self {
        self.inner.insert(key.to_string(), value.into());
        self
    }

    pub fn set_opt<T: Into<Value>>(&mut self, key: &str, value: Option<T>) -> &mut Self {
        if let Some(value) = value {
            self.set(key, value);
        }
        self
    }

    pub fn set_float(&mut self, key: &str, value: f64) -> &mut Self {
        if let Some(number) = Number::from_f64(value) {
            self.set(key, Value::Number(number));
        }
        self
    }

    pub fn set_float_opt(&mut self, key: &str, value: Option<f64>) -> &mut Self {
        if let Some(value) = value {
            self.set_float(key, value);
        }
        self
    }

    /// Whole numbers are written as integers.
    pub fn set_number_opt(&mut self, key: &str, value: Option<f64>) -> &mut Self {
        match value {
            Some(value) if value.fract() == 0.0 && value.abs() < i64::MAX as f64 => {
                self.set(key, value as i64)
            }
            other => self.set_float_opt(key, other),
        }
    }

    /// Skipped when the list is empty.
    pub fn set_list(&mut self, key: &str, values: Vec<String>) -> &mut Self {
        if !values.is_empty() {
            self.set(key, values);
        }
        self
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.inner
    }
}

fn parse_value_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(raw) => raw.as_f64(),
        Value::String(raw) => raw.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn value_as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(raw) => Some(*raw),
        Value::String(raw) => {
            let lowered = raw.trim().to_ascii_lowercase();
            if matches!(lowered.as_str(), "1" | "true" | "yes" | "on") {
                Some(true)
            } else if matches!(lowered.as_str(), "0" | "false" | "no" | "off") {
                Some(false)
            } else {
                None
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{Fields, InputReader, ValidationError};

    #[test]
    fn prompt_must_be_non_blank_string() {
        for raw in [json!({}), json!({"prompt": ""}), json!({"prompt": "  "}), json!({"prompt": 7})] {
            let reader = InputReader::new(&raw).unwrap();
            assert_eq!(reader.prompt(), Err(ValidationError::MissingPrompt));
        }
        assert_eq!(
            InputReader::new(&json!("boat")).err(),
            Some(ValidationError::NotAnObject)
        );
    }

    #[test]
    fn choice_or_distinguishes_absent_from_invalid() {
        let raw = json!({"a": "16:9", "b": "7:3", "c": null, "d": 4});
        let reader = InputReader::new(&raw).unwrap();
        let allowed = ["1:1", "16:9"];
        assert_eq!(reader.choice_or("a", &allowed, "1:1").as_deref(), Some("16:9"));
        assert_eq!(reader.choice_or("b", &allowed, "1:1").as_deref(), Some("1:1"));
        assert_eq!(reader.choice_or("c", &allowed, "1:1"), None);
        assert_eq!(reader.choice_or("d", &allowed, "1:1").as_deref(), Some("1:1"));
        assert_eq!(reader.choice_or("missing", &allowed, "1:1"), None);
    }

    #[test]
    fn numeric_accessors_accept_numeric_strings() {
        let raw = json!({"steps": "12", "quality": 140, "seed": 4.5, "flag": "yes"});
        let reader = InputReader::new(&raw).unwrap();
        assert_eq!(reader.int_in("steps", 1, 50), Some(12));
        assert_eq!(reader.int_or("quality", 0, 100, 80), Some(80));
        assert_eq!(reader.int_or("absent", 0, 100, 80), None);
        assert_eq!(reader.seed("seed", i64::MAX), None);
        assert_eq!(reader.flag("flag"), Some(true));
    }

    #[test]
    fn images_filters_and_caps() {
        let raw = json!({
            "image_input": ["a", "", 3, "b", "c"],
            "single": "only",
            "reference_images": ["x", "y"],
        });
        let reader = InputReader::new(&raw).unwrap();
        assert_eq!(reader.images("image_input", 2), vec!["a", "b"]);
        assert_eq!(reader.images("single", 5), vec!["only"]);
        assert_eq!(reader.references("input_images", 8), vec!["x", "y"]);
        assert_eq!(reader.references("image_input", 8), vec!["a", "b", "c"]);
        assert_eq!(reader.reference("image_prompt").as_deref(), Some("x"));
    }

    #[test]
    fn fields_skip_empty_lists_and_missing_options() {
        let mut fields = Fields::new();
        fields
            .set("prompt", "boat")
            .set_opt::<String>("seed", None)
            .set_list("image_input", Vec::new())
            .set_float("guidance", 3.0);
        let map = fields.into_map();
        assert_eq!(map.len(), 2);
        assert_eq!(map["guidance"], json!(3.0));
    }
}
