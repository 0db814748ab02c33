use anyhow::Context;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::blocking::multipart::{Form as MultipartForm, Part as MultipartPart};
use reqwest::blocking::Client as HttpClient;
use serde_json::{Map, Value};

use super::{build_http_client, json_value_to_form_text, response_json_or_error, ImageApi};
use crate::config::ProxyConfig;
use crate::error::ProxyError;

const PROVIDER: &str = "OpenAI";
const EDITS_PROVIDER: &str = "OpenAI edits";
const KEY_VARIABLE: &str = "OPENAI_API_KEY";

pub struct OpenAiClient {
    api_base: String,
    api_key: Option<String>,
    http: HttpClient,
}

#[derive(Debug, PartialEq)]
struct ImageBytes {
    bytes: Vec<u8>,
    mime_type: Option<String>,
}

impl OpenAiClient {
    pub fn new(config: &ProxyConfig) -> anyhow::Result<Self> {
        Ok(Self {
            api_base: config.openai_api_base.clone(),
            api_key: config.openai_api_key.clone(),
            http: build_http_client(config.http_timeout)
                .context("failed to build OpenAI HTTP client")?,
        })
    }

    fn api_key(&self) -> Result<&str, ProxyError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| ProxyError::missing_credential(KEY_VARIABLE))
    }

    fn load_source(&self, source: &str) -> Result<ImageBytes, ProxyError> {
        if source.starts_with("data:") {
            return decode_data_uri(source);
        }
        self.download_image(source)
    }

    fn download_image(&self, url: &str) -> Result<ImageBytes, ProxyError> {
        let response = self.http.get(url).send().map_err(|err| {
            ProxyError::transport(&format!("failed downloading image ({url})"), err)
        })?;
        if !response.status().is_success() {
            let code = response.status().as_u16();
            let body = response.text().unwrap_or_default();
            return Err(ProxyError::upstream("Image download", code, &body));
        }
        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .map_err(|err| ProxyError::transport("failed reading image bytes", err))?
            .to_vec();
        Ok(ImageBytes { bytes, mime_type })
    }
}

impl ImageApi for OpenAiClient {
    fn generate(&self, body: &Map<String, Value>) -> Result<Value, ProxyError> {
        let api_key = self.api_key()?;
        let endpoint = format!("{}/images/generations", self.api_base);
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(api_key)
            .json(body)
            .send()
            .map_err(|err| {
                ProxyError::transport(&format!("OpenAI request failed ({endpoint})"), err)
            })?;
        response_json_or_error(PROVIDER, response)
    }

    fn edit(
        &self,
        fields: &Map<String, Value>,
        images: &[String],
        mask: Option<&str>,
    ) -> Result<Value, ProxyError> {
        let api_key = self.api_key()?;
        let endpoint = format!("{}/images/edits", self.api_base);
        let mut form = MultipartForm::new();
        for (key, value) in fields {
            form = form.text(key.clone(), json_value_to_form_text(value));
        }
        let image_field = image_field_name(fields);
        for (index, source) in images.iter().enumerate() {
            let image = self.load_source(source)?;
            form = form.part(image_field, image_part(image, &format!("image-{index}"))?);
        }
        if let Some(mask) = mask {
            let image = self.load_source(mask)?;
            form = form.part("mask", image_part(image, "mask")?);
        }
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(api_key)
            .multipart(form)
            .send()
            .map_err(|err| ProxyError::transport("OpenAI edits request failed", err))?;
        response_json_or_error(EDITS_PROVIDER, response)
    }

    fn fetch_image(&self, url: &str) -> Result<Vec<u8>, ProxyError> {
        Ok(self.download_image(url)?.bytes)
    }
}

/// DALL-E 2 edits take one `image` file; newer models take `image[]`.
fn image_field_name(fields: &Map<String, Value>) -> &'static str {
    match fields.get("model").and_then(Value::as_str) {
        Some("dall-e-2") => "image",
        _ => "image[]",
    }
}

fn image_part(image: ImageBytes, stem: &str) -> Result<MultipartPart, ProxyError> {
    let mime = image
        .mime_type
        .as_deref()
        .map(|mime| mime.split(';').next().unwrap_or(mime).trim().to_string())
        .filter(|mime| mime.starts_with("image/"))
        .unwrap_or_else(|| "image/png".to_string());
    let file_name = format!("{stem}.{}", extension_for_mime(&mime));
    MultipartPart::bytes(image.bytes)
        .file_name(file_name)
        .mime_str(&mime)
        .map_err(|_| ProxyError::InvalidResponse(format!("invalid image mime type '{mime}'")))
}

fn decode_data_uri(uri: &str) -> Result<ImageBytes, ProxyError> {
    let invalid = || ProxyError::InvalidResponse("malformed data URI image".to_string());
    let rest = uri.strip_prefix("data:").ok_or_else(invalid)?;
    let (header, payload) = rest.split_once(',').ok_or_else(invalid)?;
    let mime = header.strip_suffix(";base64").ok_or_else(invalid)?;
    let bytes = BASE64
        .decode(payload.trim().as_bytes())
        .map_err(|_| invalid())?;
    Ok(ImageBytes {
        bytes,
        mime_type: (!mime.is_empty()).then(|| mime.to_string()),
    })
}

fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "png",
    }
}
