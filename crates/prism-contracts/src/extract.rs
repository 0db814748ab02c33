use std::collections::HashSet;

use serde_json::{Map, Value};

pub const DEFAULT_ASSET_HOST: &str = "https://replicate.delivery";

const BASE64_KEYS: [&str; 3] = ["b64_json", "base64", "image_base64"];
const URL_KEYS: [&str; 17] = [
    "image",
    "image_url",
    "asset_url",
    "url",
    "path",
    "output",
    "outputs",
    "result",
    "results",
    "download_url",
    "thumbnail",
    "cover",
    "content",
    "data",
    "asset",
    "assets",
    "signed_url",
];
const IMAGE_EXTENSIONS: [&str; 9] = [
    "png", "jpg", "jpeg", "webp", "gif", "bmp", "avif", "heic", "heif",
];
const VIDEO_EXTENSIONS: [&str; 3] = ["mp4", "mov", "webm"];
const VIDEO_PATH_MARKER: &str = "/api/videos/";

/// Finds image URLs and base64 payloads inside arbitrary provider output.
#[derive(Debug, Clone)]
pub struct OutputExtractor {
    asset_host: String,
}

impl Default for OutputExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_ASSET_HOST)
    }
}

impl OutputExtractor {
    /// `asset_host` is the origin relative `/api/...` paths resolve against;
    /// any URL on that host counts as an image even without an extension.
    pub fn new(asset_host: impl Into<String>) -> Self {
        Self {
            asset_host: asset_host.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn asset_host(&self) -> &str {
        &self.asset_host
    }

    /// Every image URL in first-seen order, without duplicates.
    pub fn extract_all(&self, output: &Value) -> Vec<String> {
        let mut found = Vec::new();
        let mut visited = HashSet::new();
        self.collect(output, &mut found, &mut visited);

        let mut seen = HashSet::new();
        found.retain(|url| seen.insert(url.clone()));
        found
    }

    pub fn extract_first(&self, output: &Value) -> Option<String> {
        self.extract_all(output).into_iter().next()
    }

    /// Returns whether anything was appended.
    fn collect(
        &self,
        value: &Value,
        found: &mut Vec<String>,
        visited: &mut HashSet<*const Map<String, Value>>,
    ) -> bool {
        match value {
            Value::String(raw) => match self.accept(raw) {
                Some(url) => {
                    found.push(url);
                    true
                }
                None => false,
            },
            Value::Array(items) => {
                let mut any = false;
                for item in items {
                    any |= self.collect(item, found, visited);
                }
                any
            }
            Value::Object(record) => {
                if !visited.insert(record as *const Map<String, Value>) {
                    return false;
                }
                if let Some(data_uri) = base64_data_uri(record) {
                    found.push(data_uri);
                    return true;
                }
                let url_keys = URL_KEYS.iter().filter_map(|key| record.get(*key));
                let other_keys = record
                    .iter()
                    .filter(|(key, _)| !URL_KEYS.contains(&key.as_str()))
                    .map(|(_, value)| value);
                for candidate in url_keys.chain(other_keys) {
                    if self.collect(candidate, found, visited) {
                        return true;
                    }
                }
                false
            }
            Value::Null | Value::Bool(_) | Value::Number(_) => false,
        }
    }

    fn accept(&self, raw: &str) -> Option<String> {
        let url = self.absolutize(raw)?;
        let lower = url.to_ascii_lowercase();
        if lower.starts_with("data:image/") {
            return Some(url);
        }
        if !(lower.starts_with("http://") || lower.starts_with("https://")) {
            return None;
        }
        if is_video_like(&lower) {
            return None;
        }
        let on_asset_host = host_of(&lower)
            .zip(host_of(&self.asset_host.to_ascii_lowercase()))
            .is_some_and(|(host, asset)| host == asset || host.ends_with(&format!(".{asset}")));
        if on_asset_host || has_extension(&lower, &IMAGE_EXTENSIONS) {
            return Some(url);
        }
        None
    }

    fn absolutize(&self, raw: &str) -> Option<String> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        if let Some(rest) = trimmed.strip_prefix("//") {
            return Some(format!("https://{rest}"));
        }
        if trimmed.starts_with("/api/") {
            return Some(format!("{}{trimmed}", self.asset_host));
        }
        Some(trimmed.to_string())
    }
}

pub fn extract_all(output: &Value) -> Vec<String> {
    OutputExtractor::default().extract_all(output)
}

pub fn extract_first(output: &Value) -> Option<String> {
    OutputExtractor::default().extract_first(output)
}

fn base64_data_uri(record: &Map<String, Value>) -> Option<String> {
    let payload = BASE64_KEYS
        .iter()
        .filter_map(|key| record.get(*key).and_then(Value::as_str))
        .find(|payload| !payload.is_empty())?;
    let format = record
        .get("format")
        .and_then(Value::as_str)
        .map(|format| format.trim().to_ascii_lowercase())
        .filter(|format| !format.is_empty())
        .unwrap_or_else(|| "png".to_string());
    Some(format!("data:image/{format};base64,{payload}"))
}

fn is_video_like(lower: &str) -> bool {
    lower.contains(VIDEO_PATH_MARKER) || has_extension(lower, &VIDEO_EXTENSIONS)
}

/// Checks the path component, ignoring query and fragment.
fn has_extension(lower: &str, extensions: &[&str]) -> bool {
    let path = lower
        .split(['?', '#'])
        .next()
        .unwrap_or_default();
    path.rsplit_once('.')
        .is_some_and(|(stem, ext)| !stem.ends_with('/') && extensions.contains(&ext))
}

fn host_of(url: &str) -> Option<&str> {
    let (_, rest) = url.split_once("://")?;
    let authority = rest.split(['/', '?', '#']).next()?;
    let host = authority.rsplit('@').next()?;
    let host = host.split(':').next()?;
    (!host.is_empty()).then_some(host)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{extract_all, extract_first, OutputExtractor};

    #[test]
    fn duplicate_urls_collapse() {
        let urls = extract_all(&json!({"output": ["https://cdn/a.png", "https://cdn/a.png"]}));
        assert_eq!(urls, vec!["https://cdn/a.png"]);
    }

    #[test]
    fn video_siblings_are_excluded() {
        let urls = extract_all(&json!({
            "output": ["https://cdn.example/clip.mp4", "https://cdn.example/still.png"],
        }));
        assert_eq!(urls, vec!["https://cdn.example/still.png"]);

        let urls = extract_all(&json!({
            "video": "https://cdn.example/clip.webm?x=1",
            "poster": "https://cdn.example/poster.jpg",
        }));
        assert_eq!(urls, vec!["https://cdn.example/poster.jpg"]);
    }

    #[test]
    fn video_path_on_asset_host_is_excluded() {
        assert!(extract_all(&json!("/api/videos/abc")).is_empty());
        assert!(extract_all(&json!({"image": "https://replicate.delivery/x/out.mov"})).is_empty());
    }

    #[test]
    fn base64_becomes_data_uri() {
        let urls = extract_all(&json!({"b64_json": "QUJD", "format": "webp"}));
        assert_eq!(urls, vec!["data:image/webp;base64,QUJD"]);

        let urls = extract_all(&json!([{"image_base64": "QUJD", "format": " JPEG "}, {"base64": "REVG"}]));
        assert_eq!(
            urls,
            vec!["data:image/jpeg;base64,QUJD", "data:image/png;base64,REVG"]
        );
    }

    #[test]
    fn relative_and_protocol_relative_paths_are_absolutized() {
        let extractor = OutputExtractor::new("https://assets.example/");
        assert_eq!(
            extractor.extract_first(&json!({"url": "/api/images/abc"})),
            Some("https://assets.example/api/images/abc".to_string())
        );
        assert_eq!(
            extractor.extract_first(&json!("//cdn.example/a.webp")),
            Some("https://cdn.example/a.webp".to_string())
        );
        assert!(extractor.extract_all(&json!("images/a.png")).is_empty());
    }

    #[test]
    fn asset_host_urls_need_no_extension() {
        let urls = extract_all(&json!("https://replicate.delivery/pbxt/abc/out"));
        assert_eq!(urls.len(), 1);
        assert!(extract_all(&json!("https://example.com/page")).is_empty());
        assert_eq!(
            extract_all(&json!("https://cdn.example/a.PNG?sig=1#frag")),
            vec!["https://cdn.example/a.PNG?sig=1#frag"]
        );
    }

    #[test]
    fn url_keys_are_searched_before_other_keys() {
        let output = json!({
            "meta": {"preview": "https://cdn.example/preview.png"},
            "result": {"download_url": "https://cdn.example/final.png"},
        });
        assert_eq!(
            extract_first(&output),
            Some("https://cdn.example/final.png".to_string())
        );
        assert_eq!(extract_all(&output), vec!["https://cdn.example/final.png"]);
    }

    #[test]
    fn nested_arrays_are_searched_exhaustively() {
        let output = json!([
            [{"images": [{"url": "https://cdn.example/1.png"}]}],
            {"data": ["https://cdn.example/2.jpg", 7, null, true]},
        ]);
        assert_eq!(
            extract_all(&output),
            vec!["https://cdn.example/1.png", "https://cdn.example/2.jpg"]
        );
    }

    #[test]
    fn nothing_usable_yields_empty() {
        assert!(extract_all(&json!(null)).is_empty());
        assert!(extract_first(&json!({"status": "succeeded", "count": 2})).is_none());
    }
}
