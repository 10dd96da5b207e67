use base64::Engine as _;
use wiremock::matchers::{method, path_regex};
use wiremock::{Mock, MockBuilder, MockServer};

pub const GENERATE_CONTENT_PATH_REGEX: &str = r"^/v1beta/models/[^/:]+:generateContent$";
pub const PREDICT_LONG_RUNNING_PATH_REGEX: &str = r"^/v1beta/models/[^/:]+:predictLongRunning$";
pub const OPERATION_PATH: &str = "/v1beta/models/veo/operations/op-1";

pub fn post_path_regex(regex: &str) -> MockBuilder {
    Mock::given(method("POST")).and(path_regex(regex))
}

/// A `generateContent` body whose first candidate carries these images.
pub fn inline_images_body(images: &[&[u8]]) -> serde_json::Value {
    let parts: Vec<serde_json::Value> = images
        .iter()
        .map(|bytes| {
            serde_json::json!({
                "inlineData": {
                    "mimeType": "image/png",
                    "data": base64::engine::general_purpose::STANDARD.encode(bytes)
                }
            })
        })
        .collect();

    serde_json::json!({ "candidates": [{ "content": { "parts": parts } }] })
}

/// JSON bodies of every POST the server saw, in arrival order.
pub async fn posted_json(server: &MockServer) -> Vec<serde_json::Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.method.as_str() == "POST")
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect()
}

pub async fn request_count(server: &MockServer, http_method: &str, path: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.method.as_str() == http_method && r.url.path() == path)
        .count()
}
