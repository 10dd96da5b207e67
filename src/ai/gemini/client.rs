use super::types::Operation;
use crate::models::DEFAULT_BASE_URL;
use crate::{Error, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

fn body_read_failure(e: reqwest::Error) -> Error {
    tracing::error!("Failed to read Gemini response body: {}", e);
    Error::Generation(format!("Failed to read Gemini response body: {}", e))
}

/// Downloaded media bytes plus the server-declared content type.
#[derive(Debug)]
pub struct Download {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// Lightweight Gemini REST handle, built fresh for each studio operation.
pub struct GeminiHttpClient {
    client: Client,
    api_key: String,
    base_url: String,
    timeout: Duration,
}

impl GeminiHttpClient {
    pub fn new(api_key: String, timeout: Duration) -> Self {
        Self::new_with_client(api_key, timeout, Client::new())
    }

    pub fn new_with_client(api_key: String, timeout: Duration, client: Client) -> Self {
        Self {
            client,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout,
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        let model = model.strip_prefix("models/").unwrap_or(model);
        format!("{}/v1beta/models/{}:{}", self.base_url, model, method)
    }

    async fn read_json<Resp: DeserializeOwned>(response: reqwest::Response) -> Result<Resp> {
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.map_err(body_read_failure)?;
            tracing::error!("Gemini API error (status {}): {}", status, error_text);
            return Err(Error::from_api_failure(status.as_u16(), &error_text));
        }

        let body = response.text().await.map_err(body_read_failure)?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::error!("Failed to parse Gemini response: {}\nBody: {}", e, body);
            Error::Generation(format!("Failed to parse Gemini response: {}", e))
        })
    }

    async fn post_to_url<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        url: String,
        request: &Req,
    ) -> Result<Resp> {
        tracing::debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to send request to Gemini: {}", e);
                Error::Generation(format!("Request to Gemini failed: {}", e))
            })?;

        Self::read_json(response).await
    }

    /// Calls Gemini's `generateContent` endpoint for frame requests.
    pub async fn generate_content<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        model: &str,
        request: &Req,
    ) -> Result<Resp> {
        self.post_to_url(self.model_url(model, "generateContent"), request)
            .await
    }

    /// Submits a long-running video job.
    pub async fn predict_long_running<Req: Serialize>(
        &self,
        model: &str,
        request: &Req,
    ) -> Result<Operation> {
        self.post_to_url(self.model_url(model, "predictLongRunning"), request)
            .await
    }

    /// Fetches the current state of `operation`, returning its replacement.
    pub async fn get_operation(&self, operation: Operation) -> Result<Operation> {
        let url = format!("{}/v1beta/{}", self.base_url, operation.name);

        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to fetch operation {}: {}", operation.name, e);
                Error::Generation(format!("Operation status request failed: {}", e))
            })?;

        Self::read_json(response).await
    }

    /// Downloads a generated asset; the credential rides along as `key`.
    pub async fn download(&self, uri: &str) -> Result<Download> {
        let separator = if uri.contains('?') { '&' } else { '?' };
        let url = format!("{}{}key={}", uri, separator, self.api_key);

        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to download generated media: {}", e);
                Error::Generation(format!("Download failed: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!("Media download failed (status {}): {}", status, error_text);
            return Err(Error::from_api_failure(status.as_u16(), &error_text));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await.map_err(body_read_failure)?.to_vec();

        Ok(Download {
            bytes,
            content_type,
        })
    }
}
