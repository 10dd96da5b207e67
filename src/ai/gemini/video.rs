//! Veo video generation over the Gemini long-running operation API.

use super::client::GeminiHttpClient;
use super::types::Operation;
use crate::ai::mime::detect_video_mime;
use crate::ai::operation::{poll_until_done, CancelSignal, PollConfig};
use crate::ai::VideoService;
use crate::models::{
    AspectRatio, GenerationRequest, GenerationResult, MediaBlob, VideoHandle, VideoModel,
    DEFAULT_BASE_URL,
};
use crate::session::SessionContext;
use crate::{prompts, Error, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error, info};

const VIDEO_RESOLUTION: &str = "720p";
const REFERENCE_TYPE_ASSET: &str = "asset";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VideoRequest {
    instances: Vec<VideoInstance>,
    parameters: VideoParameters,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VideoInstance {
    prompt: String,
    /// Seed image for the first generated frame.
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<VideoImage>,
    /// Previously generated video to continue from.
    #[serde(skip_serializing_if = "Option::is_none")]
    video: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VideoImage {
    bytes_base64_encoded: String,
    mime_type: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VideoParameters {
    aspect_ratio: String,
    resolution: String,
    number_of_videos: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    reference_images: Option<Vec<ReferenceImage>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReferenceImage {
    image: VideoImage,
    reference_type: String,
}

impl VideoParameters {
    fn new(aspect_ratio: AspectRatio) -> Self {
        Self {
            aspect_ratio: aspect_ratio.as_str().to_string(),
            resolution: VIDEO_RESOLUTION.to_string(),
            number_of_videos: 1,
            reference_images: None,
        }
    }
}

impl VideoRequest {
    fn generation(request: &GenerationRequest) -> Self {
        let forwarded = request.forwarded_references();

        let reference_images = (!forwarded.is_empty()).then(|| {
            forwarded
                .iter()
                .map(|reference| ReferenceImage {
                    image: VideoImage {
                        bytes_base64_encoded: reference.base64_data(),
                        mime_type: reference.mime_type().to_string(),
                    },
                    reference_type: REFERENCE_TYPE_ASSET.to_string(),
                })
                .collect()
        });

        Self {
            instances: vec![VideoInstance {
                prompt: prompts::identity_mapped_prompt(&request.prompt, &request.references),
                image: request.start_frame.as_ref().map(|frame| VideoImage {
                    bytes_base64_encoded: frame.base64_data(),
                    mime_type: frame.mime_type.clone(),
                }),
                video: None,
            }],
            parameters: VideoParameters {
                reference_images,
                ..VideoParameters::new(request.aspect_ratio)
            },
        }
    }

    fn extension(previous: &VideoHandle, prompt: &str, aspect_ratio: AspectRatio) -> Self {
        Self {
            instances: vec![VideoInstance {
                prompt: prompts::continuity_prompt(prompt),
                image: None,
                video: Some(previous.as_remote().clone()),
            }],
            parameters: VideoParameters::new(aspect_ratio),
        }
    }
}

fn no_video_uri() -> Error {
    Error::Generation("No video URI returned".to_string())
}

/// Pull the continuation token and download URI out of a finished job.
fn completed_video(operation: &Operation) -> Result<(VideoHandle, String)> {
    if let Some(reasons) = operation.filtered_reasons() {
        return Err(Error::Generation(format!(
            "Video was blocked by safety filters: {}",
            reasons.join("; ")
        )));
    }

    let handle = operation
        .first_video()
        .cloned()
        .map(VideoHandle::from_remote)
        .ok_or_else(no_video_uri)?;
    let uri = handle.uri().map(str::to_string).ok_or_else(no_video_uri)?;
    Ok((handle, uri))
}

/// Veo client: submit, poll until done, download into a [`MediaBlob`].
pub struct GeminiVideoClient {
    client: reqwest::Client,
    base_url: String,
    poll: PollConfig,
    cancel: Option<CancelSignal>,
}

impl GeminiVideoClient {
    pub fn new() -> Self {
        Self::new_with_client(reqwest::Client::new())
    }

    pub fn new_with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            poll: PollConfig::default(),
            cancel: None,
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    pub fn with_poll_config(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_cancel_signal(mut self, signal: CancelSignal) -> Self {
        self.cancel = Some(signal);
        self
    }

    fn http(&self, session: &SessionContext) -> Result<GeminiHttpClient> {
        Ok(GeminiHttpClient::new_with_client(
            session.api_key()?.to_string(),
            Duration::from_secs(300),
            self.client.clone(),
        )
        .with_base_url(self.base_url.clone()))
    }

    async fn run_job(
        &self,
        session: &SessionContext,
        model: VideoModel,
        request: &VideoRequest,
    ) -> Result<GenerationResult> {
        let http = self.http(session)?;
        let http = &http;

        let operation = http.predict_long_running(model.as_str(), request).await?;
        info!(operation = %operation.name, model = %model, "submitted video generation");
        if let Some(err) = operation.failure() {
            return Err(err);
        }

        let operation = poll_until_done(operation, &self.poll, self.cancel.as_ref(), |op| async move {
            let refreshed = http.get_operation(op).await?;
            match refreshed.failure() {
                Some(err) => Err(err),
                None => Ok(refreshed),
            }
        })
        .await?;

        let (video, uri) = completed_video(&operation).map_err(|e| {
            error!(operation = %operation.name, "{}", e);
            e
        })?;
        debug!(operation = %operation.name, "video generation complete, downloading");

        let download = http.download(&uri).await?;
        let mime_type = download
            .content_type
            .filter(|ct| ct.starts_with("video/"))
            .unwrap_or_else(|| detect_video_mime(&download.bytes).to_string());

        let blob = MediaBlob::new(download.bytes, mime_type);
        info!(blob = %blob.url(), bytes = blob.len(), "video materialized");

        Ok(GenerationResult { blob, video })
    }
}

impl Default for GeminiVideoClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VideoService for GeminiVideoClient {
    async fn generate_video(
        &self,
        session: &SessionContext,
        request: &GenerationRequest,
    ) -> Result<GenerationResult> {
        let body = VideoRequest::generation(request);
        debug!(
            references = request.forwarded_references().len(),
            dropped = request.references.len() - request.forwarded_references().len(),
            start_frame = request.start_frame.is_some(),
            "building video request"
        );
        self.run_job(session, request.model, &body).await
    }

    async fn extend_video(
        &self,
        session: &SessionContext,
        previous: &VideoHandle,
        prompt: &str,
        aspect_ratio: AspectRatio,
    ) -> Result<GenerationResult> {
        let body = VideoRequest::extension(previous, prompt, aspect_ratio);
        self.run_job(session, VideoModel::HighFidelity, &body).await
    }
}
