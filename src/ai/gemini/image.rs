use super::client::GeminiHttpClient;
use super::types::{Content, GenerateContentResponse, Part};
use crate::ai::FrameService;
use crate::models::{AspectRatio, ImageAsset, MediaReference, DEFAULT_BASE_URL, DEFAULT_IMAGE_MODEL};
use crate::session::SessionContext;
use crate::{prompts, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Serialize)]
struct ImageRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: ImageGenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageGenerationConfig {
    response_modalities: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_config: Option<ImageConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageConfig {
    aspect_ratio: String,
}

impl ImageRequest {
    fn new(parts: Vec<Part>, aspect_ratio: Option<AspectRatio>) -> Self {
        Self {
            contents: vec![Content { role: None, parts }],
            generation_config: ImageGenerationConfig {
                response_modalities: vec!["IMAGE".to_string()],
                image_config: aspect_ratio.map(|ratio| ImageConfig {
                    aspect_ratio: ratio.as_str().to_string(),
                }),
            },
        }
    }
}

/// Storyboard frame generation and refinement on Gemini image models.
pub struct GeminiFrameClient {
    client: reqwest::Client,
    model: String,
    base_url: String,
}

impl GeminiFrameClient {
    pub fn new() -> Self {
        Self::new_with_client(reqwest::Client::new())
    }

    pub fn new_with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            model: DEFAULT_IMAGE_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_model(mut self, model: String) -> Self {
        self.model = model;
        self
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    fn http(&self, session: &SessionContext) -> Result<GeminiHttpClient> {
        Ok(GeminiHttpClient::new_with_client(
            session.api_key()?.to_string(),
            Duration::from_secs(120),
            self.client.clone(),
        )
        .with_base_url(self.base_url.clone()))
    }
}

impl Default for GeminiFrameClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FrameService for GeminiFrameClient {
    async fn generate_frames(
        &self,
        session: &SessionContext,
        prompt: &str,
        references: &[MediaReference],
    ) -> Result<Vec<ImageAsset>> {
        let http = self.http(session)?;

        let mut parts: Vec<Part> = references
            .iter()
            .flat_map(|reference| {
                [
                    Part::text(prompts::reference_caption(reference.label())),
                    Part::inline(reference.mime_type(), reference.base64_data()),
                ]
            })
            .collect();
        parts.push(Part::text(prompts::frames_instruction(prompt, references)));

        let request = ImageRequest::new(parts, Some(AspectRatio::Landscape));

        tracing::debug!(
            references = references.len(),
            model = %self.model,
            "Requesting storyboard frames"
        );
        let response: GenerateContentResponse =
            http.generate_content(&self.model, &request).await?;

        let frames = response.inline_images()?;
        tracing::info!("Gemini returned {} storyboard frame(s)", frames.len());
        Ok(frames)
    }

    async fn refine_frame(
        &self,
        session: &SessionContext,
        base: &ImageAsset,
        instructions: &str,
    ) -> Result<Option<ImageAsset>> {
        let http = self.http(session)?;

        let request = ImageRequest::new(
            vec![
                Part::inline(&base.mime_type, base.base64_data()),
                Part::text(prompts::refine_instruction(instructions)),
            ],
            None,
        );

        let response: GenerateContentResponse =
            http.generate_content(&self.model, &request).await?;

        let refined = response.inline_images()?.into_iter().next();
        if refined.is_none() {
            tracing::warn!("Gemini refinement returned no image");
        }
        Ok(refined)
    }
}
