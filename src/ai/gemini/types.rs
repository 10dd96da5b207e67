//! Shared Gemini payload types used by the frame and video clients.

use crate::ai::operation::LongRunning;
use crate::models::ImageAsset;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Gemini content container used in both requests and responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

/// Untagged union of text and inline media content parts.
///
/// Variant order matters for `#[serde(untagged)]` decoding; `Other` keeps
/// unknown part kinds from failing the whole response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
    Other(serde_json::Value),
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn inline(mime_type: &str, data: String) -> Self {
        Self::InlineData {
            inline_data: InlineData {
                mime_type: mime_type.to_string(),
                data,
            },
        }
    }
}

/// Base64 inline payload used for image requests and responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

/// Top-level `generateContent` response envelope.
#[derive(Debug, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

/// Candidate completion item returned by Gemini.
#[derive(Debug, Deserialize)]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
}

impl GenerateContentResponse {
    /// Decode every inline image of the first candidate, in response order.
    pub fn inline_images(&self) -> Result<Vec<ImageAsset>> {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| match p {
                        Part::InlineData { inline_data } => Some(inline_data),
                        _ => None,
                    })
                    .map(|inline| {
                        ImageAsset::from_base64(&inline.data, &inline.mime_type).map_err(|e| {
                            Error::Generation(format!("Unusable image in Gemini response: {}", e))
                        })
                    })
                    .collect()
            })
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// Long-running operation as returned by `predictLongRunning` and the
/// operations endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Operation {
    pub name: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub response: Option<OperationResponse>,
    #[serde(default)]
    pub error: Option<OperationError>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResponse {
    #[serde(default)]
    pub generate_video_response: Option<GenerateVideoResponse>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateVideoResponse {
    #[serde(default)]
    pub generated_samples: Vec<GeneratedSample>,
    #[serde(default)]
    pub rai_media_filtered_count: Option<u32>,
    #[serde(default)]
    pub rai_media_filtered_reasons: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneratedSample {
    /// Kept verbatim: it doubles as the continuation token.
    #[serde(default)]
    pub video: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OperationError {
    #[serde(default)]
    pub code: Option<i32>,
    #[serde(default)]
    pub message: Option<String>,
}

impl Operation {
    /// The remote error attached to this operation, if any.
    pub fn failure(&self) -> Option<Error> {
        let err = self.error.as_ref()?;
        let message = err
            .message
            .clone()
            .unwrap_or_else(|| format!("Operation failed with code {:?}", err.code));
        Some(Error::from_operation_message(&message))
    }

    pub fn first_video(&self) -> Option<&serde_json::Value> {
        self.response
            .as_ref()?
            .generate_video_response
            .as_ref()?
            .generated_samples
            .first()?
            .video
            .as_ref()
    }

    /// Safety filtering that removed every sample.
    pub fn filtered_reasons(&self) -> Option<Vec<String>> {
        let response = self.response.as_ref()?.generate_video_response.as_ref()?;
        if response.rai_media_filtered_count.unwrap_or(0) > 0
            && response.generated_samples.is_empty()
        {
            Some(response.rai_media_filtered_reasons.clone())
        } else {
            None
        }
    }
}

impl LongRunning for Operation {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_done(&self) -> bool {
        self.done
    }
}
