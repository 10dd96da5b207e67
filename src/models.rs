//! Data models and structures
//!
//! Defines reference images, generation requests and results, the opaque
//! video continuation token, and environment configuration.

use crate::ai::mime::detect_image_mime;
use crate::ai::operation::PollConfig;
use crate::{Error, Result};
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Most reference images a video request forwards to the remote service.
pub const MAX_VIDEO_REFERENCES: usize = 3;

/// Slot a reference image was supplied for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceRole {
    Character,
    Location,
    Object,
    Style,
}

impl ReferenceRole {
    pub fn default_label(&self) -> &'static str {
        match self {
            Self::Character => "Lead Character",
            Self::Location => "Environment",
            Self::Object => "Key Prop",
            Self::Style => "Style Reference",
        }
    }
}

/// A labeled input image used to bias generation.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaReference {
    data: Vec<u8>,
    mime_type: String,
    label: String,
}

impl MediaReference {
    pub fn new(data: Vec<u8>, mime_type: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            data,
            mime_type: mime_type.into(),
            label: label.into(),
        }
    }

    /// Build a reference from raw image bytes, sniffing the MIME type.
    pub fn from_bytes(data: Vec<u8>, label: impl Into<String>) -> Self {
        let mime_type = detect_image_mime(&data);
        Self::new(data, mime_type, label)
    }

    pub fn from_data_url(url: &str, label: impl Into<String>) -> Result<Self> {
        let asset = ImageAsset::from_data_url(url)?;
        Ok(Self::new(asset.data, asset.mime_type, label))
    }

    pub fn from_file(path: &Path, label: impl Into<String>) -> Result<Self> {
        let data = std::fs::read(path)?;
        Ok(Self::from_bytes(data, label))
    }

    pub fn for_role(data: Vec<u8>, role: ReferenceRole) -> Self {
        Self::from_bytes(data, role.default_label())
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn base64_data(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.data)
    }

    /// Whether the label marks this reference as a character to keep on model.
    pub fn is_character(&self) -> bool {
        self.label.to_lowercase().contains("character")
    }
}

/// An image returned by the remote service or used as a start frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAsset {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl ImageAsset {
    pub fn new(data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data,
        }
    }

    pub fn from_bytes(data: Vec<u8>) -> Self {
        let mime_type = detect_image_mime(&data);
        Self::new(data, mime_type)
    }

    pub fn from_base64(b64: &str, mime_type: impl Into<String>) -> Result<Self> {
        let data = base64::engine::general_purpose::STANDARD
            .decode(b64.trim())
            .map_err(|e| Error::Decode(format!("Invalid base64 image data: {}", e)))?;
        Ok(Self::new(data, mime_type))
    }

    /// Parse a `data:<mime>;base64,<payload>` URL.
    ///
    /// Input without a `data:` header is treated as bare base64 and its MIME
    /// type is sniffed from the decoded bytes.
    pub fn from_data_url(url: &str) -> Result<Self> {
        let Some(rest) = url.strip_prefix("data:") else {
            let data = base64::engine::general_purpose::STANDARD
                .decode(url.trim())
                .map_err(|e| Error::Decode(format!("Invalid base64 image data: {}", e)))?;
            return Ok(Self::from_bytes(data));
        };

        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| Error::InvalidInput("Data URL has no payload".to_string()))?;
        let mime_type = header
            .strip_suffix(";base64")
            .ok_or_else(|| Error::InvalidInput("Only base64 data URLs are supported".to_string()))?;

        Self::from_base64(payload, mime_type)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        Ok(Self::from_bytes(std::fs::read(path)?))
    }

    pub fn base64_data(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.data)
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64_data())
    }

    pub fn extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "image/jpeg" => "jpg",
            "image/webp" => "webp",
            _ => "png",
        }
    }
}

/// Veo model variants offered to the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum VideoModel {
    /// Speed optimized.
    #[default]
    Fast,
    /// High fidelity; required whenever reference images are attached.
    HighFidelity,
}

impl VideoModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fast => "veo-3.1-fast-generate-preview",
            Self::HighFidelity => "veo-3.1-generate-preview",
        }
    }
}

impl std::fmt::Display for VideoModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    Landscape,
    Portrait,
}

impl AspectRatio {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Landscape => "16:9",
            Self::Portrait => "9:16",
        }
    }
}

impl FromStr for AspectRatio {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "16:9" => Ok(Self::Landscape),
            "9:16" => Ok(Self::Portrait),
            other => Err(Error::InvalidInput(format!(
                "Unsupported aspect ratio '{}'. Expected 16:9 or 9:16",
                other
            ))),
        }
    }
}

/// Everything needed to submit one video generation job.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub start_frame: Option<ImageAsset>,
    pub references: Vec<MediaReference>,
    pub model: VideoModel,
    pub aspect_ratio: AspectRatio,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            start_frame: None,
            references: Vec::new(),
            model: VideoModel::default(),
            aspect_ratio: AspectRatio::default(),
        }
    }

    pub fn with_start_frame(mut self, frame: ImageAsset) -> Self {
        self.start_frame = Some(frame);
        self
    }

    pub fn with_references(mut self, references: Vec<MediaReference>) -> Self {
        self.references = references;
        self
    }

    pub fn with_model(mut self, model: VideoModel) -> Self {
        self.model = model;
        self
    }

    pub fn with_aspect_ratio(mut self, aspect_ratio: AspectRatio) -> Self {
        self.aspect_ratio = aspect_ratio;
        self
    }

    /// The references actually sent to the remote service, in original order.
    pub fn forwarded_references(&self) -> &[MediaReference] {
        let count = self.references.len().min(MAX_VIDEO_REFERENCES);
        &self.references[..count]
    }
}

/// Opaque continuation token for a generated video.
///
/// Only ever handed back to the service to extend the video it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VideoHandle(serde_json::Value);

impl VideoHandle {
    pub(crate) fn from_remote(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub(crate) fn as_remote(&self) -> &serde_json::Value {
        &self.0
    }

    pub(crate) fn uri(&self) -> Option<&str> {
        self.0
            .get("uri")
            .and_then(serde_json::Value::as_str)
            .filter(|uri| !uri.is_empty())
    }
}

/// In-memory handle to downloaded media, cheap to clone and share.
#[derive(Debug, Clone)]
pub struct MediaBlob {
    id: Uuid,
    mime_type: String,
    data: Arc<[u8]>,
}

impl MediaBlob {
    pub fn new(data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Session-local address of the blob.
    pub fn url(&self) -> String {
        format!("blob:cine-studio/{}", self.id)
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, &self.data)?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub blob: MediaBlob,
    pub video: VideoHandle,
}

/// One finished video in the session history.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub prompt: String,
    pub model: VideoModel,
    pub initial_frames: Vec<ImageAsset>,
    pub result: GenerationResult,
}

// Configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: Option<String>,
    pub base_url: String,
    pub image_model: String,
    pub poll_interval: Duration,
    pub max_poll_attempts: Option<u32>,
    pub output_dir: PathBuf,
}

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup, so tests need not touch the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let poll_interval_secs = match non_empty("VIDEO_POLL_INTERVAL_SECS") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(0) => {
                    return Err(Error::Config(
                        "VIDEO_POLL_INTERVAL_SECS must be at least 1".to_string(),
                    ))
                }
                Ok(secs) => secs,
                Err(_) => {
                    return Err(Error::Config(format!(
                        "VIDEO_POLL_INTERVAL_SECS is not a number: {}",
                        raw
                    )))
                }
            },
            None => DEFAULT_POLL_INTERVAL_SECS,
        };

        let max_poll_attempts = match non_empty("VIDEO_MAX_POLL_ATTEMPTS") {
            Some(raw) => Some(raw.trim().parse::<u32>().map_err(|_| {
                Error::Config(format!("VIDEO_MAX_POLL_ATTEMPTS is not a number: {}", raw))
            })?),
            None => None,
        };

        Ok(Self {
            api_key: non_empty("GEMINI_API_KEY").or_else(|| non_empty("API_KEY")),
            base_url: non_empty("GEMINI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            image_model: non_empty("IMAGE_MODEL")
                .unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_string()),
            poll_interval: Duration::from_secs(poll_interval_secs),
            max_poll_attempts,
            output_dir: PathBuf::from(
                non_empty("OUTPUT_DIR").unwrap_or_else(|| "output".to_string()),
            ),
        })
    }

    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            interval: self.poll_interval,
            max_attempts: self.max_poll_attempts,
        }
    }
}
