//! Error handling and custom error types
//!
//! Provides unified error handling across the studio using thiserror.

use thiserror::Error;

/// Message fragment the remote service returns when the selected credential
/// (or the project behind it) is not usable.
pub const ENTITY_NOT_FOUND: &str = "Requested entity was not found";

/// Which generation pipeline an in-flight flag belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationKind {
    Frames,
    Video,
}

impl std::fmt::Display for GenerationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Frames => write!(f, "frames"),
            Self::Video => write!(f, "video"),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Environment variable error: {0}")]
    EnvVar(#[from] dotenvy::Error),

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Authorization failed: {0}")]
    Authorization(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("A {0} generation is already in progress")]
    Busy(GenerationKind),

    #[error("Video generation was cancelled")]
    Cancelled,

    #[error("Operation still running after {attempts} status checks")]
    PollLimitExceeded { attempts: u32 },
}

impl Error {
    /// Classify a failed API response.
    ///
    /// Credential rejections become [`Error::Authorization`] so callers can
    /// re-run credential selection; everything else is a generation failure.
    pub fn from_api_failure(status: u16, body: &str) -> Self {
        if status == 401 || status == 403 || body.contains(ENTITY_NOT_FOUND) {
            Self::Authorization(format!("API error (status {}): {}", status, body))
        } else {
            Self::Generation(format!("API error (status {}): {}", status, body))
        }
    }

    /// Classify an error message reported inside a finished operation.
    pub fn from_operation_message(message: &str) -> Self {
        if message.contains(ENTITY_NOT_FOUND) {
            Self::Authorization(message.to_string())
        } else {
            Self::Generation(message.to_string())
        }
    }

    pub fn is_authorization(&self) -> bool {
        match self {
            Self::Authorization(_) => true,
            Self::Generation(message) => message.contains(ENTITY_NOT_FOUND),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
