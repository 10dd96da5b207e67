//! Remote media generation services.
//!
//! Frame work (storyboard stills and their refinement) and video work
//! (generation and extension) sit behind separate traits so the studio can
//! swap in mocks for either side.

pub mod gemini;
pub mod mime;
pub mod mock;
pub mod operation;

pub use gemini::{GeminiFrameClient, GeminiVideoClient};
pub use mock::{MockFrameClient, MockVideoClient};
pub use operation::{cancel_pair, CancelSignal, Canceller, PollConfig};

use crate::models::{
    AspectRatio, GenerationRequest, GenerationResult, ImageAsset, MediaReference, VideoHandle,
};
use crate::session::SessionContext;
use crate::Result;
use async_trait::async_trait;

#[async_trait]
pub trait FrameService: Send + Sync {
    /// Candidate starting frames for `prompt`, conditioned on `references`.
    ///
    /// A response without images yields an empty list rather than an error.
    async fn generate_frames(
        &self,
        session: &SessionContext,
        prompt: &str,
        references: &[MediaReference],
    ) -> Result<Vec<ImageAsset>>;

    async fn refine_frame(
        &self,
        session: &SessionContext,
        base: &ImageAsset,
        instructions: &str,
    ) -> Result<Option<ImageAsset>>;
}

#[async_trait]
pub trait VideoService: Send + Sync {
    async fn generate_video(
        &self,
        session: &SessionContext,
        request: &GenerationRequest,
    ) -> Result<GenerationResult>;

    /// Continue `previous` with a follow-up scene.
    async fn extend_video(
        &self,
        session: &SessionContext,
        previous: &VideoHandle,
        prompt: &str,
        aspect_ratio: AspectRatio,
    ) -> Result<GenerationResult>;
}
