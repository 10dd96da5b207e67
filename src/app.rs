//! Studio session: previews, model choice, video history and authorization.

use crate::ai::{CancelSignal, FrameService, GeminiFrameClient, GeminiVideoClient, VideoService};
use crate::error::GenerationKind;
use crate::models::{
    AspectRatio, Config, GenerationRequest, GenerationResult, HistoryEntry, ImageAsset,
    MediaReference, VideoHandle, VideoModel,
};
use crate::session::{CredentialSelector, EnvCredentialSelector, SessionContext};
use crate::{Error, Result};
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::{error, info, warn};
use uuid::Uuid;

/// The model a video request actually uses. Attaching any reference forces
/// the high-fidelity model over the user's choice.
pub fn effective_model(selected: VideoModel, references: &[MediaReference]) -> VideoModel {
    if references.is_empty() {
        selected
    } else {
        VideoModel::HighFidelity
    }
}

/// Injectable service bundle used to construct [`Studio`] in tests/harnesses.
pub struct StudioServices {
    pub frames: Box<dyn FrameService>,
    pub video: Box<dyn VideoService>,
    pub credentials: Box<dyn CredentialSelector>,
}

#[derive(Default)]
struct StudioState {
    session: SessionContext,
    prompt: String,
    references: Vec<MediaReference>,
    selected_model: VideoModel,
    aspect_ratio: AspectRatio,
    previews: Vec<ImageAsset>,
    selected_preview: Option<usize>,
    current: Option<GenerationResult>,
    // Most recent first.
    history: Vec<HistoryEntry>,
}

/// Clears an in-flight flag when the generation finishes, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool, kind: GenerationKind) -> Result<Self> {
        if flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Rejected {} generation: one is already running", kind);
            return Err(Error::Busy(kind));
        }
        Ok(Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// One creative session against the generation services.
///
/// Methods take `&self`; state lives behind a lock that is never held
/// across a remote call, so a frame job and a video job can run at once.
pub struct Studio {
    frames: Box<dyn FrameService>,
    video: Box<dyn VideoService>,
    credentials: Box<dyn CredentialSelector>,
    state: Mutex<StudioState>,
    frames_busy: AtomicBool,
    video_busy: AtomicBool,
}

impl Studio {
    pub fn with_services(services: StudioServices, session: SessionContext) -> Self {
        Self {
            frames: services.frames,
            video: services.video,
            credentials: services.credentials,
            state: Mutex::new(StudioState {
                session,
                ..StudioState::default()
            }),
            frames_busy: AtomicBool::new(false),
            video_busy: AtomicBool::new(false),
        }
    }

    /// Wire the Gemini clients from `config`. `cancel` aborts video polling.
    pub fn from_config(config: &Config, cancel: Option<CancelSignal>) -> Self {
        // Reuse one HTTP connection pool across both clients.
        let http_client = reqwest::Client::new();

        let frames = GeminiFrameClient::new_with_client(http_client.clone())
            .with_model(config.image_model.clone())
            .with_base_url(config.base_url.clone());

        let mut video = GeminiVideoClient::new_with_client(http_client)
            .with_base_url(config.base_url.clone())
            .with_poll_config(config.poll_config());
        if let Some(signal) = cancel {
            video = video.with_cancel_signal(signal);
        }

        info!(
            image_model = %config.image_model,
            poll_interval_secs = config.poll_interval.as_secs(),
            "Studio configured"
        );

        Self::with_services(
            StudioServices {
                frames: Box::new(frames),
                video: Box::new(video),
                credentials: Box::new(EnvCredentialSelector),
            },
            SessionContext::new(config.api_key.clone()),
        )
    }

    fn state(&self) -> MutexGuard<'_, StudioState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn session(&self) -> SessionContext {
        self.state().session.clone()
    }

    pub fn is_authorized(&self) -> bool {
        self.state().session.is_authorized()
    }

    /// Run credential selection unless the session is already authorized.
    pub async fn ensure_authorized(&self) -> Result<()> {
        if self.is_authorized() {
            return Ok(());
        }
        self.select_credential().await
    }

    async fn select_credential(&self) -> Result<()> {
        info!("Requesting credential selection");
        let key = self.credentials.select_credential().await?;
        self.state().session.authorize(key);
        info!("Credential selected");
        Ok(())
    }

    /// Log a failed generation; on a rejected credential, revoke it and ask
    /// for a new one before handing the original error back.
    async fn handle_failure(&self, kind: GenerationKind, err: Error) -> Error {
        error!("{} generation failed: {}", kind, err);

        if err.is_authorization() {
            self.state().session.revoke();
            warn!("Credential revoked after authorization failure");
            if let Err(select_err) = self.select_credential().await {
                warn!("Credential selection did not complete: {}", select_err);
            }
        }

        err
    }

    pub fn set_prompt(&self, prompt: impl Into<String>) {
        self.state().prompt = prompt.into();
    }

    pub fn prompt(&self) -> String {
        self.state().prompt.clone()
    }

    pub fn set_references(&self, references: Vec<MediaReference>) {
        self.state().references = references;
    }

    pub fn references(&self) -> Vec<MediaReference> {
        self.state().references.clone()
    }

    pub fn select_model(&self, model: VideoModel) {
        self.state().selected_model = model;
    }

    pub fn selected_model(&self) -> VideoModel {
        self.state().selected_model
    }

    pub fn set_aspect_ratio(&self, aspect_ratio: AspectRatio) {
        self.state().aspect_ratio = aspect_ratio;
    }

    pub fn aspect_ratio(&self) -> AspectRatio {
        self.state().aspect_ratio
    }

    pub fn previews(&self) -> Vec<ImageAsset> {
        self.state().previews.clone()
    }

    /// Choose which preview seeds the next video; `None` clears the choice.
    pub fn select_preview(&self, index: Option<usize>) -> Result<()> {
        let mut state = self.state();
        if let Some(i) = index {
            if i >= state.previews.len() {
                return Err(Error::InvalidInput(format!(
                    "No preview at index {} ({} available)",
                    i,
                    state.previews.len()
                )));
            }
        }
        state.selected_preview = index;
        Ok(())
    }

    pub fn selected_preview(&self) -> Option<usize> {
        self.state().selected_preview
    }

    /// Use an externally supplied image as the only, selected preview.
    pub fn load_start_frame(&self, frame: ImageAsset) {
        let mut state = self.state();
        state.previews = vec![frame];
        state.selected_preview = Some(0);
    }

    pub fn current_result(&self) -> Option<GenerationResult> {
        self.state().current.clone()
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.state().history.clone()
    }

    fn require_prompt(&self) -> Result<String> {
        let prompt = self.prompt();
        if prompt.trim().is_empty() {
            return Err(Error::InvalidInput(
                "Enter a directorial script first".to_string(),
            ));
        }
        Ok(prompt)
    }

    /// Generate storyboard frames for the current prompt and references.
    ///
    /// Replaces the previews and clears the preview selection.
    pub async fn generate_frames(&self) -> Result<Vec<ImageAsset>> {
        let prompt = self.require_prompt()?;
        let _guard = InFlight::acquire(&self.frames_busy, GenerationKind::Frames)?;
        self.ensure_authorized().await?;

        let (session, references) = {
            let state = self.state();
            (state.session.clone(), state.references.clone())
        };

        info!(references = references.len(), "Generating storyboard frames");
        match self.frames.generate_frames(&session, &prompt, &references).await {
            Ok(frames) => {
                let mut state = self.state();
                state.previews = frames.clone();
                state.selected_preview = None;
                info!("Storyboard updated with {} frame(s)", frames.len());
                Ok(frames)
            }
            Err(e) => Err(self.handle_failure(GenerationKind::Frames, e).await),
        }
    }

    /// Refine preview `index`; it is replaced only when an image comes back.
    pub async fn refine_frame(
        &self,
        index: usize,
        instructions: &str,
    ) -> Result<Option<ImageAsset>> {
        if instructions.trim().is_empty() {
            return Err(Error::InvalidInput(
                "Refinement instructions are empty".to_string(),
            ));
        }
        let base = self.previews().get(index).cloned().ok_or_else(|| {
            Error::InvalidInput(format!("No preview at index {}", index))
        })?;
        let _guard = InFlight::acquire(&self.frames_busy, GenerationKind::Frames)?;
        self.ensure_authorized().await?;

        let session = self.session();
        match self.frames.refine_frame(&session, &base, instructions).await {
            Ok(Some(refined)) => {
                let mut state = self.state();
                if let Some(slot) = state.previews.get_mut(index) {
                    *slot = refined.clone();
                }
                info!("Refined preview {}", index);
                Ok(Some(refined))
            }
            Ok(None) => {
                warn!("Refinement of preview {} returned no image", index);
                Ok(None)
            }
            Err(e) => Err(self.handle_failure(GenerationKind::Frames, e).await),
        }
    }

    /// Render a video from the prompt, references and selected preview, and
    /// record it at the top of the history.
    pub async fn generate_video(&self) -> Result<HistoryEntry> {
        let prompt = self.require_prompt()?;
        let _guard = InFlight::acquire(&self.video_busy, GenerationKind::Video)?;
        self.ensure_authorized().await?;

        let (session, request, initial_frames) = {
            let state = self.state();
            let model = effective_model(state.selected_model, &state.references);
            if model != state.selected_model {
                info!(
                    "References attached; using {} instead of {}",
                    model, state.selected_model
                );
            }

            let mut request = GenerationRequest::new(prompt.clone())
                .with_references(state.references.clone())
                .with_model(model)
                .with_aspect_ratio(state.aspect_ratio);
            if let Some(frame) = state.selected_preview.and_then(|i| state.previews.get(i)) {
                request = request.with_start_frame(frame.clone());
            }
            (state.session.clone(), request, state.previews.clone())
        };

        info!(model = %request.model, "Generating video");
        match self.video.generate_video(&session, &request).await {
            Ok(result) => Ok(self.record(prompt, request.model, initial_frames, result)),
            Err(e) => Err(self.handle_failure(GenerationKind::Video, e).await),
        }
    }

    /// Continue the current video with a follow-up scene.
    pub async fn extend_video(&self, prompt: &str) -> Result<HistoryEntry> {
        let previous = self
            .current_result()
            .map(|result| result.video)
            .ok_or_else(|| Error::InvalidInput("No video to extend".to_string()))?;
        self.extend_from(previous, prompt).await
    }

    /// Continue `previous`, which may come from an earlier session.
    pub async fn extend_from(&self, previous: VideoHandle, prompt: &str) -> Result<HistoryEntry> {
        if prompt.trim().is_empty() {
            return Err(Error::InvalidInput(
                "Enter a continuation script first".to_string(),
            ));
        }
        let _guard = InFlight::acquire(&self.video_busy, GenerationKind::Video)?;
        self.ensure_authorized().await?;

        let (session, aspect_ratio, initial_frames) = {
            let state = self.state();
            (state.session.clone(), state.aspect_ratio, state.previews.clone())
        };

        info!("Extending video");
        match self
            .video
            .extend_video(&session, &previous, prompt, aspect_ratio)
            .await
        {
            Ok(result) => Ok(self.record(
                prompt.to_string(),
                VideoModel::HighFidelity,
                initial_frames,
                result,
            )),
            Err(e) => Err(self.handle_failure(GenerationKind::Video, e).await),
        }
    }

    fn record(
        &self,
        prompt: String,
        model: VideoModel,
        initial_frames: Vec<ImageAsset>,
        result: GenerationResult,
    ) -> HistoryEntry {
        let entry = HistoryEntry {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            prompt,
            model,
            initial_frames,
            result: result.clone(),
        };

        let mut state = self.state();
        state.current = Some(result);
        state.history.insert(0, entry.clone());
        info!(
            entry = %entry.id,
            video = %entry.result.blob.url(),
            "Video added to history ({} total)",
            state.history.len()
        );
        entry
    }

    /// Bring back a past entry's prompt, frames and video.
    pub fn restore(&self, id: Uuid) -> Result<HistoryEntry> {
        let mut state = self.state();
        let entry = state
            .history
            .iter()
            .find(|entry| entry.id == id)
            .cloned()
            .ok_or_else(|| Error::InvalidInput(format!("No history entry {}", id)))?;

        state.prompt = entry.prompt.clone();
        state.previews = entry.initial_frames.clone();
        state.selected_preview = None;
        state.current = Some(entry.result.clone());
        Ok(entry)
    }

    /// Write the current video into `dir` as `CineStudio_<millis>.mp4`.
    pub fn export(&self, dir: &Path) -> Result<PathBuf> {
        let current = self
            .current_result()
            .ok_or_else(|| Error::InvalidInput("No video to export".to_string()))?;

        fs::create_dir_all(dir)?;
        let path = dir.join(format!("CineStudio_{}.mp4", Utc::now().timestamp_millis()));
        current.blob.save(&path)?;
        info!("Exported video to {}", path.display());
        Ok(path)
    }
}
