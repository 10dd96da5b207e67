use super::{FrameService, VideoService};
use crate::models::{
    AspectRatio, GenerationRequest, GenerationResult, ImageAsset, MediaBlob, MediaReference,
    VideoHandle, VideoModel,
};
use crate::session::SessionContext;
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// Smallest PNG that still sniffs as image/png.
const TINY_PNG: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

// ftyp box header, enough for video MIME sniffing.
const TINY_MP4: [u8; 12] = [
    0x00, 0x00, 0x00, 0x18, b'f', b't', b'y', b'p', b'i', b's', b'o', b'm',
];

/// A failure a mock hands out once, before returning to normal responses.
#[derive(Debug, Clone)]
pub enum MockFailure {
    Authorization(String),
    Generation(String),
}

impl MockFailure {
    fn to_error(&self) -> Error {
        match self {
            Self::Authorization(message) => Error::Authorization(message.clone()),
            Self::Generation(message) => Error::Generation(message.clone()),
        }
    }
}

fn next_failure(failures: &Mutex<VecDeque<MockFailure>>) -> Option<Error> {
    failures.lock().unwrap().pop_front().map(|f| f.to_error())
}

async fn maybe_delay(delay: &Mutex<Option<Duration>>) {
    let delay = *delay.lock().unwrap();
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
}

/// What the studio asked a [`MockFrameClient`] to do.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameCall {
    Generate {
        prompt: String,
        reference_labels: Vec<String>,
    },
    Refine {
        instructions: String,
    },
}

#[derive(Clone)]
pub struct MockFrameClient {
    frame_responses: Arc<Mutex<Vec<Vec<ImageAsset>>>>,
    refine_responses: Arc<Mutex<Vec<Option<ImageAsset>>>>,
    failures: Arc<Mutex<VecDeque<MockFailure>>>,
    delay: Arc<Mutex<Option<Duration>>>,
    calls: Arc<Mutex<Vec<FrameCall>>>,
}

impl MockFrameClient {
    pub fn new() -> Self {
        Self {
            frame_responses: Arc::new(Mutex::new(Vec::new())),
            refine_responses: Arc::new(Mutex::new(Vec::new())),
            failures: Arc::new(Mutex::new(VecDeque::new())),
            delay: Arc::new(Mutex::new(None)),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_frames_response(self, frames: Vec<ImageAsset>) -> Self {
        self.frame_responses.lock().unwrap().push(frames);
        self
    }

    pub fn with_refine_response(self, refined: Option<ImageAsset>) -> Self {
        self.refine_responses.lock().unwrap().push(refined);
        self
    }

    pub fn with_failure(self, failure: MockFailure) -> Self {
        self.failures.lock().unwrap().push_back(failure);
        self
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock().unwrap() = Some(delay);
        self
    }

    pub fn get_call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<FrameCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: FrameCall) -> usize {
        let mut calls = self.calls.lock().unwrap();
        calls.push(call);
        calls.len()
    }
}

impl Default for MockFrameClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FrameService for MockFrameClient {
    async fn generate_frames(
        &self,
        session: &SessionContext,
        prompt: &str,
        references: &[MediaReference],
    ) -> Result<Vec<ImageAsset>> {
        session.api_key()?;
        let count = self.record(FrameCall::Generate {
            prompt: prompt.to_string(),
            reference_labels: references.iter().map(|r| r.label().to_string()).collect(),
        });
        maybe_delay(&self.delay).await;

        if let Some(err) = next_failure(&self.failures) {
            return Err(err);
        }

        let responses = self.frame_responses.lock().unwrap();
        if responses.is_empty() {
            Ok((0..4)
                .map(|i| {
                    let mut data = TINY_PNG.to_vec();
                    data.push(i);
                    ImageAsset::new(data, "image/png")
                })
                .collect())
        } else {
            let index = (count - 1) % responses.len();
            Ok(responses[index].clone())
        }
    }

    async fn refine_frame(
        &self,
        session: &SessionContext,
        _base: &ImageAsset,
        instructions: &str,
    ) -> Result<Option<ImageAsset>> {
        session.api_key()?;
        self.record(FrameCall::Refine {
            instructions: instructions.to_string(),
        });
        maybe_delay(&self.delay).await;

        if let Some(err) = next_failure(&self.failures) {
            return Err(err);
        }

        let mut responses = self.refine_responses.lock().unwrap();
        if responses.is_empty() {
            let mut data = TINY_PNG.to_vec();
            data.extend_from_slice(b"refined");
            Ok(Some(ImageAsset::new(data, "image/png")))
        } else {
            Ok(responses.remove(0))
        }
    }
}

/// What the studio asked a [`MockVideoClient`] to do.
#[derive(Debug, Clone, PartialEq)]
pub enum VideoCall {
    Generate {
        model: VideoModel,
        prompt: String,
        reference_labels: Vec<String>,
        start_frame: Option<ImageAsset>,
        aspect_ratio: AspectRatio,
    },
    Extend {
        previous: VideoHandle,
        prompt: String,
        aspect_ratio: AspectRatio,
    },
}

#[derive(Clone)]
pub struct MockVideoClient {
    failures: Arc<Mutex<VecDeque<MockFailure>>>,
    delay: Arc<Mutex<Option<Duration>>>,
    calls: Arc<Mutex<Vec<VideoCall>>>,
}

impl MockVideoClient {
    pub fn new() -> Self {
        Self {
            failures: Arc::new(Mutex::new(VecDeque::new())),
            delay: Arc::new(Mutex::new(None)),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_failure(self, failure: MockFailure) -> Self {
        self.failures.lock().unwrap().push_back(failure);
        self
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock().unwrap() = Some(delay);
        self
    }

    pub fn get_call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<VideoCall> {
        self.calls.lock().unwrap().clone()
    }

    async fn respond(&self, call: VideoCall) -> Result<GenerationResult> {
        let count = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(call);
            calls.len()
        };
        maybe_delay(&self.delay).await;

        if let Some(err) = next_failure(&self.failures) {
            return Err(err);
        }

        Ok(GenerationResult {
            blob: MediaBlob::new(TINY_MP4.to_vec(), "video/mp4"),
            video: VideoHandle::from_remote(serde_json::json!({
                "uri": format!("mock://videos/{}", count)
            })),
        })
    }
}

impl Default for MockVideoClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VideoService for MockVideoClient {
    async fn generate_video(
        &self,
        session: &SessionContext,
        request: &GenerationRequest,
    ) -> Result<GenerationResult> {
        session.api_key()?;
        self.respond(VideoCall::Generate {
            model: request.model,
            prompt: request.prompt.clone(),
            reference_labels: request
                .forwarded_references()
                .iter()
                .map(|r| r.label().to_string())
                .collect(),
            start_frame: request.start_frame.clone(),
            aspect_ratio: request.aspect_ratio,
        })
        .await
    }

    async fn extend_video(
        &self,
        session: &SessionContext,
        previous: &VideoHandle,
        prompt: &str,
        aspect_ratio: AspectRatio,
    ) -> Result<GenerationResult> {
        session.api_key()?;
        self.respond(VideoCall::Extend {
            previous: previous.clone(),
            prompt: prompt.to_string(),
            aspect_ratio,
        })
        .await
    }
}
