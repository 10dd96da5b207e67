//! cine-studio - storyboard frames and Veo video generation on Gemini
//!
//! Generates candidate starting frames from a script and reference images,
//! turns a chosen frame into a video through a long-running Veo job, and
//! keeps the session's history of results.

pub mod ai;
pub mod app;
pub mod error;
pub mod models;
pub mod prompts;
pub mod session;

pub use error::{Error, Result};
