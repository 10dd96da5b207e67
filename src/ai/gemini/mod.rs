pub mod client;
pub mod image;
pub mod types;
pub mod video;

#[cfg(test)]
mod test_support;

pub use image::GeminiFrameClient;
pub use video::GeminiVideoClient;
