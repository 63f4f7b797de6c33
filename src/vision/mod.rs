//! Video ingestion and object detection
//!
//! - [`frames`]: decode a video into sampled JPEG frames
//! - [`detector`]: per-frame object detection backends
//! - [`normalizer`]: flatten per-frame results into one attributed list

pub mod detector;
pub mod frames;
pub mod normalizer;

pub use detector::{detect_frames, ObjectDetector, RoboflowDetector};
pub use frames::{FfmpegFrameSource, FrameSource, StaticFrameSource};
pub use normalizer::{normalize, qualifying, FrameDetections};
