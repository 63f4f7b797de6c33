//! Frame source abstraction for video ingestion.
//!
//! The pipeline only needs an ordered, finite sequence of JPEG frames for a
//! video reference. [`FfmpegFrameSource`] produces it by shelling out to
//! `ffprobe`/`ffmpeg`; tests substitute an in-memory source.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::VideoConfig;
use crate::error::PipelineError;
use crate::types::Frame;

/// Trait abstracting where frames come from.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Decode the video into sampled frames, in order.
    ///
    /// Returns `PipelineError::VideoUnreadable` when no frames can exist.
    async fn extract(&self, video: &str) -> Result<Vec<Frame>, PipelineError>;

    /// Human-readable name for logging (e.g. "ffmpeg").
    fn source_name(&self) -> &str;
}

// ============================================================================
// Probe
// ============================================================================

/// Stream properties reported by ffprobe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoProperties {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

/// Parse `r_frame_rate` in either `30` or `30000/1001` form.
pub fn parse_frame_rate(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    let fps = match raw.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => raw.parse().ok()?,
    };
    (fps.is_finite() && fps > 0.0).then_some(fps)
}

/// Parse ffprobe's `default=noprint_wrappers=1:nokey=1` output
/// (width, height, frame rate on separate lines).
pub fn parse_probe_output(stdout: &str) -> Result<VideoProperties, String> {
    let lines: Vec<&str> = stdout.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    if lines.len() < 3 {
        return Err(format!("unexpected ffprobe output: {stdout:?}"));
    }
    let width = lines[0]
        .parse()
        .map_err(|_| format!("bad width '{}'", lines[0]))?;
    let height = lines[1]
        .parse()
        .map_err(|_| format!("bad height '{}'", lines[1]))?;
    let fps = parse_frame_rate(lines[2]).ok_or_else(|| format!("bad frame rate '{}'", lines[2]))?;
    Ok(VideoProperties { width, height, fps })
}

/// Split an `image2pipe` MJPEG stream into individual JPEG images.
///
/// Each image runs from an SOI marker (`FF D8`) to the next EOI marker
/// (`FF D9`). Entropy-coded data byte-stuffs `FF`, so EOI cannot occur early.
pub fn split_jpeg_stream(buf: &[u8]) -> Vec<Vec<u8>> {
    let mut images = Vec::new();
    let mut pos = 0;

    while let Some(start) = find_marker(buf, pos, 0xD8) {
        match find_marker(buf, start + 2, 0xD9) {
            Some(end) => {
                images.push(buf[start..end + 2].to_vec());
                pos = end + 2;
            }
            // truncated trailing image
            None => break,
        }
    }
    images
}

fn find_marker(buf: &[u8], from: usize, marker: u8) -> Option<usize> {
    if from >= buf.len() {
        return None;
    }
    buf[from..]
        .windows(2)
        .position(|w| w[0] == 0xFF && w[1] == marker)
        .map(|p| p + from)
}

// ============================================================================
// ffmpeg Source
// ============================================================================

/// Samples frames with ffmpeg at a fixed rate, up to a frame cap.
pub struct FfmpegFrameSource {
    config: VideoConfig,
}

impl FfmpegFrameSource {
    pub fn new(config: VideoConfig) -> Self {
        Self { config }
    }

    async fn probe(&self, video: &str) -> Result<VideoProperties, PipelineError> {
        let output = Command::new(&self.config.ffprobe_bin)
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=width,height,r_frame_rate",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
                video,
            ])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.config.timeout(), output)
            .await
            .map_err(|_| unreadable(video, "ffprobe timed out"))?
            .map_err(|e| unreadable(video, format!("failed to spawn ffprobe: {e}")))?;

        if !output.status.success() {
            return Err(unreadable(
                video,
                format!("ffprobe failed: {}", String::from_utf8_lossy(&output.stderr).trim()),
            ));
        }

        parse_probe_output(&String::from_utf8_lossy(&output.stdout)).map_err(|e| unreadable(video, e))
    }
}

#[async_trait]
impl FrameSource for FfmpegFrameSource {
    async fn extract(&self, video: &str) -> Result<Vec<Frame>, PipelineError> {
        if !Path::new(video).exists() {
            return Err(unreadable(video, "file does not exist"));
        }

        let props = self.probe(video).await?;
        info!(
            video = %video,
            width = props.width,
            height = props.height,
            fps = format!("{:.2}", props.fps),
            "Probed video"
        );

        let fps_filter = format!("fps={}", self.config.sample_fps);
        let max_frames = self.config.max_frames.to_string();
        let output = Command::new(&self.config.ffmpeg_bin)
            .args([
                "-v",
                "error",
                "-i",
                video,
                "-vf",
                &fps_filter,
                "-frames:v",
                &max_frames,
                "-f",
                "image2pipe",
                "-c:v",
                "mjpeg",
                "-q:v",
                "3",
                "-",
            ])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.config.timeout(), output)
            .await
            .map_err(|_| unreadable(video, "ffmpeg timed out"))?
            .map_err(|e| unreadable(video, format!("failed to spawn ffmpeg: {e}")))?;

        let frames: Vec<Frame> = split_jpeg_stream(&output.stdout)
            .into_iter()
            .take(self.config.max_frames)
            .enumerate()
            .map(|(idx, jpeg)| Frame::new(idx, idx as f64 / self.config.sample_fps, jpeg))
            .collect();

        if !output.status.success() && frames.is_empty() {
            return Err(unreadable(
                video,
                format!(
                    "ffmpeg exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }

        debug!(frames = frames.len(), "Decoded frames");
        Ok(frames)
    }

    fn source_name(&self) -> &str {
        "ffmpeg"
    }
}

fn unreadable(video: &str, reason: impl Into<String>) -> PipelineError {
    PipelineError::VideoUnreadable {
        path: video.to_string(),
        reason: reason.into(),
    }
}

// ============================================================================
// In-memory Source
// ============================================================================

/// Replays pre-decoded frames; used for tests and offline replays.
pub struct StaticFrameSource {
    frames: Vec<Frame>,
}

impl StaticFrameSource {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self { frames }
    }

    /// `count` placeholder frames one second apart.
    pub fn with_blank_frames(count: usize) -> Self {
        Self::new(
            (0..count)
                .map(|i| Frame::new(i, i as f64, vec![0xFF, 0xD8, 0xFF, 0xD9]))
                .collect(),
        )
    }
}

#[async_trait]
impl FrameSource for StaticFrameSource {
    async fn extract(&self, _video: &str) -> Result<Vec<Frame>, PipelineError> {
        Ok(self.frames.clone())
    }

    fn source_name(&self) -> &str {
        "static"
    }
}
