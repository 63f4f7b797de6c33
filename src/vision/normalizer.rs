//! Detection Normalizer
//!
//! Flattens per-frame detector output into one run-ordered list, stamping each
//! detection with the frame it came from. Nothing is discarded here: every
//! downstream consumer applies its own confidence floor, either through
//! [`qualifying`] or [`Detection::meets`] directly.

use serde::{Deserialize, Serialize};

use crate::types::Detection;

/// Raw detector output for one frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameDetections {
    pub frame_index: usize,
    pub timestamp_secs: f64,
    pub detections: Vec<Detection>,
}

/// Flatten per-frame records, preserving frame order then in-frame order.
///
/// Non-finite confidences (a detector bug, not a signal) are recorded as 0.0
/// so they can never clear a threshold.
pub fn normalize(frames: Vec<FrameDetections>) -> Vec<Detection> {
    frames
        .into_iter()
        .flat_map(|frame| {
            let (idx, ts) = (frame.frame_index, frame.timestamp_secs);
            frame.detections.into_iter().map(move |mut d| {
                if !d.confidence.is_finite() {
                    d.confidence = 0.0;
                }
                d.in_frame(idx, ts)
            })
        })
        .collect()
}

/// Borrow the detections a consumer with floor `threshold` should see.
pub fn qualifying(detections: &[Detection], threshold: f64) -> impl Iterator<Item = &Detection> {
    detections.iter().filter(move |d| d.meets(threshold))
}
