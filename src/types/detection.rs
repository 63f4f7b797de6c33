//! Frame and detection types: Frame, BoundingBox, Detection, DetectionStats

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

// ============================================================================
// Stage 1: Frames
// ============================================================================

/// A single video frame sampled for analysis.
#[derive(Clone, Serialize)]
pub struct Frame {
    /// Position in the sampled sequence (0-based)
    pub index: usize,
    /// Offset into the video in seconds
    pub timestamp_secs: f64,
    /// JPEG-encoded image; shared so state snapshots stay cheap to clone
    #[serde(skip_serializing)]
    pub image: Arc<[u8]>,
}

impl Frame {
    pub fn new(index: usize, timestamp_secs: f64, image: Vec<u8>) -> Self {
        Self {
            index,
            timestamp_secs,
            image: Arc::from(image),
        }
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("index", &self.index)
            .field("timestamp_secs", &self.timestamp_secs)
            .field("image_bytes", &self.image.len())
            .finish()
    }
}

// ============================================================================
// Stage 2: Detections
// ============================================================================

/// Axis-aligned box in (x, y, w, h) form, origin top-left, pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Build from a centre-anchored box (the form most detectors emit).
    pub fn from_center(cx: f64, cy: f64, width: f64, height: f64) -> Self {
        Self {
            x: cx - width / 2.0,
            y: cy - height / 2.0,
            width,
            height,
        }
    }
}

/// One recognised object or condition in one frame. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    /// Detector confidence in [0, 1]
    pub confidence: f64,
    pub bbox: BoundingBox,
    pub frame_index: usize,
    pub timestamp_secs: f64,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f64, bbox: BoundingBox) -> Self {
        Self {
            label: label.into(),
            confidence: confidence.clamp(0.0, 1.0),
            bbox,
            frame_index: 0,
            timestamp_secs: 0.0,
        }
    }

    /// Attribute this detection to a frame.
    pub fn in_frame(mut self, frame_index: usize, timestamp_secs: f64) -> Self {
        self.frame_index = frame_index;
        self.timestamp_secs = timestamp_secs;
        self
    }

    /// Whether the detection clears a consumer's confidence floor (inclusive).
    pub fn meets(&self, threshold: f64) -> bool {
        self.confidence >= threshold
    }
}

// ============================================================================
// Detection Statistics
// ============================================================================

/// Aggregate view of one label across a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelStats {
    pub label: String,
    pub count: usize,
    pub max_confidence: f64,
    pub mean_confidence: f64,
    pub first_seen_secs: f64,
    pub last_seen_secs: f64,
}

/// Per-label counts and confidence, ordered by count (desc) then label.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionStats {
    pub total: usize,
    pub labels: Vec<LabelStats>,
}

impl DetectionStats {
    pub fn from_detections(detections: &[Detection]) -> Self {
        let mut by_label: HashMap<&str, LabelStats> = HashMap::new();

        for d in detections {
            let entry = by_label.entry(d.label.as_str()).or_insert_with(|| LabelStats {
                label: d.label.clone(),
                count: 0,
                max_confidence: 0.0,
                mean_confidence: 0.0,
                first_seen_secs: d.timestamp_secs,
                last_seen_secs: d.timestamp_secs,
            });
            entry.count += 1;
            entry.max_confidence = entry.max_confidence.max(d.confidence);
            // running sum, divided below
            entry.mean_confidence += d.confidence;
            entry.first_seen_secs = entry.first_seen_secs.min(d.timestamp_secs);
            entry.last_seen_secs = entry.last_seen_secs.max(d.timestamp_secs);
        }

        let mut labels: Vec<LabelStats> = by_label
            .into_values()
            .map(|mut s| {
                s.mean_confidence /= s.count as f64;
                s
            })
            .collect();
        labels.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));

        Self {
            total: detections.len(),
            labels,
        }
    }

    pub fn get(&self, label: &str) -> Option<&LabelStats> {
        self.labels.iter().find(|s| s.label == label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(label: &str, confidence: f64, frame: usize) -> Detection {
        Detection::new(label, confidence, BoundingBox::default()).in_frame(frame, frame as f64)
    }

    #[test]
    fn test_confidence_boundary_is_inclusive() {
        assert!(det("NO-Hardhat", 0.50, 0).meets(0.50));
        assert!(!det("NO-Hardhat", 0.49, 0).meets(0.50));
    }

    #[test]
    fn test_confidence_is_clamped() {
        assert!((det("Person", 1.7, 0).confidence - 1.0).abs() < f64::EPSILON);
        assert!(det("Person", -0.2, 0).confidence.abs() < f64::EPSILON);
    }

    #[test]
    fn test_center_box_conversion() {
        let b = BoundingBox::from_center(100.0, 50.0, 40.0, 20.0);
        assert_eq!(b, BoundingBox::new(80.0, 40.0, 40.0, 20.0));
    }

    #[test]
    fn test_stats_group_by_label() {
        let detections = vec![
            det("NO-Hardhat", 0.9, 0),
            det("Person", 0.8, 0),
            det("NO-Hardhat", 0.7, 3),
        ];
        let stats = DetectionStats::from_detections(&detections);

        assert_eq!(stats.total, 3);
        assert_eq!(stats.labels[0].label, "NO-Hardhat");

        let hardhat = stats.get("NO-Hardhat").expect("label present");
        assert_eq!(hardhat.count, 2);
        assert!((hardhat.max_confidence - 0.9).abs() < 1e-9);
        assert!((hardhat.mean_confidence - 0.8).abs() < 1e-9);
        assert!((hardhat.first_seen_secs - 0.0).abs() < 1e-9);
        assert!((hardhat.last_seen_secs - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_stats_of_nothing() {
        let stats = DetectionStats::from_detections(&[]);
        assert_eq!(stats.total, 0);
        assert!(stats.labels.is_empty());
    }

    #[test]
    fn test_frame_debug_hides_payload() {
        let frame = Frame::new(2, 2.0, vec![0xFF, 0xD8, 0xFF, 0xD9]);
        let dbg = format!("{frame:?}");
        assert!(dbg.contains("image_bytes: 4"));
    }
}
