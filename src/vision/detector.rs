//! Object detection backends
//!
//! [`ObjectDetector`] is the seam between the pipeline and whichever hosted
//! model recognises PPE and equipment in a frame. The production backend is a
//! Roboflow-hosted model reached over HTTP.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::DetectorConfig;
use crate::error::{bounded, UpstreamError};
use crate::http;
use crate::types::{BoundingBox, Detection, Frame};

use super::normalizer::FrameDetections;

const SERVICE: &str = "detector";

/// Recognises labelled objects in a single frame.
#[async_trait]
pub trait ObjectDetector: Send + Sync {
    /// Detections for `frame`. Implementations need not set frame attribution;
    /// the normalizer does that.
    async fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, UpstreamError>;

    fn detector_name(&self) -> &str;
}

// ============================================================================
// Roboflow
// ============================================================================

#[derive(Debug, Deserialize)]
struct RoboflowResponse {
    #[serde(default)]
    predictions: Vec<RoboflowPrediction>,
}

/// Roboflow boxes are centre-anchored.
#[derive(Debug, Deserialize)]
struct RoboflowPrediction {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
    confidence: f64,
    class: String,
}

impl From<RoboflowPrediction> for Detection {
    fn from(p: RoboflowPrediction) -> Self {
        Detection::new(
            p.class,
            p.confidence,
            BoundingBox::from_center(p.x, p.y, p.width, p.height),
        )
    }
}

/// Hosted inference via `POST {api_url}/{project}/{version}`.
pub struct RoboflowDetector {
    client: reqwest::Client,
    timeout: Duration,
    endpoint: String,
    api_key: String,
    min_confidence: f64,
}

impl RoboflowDetector {
    pub fn new(config: &DetectorConfig) -> Result<Self, UpstreamError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| UpstreamError::unavailable(SERVICE, "ROBOFLOW_API_KEY not set"))?;

        Ok(Self {
            client: http::build_client(SERVICE, config.timeout())?,
            timeout: config.timeout(),
            endpoint: format!(
                "{}/{}/{}",
                http::base_url(&config.api_url),
                config.project,
                config.version
            ),
            api_key,
            min_confidence: config.min_confidence,
        })
    }

    fn parse_response(body: RoboflowResponse) -> Vec<Detection> {
        body.predictions.into_iter().map(Detection::from).collect()
    }
}

#[async_trait]
impl ObjectDetector for RoboflowDetector {
    async fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, UpstreamError> {
        let part = reqwest::multipart::Part::bytes(frame.image.to_vec())
            .file_name(format!("frame_{:04}.jpg", frame.index))
            .mime_str("image/jpeg")
            .map_err(|e| UpstreamError::unavailable(SERVICE, e))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        // Roboflow takes confidence as a percentage
        let confidence_pct = (self.min_confidence * 100.0).round().to_string();
        let request = self
            .client
            .post(&self.endpoint)
            .query(&[("api_key", self.api_key.as_str()), ("confidence", confidence_pct.as_str())])
            .multipart(form);

        let body: RoboflowResponse = http::read_json(SERVICE, self.timeout, request).await?;
        let detections = Self::parse_response(body);
        debug!(frame = frame.index, detections = detections.len(), "Roboflow inference complete");
        Ok(detections)
    }

    fn detector_name(&self) -> &str {
        "roboflow"
    }
}

// ============================================================================
// Frame Fan-out
// ============================================================================

/// Run the detector over every frame with at most `concurrency` calls in
/// flight, returning results in frame order.
///
/// A frame whose call fails or times out is logged and yields no detections.
pub async fn detect_frames(
    detector: &dyn ObjectDetector,
    frames: &[Frame],
    concurrency: usize,
    timeout: Duration,
) -> Vec<FrameDetections> {
    let calls: Vec<_> = frames
        .iter()
        .map(|frame| async move {
            let detections = match bounded(SERVICE, timeout, detector.detect(frame)).await {
                Ok(detections) => detections,
                Err(e) => {
                    warn!(
                        frame = frame.index,
                        detector = detector.detector_name(),
                        error = %e,
                        "Detection failed for frame, continuing without it"
                    );
                    Vec::new()
                }
            };
            FrameDetections {
                frame_index: frame.index,
                timestamp_secs: frame.timestamp_secs,
                detections,
            }
        })
        .collect();
    stream::iter(calls)
        .buffered(concurrency.max(1))
        .collect()
        .await
}
