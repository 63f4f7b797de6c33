//! The six stage bodies
//!
//! Each takes the state accumulated so far and returns its delta. Only
//! `process_video` is fallible.

use tracing::{info, warn};

use crate::alert::build_alert_message;
use crate::error::PipelineError;
use crate::vision::{detect_frames, normalize};

use super::coordinator::SafetyPipeline;
use super::state::{PipelineState, StateDelta};

impl SafetyPipeline {
    pub(super) async fn process_video(&self, state: &PipelineState) -> Result<StateDelta, PipelineError> {
        let frames = self.frame_source.extract(&state.video_path).await?;
        info!(
            source = self.frame_source.source_name(),
            frames = frames.len(),
            "Video processed"
        );
        Ok(StateDelta {
            frames,
            ..StateDelta::default()
        })
    }

    pub(super) async fn detect_objects(&self, state: &PipelineState) -> StateDelta {
        let per_frame = detect_frames(
            self.detector.as_ref(),
            &state.frames,
            self.detection.max_concurrent_frames,
            self.detection.timeout,
        )
        .await;
        let detections = normalize(per_frame);
        info!(
            detector = self.detector.detector_name(),
            frames = state.frames.len(),
            detections = detections.len(),
            "Object detection complete"
        );
        StateDelta {
            detections,
            ..StateDelta::default()
        }
    }

    pub(super) async fn retrieve_regulations(&self, state: &PipelineState) -> StateDelta {
        match self.retriever.retrieve(&state.detections).await {
            Ok(outcome) => StateDelta {
                regulations: outcome.regulations,
                retrieval_stats: Some(outcome.stats),
                ..StateDelta::default()
            },
            Err(e) => {
                warn!(
                    service = e.service(),
                    error = %e,
                    "Regulation retrieval failed, continuing without regulations"
                );
                StateDelta::default()
            }
        }
    }

    pub(super) async fn assess_risk(&self, state: &PipelineState) -> StateDelta {
        let assessment = self.assessor.assess(&state.detections, &state.regulations).await;
        StateDelta {
            risk_assessment: Some(assessment),
            ..StateDelta::default()
        }
    }

    pub(super) async fn generate_report(&self, state: &PipelineState) -> StateDelta {
        let assessment = state.assessment();
        let stats = state.detection_stats();
        match self
            .reporter
            .generate(state.run_id, &state.video_path, &assessment, &state.regulations, &stats)
            .await
        {
            Ok(path) => StateDelta {
                final_report: Some(path),
                ..StateDelta::default()
            },
            Err(e) => {
                warn!(error = %e, "Report rendering failed, continuing without a report");
                StateDelta::default()
            }
        }
    }

    pub(super) async fn send_alerts(&self, state: &PipelineState) -> StateDelta {
        let message = build_alert_message(&state.assessment(), state.final_report.as_deref());
        StateDelta {
            alerts_sent: self.alerts.dispatch(&message).await,
            ..StateDelta::default()
        }
    }
}
