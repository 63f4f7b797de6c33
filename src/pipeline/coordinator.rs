//! Pipeline Coordinator - 6-Stage Safety Analysis Sequence
//!
//! ```text
//! STAGE 1: process_video         decode sampled frames (fatal if unreadable)
//! STAGE 2: detect_objects        per-frame detection, normalised
//! STAGE 3: retrieve_regulations  hybrid retrieval (empty on failure)
//! STAGE 4: assess_risk           model scoring or deterministic fallback
//! STAGE 5: generate_report       narrative + persisted report (none on failure)
//! STAGE 6: send_alerts           best-effort multi-channel delivery
//! ```
//!
//! Stages run strictly in order. Only stage 1 can end a run; every later
//! stage absorbs its own dependency failures and returns its documented
//! empty or fallback delta.

use futures::stream::{self, BoxStream, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, Instrument};

use crate::alert::AlertDispatcher;
use crate::error::PipelineError;
use crate::report::ReportGenerator;
use crate::retrieval::HybridRetriever;
use crate::risk::RiskAssessor;
use crate::vision::{FrameSource, ObjectDetector};

use super::state::{PipelineState, Stage, StageTiming, StageUpdate, StateDelta};

/// Detector fan-out limits.
#[derive(Debug, Clone, Copy)]
pub struct DetectionSettings {
    pub max_concurrent_frames: usize,
    pub timeout: Duration,
}

/// Names of the wired collaborators, for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineInfo {
    pub frame_source: String,
    pub detector: String,
    pub alert_channels: usize,
    pub stages: Vec<&'static str>,
}

/// The safety pipeline. Holds only read-only collaborators, so one instance
/// can serve any number of concurrent runs.
pub struct SafetyPipeline {
    pub(super) frame_source: Arc<dyn FrameSource>,
    pub(super) detector: Arc<dyn ObjectDetector>,
    pub(super) detection: DetectionSettings,
    pub(super) retriever: HybridRetriever,
    pub(super) assessor: RiskAssessor,
    pub(super) reporter: ReportGenerator,
    pub(super) alerts: AlertDispatcher,
}

impl SafetyPipeline {
    pub fn new(
        frame_source: Arc<dyn FrameSource>,
        detector: Arc<dyn ObjectDetector>,
        detection: DetectionSettings,
        retriever: HybridRetriever,
        assessor: RiskAssessor,
        reporter: ReportGenerator,
        alerts: AlertDispatcher,
    ) -> Self {
        Self {
            frame_source,
            detector,
            detection,
            retriever,
            assessor,
            reporter,
            alerts,
        }
    }

    pub fn info(&self) -> PipelineInfo {
        PipelineInfo {
            frame_source: self.frame_source.source_name().to_string(),
            detector: self.detector.detector_name().to_string(),
            alert_channels: self.alerts.channel_count(),
            stages: Stage::ALL.iter().map(|s| s.as_str()).collect(),
        }
    }

    /// Run one stage against the state so far and time it.
    async fn step(&self, stage: Stage, state: &PipelineState) -> Result<StateDelta, PipelineError> {
        let start = Instant::now();
        let mut delta = match stage {
            Stage::ProcessVideo => self.process_video(state).await?,
            Stage::DetectObjects => self.detect_objects(state).await,
            Stage::RetrieveRegulations => self.retrieve_regulations(state).await,
            Stage::AssessRisk => self.assess_risk(state).await,
            Stage::GenerateReport => self.generate_report(state).await,
            Stage::SendAlerts => self.send_alerts(state).await,
        };
        let elapsed_ms = start.elapsed().as_millis() as u64;
        delta.timing = Some(StageTiming { stage, elapsed_ms });
        debug!(stage = %stage, elapsed_ms, "Stage complete");
        Ok(delta)
    }

    /// Run all six stages and return the final state.
    pub async fn run(&self, video: &str) -> Result<PipelineState, PipelineError> {
        self.run_with_cancel(video, &CancellationToken::new()).await
    }

    /// Like [`run`](Self::run), but checks `cancel` at every stage boundary.
    pub async fn run_with_cancel(
        &self,
        video: &str,
        cancel: &CancellationToken,
    ) -> Result<PipelineState, PipelineError> {
        let mut state = PipelineState::new(video);
        let span = info_span!("run", run_id = %state.run_id, video = %video);

        async move {
            info!("Pipeline run started");
            let mut last = "start";
            for stage in Stage::ALL {
                if cancel.is_cancelled() {
                    info!(after = last, "Pipeline run cancelled");
                    return Err(PipelineError::Cancelled { after: last });
                }
                let delta = self.step(stage, &state).await?;
                state = state.apply(delta);
                last = stage.as_str();
            }

            let a = state.assessment();
            info!(
                risk_score = a.risk_score.value(),
                alert_level = %a.alert_level,
                regulations = state.regulations.len(),
                alerts = state.alerts_sent.len(),
                "Pipeline run complete"
            );
            Ok(state)
        }
        .instrument(span)
        .await
    }

    /// Run incrementally, yielding each stage's delta as soon as it is ready.
    ///
    /// The stream ends after `send_alerts`, or after the first error.
    /// Dropping it abandons the run.
    pub fn stream(self: &Arc<Self>, video: &str) -> BoxStream<'static, Result<StageUpdate, PipelineError>> {
        let pipeline = Arc::clone(self);
        let initial = PipelineState::new(video);

        stream::unfold(Some((initial, 0usize)), move |cursor| {
            let pipeline = Arc::clone(&pipeline);
            async move {
                let (state, idx) = cursor?;
                let stage = *Stage::ALL.get(idx)?;
                let run_id = state.run_id;

                match pipeline.step(stage, &state).await {
                    Ok(delta) => {
                        let elapsed_ms = delta.timing.map_or(0, |t| t.elapsed_ms);
                        let update = StageUpdate {
                            run_id,
                            stage,
                            delta: delta.clone(),
                            elapsed_ms,
                        };
                        Some((Ok(update), Some((state.apply(delta), idx + 1))))
                    }
                    Err(e) => Some((Err(e), None)),
                }
            }
        })
        .boxed()
    }
}
