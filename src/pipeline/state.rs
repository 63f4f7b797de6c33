//! Run State and Stage Deltas
//!
//! A run's state is a value: every stage reads the state produced so far and
//! returns a [`StateDelta`]; [`PipelineState::apply`] folds it in. List fields
//! append in arrival order, singular fields replace. Replaying the same
//! deltas always rebuilds the same state.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::retrieval::RetrievalStats;
use crate::types::{Detection, DetectionStats, Frame, Regulation, RiskAssessment};

// ============================================================================
// Stages
// ============================================================================

/// The six pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ProcessVideo,
    DetectObjects,
    RetrieveRegulations,
    AssessRisk,
    GenerateReport,
    SendAlerts,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::ProcessVideo,
        Stage::DetectObjects,
        Stage::RetrieveRegulations,
        Stage::AssessRisk,
        Stage::GenerateReport,
        Stage::SendAlerts,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::ProcessVideo => "process_video",
            Stage::DetectObjects => "detect_objects",
            Stage::RetrieveRegulations => "retrieve_regulations",
            Stage::AssessRisk => "assess_risk",
            Stage::GenerateReport => "generate_report",
            Stage::SendAlerts => "send_alerts",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wall-clock time spent in one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTiming {
    pub stage: Stage,
    pub elapsed_ms: u64,
}

// ============================================================================
// State
// ============================================================================

/// Run-scoped accumulator. Created empty, never shared between runs.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineState {
    pub run_id: Uuid,
    pub video_path: String,
    pub frames: Vec<Frame>,
    pub detections: Vec<Detection>,
    pub regulations: Vec<Regulation>,
    pub retrieval_stats: Option<RetrievalStats>,
    pub risk_assessment: Option<RiskAssessment>,
    pub final_report: Option<PathBuf>,
    pub alerts_sent: Vec<String>,
    pub timings: Vec<StageTiming>,
}

impl PipelineState {
    pub fn new(video_path: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            video_path: video_path.into(),
            frames: Vec::new(),
            detections: Vec::new(),
            regulations: Vec::new(),
            retrieval_stats: None,
            risk_assessment: None,
            final_report: None,
            alerts_sent: Vec::new(),
            timings: Vec::new(),
        }
    }

    /// Fold a stage's output into the state.
    pub fn apply(mut self, delta: StateDelta) -> Self {
        self.frames.extend(delta.frames);
        self.detections.extend(delta.detections);
        self.regulations.extend(delta.regulations);
        self.alerts_sent.extend(delta.alerts_sent);
        self.timings.extend(delta.timing);

        if delta.retrieval_stats.is_some() {
            self.retrieval_stats = delta.retrieval_stats;
        }
        if delta.risk_assessment.is_some() {
            self.risk_assessment = delta.risk_assessment;
        }
        if delta.final_report.is_some() {
            self.final_report = delta.final_report;
        }
        self
    }

    /// The run's assessment; the zero assessment until scoring has run.
    pub fn assessment(&self) -> RiskAssessment {
        self.risk_assessment.clone().unwrap_or_default()
    }

    pub fn detection_stats(&self) -> DetectionStats {
        DetectionStats::from_detections(&self.detections)
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            run_id: self.run_id,
            video_path: self.video_path.clone(),
            frames_processed: self.frames.len(),
            detection_stats: self.detection_stats(),
            regulations: self.regulations.clone(),
            retrieval_stats: self.retrieval_stats.clone(),
            risk_assessment: self.assessment(),
            final_report: self.final_report.clone(),
            alerts_sent: self.alerts_sent.clone(),
            timings: self.timings.clone(),
            total_ms: self.timings.iter().map(|t| t.elapsed_ms).sum(),
        }
    }
}

/// Partial update returned by one stage.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StateDelta {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub frames: Vec<Frame>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub detections: Vec<Detection>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub regulations: Vec<Regulation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retrieval_stats: Option<RetrievalStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_assessment: Option<RiskAssessment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_report: Option<PathBuf>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub alerts_sent: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timing: Option<StageTiming>,
}

/// One incremental step of a streamed run.
#[derive(Debug, Clone, Serialize)]
pub struct StageUpdate {
    pub run_id: Uuid,
    pub stage: Stage,
    pub delta: StateDelta,
    pub elapsed_ms: u64,
}

// ============================================================================
// Summary
// ============================================================================

/// Serialisable result of a finished run, without frame payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub video_path: String,
    pub frames_processed: usize,
    pub detection_stats: DetectionStats,
    pub regulations: Vec<Regulation>,
    pub retrieval_stats: Option<RetrievalStats>,
    pub risk_assessment: RiskAssessment,
    pub final_report: Option<PathBuf>,
    pub alerts_sent: Vec<String>,
    pub timings: Vec<StageTiming>,
    pub total_ms: u64,
}
