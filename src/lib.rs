//! SiteWatch: Construction-Site Safety Intelligence
//!
//! Turns site video into PPE violation findings, cited regulations, a
//! bounded risk score, a written report and alerts.
//!
//! ## Architecture
//!
//! - **Vision**: frame sampling and hosted object detection
//! - **Retrieval**: priority-tiered hybrid (dense + sparse) regulation search
//! - **Risk**: model-scored assessment with a deterministic fallback
//! - **Report / Alert**: narrative report on disk, multi-channel alerting
//! - **Pipeline**: six ordered stages over run-local state

pub mod config;
pub mod error;
pub mod http;
pub mod types;

pub mod alert;
pub mod api;
pub mod llm;
pub mod pipeline;
pub mod report;
pub mod retrieval;
pub mod risk;
pub mod vision;

// Re-export site configuration
pub use config::SiteConfig;

// Re-export errors
pub use error::{PipelineError, UpstreamError};

// Re-export commonly used types
pub use types::{
    AlertLevel, AssessmentMethod, BoundingBox, Detection, DetectionStats, Frame, Regulation,
    RiskAssessment, RiskScore, TimeSpan, Violation,
};

// Re-export the pipeline surface
pub use pipeline::{
    Collaborators, PipelineState, RunSummary, SafetyPipeline, Stage, StageUpdate, StateDelta,
};
