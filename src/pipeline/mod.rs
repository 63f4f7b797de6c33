//! Safety Analysis Pipeline
//!
//! ## 6-Stage Pipeline Architecture
//!
//! ```text
//! process_video → detect_objects → retrieve_regulations
//!              → assess_risk → generate_report → send_alerts
//! ```
//!
//! Each stage returns a [`StateDelta`]; the coordinator folds deltas into a
//! run-local [`PipelineState`]. Runs share no mutable state.

mod builder;
mod coordinator;
mod stages;
mod state;

pub use builder::Collaborators;
pub use coordinator::{DetectionSettings, PipelineInfo, SafetyPipeline};
pub use state::*;
