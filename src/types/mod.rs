//! Shared data structures for the construction-site safety pipeline
//!
//! This module defines the values that flow between stages:
//! - Stage 1: Frame (decoded video sample)
//! - Stage 2: Detection (one labelled object in one frame), DetectionStats
//! - Stage 3: Regulation (retrieved knowledge-base passage)
//! - Stage 4: RiskAssessment, Violation, AlertLevel

mod assessment;
mod detection;
mod regulation;

pub use assessment::*;
pub use detection::*;
pub use regulation::*;
