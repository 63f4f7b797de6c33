//! Risk scoring
//!
//! - [`assessor`]: model-backed scoring with the deterministic fallback
//! - [`bands`]: advisory score bands shared by the prompt and the checks

pub mod assessor;
pub mod bands;

pub use assessor::{rule_based_assessment, system_prompt, RiskAssessor, Scene};
pub use bands::{ScoringBand, SCORING_GUIDE};
