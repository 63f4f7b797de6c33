//! Advisory scoring bands
//!
//! The bands are written into the model prompt and checked against the
//! model's answer. A score outside its band is logged, not rejected.

use serde::Serialize;
use std::ops::RangeInclusive;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringBand {
    /// No violations, no equipment
    Clear,
    /// PPE violation, no heavy machinery nearby
    ViolationOnly,
    /// PPE violation with heavy machinery present
    ViolationWithMachinery,
    /// Several violations, machinery and people nearby
    Compound,
}

impl ScoringBand {
    /// Band for a scene, or `None` when the guide does not cover it
    /// (machinery without violations).
    pub fn for_context(violations: usize, machinery: usize, people: usize) -> Option<Self> {
        match (violations, machinery) {
            (0, 0) => Some(ScoringBand::Clear),
            (0, _) => None,
            (v, m) if v >= 2 && m > 0 && people > 0 => Some(ScoringBand::Compound),
            (_, 0) => Some(ScoringBand::ViolationOnly),
            _ => Some(ScoringBand::ViolationWithMachinery),
        }
    }

    pub fn range(self) -> RangeInclusive<u8> {
        match self {
            ScoringBand::Clear => 0..=20,
            ScoringBand::ViolationOnly => 30..=50,
            ScoringBand::ViolationWithMachinery => 60..=80,
            ScoringBand::Compound => 80..=100,
        }
    }

    pub fn contains(self, score: u8) -> bool {
        self.range().contains(&score)
    }
}

/// Scoring guide text embedded in the model instruction.
pub const SCORING_GUIDE: &str = "Scoring guide:
- No violations, no equipment: 0-20
- PPE violation, no equipment nearby: 30-50
- PPE violation + heavy machinery present: 60-80
- Multiple PPE violations + machinery + people nearby: 80-100";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_selection() {
        assert_eq!(ScoringBand::for_context(0, 0, 3), Some(ScoringBand::Clear));
        assert_eq!(ScoringBand::for_context(1, 0, 1), Some(ScoringBand::ViolationOnly));
        assert_eq!(ScoringBand::for_context(2, 1, 0), Some(ScoringBand::ViolationWithMachinery));
        assert_eq!(ScoringBand::for_context(2, 1, 4), Some(ScoringBand::Compound));
        assert_eq!(ScoringBand::for_context(0, 2, 2), None);
    }

    #[test]
    fn test_band_ranges() {
        assert!(ScoringBand::ViolationWithMachinery.contains(60));
        assert!(ScoringBand::ViolationWithMachinery.contains(80));
        assert!(!ScoringBand::ViolationWithMachinery.contains(50));
        assert!(ScoringBand::Clear.contains(0));
    }
}
