//! Risk assessment types: AlertLevel, RiskScore, Violation, RiskAssessment

use serde::{Deserialize, Serialize};

use crate::config::defaults::{CRITICAL_SCORE, HIGH_SCORE, MEDIUM_SCORE};

// ============================================================================
// Alert Level
// ============================================================================

/// Overall run risk classification, ordered LOW < MEDIUM < HIGH < CRITICAL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertLevel {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl AlertLevel {
    /// Fixed score thresholds: >=75 CRITICAL, >=50 HIGH, >=25 MEDIUM, else LOW.
    pub fn from_score(score: RiskScore) -> Self {
        let s = score.value();
        if s >= CRITICAL_SCORE {
            AlertLevel::Critical
        } else if s >= HIGH_SCORE {
            AlertLevel::High
        } else if s >= MEDIUM_SCORE {
            AlertLevel::Medium
        } else {
            AlertLevel::Low
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AlertLevel::Low => "LOW",
            AlertLevel::Medium => "MEDIUM",
            AlertLevel::High => "HIGH",
            AlertLevel::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AlertLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOW" => Ok(AlertLevel::Low),
            "MEDIUM" => Ok(AlertLevel::Medium),
            "HIGH" => Ok(AlertLevel::High),
            "CRITICAL" => Ok(AlertLevel::Critical),
            other => Err(format!("unknown alert level '{other}'")),
        }
    }
}

// ============================================================================
// Risk Score
// ============================================================================

/// Integer risk score, guaranteed to lie in [0, 100].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct RiskScore(u8);

impl RiskScore {
    pub const MAX: u8 = 100;
    pub const ZERO: RiskScore = RiskScore(0);

    /// `None` when `value` is out of range.
    pub fn new(value: i64) -> Option<Self> {
        u8::try_from(value)
            .ok()
            .filter(|v| *v <= Self::MAX)
            .map(Self)
    }

    /// Clamp an unbounded tally into range.
    pub fn saturating(value: u32) -> Self {
        Self(u8::try_from(value.min(u32::from(Self::MAX))).unwrap_or(Self::MAX))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for RiskScore {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| format!("risk score {value} outside [0, 100]"))
    }
}

impl From<RiskScore> for u8 {
    fn from(score: RiskScore) -> Self {
        score.0
    }
}

impl std::fmt::Display for RiskScore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Violations
// ============================================================================

/// Interval in which a violation was observed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeSpan {
    pub start_secs: f64,
    pub end_secs: f64,
}

impl TimeSpan {
    pub fn duration_secs(&self) -> f64 {
        (self.end_secs - self.start_secs).max(0.0)
    }
}

/// A safety issue judged risk-relevant by the scoring engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    #[serde(rename = "type")]
    pub kind: String,
    pub confidence: f64,
    pub severity: AlertLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_span: Option<TimeSpan>,
}

impl Violation {
    pub fn duration_secs(&self) -> f64 {
        self.time_span.map_or(0.0, |s| s.duration_secs())
    }
}

// ============================================================================
// Risk Assessment
// ============================================================================

/// Which path produced an assessment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentMethod {
    /// No detections: deterministic zero assessment, no model call
    #[default]
    NoDetections,
    Model,
    /// Deterministic fallback after a model failure
    RuleBased,
}

/// The single scoring output of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub risk_score: RiskScore,
    pub alert_level: AlertLevel,
    pub violations: Vec<Violation>,
    pub equipment_context: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    #[serde(default)]
    pub method: AssessmentMethod,
}

impl RiskAssessment {
    /// Score 0, LOW, nothing else.
    pub fn zero() -> Self {
        Self::default()
    }
}
