//! Risk Scoring Engine
//!
//! `assess(detections, regulations)` always produces exactly one valid
//! [`RiskAssessment`]:
//!
//! - no detections: the zero assessment, no model call
//! - model reachable and well-formed: the model's score and violations
//! - anything else: `min(25 × violations, 100)` with fixed thresholds and no
//!   per-violation detail

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::defaults::FALLBACK_POINTS_PER_VIOLATION;
use crate::config::ScoringConfig;
use crate::error::{bounded, UpstreamError};
use crate::llm::{generate_json, LlmBackend};
use crate::retrieval::priority::{is_machinery, is_violation, PERSON_LABEL};
use crate::types::{
    AlertLevel, AssessmentMethod, Detection, DetectionStats, Regulation, RiskAssessment, RiskScore, TimeSpan,
    Violation,
};
use crate::vision::qualifying;

use super::bands::{ScoringBand, SCORING_GUIDE};

// ============================================================================
// Model Contract
// ============================================================================

const SYSTEM_PROMPT_HEADER: &str = r#"You are a construction site safety expert.
Given detected violations, equipment context, and relevant OSHA regulations,
return a JSON risk assessment with this exact structure:
{
  "risk_score": <0-100 integer>,
  "alert_level": <"LOW"|"MEDIUM"|"HIGH"|"CRITICAL">,
  "violations": [
    {
      "type": <violation label>,
      "severity": <"LOW"|"MEDIUM"|"HIGH"|"CRITICAL">,
      "confidence": <float>,
      "reasoning": <one sentence why this is risky>
    }
  ],
  "reasoning": <overall 1-2 sentence explanation>
}"#;

/// Full instruction sent with every scoring request.
pub fn system_prompt() -> String {
    format!("{SYSTEM_PROMPT_HEADER}\n{SCORING_GUIDE}\nReturn only valid JSON, no other text.")
}

#[derive(Debug, Clone, Serialize)]
struct ViolationContext {
    label: String,
    confidence: f64,
}

#[derive(Debug, Clone, Serialize)]
struct RegulationContext<'a> {
    citation: &'a str,
    text: &'a str,
}

/// Compact scene description handed to the model.
#[derive(Debug, Clone, Serialize)]
struct ScoringContext<'a> {
    violations: Vec<ViolationContext>,
    heavy_equipment: Vec<&'a str>,
    people_nearby: usize,
    relevant_regulations: Vec<RegulationContext<'a>>,
}

#[derive(Debug, Deserialize)]
struct ModelReply {
    risk_score: f64,
    alert_level: String,
    #[serde(default)]
    violations: Vec<ModelViolation>,
    #[serde(default)]
    reasoning: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelViolation {
    #[serde(rename = "type")]
    kind: String,
    severity: String,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    reasoning: Option<String>,
}

// ============================================================================
// Scene Partition
// ============================================================================

/// Detections split the way the scoring guide reasons about a scene.
#[derive(Debug, Clone, Default)]
pub struct Scene<'a> {
    pub violations: Vec<&'a Detection>,
    pub machinery: Vec<&'a Detection>,
    pub people: usize,
}

impl<'a> Scene<'a> {
    pub fn from_detections(detections: &'a [Detection], min_confidence: f64) -> Self {
        let mut scene = Scene::default();
        for d in qualifying(detections, min_confidence) {
            if is_violation(&d.label) {
                scene.violations.push(d);
            } else if is_machinery(&d.label) {
                scene.machinery.push(d);
            } else if d.label == PERSON_LABEL {
                scene.people += 1;
            }
        }
        scene
    }

    /// Distinct machinery labels in first-seen order.
    pub fn equipment_context(&self) -> Vec<String> {
        let mut labels: Vec<String> = Vec::new();
        for d in &self.machinery {
            if !labels.iter().any(|l| l == &d.label) {
                labels.push(d.label.clone());
            }
        }
        labels
    }

    pub fn band(&self) -> Option<ScoringBand> {
        ScoringBand::for_context(self.violations.len(), self.machinery.len(), self.people)
    }
}

// ============================================================================
// Deterministic Fallback
// ============================================================================

/// `min(25 × N, 100)` with the fixed level thresholds; no violation detail.
pub fn rule_based_assessment(violation_count: usize, equipment_context: Vec<String>) -> RiskAssessment {
    let points = u32::try_from(violation_count)
        .unwrap_or(u32::MAX)
        .saturating_mul(FALLBACK_POINTS_PER_VIOLATION);
    let risk_score = RiskScore::saturating(points);

    RiskAssessment {
        risk_score,
        alert_level: AlertLevel::from_score(risk_score),
        violations: Vec::new(),
        equipment_context,
        rationale: None,
        method: AssessmentMethod::RuleBased,
    }
}

// ============================================================================
// Assessor
// ============================================================================

pub struct RiskAssessor {
    model: Arc<dyn LlmBackend>,
    config: ScoringConfig,
    timeout: Duration,
}

impl RiskAssessor {
    pub fn new(model: Arc<dyn LlmBackend>, config: ScoringConfig, timeout: Duration) -> Self {
        Self { model, config, timeout }
    }

    pub async fn assess(&self, detections: &[Detection], regulations: &[Regulation]) -> RiskAssessment {
        if detections.is_empty() {
            debug!("No detections, returning zero assessment");
            return RiskAssessment::zero();
        }

        let start = Instant::now();
        let scene = Scene::from_detections(detections, self.config.min_confidence);

        let assessment = match self.model_assessment(&scene, detections, regulations).await {
            Ok(assessment) => assessment,
            Err(e) => {
                warn!(
                    service = e.service(),
                    error = %e,
                    violations = scene.violations.len(),
                    "Model scoring failed, falling back to rule-based scoring"
                );
                rule_based_assessment(scene.violations.len(), scene.equipment_context())
            }
        };

        info!(
            risk_score = assessment.risk_score.value(),
            alert_level = %assessment.alert_level,
            method = ?assessment.method,
            violations = assessment.violations.len(),
            latency_ms = start.elapsed().as_millis() as u64,
            "Risk assessment complete"
        );
        assessment
    }

    async fn model_assessment(
        &self,
        scene: &Scene<'_>,
        detections: &[Detection],
        regulations: &[Regulation],
    ) -> Result<RiskAssessment, UpstreamError> {
        let context = self.build_context(scene, regulations);
        let user = serde_json::to_string_pretty(&context).map_err(|e| UpstreamError::malformed("llm", e))?;
        let system = system_prompt();

        let reply: ModelReply = bounded(
            "llm",
            self.timeout,
            generate_json(self.model.as_ref(), &system, &user),
        )
        .await?;

        let assessment = interpret_reply(reply, scene, &DetectionStats::from_detections(detections))?;
        if let Some(band) = scene.band() {
            if !band.contains(assessment.risk_score.value()) {
                warn!(
                    risk_score = assessment.risk_score.value(),
                    band = ?band,
                    "Model score outside advisory band"
                );
            }
        }
        Ok(assessment)
    }

    fn build_context<'a>(&self, scene: &Scene<'a>, regulations: &'a [Regulation]) -> ScoringContext<'a> {
        ScoringContext {
            violations: scene
                .violations
                .iter()
                .map(|v| ViolationContext {
                    label: v.label.clone(),
                    confidence: (v.confidence * 1000.0).round() / 1000.0,
                })
                .collect(),
            heavy_equipment: scene.machinery.iter().map(|&d| d.label.as_str()).collect(),
            people_nearby: scene.people,
            relevant_regulations: regulations
                .iter()
                .map(|r| RegulationContext {
                    citation: &r.citation,
                    text: r.excerpt(self.config.regulation_excerpt_chars),
                })
                .collect(),
        }
    }
}

/// Validate a model reply and turn it into an assessment.
///
/// The overall level is derived from the score so both paths share one set of
/// thresholds; a disagreeing model level is logged.
fn interpret_reply(reply: ModelReply, scene: &Scene<'_>, stats: &DetectionStats) -> Result<RiskAssessment, UpstreamError> {
    if !reply.risk_score.is_finite() {
        return Err(UpstreamError::malformed("llm", "risk_score is not a number"));
    }
    let risk_score = RiskScore::new(reply.risk_score.round() as i64)
        .ok_or_else(|| UpstreamError::malformed("llm", format!("risk_score {} outside [0, 100]", reply.risk_score)))?;
    let stated: AlertLevel = reply
        .alert_level
        .parse()
        .map_err(|e: String| UpstreamError::malformed("llm", e))?;

    let alert_level = AlertLevel::from_score(risk_score);
    if stated != alert_level {
        warn!(
            stated = %stated,
            derived = %alert_level,
            risk_score = risk_score.value(),
            "Model alert level disagrees with score thresholds, using thresholds"
        );
    }

    let violations = reply
        .violations
        .into_iter()
        .map(|v| {
            let severity: AlertLevel = v.severity.parse().map_err(|e: String| UpstreamError::malformed("llm", e))?;
            let time_span = stats.get(&v.kind).map(|s| TimeSpan {
                start_secs: s.first_seen_secs,
                end_secs: s.last_seen_secs,
            });
            Ok(Violation {
                kind: v.kind,
                confidence: if v.confidence.is_finite() { v.confidence.clamp(0.0, 1.0) } else { 0.0 },
                severity,
                reasoning: v.reasoning,
                time_span,
            })
        })
        .collect::<Result<Vec<_>, UpstreamError>>()?;

    Ok(RiskAssessment {
        risk_score,
        alert_level,
        violations,
        equipment_context: scene.equipment_context(),
        rationale: reply.reasoning,
        method: AssessmentMethod::Model,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BoundingBox;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replays a fixed reply (or failure) and records prompts.
    struct ScriptedModel {
        reply: Result<String, ()>,
        calls: AtomicUsize,
        last_user: Mutex<String>,
    }

    impl ScriptedModel {
        fn replying(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                calls: AtomicUsize::new(0),
                last_user: Mutex::new(String::new()),
            })
        }

        fn down() -> Arc<Self> {
            Arc::new(Self {
                reply: Err(()),
                calls: AtomicUsize::new(0),
                last_user: Mutex::new(String::new()),
            })
        }
    }

    #[async_trait]
    impl LlmBackend for ScriptedModel {
        async fn generate(&self, _system: &str, user: &str) -> Result<String, UpstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_user.lock().expect("lock") = user.to_string();
            self.reply
                .clone()
                .map_err(|_| UpstreamError::unavailable("llm", "connection refused"))
        }

        fn backend_name(&self) -> &str {
            "scripted"
        }
    }

    fn det(label: &str, confidence: f64, t: f64) -> Detection {
        Detection::new(label, confidence, BoundingBox::default()).in_frame(t as usize, t)
    }

    fn assessor(model: Arc<ScriptedModel>) -> RiskAssessor {
        RiskAssessor::new(model, ScoringConfig::default(), Duration::from_secs(5))
    }

    fn scenario() -> Vec<Detection> {
        vec![
            det("NO-Hardhat", 0.91, 0.0),
            det("NO-Safety Vest", 0.85, 1.0),
            det("Excavator", 0.78, 1.0),
            det("Sedan", 0.72, 2.0),
            det("Ladder", 0.65, 3.0),
        ]
    }

    #[tokio::test]
    async fn test_empty_detections_skip_model() {
        let model = ScriptedModel::replying("{}");
        let out = assessor(model.clone()).assess(&[], &[]).await;
        assert_eq!(out, RiskAssessment::zero());
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_fallback_formula() {
        let cases = [
            (0, 0, AlertLevel::Low),
            (1, 25, AlertLevel::Medium),
            (2, 50, AlertLevel::High),
            (3, 75, AlertLevel::Critical),
            (5, 100, AlertLevel::Critical),
        ];
        for (n, score, level) in cases {
            let a = rule_based_assessment(n, Vec::new());
            assert_eq!(a.risk_score.value(), score, "n={n}");
            assert_eq!(a.alert_level, level, "n={n}");
            assert!(a.violations.is_empty());
            assert_eq!(a.method, AssessmentMethod::RuleBased);
        }
    }

    #[tokio::test]
    async fn test_scenario_falls_back_to_fifty() {
        let model = ScriptedModel::down();
        let out = assessor(model.clone()).assess(&scenario(), &[]).await;

        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
        assert_eq!(out.risk_score.value(), 50);
        assert_eq!(out.alert_level, AlertLevel::High);
        assert!(out.violations.is_empty());
        assert_eq!(out.equipment_context, vec!["Excavator".to_string()]);
    }

    #[tokio::test]
    async fn test_model_path() {
        let reply = r#"```json
{
  "risk_score": 72,
  "alert_level": "HIGH",
  "violations": [
    {"type": "NO-Hardhat", "severity": "HIGH", "confidence": 0.91,
     "reasoning": "Worker without head protection near an operating excavator."},
    {"type": "NO-Safety Vest", "severity": "MEDIUM", "confidence": 0.85,
     "reasoning": "Low visibility near moving equipment."}
  ],
  "reasoning": "PPE violations in the swing radius of heavy machinery."
}
```"#;
        let model = ScriptedModel::replying(reply);
        let out = assessor(model).assess(&scenario(), &[]).await;

        assert_eq!(out.method, AssessmentMethod::Model);
        assert_eq!(out.risk_score.value(), 72);
        assert!((60..=80).contains(&out.risk_score.value()));
        assert_eq!(out.alert_level, AlertLevel::High);
        assert_eq!(out.violations.len(), 2);
        assert_eq!(out.violations[0].time_span, Some(TimeSpan { start_secs: 0.0, end_secs: 0.0 }));
        assert!(out.rationale.is_some());
    }

    #[tokio::test]
    async fn test_malformed_reply_falls_back() {
        for reply in [
            "The site looks dangerous.",
            r#"{"risk_score": 140, "alert_level": "CRITICAL"}"#,
            r#"{"risk_score": 40, "alert_level": "SEVERE"}"#,
            r#"{"risk_score": 40, "alert_level": "MEDIUM", "violations": [{"type": "NO-Mask", "severity": "??"}]}"#,
        ] {
            let out = assessor(ScriptedModel::replying(reply))
                .assess(&[det("NO-Mask", 0.9, 0.0)], &[])
                .await;
            assert_eq!(out.method, AssessmentMethod::RuleBased, "reply: {reply}");
            assert_eq!(out.risk_score.value(), 25);
            assert_eq!(out.alert_level, AlertLevel::Medium);
        }
    }

    #[tokio::test]
    async fn test_level_follows_thresholds() {
        let model = ScriptedModel::replying(r#"{"risk_score": 75, "alert_level": "HIGH"}"#);
        let out = assessor(model).assess(&[det("NO-Mask", 0.9, 0.0)], &[]).await;
        assert_eq!(out.alert_level, AlertLevel::Critical);
    }

    #[tokio::test]
    async fn test_context_truncates_regulations() {
        let model = ScriptedModel::replying(r#"{"risk_score": 40, "alert_level": "MEDIUM"}"#);
        let long = Regulation {
            citation: "1926.100".to_string(),
            text: "z".repeat(1000),
            source: "CAL_OSHA".to_string(),
        };
        assessor(model.clone())
            .assess(&[det("NO-Hardhat", 0.9, 0.0), det("Person", 0.8, 0.0)], &[long])
            .await;

        let user = model.last_user.lock().expect("lock").clone();
        let context: serde_json::Value = serde_json::from_str(&user).expect("context is JSON");
        assert_eq!(context["people_nearby"], 1);
        assert_eq!(context["violations"][0]["label"], "NO-Hardhat");
        assert_eq!(
            context["relevant_regulations"][0]["text"].as_str().map(str::len),
            Some(300)
        );
    }

    #[test]
    fn test_scene_drops_detections_below_floor() {
        let detections = vec![
            det("NO-Hardhat", 0.91, 0.0),
            det("NO-Mask", 0.40, 0.0),
            det("Excavator", 0.39, 1.0),
            det("Person", 0.60, 1.0),
        ];
        let scene = Scene::from_detections(&detections, 0.50);
        let labels: Vec<&str> = scene.violations.iter().map(|d| d.label.as_str()).collect();
        assert_eq!(labels, vec!["NO-Hardhat"]);
        assert!(scene.machinery.is_empty());
        assert_eq!(scene.people, 1);
    }

    #[tokio::test]
    async fn test_low_confidence_violations_do_not_score() {
        let mut config = ScoringConfig::default();
        config.min_confidence = 0.80;
        let assessor = RiskAssessor::new(ScriptedModel::down(), config, Duration::from_secs(5));
        // NO-Mask at 0.30 is below the floor
        let out = assessor
            .assess(&[det("NO-Hardhat", 0.91, 0.0), det("NO-Mask", 0.30, 0.0)], &[])
            .await;
        assert_eq!(out.risk_score.value(), 25);
    }

    #[tokio::test]
    async fn test_no_violations_model_unavailable() {
        let out = assessor(ScriptedModel::down())
            .assess(&[det("Person", 0.9, 0.0), det("Excavator", 0.9, 0.0)], &[])
            .await;
        assert_eq!(out.risk_score.value(), 0);
        assert_eq!(out.alert_level, AlertLevel::Low);
    }
}
