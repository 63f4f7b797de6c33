//! Narrative generation for safety reports
//!
//! The model writes the narrative when it can; otherwise a deterministic
//! template covers the same four sections.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::error::bounded;
use crate::llm::LlmBackend;
use crate::types::{RiskAssessment, Regulation};

pub const REPORT_SYSTEM_PROMPT: &str = "You are a construction site safety expert writing an incident report.
Based on the safety data provided, write a clear professional report with the following sections:

1. Executive Summary - brief overview of what was found
2. Violations Found - describe each violation and why it is dangerous
3. Applicable Regulations - summarize the relevant OSHA rules that were violated
4. Recommended Actions - what should be done to fix the issues

Use plain professional language. Include headings for each section.";

#[derive(Debug, Serialize)]
struct ViolationSummary<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    severity: &'a str,
    confidence: String,
    duration: String,
}

#[derive(Debug, Serialize)]
struct RegulationSummary<'a> {
    citation: &'a str,
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct NarrativeContext<'a> {
    video_id: &'a str,
    risk_score: u8,
    alert_level: &'a str,
    violations: Vec<ViolationSummary<'a>>,
    equipment: &'a [String],
    regulations: Vec<RegulationSummary<'a>>,
}

/// Where a narrative came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NarrativeSource {
    Model,
    Template,
}

pub struct Narrator {
    model: Arc<dyn LlmBackend>,
    timeout: Duration,
}

impl Narrator {
    pub fn new(model: Arc<dyn LlmBackend>, timeout: Duration) -> Self {
        Self { model, timeout }
    }

    /// Model-written narrative, or the template on any failure.
    pub async fn write(
        &self,
        video_id: &str,
        assessment: &RiskAssessment,
        regulations: &[Regulation],
    ) -> (String, NarrativeSource) {
        let context = NarrativeContext {
            video_id,
            risk_score: assessment.risk_score.value(),
            alert_level: assessment.alert_level.as_str(),
            violations: assessment
                .violations
                .iter()
                .map(|v| ViolationSummary {
                    kind: &v.kind,
                    severity: v.severity.as_str(),
                    confidence: format!("{:.1}%", v.confidence * 100.0),
                    duration: format!("{:.1}s", v.duration_secs()),
                })
                .collect(),
            equipment: &assessment.equipment_context,
            regulations: regulations
                .iter()
                .map(|r| RegulationSummary {
                    citation: &r.citation,
                    text: &r.text,
                })
                .collect(),
        };

        let user = match serde_json::to_string_pretty(&context) {
            Ok(user) => user,
            Err(e) => {
                warn!(error = %e, "Could not serialise report context, using template");
                return (template_narrative(video_id, assessment, regulations), NarrativeSource::Template);
            }
        };

        match bounded("llm", self.timeout, self.model.generate(REPORT_SYSTEM_PROMPT, &user)).await {
            Ok(text) if !text.trim().is_empty() => (text, NarrativeSource::Model),
            Ok(_) => {
                warn!("Model returned an empty narrative, using template");
                (template_narrative(video_id, assessment, regulations), NarrativeSource::Template)
            }
            Err(e) => {
                warn!(service = e.service(), error = %e, "Narrative generation failed, using template");
                (template_narrative(video_id, assessment, regulations), NarrativeSource::Template)
            }
        }
    }
}

/// Deterministic narrative from structured data.
///
/// Produces sections: Executive Summary, Violations Found, Applicable
/// Regulations, and Recommended Actions.
pub fn template_narrative(video_id: &str, assessment: &RiskAssessment, regulations: &[Regulation]) -> String {
    let mut sections = Vec::new();

    // 1. Executive Summary
    let mut summary = format!(
        "## Executive Summary\n\n\
         Safety analysis for {} detected {} violation(s) with risk score {}/100 ({}).",
        video_id,
        assessment.violations.len(),
        assessment.risk_score,
        assessment.alert_level,
    );
    if !assessment.equipment_context.is_empty() {
        summary.push_str(&format!(
            " Heavy equipment on site: {}.",
            assessment.equipment_context.join(", ")
        ));
    }
    sections.push(summary);

    // 2. Violations Found
    if assessment.violations.is_empty() {
        sections.push("## Violations Found\n\nNo individual violations were itemised for this run.".to_string());
    } else {
        let mut lines = vec!["## Violations Found\n".to_string()];
        for v in &assessment.violations {
            let mut line = format!(
                "- **{}** ({}): confidence {:.1}%, observed for {:.1}s.",
                v.kind,
                v.severity,
                v.confidence * 100.0,
                v.duration_secs(),
            );
            if let Some(reason) = &v.reasoning {
                line.push(' ');
                line.push_str(reason);
            }
            lines.push(line);
        }
        sections.push(lines.join("\n"));
    }

    // 3. Applicable Regulations
    if !regulations.is_empty() {
        let mut lines = vec!["## Applicable Regulations\n".to_string()];
        for r in regulations {
            lines.push(format!("- **{}**: {}", r.citation, r.excerpt(200).trim()));
        }
        sections.push(lines.join("\n"));
    }

    // 4. Recommended Actions
    let mut actions = vec!["## Recommended Actions\n".to_string()];
    for v in &assessment.violations {
        actions.push(format!("- {}", recommended_action(&v.kind)));
    }
    if !assessment.equipment_context.is_empty() && !assessment.violations.is_empty() {
        actions.push("- Keep workers without full PPE out of heavy equipment swing and travel zones.".to_string());
    }
    if actions.len() == 1 {
        actions.push("- Continue routine site monitoring.".to_string());
    }
    actions.dedup();
    sections.push(actions.join("\n"));

    sections.join("\n\n")
}

fn recommended_action(label: &str) -> &'static str {
    match label {
        "NO-Hardhat" => "Require approved head protection for every worker before site entry.",
        "NO-Mask" => "Issue respiratory protection where airborne contaminants are present.",
        "NO-Safety Vest" => "Enforce high-visibility apparel near vehicle and equipment traffic.",
        _ => "Review the observed condition with the site safety officer.",
    }
}
