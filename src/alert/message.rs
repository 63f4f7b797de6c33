//! Alert message formatting

use serde::Serialize;
use std::path::Path;

use crate::types::{AlertLevel, RiskAssessment};

/// Subject + body pair handed to every channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertMessage {
    pub subject: String,
    pub body: String,
    pub alert_level: AlertLevel,
    pub risk_score: u8,
}

pub fn build_alert_message(risk: &RiskAssessment, report_path: Option<&Path>) -> AlertMessage {
    let subject = format!(
        "[{}] Construction Safety Alert - Risk Score: {}",
        risk.alert_level, risk.risk_score
    );

    let violations = if risk.violations.is_empty() {
        "None".to_string()
    } else {
        risk.violations
            .iter()
            .map(|v| {
                format!(
                    "- {} (confidence: {:.0}%, duration: {:.1}s)",
                    v.kind,
                    v.confidence * 100.0,
                    v.duration_secs()
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };
    let equipment = if risk.equipment_context.is_empty() {
        "N/A".to_string()
    } else {
        risk.equipment_context.join(", ")
    };

    let mut body = format!(
        "Construction Safety Alert\n\
         =========================\n\
         Alert Level : {}\n\
         Risk Score  : {}/100\n\
         \n\
         Violations Detected:\n\
         {}\n\
         \n\
         Equipment Context: {}",
        risk.alert_level, risk.risk_score, violations, equipment
    );
    if let Some(path) = report_path {
        body.push_str(&format!("\nReport: {}", path.display()));
    }

    AlertMessage {
        subject,
        body,
        alert_level: risk.alert_level,
        risk_score: risk.risk_score.value(),
    }
}
