//! Safety report generation
//!
//! [`ReportGenerator`] writes the narrative (model or template) and hands the
//! finished run to a [`ReportRenderer`] for persistence.

pub mod narrative;
pub mod renderer;

pub use narrative::{template_narrative, NarrativeSource, Narrator, REPORT_SYSTEM_PROMPT};
pub use renderer::{video_id, MarkdownReportRenderer, ReportInput, ReportRenderer};

use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::types::{DetectionStats, Regulation, RiskAssessment};

pub struct ReportGenerator {
    narrator: Narrator,
    renderer: Arc<dyn ReportRenderer>,
}

impl ReportGenerator {
    pub fn new(narrator: Narrator, renderer: Arc<dyn ReportRenderer>) -> Self {
        Self { narrator, renderer }
    }

    /// Write the report for run `run_id` and return its path.
    pub async fn generate(
        &self,
        run_id: Uuid,
        video: &str,
        assessment: &RiskAssessment,
        regulations: &[Regulation],
        stats: &DetectionStats,
    ) -> std::io::Result<PathBuf> {
        let id = video_id(video);
        let (narrative, source) = self.narrator.write(&id, assessment, regulations).await;
        debug!(video_id = %id, source = ?source, renderer = self.renderer.renderer_name(), "Rendering report");

        let input = ReportInput {
            run_id,
            video_id: &id,
            video_path: video,
            assessment,
            regulations,
            stats,
            narrative: &narrative,
            generated_at: Utc::now(),
        };
        self.renderer.render(&input).await
    }
}
