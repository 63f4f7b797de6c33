//! Report persistence
//!
//! A [`ReportRenderer`] turns a finished run into a file on disk and hands
//! back its path. The pipeline does not look inside the artifact.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::info;
use uuid::Uuid;

use crate::types::{DetectionStats, Regulation, RiskAssessment};

/// Everything a renderer may draw on.
#[derive(Debug, Clone, Copy)]
pub struct ReportInput<'a> {
    pub run_id: Uuid,
    pub video_id: &'a str,
    pub video_path: &'a str,
    pub assessment: &'a RiskAssessment,
    pub regulations: &'a [Regulation],
    pub stats: &'a DetectionStats,
    pub narrative: &'a str,
    pub generated_at: DateTime<Utc>,
}

#[async_trait]
pub trait ReportRenderer: Send + Sync {
    /// Persist the report and return where it was written.
    async fn render(&self, input: &ReportInput<'_>) -> std::io::Result<PathBuf>;

    fn renderer_name(&self) -> &str;
}

/// Writes `{reports_dir}/{video_id}_{run_id}_report.md`, one file per run.
/// An existing file is never overwritten.
pub struct MarkdownReportRenderer {
    reports_dir: PathBuf,
}

impl MarkdownReportRenderer {
    pub fn new(reports_dir: impl Into<PathBuf>) -> Self {
        Self {
            reports_dir: reports_dir.into(),
        }
    }

    pub fn report_path(&self, video_id: &str, run_id: Uuid) -> PathBuf {
        self.reports_dir.join(format!("{video_id}_{run_id}_report.md"))
    }

    pub fn render_markdown(input: &ReportInput<'_>) -> String {
        let a = input.assessment;
        let mut doc = String::new();

        // writes to a String cannot fail
        let _ = writeln!(doc, "# Construction Site Safety Report\n");
        let _ = writeln!(doc, "**Video ID:** {}  ", input.video_id);
        let _ = writeln!(doc, "**Source:** {}  ", input.video_path);
        let _ = writeln!(doc, "**Run ID:** {}  ", input.run_id);
        let _ = writeln!(doc, "**Generated:** {}\n", input.generated_at.format("%B %d, %Y %H:%M:%S UTC"));
        let _ = writeln!(doc, "| Risk Score | Alert Level |");
        let _ = writeln!(doc, "|---|---|");
        let _ = writeln!(doc, "| {}/100 | {} |\n", a.risk_score, a.alert_level);

        let _ = writeln!(doc, "{}\n", input.narrative.trim());

        let _ = writeln!(doc, "## Detection Statistics\n");
        if input.stats.labels.is_empty() {
            let _ = writeln!(doc, "No objects were detected.\n");
        } else {
            let _ = writeln!(doc, "| Label | Count | Max Confidence | Mean Confidence | First Seen | Last Seen |");
            let _ = writeln!(doc, "|---|---|---|---|---|---|");
            for s in &input.stats.labels {
                let _ = writeln!(
                    doc,
                    "| {} | {} | {:.1}% | {:.1}% | {:.1}s | {:.1}s |",
                    s.label,
                    s.count,
                    s.max_confidence * 100.0,
                    s.mean_confidence * 100.0,
                    s.first_seen_secs,
                    s.last_seen_secs,
                );
            }
            let _ = writeln!(doc);
        }

        if !input.regulations.is_empty() {
            let _ = writeln!(doc, "## Regulation Citations\n");
            for (i, r) in input.regulations.iter().enumerate() {
                let _ = writeln!(doc, "{}. **{}** ({}): {}", i + 1, r.citation, r.source, r.excerpt(300).trim());
            }
        }
        doc
    }
}

#[async_trait]
impl ReportRenderer for MarkdownReportRenderer {
    async fn render(&self, input: &ReportInput<'_>) -> std::io::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.reports_dir).await?;
        let path = self.report_path(input.video_id, input.run_id);
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        file.write_all(Self::render_markdown(input).as_bytes()).await?;
        file.flush().await?;
        info!(path = %path.display(), run_id = %input.run_id, "Report saved");
        Ok(path)
    }

    fn renderer_name(&self) -> &str {
        "markdown"
    }
}

/// Stem of a video reference, used as its report id.
pub fn video_id(video: &str) -> String {
    Path::new(video)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "video".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BoundingBox, Detection};

    fn blank_input<'a>(
        run_id: Uuid,
        video_path: &'a str,
        assessment: &'a RiskAssessment,
        stats: &'a DetectionStats,
    ) -> ReportInput<'a> {
        ReportInput {
            run_id,
            video_id: "site",
            video_path,
            assessment,
            regulations: &[],
            stats,
            narrative: "No findings.",
            generated_at: Utc::now(),
        }
    }

    #[test]
    fn test_video_id() {
        assert_eq!(video_id("/data/input/site_cam_03.mp4"), "site_cam_03");
        assert_eq!(video_id("clip"), "clip");
        assert_eq!(video_id(""), "video");
    }

    #[tokio::test]
    async fn test_render_writes_markdown() {
        let dir = tempfile::tempdir().expect("tempdir");
        let renderer = MarkdownReportRenderer::new(dir.path().join("reports"));

        let detections = vec![Detection::new("NO-Hardhat", 0.9, BoundingBox::default()).in_frame(0, 0.0)];
        let stats = DetectionStats::from_detections(&detections);
        let regulations = vec![Regulation {
            citation: "1926.100(a)".to_string(),
            text: "Employees working in areas where there is a possible danger of head injury shall be protected."
                .to_string(),
            source: "CAL_OSHA".to_string(),
        }];
        let assessment = RiskAssessment::zero();
        let run_id = Uuid::new_v4();
        let input = ReportInput {
            run_id,
            video_id: "site_cam_03",
            video_path: "/data/input/site_cam_03.mp4",
            assessment: &assessment,
            regulations: &regulations,
            stats: &stats,
            narrative: "## Executive Summary\n\nNothing of note.",
            generated_at: Utc::now(),
        };

        let path = renderer.render(&input).await.expect("render");
        assert!(path.ends_with(format!("site_cam_03_{run_id}_report.md")));

        let body = std::fs::read_to_string(&path).expect("report exists");
        assert!(body.contains("# Construction Site Safety Report"));
        assert!(body.contains(&format!("**Run ID:** {run_id}")));
        assert!(body.contains("| 0/100 | LOW |"));
        assert!(body.contains("| NO-Hardhat | 1 | 90.0%"));
        assert!(body.contains("1. **1926.100(a)** (CAL_OSHA)"));
    }

    #[tokio::test]
    async fn test_same_stem_runs_get_separate_reports() {
        let dir = tempfile::tempdir().expect("tempdir");
        let renderer = MarkdownReportRenderer::new(dir.path());
        let assessment = RiskAssessment::zero();
        let stats = DetectionStats::default();

        let first = blank_input(Uuid::new_v4(), "north/site.mp4", &assessment, &stats);
        let second = blank_input(Uuid::new_v4(), "south/site.mp4", &assessment, &stats);
        let first_path = renderer.render(&first).await.expect("first");
        let second_path = renderer.render(&second).await.expect("second");

        assert_ne!(first_path, second_path);
        let first_body = std::fs::read_to_string(&first_path).expect("first report");
        let second_body = std::fs::read_to_string(&second_path).expect("second report");
        assert!(first_body.contains("**Source:** north/site.mp4"));
        assert!(second_body.contains("**Source:** south/site.mp4"));
    }

    #[tokio::test]
    async fn test_existing_report_is_not_overwritten() {
        let dir = tempfile::tempdir().expect("tempdir");
        let renderer = MarkdownReportRenderer::new(dir.path());
        let assessment = RiskAssessment::zero();
        let stats = DetectionStats::default();
        let input = blank_input(Uuid::new_v4(), "site.mp4", &assessment, &stats);

        let path = renderer.render(&input).await.expect("first render");
        let err = renderer.render(&input).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::AlreadyExists);
        assert!(std::fs::read_to_string(&path).expect("kept").contains("No findings."));
    }
}
