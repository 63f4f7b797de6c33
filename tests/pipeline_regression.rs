//! Pipeline Regression Tests
//!
//! Drives the full six-stage pipeline with in-process collaborators wired
//! through `Collaborators` + `SafetyPipeline::with_collaborators`. No network,
//! no ffmpeg: frames come from `StaticFrameSource`, reports go to a tempdir.

use async_trait::async_trait;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use sitewatch::alert::{AlertChannel, AlertMessage};
use sitewatch::config::{SiteConfig, VideoConfig};
use sitewatch::llm::LlmBackend;
use sitewatch::pipeline::{Collaborators, SafetyPipeline, Stage};
use sitewatch::report::{MarkdownReportRenderer, ReportInput, ReportRenderer};
use sitewatch::retrieval::{Embedder, PassagePayload, ScoredPassage, SparseVector, VectorIndex};
use sitewatch::vision::{FfmpegFrameSource, ObjectDetector, StaticFrameSource};
use sitewatch::{AlertLevel, AssessmentMethod, BoundingBox, Detection, Frame, PipelineError, UpstreamError};

// ============================================================================
// Collaborator doubles
// ============================================================================

/// Reports the site-walk scene on frame 0 and nothing afterwards.
struct SceneDetector {
    calls: AtomicUsize,
    cancel_on_call: Option<CancellationToken>,
}

impl SceneDetector {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            cancel_on_call: None,
        }
    }
}

#[async_trait]
impl ObjectDetector for SceneDetector {
    async fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(token) = &self.cancel_on_call {
            token.cancel();
        }
        if frame.index != 0 {
            return Ok(Vec::new());
        }
        Ok([
            ("NO-Hardhat", 0.91),
            ("NO-Safety Vest", 0.85),
            ("Excavator", 0.78),
            ("Sedan", 0.72),
            ("Ladder", 0.65),
        ]
        .into_iter()
        .map(|(label, conf)| Detection::new(label, conf, BoundingBox::new(10.0, 10.0, 50.0, 80.0)))
        .collect())
    }

    fn detector_name(&self) -> &str {
        "scene"
    }
}

struct FixedEmbedder;

#[async_trait]
impl Embedder for FixedEmbedder {
    async fn embed_dense(&self, _text: &str) -> Result<Vec<f32>, UpstreamError> {
        Ok(vec![0.1, 0.2, 0.3])
    }

    async fn embed_sparse(&self, _text: &str) -> Result<SparseVector, UpstreamError> {
        Ok(SparseVector {
            indices: vec![3, 17],
            values: vec![0.5, 0.25],
        })
    }
}

/// Same ranking from both signals, so hits fuse well above threshold.
struct CorpusIndex {
    searches: AtomicUsize,
    available: bool,
}

impl CorpusIndex {
    fn online() -> Self {
        Self {
            searches: AtomicUsize::new(0),
            available: true,
        }
    }

    fn offline() -> Self {
        Self {
            searches: AtomicUsize::new(0),
            available: false,
        }
    }

    fn hits(&self, limit: usize) -> Result<Vec<ScoredPassage>, UpstreamError> {
        if !self.available {
            return Err(UpstreamError::unavailable("vector_index", "connection refused"));
        }
        Ok([
            ("1", "Employees working in areas where there is a possible danger of head injury shall wear approved head protection.", Some("Title 8 Section 1538")),
            ("2", "Employees exposed to vehicular traffic shall wear high-visibility safety apparel.", Some("Title 8 Section 1599")),
            ("3", "Ladders shall be maintained in good condition at all times.", None),
        ]
        .into_iter()
        .take(limit)
        .map(|(id, text, source)| ScoredPassage {
            id: id.to_string(),
            score: 0.8,
            payload: PassagePayload {
                text: text.to_string(),
                source: source.map(str::to_string),
                page: None,
            },
        })
        .collect())
    }
}

#[async_trait]
impl VectorIndex for CorpusIndex {
    async fn dense_search(&self, _vector: &[f32], limit: usize) -> Result<Vec<ScoredPassage>, UpstreamError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        self.hits(limit)
    }

    async fn sparse_search(&self, _vector: &SparseVector, limit: usize) -> Result<Vec<ScoredPassage>, UpstreamError> {
        self.hits(limit)
    }

    fn index_name(&self) -> &str {
        "corpus"
    }
}

/// Language model double: either unreachable, or answering scoring and
/// narrative requests with canned replies.
struct ScriptedModel {
    scoring_reply: Option<&'static str>,
}

#[async_trait]
impl LlmBackend for ScriptedModel {
    async fn generate(&self, system: &str, _user: &str) -> Result<String, UpstreamError> {
        let Some(scoring) = self.scoring_reply else {
            return Err(UpstreamError::unavailable("llm", "connection refused"));
        };
        if system.contains("risk_score") {
            Ok(scoring.to_string())
        } else {
            Ok("## Executive Summary\nTwo PPE violations near an excavator.".to_string())
        }
    }

    fn backend_name(&self) -> &str {
        "scripted"
    }
}

const MODEL_SCORE: &str = r#"{
  "risk_score": 72,
  "alert_level": "HIGH",
  "violations": [
    {"type": "NO-Hardhat", "severity": "HIGH", "confidence": 0.91,
     "reasoning": "No head protection inside the excavator swing radius."},
    {"type": "NO-Safety Vest", "severity": "MEDIUM", "confidence": 0.85,
     "reasoning": "Low visibility to the machine operator."}
  ],
  "reasoning": "PPE violations next to operating heavy machinery."
}"#;

struct RecordingChannel {
    name: &'static str,
    healthy: bool,
    sent: Mutex<Vec<AlertMessage>>,
}

impl RecordingChannel {
    fn new(name: &'static str, healthy: bool) -> Self {
        Self {
            name,
            healthy,
            sent: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl AlertChannel for RecordingChannel {
    async fn send(&self, message: &AlertMessage) -> Result<(), UpstreamError> {
        if !self.healthy {
            return Err(UpstreamError::Rejected {
                service: "alert",
                status: 500,
            });
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }

    fn channel_name(&self) -> &str {
        self.name
    }
}

struct BrokenRenderer;

#[async_trait]
impl ReportRenderer for BrokenRenderer {
    async fn render(&self, _input: &ReportInput<'_>) -> std::io::Result<PathBuf> {
        Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only volume"))
    }

    fn renderer_name(&self) -> &str {
        "broken"
    }
}

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    collaborators: Collaborators,
    detector: Arc<SceneDetector>,
    index: Arc<CorpusIndex>,
    slack: Arc<RecordingChannel>,
    reports: tempfile::TempDir,
}

impl Harness {
    fn new() -> Self {
        let reports = tempfile::tempdir().unwrap();
        let detector = Arc::new(SceneDetector::new());
        let index = Arc::new(CorpusIndex::online());
        let slack = Arc::new(RecordingChannel::new("slack", true));

        let collaborators = Collaborators {
            frame_source: Arc::new(StaticFrameSource::with_blank_frames(3)),
            detector: detector.clone(),
            embedder: Arc::new(FixedEmbedder),
            index: index.clone(),
            model: Arc::new(ScriptedModel { scoring_reply: None }),
            renderer: Arc::new(MarkdownReportRenderer::new(reports.path())),
            alert_channels: vec![slack.clone() as Arc<dyn AlertChannel>],
        };

        Self {
            collaborators,
            detector,
            index,
            slack,
            reports,
        }
    }

    fn with_index(mut self, index: CorpusIndex) -> Self {
        let index = Arc::new(index);
        self.collaborators.index = index.clone();
        self.index = index;
        self
    }

    fn with_model_reply(mut self, reply: &'static str) -> Self {
        self.collaborators.model = Arc::new(ScriptedModel {
            scoring_reply: Some(reply),
        });
        self
    }

    fn pipeline(&self) -> SafetyPipeline {
        SafetyPipeline::with_collaborators(self.collaborators.clone(), &SiteConfig::default())
    }
}

// ============================================================================
// Tests
// ============================================================================

/// Model offline: fallback scoring, template narrative, report and alert
/// still produced.
#[tokio::test]
async fn test_site_walk_with_model_offline() {
    let harness = Harness::new();
    let state = harness.pipeline().run("data/input/site_walk.mp4").await.unwrap();

    assert_eq!(state.frames.len(), 3);
    assert_eq!(harness.detector.calls.load(Ordering::SeqCst), 3);
    assert_eq!(state.detections.len(), 5);

    // Sedan is skipped; the other four labels each issue one query
    assert_eq!(harness.index.searches.load(Ordering::SeqCst), 4);
    let stats = state.retrieval_stats.clone().unwrap();
    assert_eq!(stats.skipped_low_tier, 1);
    assert_eq!(stats.queries_issued, 4);

    // three distinct passages survive cross-query dedup
    assert_eq!(state.regulations.len(), 3);
    assert_eq!(state.regulations[0].citation, "Title 8 Section 1538");
    assert_eq!(state.regulations[2].citation, "Unknown");
    assert!(state.regulations.iter().all(|r| r.source == "CAL_OSHA"));

    // two violation detections: min(25 * 2, 100) = 50, which is HIGH
    let a = state.assessment();
    assert_eq!(a.method, AssessmentMethod::RuleBased);
    assert_eq!(a.risk_score.value(), 50);
    assert_eq!(a.alert_level, AlertLevel::High);
    assert_eq!(a.equipment_context, vec!["Excavator".to_string()]);

    let report = state.final_report.clone().unwrap();
    let report_name = format!("site_walk_{}_report.md", state.run_id);
    assert_eq!(report, harness.reports.path().join(&report_name));
    let body = std::fs::read_to_string(&report).unwrap();
    assert!(body.contains("Safety analysis for site_walk detected"));
    assert!(body.contains("risk score 50/100"));

    assert_eq!(state.alerts_sent, vec!["slack".to_string()]);
    let sent = harness.slack.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "[HIGH] Construction Safety Alert - Risk Score: 50");
    assert!(sent[0].body.contains(&report_name));
}

#[tokio::test]
async fn test_site_walk_with_model_online() {
    let harness = Harness::new().with_model_reply(MODEL_SCORE);
    let state = harness.pipeline().run("site_walk.mp4").await.unwrap();

    let a = state.assessment();
    assert_eq!(a.method, AssessmentMethod::Model);
    assert!((60..=80).contains(&a.risk_score.value()));
    assert_eq!(a.alert_level, AlertLevel::High);
    assert_eq!(a.violations.len(), 2);

    let body = std::fs::read_to_string(state.final_report.unwrap()).unwrap();
    assert!(body.contains("Two PPE violations near an excavator."));
}

#[tokio::test]
async fn test_retrieval_outage_continues_without_regulations() {
    let harness = Harness::new().with_index(CorpusIndex::offline());
    let state = harness.pipeline().run("site_walk.mp4").await.unwrap();

    assert!(state.regulations.is_empty());
    assert!(state.retrieval_stats.is_none());
    assert_eq!(state.assessment().risk_score.value(), 50);
    assert!(state.final_report.is_some());
    assert_eq!(state.alerts_sent, vec!["slack".to_string()]);
}

#[tokio::test]
async fn test_report_failure_still_alerts() {
    let mut harness = Harness::new();
    harness.collaborators.renderer = Arc::new(BrokenRenderer);
    let state = harness.pipeline().run("site_walk.mp4").await.unwrap();

    assert!(state.final_report.is_none());
    assert_eq!(state.alerts_sent, vec!["slack".to_string()]);
    let sent = harness.slack.sent.lock().unwrap();
    assert!(!sent[0].body.contains("Report:"));
}

#[tokio::test]
async fn test_failed_alert_channel_is_omitted() {
    let mut harness = Harness::new();
    let down = Arc::new(RecordingChannel::new("webhook", false));
    harness.collaborators.alert_channels.push(down);
    let state = harness.pipeline().run("site_walk.mp4").await.unwrap();

    assert_eq!(state.alerts_sent, vec!["slack".to_string()]);
}

#[tokio::test]
async fn test_unreadable_video_ends_the_run() {
    let mut harness = Harness::new();
    harness.collaborators.frame_source = Arc::new(FfmpegFrameSource::new(VideoConfig::default()));
    let result = harness.pipeline().run("/definitely/not/here.mp4").await;

    assert!(matches!(result, Err(PipelineError::VideoUnreadable { .. })));
    assert_eq!(harness.detector.calls.load(Ordering::SeqCst), 0);
    assert!(harness.slack.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_video_yields_zero_assessment() {
    let mut harness = Harness::new();
    harness.collaborators.frame_source = Arc::new(StaticFrameSource::new(Vec::new()));
    let state = harness.pipeline().run("empty.mp4").await.unwrap();

    assert!(state.detections.is_empty());
    assert!(state.regulations.is_empty());
    let a = state.assessment();
    assert_eq!(a.risk_score.value(), 0);
    assert_eq!(a.alert_level, AlertLevel::Low);
    assert_eq!(a.method, AssessmentMethod::NoDetections);
    assert_eq!(harness.index.searches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_stream_yields_every_stage_in_order() {
    let harness = Harness::new();
    let pipeline = Arc::new(harness.pipeline());
    let updates: Vec<_> = pipeline.stream("site_walk.mp4").collect().await;

    let stages: Vec<Stage> = updates.iter().map(|u| u.as_ref().unwrap().stage).collect();
    assert_eq!(stages, Stage::ALL.to_vec());

    let run_id = updates[0].as_ref().unwrap().run_id;
    assert!(updates.iter().all(|u| u.as_ref().unwrap().run_id == run_id));

    let assess = updates[3].as_ref().unwrap();
    assert_eq!(assess.delta.risk_assessment.as_ref().unwrap().risk_score.value(), 50);
}

#[tokio::test]
async fn test_stream_stops_after_fatal_error() {
    let mut harness = Harness::new();
    harness.collaborators.frame_source = Arc::new(FfmpegFrameSource::new(VideoConfig::default()));
    let pipeline = Arc::new(harness.pipeline());
    let updates: Vec<_> = pipeline.stream("/definitely/not/here.mp4").collect().await;

    assert_eq!(updates.len(), 1);
    assert!(matches!(updates[0], Err(PipelineError::VideoUnreadable { .. })));
}

#[tokio::test]
async fn test_cancel_before_start() {
    let harness = Harness::new();
    let token = CancellationToken::new();
    token.cancel();

    let result = harness.pipeline().run_with_cancel("site_walk.mp4", &token).await;
    assert!(matches!(result, Err(PipelineError::Cancelled { after: "start" })));
    assert_eq!(harness.detector.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cancel_at_stage_boundary() {
    let mut harness = Harness::new();
    let token = CancellationToken::new();
    let detector = Arc::new(SceneDetector {
        calls: AtomicUsize::new(0),
        cancel_on_call: Some(token.clone()),
    });
    harness.collaborators.detector = detector;

    let result = harness.pipeline().run_with_cancel("site_walk.mp4", &token).await;
    assert!(matches!(result, Err(PipelineError::Cancelled { after: "detect_objects" })));
    assert_eq!(harness.index.searches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_concurrent_runs_share_nothing() {
    let harness = Harness::new();
    let pipeline = Arc::new(harness.pipeline());

    let (a, b) = tokio::join!(pipeline.run("a.mp4"), pipeline.run("b.mp4"));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_ne!(a.run_id, b.run_id);
    assert_eq!(a.regulations.len(), b.regulations.len());
    assert_eq!(a.detections.len(), 5);
    assert_eq!(b.detections.len(), 5);
    assert!(harness.reports.path().join(format!("a_{}_report.md", a.run_id)).exists());
    assert!(harness.reports.path().join(format!("b_{}_report.md", b.run_id)).exists());
}

/// Two videos with the same stem, run at the same time, keep separate reports.
#[tokio::test]
async fn test_same_stem_runs_keep_separate_reports() {
    let harness = Harness::new();
    let pipeline = Arc::new(harness.pipeline());

    let (north, south) = tokio::join!(pipeline.run("north/site.mp4"), pipeline.run("south/site.mp4"));
    let (north, south) = (north.unwrap(), south.unwrap());

    let north_report = north.final_report.clone().unwrap();
    let south_report = south.final_report.clone().unwrap();
    assert_ne!(north_report, south_report);
    assert_eq!(north.summary().final_report.as_deref(), Some(north_report.as_path()));

    let north_body = std::fs::read_to_string(&north_report).unwrap();
    let south_body = std::fs::read_to_string(&south_report).unwrap();
    assert!(north_body.contains("**Source:** north/site.mp4"));
    assert!(north_body.contains(&north.run_id.to_string()));
    assert!(south_body.contains("**Source:** south/site.mp4"));
    assert!(south_body.contains(&south.run_id.to_string()));

    let written = std::fs::read_dir(harness.reports.path()).unwrap().count();
    assert_eq!(written, 2);
}
