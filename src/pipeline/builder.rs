//! Pipeline assembly from configuration
//!
//! Live collaborators are only built after `require_credentials` passes, so a
//! misconfigured deployment fails at startup instead of degrading every run.

use std::sync::Arc;

use crate::alert::{channels_from_config, AlertChannel, AlertDispatcher};
use crate::config::{ConfigError, SiteConfig};
use crate::error::{PipelineError, UpstreamError};
use crate::llm::{LlmBackend, MessagesApiBackend};
use crate::report::{MarkdownReportRenderer, Narrator, ReportGenerator, ReportRenderer};
use crate::retrieval::{Embedder, HybridRetriever, QdrantIndex, TeiEmbedder, VectorIndex};
use crate::risk::RiskAssessor;
use crate::vision::{FfmpegFrameSource, FrameSource, ObjectDetector, RoboflowDetector};

use super::coordinator::{DetectionSettings, SafetyPipeline};

/// Every external collaborator a pipeline needs.
#[derive(Clone)]
pub struct Collaborators {
    pub frame_source: Arc<dyn FrameSource>,
    pub detector: Arc<dyn ObjectDetector>,
    pub embedder: Arc<dyn Embedder>,
    pub index: Arc<dyn VectorIndex>,
    pub model: Arc<dyn LlmBackend>,
    pub renderer: Arc<dyn ReportRenderer>,
    pub alert_channels: Vec<Arc<dyn AlertChannel>>,
}

impl Collaborators {
    /// Production collaborators (ffmpeg, Roboflow, TEI, Qdrant, Messages API,
    /// Markdown reports, webhooks).
    pub fn live(config: &SiteConfig) -> Result<Self, PipelineError> {
        config.require_credentials()?;

        Ok(Self {
            frame_source: Arc::new(FfmpegFrameSource::new(config.video.clone())),
            detector: Arc::new(RoboflowDetector::new(&config.detector).map_err(startup)?),
            embedder: Arc::new(TeiEmbedder::new(&config.embeddings).map_err(startup)?),
            index: Arc::new(QdrantIndex::new(&config.vector_index).map_err(startup)?),
            model: Arc::new(MessagesApiBackend::new(&config.model).map_err(startup)?),
            renderer: Arc::new(MarkdownReportRenderer::new(config.paths.reports_dir.clone())),
            alert_channels: channels_from_config(&config.alerts).map_err(startup)?,
        })
    }
}

fn startup(err: UpstreamError) -> PipelineError {
    PipelineError::Configuration(ConfigError::Validation(vec![err.to_string()]))
}

impl SafetyPipeline {
    /// Wire collaborators with the tuning from `config`. The one model client
    /// is shared by scoring and narration.
    pub fn with_collaborators(collaborators: Collaborators, config: &SiteConfig) -> Self {
        let Collaborators {
            frame_source,
            detector,
            embedder,
            index,
            model,
            renderer,
            alert_channels,
        } = collaborators;

        let retriever = HybridRetriever::new(embedder, index, config.retrieval.clone());
        let assessor = RiskAssessor::new(Arc::clone(&model), config.scoring.clone(), config.model.timeout());
        let reporter = ReportGenerator::new(Narrator::new(model, config.model.timeout()), renderer);
        let alerts = AlertDispatcher::new(alert_channels, config.alerts.min_level, config.alerts.timeout());

        SafetyPipeline::new(
            frame_source,
            detector,
            DetectionSettings {
                max_concurrent_frames: config.detector.max_concurrent_frames,
                timeout: config.detector.timeout(),
            },
            retriever,
            assessor,
            reporter,
            alerts,
        )
    }

    /// Validate `config`, build live collaborators, and wire the pipeline.
    pub fn from_config(config: &SiteConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self::with_collaborators(Collaborators::live(config)?, config))
    }
}
