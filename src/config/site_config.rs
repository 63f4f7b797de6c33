//! Site Configuration - every pipeline tunable as a TOML value
//!
//! Each struct implements `Default` with the production constants from
//! [`super::defaults`], so a deployment without a config file behaves
//! identically to one that spells every value out.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use super::defaults;

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for a SiteWatch deployment.
///
/// Load with `SiteConfig::load()` which searches:
/// 1. `$SITEWATCH_CONFIG` env var
/// 2. `./sitewatch.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SiteConfig {
    #[serde(default)]
    pub project: ProjectConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub video: VideoConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,
    #[serde(default)]
    pub vector_index: VectorIndexConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl SiteConfig {
    /// Load configuration using the standard search order, then apply
    /// environment overrides.
    pub fn load() -> Self {
        let mut config = Self::load_file_or_default();
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    fn load_file_or_default() -> Self {
        // 1. Check env var
        if let Ok(path) = std::env::var("SITEWATCH_CONFIG") {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded site config from SITEWATCH_CONFIG");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from SITEWATCH_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "SITEWATCH_CONFIG points to non-existent file, falling back");
            }
        }

        // 2. Check ./sitewatch.toml
        let local = PathBuf::from("sitewatch.toml");
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded site config from ./sitewatch.toml");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./sitewatch.toml, using defaults");
                }
            }
        }

        // 3. Defaults
        info!("No sitewatch.toml found, using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config: Self = toml::from_str(&contents)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Apply environment overrides. `lookup` is injected so tests don't
    /// touch the process environment.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = non_empty("PROJECT_NAME") {
            self.project.name = v;
        }
        if let Some(v) = non_empty("LOG_LEVEL") {
            self.project.log_level = v.to_lowercase();
        }

        if let Some(v) = non_empty("ROBOFLOW_API_KEY") {
            self.detector.api_key = Some(v);
        }
        if let Some(v) = non_empty("ROBOFLOW_PROJECT") {
            self.detector.project = v;
        }
        if let Some(v) = non_empty("ROBOFLOW_VERSION") {
            self.detector.version = v;
        }

        if let Some(v) = non_empty("EMBEDDINGS_URL") {
            self.embeddings.dense_url = v.clone();
            self.embeddings.sparse_url = v;
        }
        if let Some(v) = non_empty("SPARSE_EMBEDDINGS_URL") {
            self.embeddings.sparse_url = v;
        }

        if let Some(v) = non_empty("QDRANT_URL") {
            self.vector_index.url = v;
        } else if let Some(host) = non_empty("QDRANT_HOST") {
            let port = non_empty("QDRANT_PORT").unwrap_or_else(|| "6333".to_string());
            self.vector_index.url = format!("http://{host}:{port}");
        }
        if let Some(v) = non_empty("QDRANT_COLLECTION_NAME") {
            self.vector_index.collection = v;
        }
        if let Some(v) = non_empty("QDRANT_API_KEY") {
            self.vector_index.api_key = Some(v);
        }

        if let Some(v) = non_empty("LLM_API_URL") {
            self.model.api_url = v;
        }
        if let Some(v) = non_empty("LLM_API_KEY") {
            self.model.api_key = Some(v);
        }
        if let Some(v) = non_empty("LLM_MODEL_ID") {
            self.model.model_id = v;
        }

        if let Some(v) = non_empty("SLACK_WEBHOOK_URL") {
            self.alerts.slack_webhook_url = Some(v);
        }
        if let Some(v) = non_empty("ALERT_WEBHOOK_URL") {
            self.alerts.webhook_url = Some(v);
        }

        if let Some(v) = non_empty("SITEWATCH_SERVER_ADDR") {
            self.server.addr = v;
        }
    }

    /// Validate tunables for internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();
        let r = &self.retrieval;

        Self::check_unit_interval(r.confidence_threshold, "retrieval.confidence_threshold", &mut errors);
        Self::check_unit_interval(r.score_threshold, "retrieval.score_threshold", &mut errors);
        Self::check_unit_interval(self.scoring.min_confidence, "scoring.min_confidence", &mut errors);
        Self::check_unit_interval(self.detector.min_confidence, "detector.min_confidence", &mut errors);

        if r.high_limit == 0 || r.medium_limit == 0 || r.low_limit == 0 {
            errors.push("retrieval tier limits must all be > 0".to_string());
        }
        if r.high_limit < r.medium_limit || r.medium_limit < r.low_limit {
            errors.push(format!(
                "retrieval tier limits must not decrease with priority (high={}, medium={}, low={})",
                r.high_limit, r.medium_limit, r.low_limit
            ));
        }
        if r.overfetch_factor == 0 {
            errors.push("retrieval.overfetch_factor must be > 0".to_string());
        }
        if !r.rrf_k.is_finite() || r.rrf_k < 0.0 {
            errors.push(format!("retrieval.rrf_k must be finite and >= 0 (got {})", r.rrf_k));
        }
        if r.dedup_prefix_chars == 0 {
            errors.push("retrieval.dedup_prefix_chars must be > 0".to_string());
        }
        if r.max_concurrent_queries == 0 {
            errors.push("retrieval.max_concurrent_queries must be > 0".to_string());
        }

        if self.video.max_frames == 0 {
            errors.push("video.max_frames must be > 0".to_string());
        }
        if !self.video.sample_fps.is_finite() || self.video.sample_fps <= 0.0 {
            errors.push("video.sample_fps must be > 0".to_string());
        }
        if self.detector.max_concurrent_frames == 0 {
            errors.push("detector.max_concurrent_frames must be > 0".to_string());
        }
        if self.scoring.regulation_excerpt_chars == 0 {
            errors.push("scoring.regulation_excerpt_chars must be > 0".to_string());
        }
        if self.model.max_tokens == 0 {
            errors.push("model.max_tokens must be > 0".to_string());
        }

        for (name, secs) in [
            ("video.timeout_secs", self.video.timeout_secs),
            ("detector.timeout_secs", self.detector.timeout_secs),
            ("embeddings.timeout_secs", self.embeddings.timeout_secs),
            ("vector_index.timeout_secs", self.vector_index.timeout_secs),
            ("model.timeout_secs", self.model.timeout_secs),
            ("alerts.timeout_secs", self.alerts.timeout_secs),
        ] {
            if secs == 0 {
                errors.push(format!("{name} must be > 0"));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Check that every credential and endpoint a live deployment needs is
    /// present. Missing values are fatal at startup, never degraded.
    pub fn require_credentials(&self) -> Result<(), ConfigError> {
        if self.detector.api_key.is_none() {
            return Err(ConfigError::MissingCredential("ROBOFLOW_API_KEY"));
        }
        if self.model.api_key.is_none() {
            return Err(ConfigError::MissingCredential("LLM_API_KEY"));
        }
        if self.vector_index.url.trim().is_empty() {
            return Err(ConfigError::MissingCredential("QDRANT_URL"));
        }
        if self.embeddings.dense_url.trim().is_empty() || self.embeddings.sparse_url.trim().is_empty() {
            return Err(ConfigError::MissingCredential("EMBEDDINGS_URL"));
        }
        Ok(())
    }

    fn check_unit_interval(value: f64, name: &str, errors: &mut Vec<String>) {
        if !value.is_finite() || !(0.0..=1.0).contains(&value) {
            errors.push(format!("{name} must be within [0, 1] (got {value})"));
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config I/O error ({path}): {err}", path = .0.display(), err = .1)]
    Io(PathBuf, std::io::Error),
    #[error("Config parse error ({path}): {err}", path = .0.display(), err = .1)]
    Parse(PathBuf, toml::de::Error),
    #[error("Config serialization error: {0}")]
    Serialize(toml::ser::Error),
    #[error("Config validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
    #[error("missing required credential or endpoint: {0}")]
    MissingCredential(&'static str),
}

// ============================================================================
// Sections
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub name: String,
    pub log_level: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: "Construction Safety AI".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Local data directories.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Where uploaded videos land; relative video paths are looked up here.
    pub input_dir: PathBuf,
    pub reports_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("./data/input"),
            reports_dir: PathBuf::from("./data/reports"),
        }
    }
}

impl PathsConfig {
    /// Resolve a video path as given by a caller.
    ///
    /// A path that exists as given (or is absolute) is used unchanged. A
    /// relative path that only exists under `input_dir` resolves there.
    /// Anything else is returned unchanged so the decode stage reports it.
    pub fn resolve_video(&self, video: &str) -> PathBuf {
        let given = PathBuf::from(video);
        if given.is_absolute() || given.exists() {
            return given;
        }
        let staged = self.input_dir.join(&given);
        if staged.exists() {
            staged
        } else {
            given
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub ffmpeg_bin: String,
    pub ffprobe_bin: String,
    pub max_frames: usize,
    pub sample_fps: f64,
    pub timeout_secs: u64,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            ffmpeg_bin: "ffmpeg".to_string(),
            ffprobe_bin: "ffprobe".to_string(),
            max_frames: defaults::MAX_FRAMES,
            sample_fps: defaults::SAMPLE_FPS,
            timeout_secs: defaults::VIDEO_DECODE_TIMEOUT_SECS,
        }
    }
}

impl VideoConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub api_url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub project: String,
    pub version: String,
    /// Confidence floor sent to the inference API.
    pub min_confidence: f64,
    pub max_concurrent_frames: usize,
    pub timeout_secs: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            api_url: defaults::DETECTOR_API_URL.to_string(),
            api_key: None,
            project: defaults::DETECTOR_PROJECT.to_string(),
            version: defaults::DETECTOR_VERSION.to_string(),
            min_confidence: 0.0,
            max_concurrent_frames: defaults::DETECTOR_MAX_CONCURRENT_FRAMES,
            timeout_secs: defaults::HTTP_TIMEOUT_SECS,
        }
    }
}

impl DetectorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingsConfig {
    /// text-embeddings-inference server for the dense model
    pub dense_url: String,
    /// text-embeddings-inference server for the sparse (SPLADE) model
    pub sparse_url: String,
    pub dense_model: String,
    pub sparse_model: String,
    pub timeout_secs: u64,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            dense_url: "http://localhost:8081".to_string(),
            sparse_url: "http://localhost:8082".to_string(),
            dense_model: defaults::DENSE_MODEL.to_string(),
            sparse_model: defaults::SPARSE_MODEL.to_string(),
            timeout_secs: defaults::HTTP_TIMEOUT_SECS,
        }
    }
}

impl EmbeddingsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorIndexConfig {
    pub url: String,
    pub collection: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub dense_vector_name: String,
    pub sparse_vector_name: String,
    pub timeout_secs: u64,
}

impl Default for VectorIndexConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:6333".to_string(),
            collection: defaults::VECTOR_COLLECTION.to_string(),
            api_key: None,
            dense_vector_name: "dense".to_string(),
            sparse_vector_name: "sparse".to_string(),
            timeout_secs: defaults::HTTP_TIMEOUT_SECS,
        }
    }
}

impl VectorIndexConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Hybrid retrieval policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub confidence_threshold: f64,
    pub score_threshold: f64,
    pub high_limit: usize,
    pub medium_limit: usize,
    pub low_limit: usize,
    pub overfetch_factor: usize,
    pub rrf_k: f64,
    pub dedup_prefix_chars: usize,
    pub source_tag: String,
    pub max_concurrent_queries: usize,
    /// Deadline for one query's embed + search round (seconds).
    pub query_timeout_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: defaults::RETRIEVAL_CONFIDENCE_THRESHOLD,
            score_threshold: defaults::RETRIEVAL_SCORE_THRESHOLD,
            high_limit: defaults::HIGH_TIER_LIMIT,
            medium_limit: defaults::MEDIUM_TIER_LIMIT,
            low_limit: defaults::LOW_TIER_LIMIT,
            overfetch_factor: defaults::OVERFETCH_FACTOR,
            rrf_k: defaults::RRF_K,
            dedup_prefix_chars: defaults::DEDUP_PREFIX_CHARS,
            source_tag: defaults::REGULATION_SOURCE_TAG.to_string(),
            max_concurrent_queries: defaults::MAX_CONCURRENT_QUERIES,
            query_timeout_secs: defaults::HTTP_TIMEOUT_SECS,
        }
    }
}

impl RetrievalConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub api_url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub model_id: String,
    pub api_version: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_url: defaults::MODEL_API_URL.to_string(),
            api_key: None,
            model_id: defaults::MODEL_ID.to_string(),
            api_version: defaults::MODEL_API_VERSION.to_string(),
            max_tokens: defaults::MODEL_MAX_TOKENS,
            timeout_secs: defaults::MODEL_TIMEOUT_SECS,
        }
    }
}

impl ModelConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Detections below this confidence are ignored by the scorer.
    pub min_confidence: f64,
    pub regulation_excerpt_chars: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.0,
            regulation_excerpt_chars: defaults::REGULATION_EXCERPT_CHARS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    #[serde(skip_serializing)]
    pub slack_webhook_url: Option<String>,
    /// Generic JSON relay (e-mail gateway, incident tool)
    #[serde(skip_serializing)]
    pub webhook_url: Option<String>,
    /// Lowest alert level that is dispatched ("LOW" sends everything).
    pub min_level: crate::types::AlertLevel,
    pub timeout_secs: u64,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            slack_webhook_url: None,
            webhook_url: None,
            min_level: crate::types::AlertLevel::Low,
            timeout_secs: defaults::HTTP_TIMEOUT_SECS,
        }
    }
}

impl AlertsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: defaults::SERVER_ADDR.to_string(),
        }
    }
}
