//! System-wide default constants.
//!
//! Centralises the tuning numbers used across the pipeline.
//! Grouped by subsystem for easy discovery.

// ============================================================================
// Video
// ============================================================================

/// Maximum frames extracted per video.
pub const MAX_FRAMES: usize = 10;

/// Frame sampling rate (frames per second of video).
pub const SAMPLE_FPS: f64 = 1.0;

/// Upper bound on a single ffprobe/ffmpeg invocation (seconds).
pub const VIDEO_DECODE_TIMEOUT_SECS: u64 = 120;

// ============================================================================
// Detector
// ============================================================================

/// Roboflow serverless inference endpoint.
pub const DETECTOR_API_URL: &str = "https://detect.roboflow.com";

/// Model served by the detector (project/version).
pub const DETECTOR_PROJECT: &str = "construction-site-safety";
pub const DETECTOR_VERSION: &str = "27";

/// Frames in flight against the detector at once.
pub const DETECTOR_MAX_CONCURRENT_FRAMES: usize = 4;

// ============================================================================
// Retrieval
// ============================================================================

/// Detections below this confidence never trigger retrieval (inclusive floor).
pub const RETRIEVAL_CONFIDENCE_THRESHOLD: f64 = 0.50;

/// Minimum normalised fused score a passage needs to be kept.
pub const RETRIEVAL_SCORE_THRESHOLD: f64 = 0.60;

/// Result budget per priority tier.
pub const HIGH_TIER_LIMIT: usize = 5;
pub const MEDIUM_TIER_LIMIT: usize = 3;
pub const LOW_TIER_LIMIT: usize = 1;

/// Each candidate list fetches `limit * OVERFETCH_FACTOR` before fusion.
pub const OVERFETCH_FACTOR: usize = 3;

/// Reciprocal Rank Fusion constant.
pub const RRF_K: f64 = 60.0;

/// Characters of passage text hashed into the dedup key.
pub const DEDUP_PREFIX_CHARS: usize = 200;

/// Provenance tag stamped on every retrieved regulation.
pub const REGULATION_SOURCE_TAG: &str = "CAL_OSHA";

/// Citation used when a passage payload carries no source.
pub const UNKNOWN_CITATION: &str = "Unknown";

/// Distinct queries searched concurrently within one run.
pub const MAX_CONCURRENT_QUERIES: usize = 4;

/// Qdrant collection holding the regulation corpus.
pub const VECTOR_COLLECTION: &str = "osha_regulations";

pub const DENSE_MODEL: &str = "BAAI/bge-small-en-v1.5";
pub const SPARSE_MODEL: &str = "prithivida/Splade_PP_en_v1";

// ============================================================================
// Scoring
// ============================================================================

/// Regulation text is cut to this many characters in the scoring context.
pub const REGULATION_EXCERPT_CHARS: usize = 300;

/// Fallback score contributed by each violation detection.
pub const FALLBACK_POINTS_PER_VIOLATION: u32 = 25;

/// Alert level thresholds (score >= threshold).
pub const CRITICAL_SCORE: u8 = 75;
pub const HIGH_SCORE: u8 = 50;
pub const MEDIUM_SCORE: u8 = 25;

// ============================================================================
// Language model
// ============================================================================

pub const MODEL_API_URL: &str = "https://api.anthropic.com/v1/messages";
pub const MODEL_ID: &str = "claude-3-5-haiku-20241022";
pub const MODEL_API_VERSION: &str = "2023-06-01";
pub const MODEL_MAX_TOKENS: u32 = 1024;

// ============================================================================
// HTTP
// ============================================================================

/// Default per-call timeout for external HTTP collaborators (seconds).
pub const HTTP_TIMEOUT_SECS: u64 = 30;

/// Language-model calls get longer; narrative generation is slow.
pub const MODEL_TIMEOUT_SECS: u64 = 60;

/// Default bind address for `sitewatch serve`.
pub const SERVER_ADDR: &str = "0.0.0.0:8080";
