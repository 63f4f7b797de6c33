//! Error taxonomy for the safety pipeline
//!
//! Two families:
//! - [`UpstreamError`]: the tagged failure outcome of a single external call
//!   (detector, embeddings, vector index, language model, alert transport).
//!   Always recoverable at the pipeline level; each stage maps it to its
//!   documented empty/default/fallback output.
//! - [`PipelineError`]: conditions that end a run (or startup) outright.

use std::future::Future;
use std::time::Duration;

/// Failure of one call to an external collaborator.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("{service} unavailable: {reason}")]
    Unavailable { service: &'static str, reason: String },

    #[error("{service} timed out after {timeout_ms}ms")]
    Timeout { service: &'static str, timeout_ms: u64 },

    #[error("{service} returned a malformed response: {reason}")]
    MalformedResponse { service: &'static str, reason: String },

    #[error("{service} rejected the request with status {status}")]
    Rejected { service: &'static str, status: u16 },
}

impl UpstreamError {
    pub fn unavailable(service: &'static str, reason: impl ToString) -> Self {
        Self::Unavailable {
            service,
            reason: reason.to_string(),
        }
    }

    pub fn malformed(service: &'static str, reason: impl ToString) -> Self {
        Self::MalformedResponse {
            service,
            reason: reason.to_string(),
        }
    }

    /// Map a transport error from `reqwest` onto the taxonomy. `timeout` is
    /// the budget the client was built with.
    pub fn from_http(service: &'static str, err: &reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            return Self::timed_out(service, timeout);
        }
        if err.is_decode() {
            return Self::malformed(service, err);
        }
        match err.status() {
            Some(status) => Self::Rejected {
                service,
                status: status.as_u16(),
            },
            None => Self::unavailable(service, err),
        }
    }

    pub fn timed_out(service: &'static str, timeout: Duration) -> Self {
        Self::Timeout {
            service,
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Name of the collaborator that failed.
    pub fn service(&self) -> &'static str {
        match self {
            Self::Unavailable { service, .. }
            | Self::Timeout { service, .. }
            | Self::MalformedResponse { service, .. }
            | Self::Rejected { service, .. } => service,
        }
    }
}

/// Errors that terminate a run or prevent startup.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// No frames can exist, so nothing downstream can run.
    #[error("video unreadable ({path}): {reason}")]
    VideoUnreadable { path: String, reason: String },

    #[error("configuration error: {0}")]
    Configuration(#[from] crate::config::ConfigError),

    #[error("run cancelled after stage '{after}'")]
    Cancelled { after: &'static str },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Run `fut` with a deadline, turning expiry into [`UpstreamError::Timeout`].
///
/// Every collaborator call goes through here so a hung dependency can only
/// cost its own stage, never the whole run.
pub async fn bounded<T, F>(
    service: &'static str,
    timeout: Duration,
    fut: F,
) -> Result<T, UpstreamError>
where
    F: Future<Output = Result<T, UpstreamError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(outcome) => outcome,
        Err(_) => Err(UpstreamError::timed_out(service, timeout)),
    }
}
