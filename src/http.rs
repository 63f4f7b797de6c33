//! Shared HTTP plumbing for external collaborators
//!
//! Every outbound client is built here with a per-call timeout, and every
//! response is funnelled through [`read_json`] so status and decode failures
//! land in [`UpstreamError`] the same way for every service.

use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::error::UpstreamError;

/// Build a `reqwest` client with the given per-request timeout.
pub fn build_client(service: &'static str, timeout: Duration) -> Result<reqwest::Client, UpstreamError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("sitewatch/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| UpstreamError::unavailable(service, e))
}

/// Send a prepared request and decode a JSON body.
///
/// Non-2xx statuses become [`UpstreamError::Rejected`]; bodies that do not
/// match `T` become [`UpstreamError::MalformedResponse`]. `timeout` must be
/// the budget the request's client was built with.
pub async fn read_json<T: DeserializeOwned>(
    service: &'static str,
    timeout: Duration,
    request: reqwest::RequestBuilder,
) -> Result<T, UpstreamError> {
    let resp = request
        .send()
        .await
        .map_err(|e| UpstreamError::from_http(service, &e, timeout))?;

    let status = resp.status();
    if !status.is_success() {
        return Err(UpstreamError::Rejected {
            service,
            status: status.as_u16(),
        });
    }

    let body = resp
        .bytes()
        .await
        .map_err(|e| UpstreamError::from_http(service, &e, timeout))?;
    serde_json::from_slice(&body).map_err(|e| UpstreamError::malformed(service, e))
}

/// Send a prepared request where only the status matters.
pub async fn expect_success(
    service: &'static str,
    timeout: Duration,
    request: reqwest::RequestBuilder,
) -> Result<(), UpstreamError> {
    let resp = request
        .send()
        .await
        .map_err(|e| UpstreamError::from_http(service, &e, timeout))?;

    if resp.status().is_success() {
        Ok(())
    } else {
        Err(UpstreamError::Rejected {
            service,
            status: resp.status().as_u16(),
        })
    }
}

/// Trim a trailing slash so paths can be appended with `format!`.
pub fn base_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trims_trailing_slash() {
        assert_eq!(base_url("http://qdrant:6333/"), "http://qdrant:6333");
        assert_eq!(base_url("http://qdrant:6333"), "http://qdrant:6333");
    }

    #[test]
    fn test_client_builds() {
        assert!(build_client("test", Duration::from_secs(1)).is_ok());
    }

    /// Accepts connections and never answers.
    async fn silent_server() -> (String, tokio::task::JoinHandle<()>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        (format!("http://{addr}/embed"), handle)
    }

    #[tokio::test]
    async fn test_timeout_reports_configured_budget() {
        let (url, server) = silent_server().await;
        let timeout = Duration::from_millis(50);
        let client = build_client("embeddings", timeout).unwrap();

        let out: Result<serde_json::Value, _> = read_json("embeddings", timeout, client.post(&url)).await;
        match out {
            Err(UpstreamError::Timeout { service, timeout_ms }) => {
                assert_eq!(service, "embeddings");
                assert_eq!(timeout_ms, 50);
            }
            other => panic!("expected timeout, got {other:?}"),
        }

        let sent = expect_success("webhook", timeout, client.post(&url)).await;
        assert!(sent.unwrap_err().to_string().contains("timed out after 50ms"));
        server.abort();
    }
}
