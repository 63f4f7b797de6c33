//! Messages-API HTTP backend
//!
//! Speaks the `POST /v1/messages` protocol: `model`, `max_tokens`, `system`
//! and a single user message in; a list of content blocks out.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::ModelConfig;
use crate::error::UpstreamError;
use crate::http;

use super::LlmBackend;

const SERVICE: &str = "llm";

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: String,
}

pub struct MessagesApiBackend {
    client: reqwest::Client,
    timeout: Duration,
    api_url: String,
    api_key: String,
    api_version: String,
    model_id: String,
    max_tokens: u32,
}

impl MessagesApiBackend {
    pub fn new(config: &ModelConfig) -> Result<Self, UpstreamError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| UpstreamError::unavailable(SERVICE, "LLM_API_KEY not set"))?;

        Ok(Self {
            client: http::build_client(SERVICE, config.timeout())?,
            timeout: config.timeout(),
            api_url: config.api_url.clone(),
            api_key,
            api_version: config.api_version.clone(),
            model_id: config.model_id.clone(),
            max_tokens: config.max_tokens,
        })
    }

    /// Concatenated text blocks of a reply; an empty reply is malformed.
    fn reply_text(resp: MessagesResponse) -> Result<String, UpstreamError> {
        let text: String = resp
            .content
            .into_iter()
            .filter(|b| b.kind == "text")
            .map(|b| b.text)
            .collect();
        if text.trim().is_empty() {
            return Err(UpstreamError::malformed(SERVICE, "reply contained no text"));
        }
        Ok(text)
    }
}

#[async_trait]
impl LlmBackend for MessagesApiBackend {
    async fn generate(&self, system: &str, user: &str) -> Result<String, UpstreamError> {
        let start = Instant::now();
        let body = json!({
            "model": self.model_id,
            "max_tokens": self.max_tokens,
            "system": system,
            "messages": [{ "role": "user", "content": user }],
        });
        let request = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.api_version)
            .json(&body);

        let resp: MessagesResponse = http::read_json(SERVICE, self.timeout, request).await?;
        let text = Self::reply_text(resp)?;
        debug!(
            model = %self.model_id,
            chars = text.len(),
            latency_ms = start.elapsed().as_millis() as u64,
            "Model reply received"
        );
        Ok(text)
    }

    fn backend_name(&self) -> &str {
        &self.model_id
    }
}
