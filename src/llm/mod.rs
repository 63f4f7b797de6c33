//! Language Model Backend Module
//!
//! Provides a unified interface for the hosted language model used by the
//! risk scoring engine and the report narrator.
//!
//! ## Architecture
//!
//! - [`LlmBackend`]: system + user prompt in, free text out
//! - [`MessagesApiBackend`]: HTTP client for a Messages-API compatible endpoint
//!
//! One backend instance is built at startup and shared as
//! `Arc<dyn LlmBackend>`; there is no process-wide model singleton.

use async_trait::async_trait;
use regex::Regex;
use serde::de::DeserializeOwned;
use std::sync::OnceLock;

use crate::error::UpstreamError;

mod messages_api;
pub use messages_api::MessagesApiBackend;

/// Unified trait for language model backends
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Generate a completion for `user` under the `system` instruction
    async fn generate(&self, system: &str, user: &str) -> Result<String, UpstreamError>;

    /// Get the backend name for logging
    fn backend_name(&self) -> &str;
}

/// Generate and parse a JSON object out of the completion.
///
/// Tolerates Markdown code fences and prose around the object; anything that
/// still fails to parse is `MalformedResponse`.
pub async fn generate_json<T: DeserializeOwned>(
    backend: &dyn LlmBackend,
    system: &str,
    user: &str,
) -> Result<T, UpstreamError> {
    let raw = backend.generate(system, user).await?;
    parse_json_reply(backend.backend_name(), &raw)
}

/// Parse a model reply as `T`, see [`generate_json`].
pub fn parse_json_reply<T: DeserializeOwned>(backend: &str, raw: &str) -> Result<T, UpstreamError> {
    let stripped = strip_code_fences(raw);
    let candidate = extract_json_object(stripped).unwrap_or(stripped);
    serde_json::from_str(candidate).map_err(|e| {
        UpstreamError::malformed("llm", format!("{backend} reply is not the expected JSON: {e}"))
    })
}

fn fence_regex() -> Option<&'static Regex> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    FENCE
        .get_or_init(|| Regex::new(r"(?s)^\s*```[A-Za-z0-9_-]*\s*\n?(.*?)\n?\s*```\s*$").ok())
        .as_ref()
}

/// Remove a surrounding Markdown code fence (with optional language tag).
pub fn strip_code_fences(raw: &str) -> &str {
    let inner = fence_regex().and_then(|re| re.captures(raw)).and_then(|c| c.get(1));
    match inner {
        Some(inner) => inner.as_str().trim(),
        None => raw.trim(),
    }
}

/// Slice of the outermost `{ ... }` object, honouring JSON strings.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}
