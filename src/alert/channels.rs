//! Alert delivery channels

use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

use crate::error::UpstreamError;
use crate::http;

use super::message::AlertMessage;

#[async_trait]
pub trait AlertChannel: Send + Sync {
    async fn send(&self, message: &AlertMessage) -> Result<(), UpstreamError>;

    /// Name reported back when delivery succeeds.
    fn channel_name(&self) -> &str;
}

/// Slack incoming webhook (`{"text": ...}`).
pub struct SlackWebhookChannel {
    client: reqwest::Client,
    timeout: Duration,
    url: String,
}

impl SlackWebhookChannel {
    /// `timeout` is the budget `client` was built with.
    pub fn new(client: reqwest::Client, timeout: Duration, url: impl Into<String>) -> Self {
        Self {
            client,
            timeout,
            url: url.into(),
        }
    }

    fn payload(message: &AlertMessage) -> serde_json::Value {
        json!({ "text": format!("*{}*\n```\n{}\n```", message.subject, message.body) })
    }
}

#[async_trait]
impl AlertChannel for SlackWebhookChannel {
    async fn send(&self, message: &AlertMessage) -> Result<(), UpstreamError> {
        let request = self.client.post(&self.url).json(&Self::payload(message));
        http::expect_success("slack", self.timeout, request).await
    }

    fn channel_name(&self) -> &str {
        "slack"
    }
}

/// Generic JSON webhook, e.g. an e-mail relay.
pub struct WebhookChannel {
    client: reqwest::Client,
    timeout: Duration,
    url: String,
}

impl WebhookChannel {
    pub fn new(client: reqwest::Client, timeout: Duration, url: impl Into<String>) -> Self {
        Self {
            client,
            timeout,
            url: url.into(),
        }
    }
}

#[async_trait]
impl AlertChannel for WebhookChannel {
    async fn send(&self, message: &AlertMessage) -> Result<(), UpstreamError> {
        let request = self.client.post(&self.url).json(message);
        http::expect_success("webhook", self.timeout, request).await
    }

    fn channel_name(&self) -> &str {
        "webhook"
    }
}
