//! Alert dispatch
//!
//! Formats one message per run and fans it out to every configured channel.
//! Delivery is best effort: a failing channel is logged and left out of the
//! returned list, never retried.

pub mod channels;
pub mod message;

pub use channels::{AlertChannel, SlackWebhookChannel, WebhookChannel};
pub use message::{build_alert_message, AlertMessage};

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::AlertsConfig;
use crate::error::{bounded, UpstreamError};
use crate::http;
use crate::types::AlertLevel;

/// One channel per webhook URL present in `config`.
pub fn channels_from_config(config: &AlertsConfig) -> Result<Vec<Arc<dyn AlertChannel>>, UpstreamError> {
    let timeout = config.timeout();
    let client = http::build_client("alerts", timeout)?;
    let mut channels: Vec<Arc<dyn AlertChannel>> = Vec::new();
    if let Some(url) = &config.slack_webhook_url {
        channels.push(Arc::new(SlackWebhookChannel::new(client.clone(), timeout, url)));
    }
    if let Some(url) = &config.webhook_url {
        channels.push(Arc::new(WebhookChannel::new(client, timeout, url)));
    }
    Ok(channels)
}

pub struct AlertDispatcher {
    channels: Vec<Arc<dyn AlertChannel>>,
    min_level: AlertLevel,
    timeout: Duration,
}

impl AlertDispatcher {
    pub fn new(channels: Vec<Arc<dyn AlertChannel>>, min_level: AlertLevel, timeout: Duration) -> Self {
        Self {
            channels,
            min_level,
            timeout,
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Send to all channels; returns the names of those that accepted.
    pub async fn dispatch(&self, message: &AlertMessage) -> Vec<String> {
        if self.channels.is_empty() {
            debug!("No alert channels configured");
            return Vec::new();
        }
        if message.alert_level < self.min_level {
            debug!(
                alert_level = %message.alert_level,
                min_level = %self.min_level,
                "Alert below minimum level, not sent"
            );
            return Vec::new();
        }

        let sends = self.channels.iter().map(|channel| async move {
            let outcome = bounded("alerts", self.timeout, channel.send(message)).await;
            (channel.channel_name().to_string(), outcome)
        });

        let mut sent = Vec::new();
        for (name, outcome) in join_all(sends).await {
            match outcome {
                Ok(()) => sent.push(name),
                Err(e) => warn!(channel = %name, error = %e, "Alert delivery failed"),
            }
        }
        info!(sent = ?sent, subject = %message.subject, "Alerts dispatched");
        sent
    }
}
