//! Ops notifications.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::{WebhookConfig, DEFAULT_ALERT_TIMEOUT_SECS};
use crate::fetch::{Fetch, Sink};
use crate::TelemetryError;

/// Body posted to the webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookMessage {
    pub text: String,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
    pub repository: String,
}

/// Posts short status messages to a chat-style webhook.
pub struct WebhookNotifier {
    sink: Sink,
    url: String,
    repository: String,
    timeout: Duration,
}

impl WebhookNotifier {
    /// `None` when no webhook URL is configured.
    #[must_use]
    pub fn from_config(config: &WebhookConfig, fetch: Arc<dyn Fetch>) -> Option<Self> {
        let url = config.url.as_deref().filter(|url| !url.trim().is_empty())?;
        Some(Self {
            sink: Sink::new(url, fetch),
            url: url.to_owned(),
            repository: config.repository.clone(),
            timeout: Duration::from_secs(DEFAULT_ALERT_TIMEOUT_SECS),
        })
    }

    pub async fn notify(&self, text: &str, success: bool) -> Result<(), TelemetryError> {
        let message = WebhookMessage {
            text: text.to_owned(),
            success,
            timestamp: Utc::now(),
            repository: self.repository.clone(),
        };
        self.sink
            .post_to(
                &self.url,
                "webhook",
                &message,
                self.timeout,
                &CancellationToken::new(),
            )
            .await?;
        tracing::debug!(success, "Webhook notified");
        Ok(())
    }
}
