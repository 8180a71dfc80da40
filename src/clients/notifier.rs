//! Notification dispatch clients.
//!
//! The delivery collaborator (email/WhatsApp formatting and sending) sits
//! behind an HTTP endpoint; this side only posts the trigger. Without a
//! configured endpoint the [`LogNotifier`] records dispatches in the
//! structured log, which keeps local development and tests observable.

use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use reqwest::Client;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::NotifierConfig;
use crate::interfaces::notifier::{NotificationKind, Notifier, NotifyError, Result};

/// POSTs notification triggers to the delivery collaborator.
pub struct HttpNotifier {
    client: Client,
    endpoint: String,
}

impl HttpNotifier {
    /// Create a notifier from configuration. Fails when reqwest cannot
    /// build a client, and expects `endpoint` to be present.
    pub fn new(config: &NotifierConfig, endpoint: String) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self { client, endpoint })
    }

    fn backoff() -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_secs(2))
            .with_max_times(3)
            .with_jitter()
    }

    fn is_retryable(err: &NotifyError) -> bool {
        match err {
            NotifyError::Transport(e) => e.is_timeout() || e.is_connect(),
            NotifyError::Rejected { status } => *status == 429 || *status >= 500,
        }
    }

    async fn post_once(
        &self,
        recipient: &str,
        kind: NotificationKind,
        context: &serde_json::Value,
    ) -> Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&json!({
                "recipient": recipient,
                "template": kind.as_str(),
                "context": context,
            }))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            debug!(recipient = %recipient, kind = %kind, "notification trigger posted");
            Ok(())
        } else {
            Err(NotifyError::Rejected {
                status: status.as_u16(),
            })
        }
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn notify(
        &self,
        recipient: &str,
        kind: NotificationKind,
        context: serde_json::Value,
    ) -> Result<()> {
        let result = (|| async { self.post_once(recipient, kind, &context).await })
            .retry(Self::backoff())
            .when(Self::is_retryable)
            .await;

        if let Err(e) = &result {
            warn!(
                recipient = %recipient,
                kind = %kind,
                error = %e,
                "notification POST exhausted retries"
            );
        }
        result
    }
}

/// Structured-log notifier, the default when no endpoint is configured.
#[derive(Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(
        &self,
        recipient: &str,
        kind: NotificationKind,
        context: serde_json::Value,
    ) -> Result<()> {
        info!(
            recipient = %recipient,
            kind = %kind,
            context = %context,
            "notification dispatch (log only)"
        );
        Ok(())
    }
}
