//! Notification dispatch interface.
//!
//! The core decides when to notify, whom, and with what context; message
//! formatting and delivery (email/WhatsApp) belong to an external
//! collaborator behind this trait. Dispatch is always best-effort: callers
//! log failures and never roll back the transition that triggered them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Result type for notification dispatch.
pub type Result<T> = std::result::Result<T, NotifyError>;

/// Errors that can occur dispatching a notification.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Notification transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Notification endpoint rejected dispatch: status={status}")]
    Rejected { status: u16 },
}

/// Template selector understood by the delivery collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// Courier reported delivery; sent to the customer.
    OrderDelivered,
    /// Reminder that the order auto-completes after the grace window.
    ConfirmDeliveryReminder,
    /// Order reached `completed`; sent to the customer.
    OrderCompleted,
    /// Net earnings figure for the fulfilling farmer.
    EarningsCredited,
}

impl NotificationKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OrderDelivered => "order_delivered",
            Self::ConfirmDeliveryReminder => "confirm_delivery_reminder",
            Self::OrderCompleted => "order_completed",
            Self::EarningsCredited => "earnings_credited",
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Interface for triggering outbound notifications.
///
/// Implementations:
/// - `HttpNotifier`: POSTs to the delivery collaborator
/// - `LogNotifier`: structured-log only (default without an endpoint)
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Trigger one notification. `context` carries the template data
    /// (order code, names, amounts).
    async fn notify(
        &self,
        recipient: &str,
        kind: NotificationKind,
        context: serde_json::Value,
    ) -> Result<()>;
}
