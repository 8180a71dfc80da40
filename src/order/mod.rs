//! Order domain model: the persisted order record, its append-only status
//! history, and the tags identifying which subsystem triggered a change.

mod status;

pub use status::{OrderStatus, UnknownStatus};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Subsystem that triggered a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionSource {
    /// Inbound shipping or payment webhook.
    Webhook,
    /// Scheduled reconciler run.
    Cron,
    /// Customer-initiated action.
    Manual,
    /// Internal bookkeeping.
    System,
}

impl TransitionSource {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Webhook => "webhook",
            Self::Cron => "cron",
            Self::Manual => "manual",
            Self::System => "system",
        }
    }
}

impl std::fmt::Display for TransitionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TransitionSource {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "webhook" => Ok(Self::Webhook),
            "cron" => Ok(Self::Cron),
            "manual" => Ok(Self::Manual),
            "system" => Ok(Self::System),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// A customer's purchase record, tracked through its fulfillment lifecycle.
///
/// Money fields are whole rupiah. `version` increments on every successful
/// write; updates are conditional on the expected version so racing writers
/// surface as conflicts instead of lost updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    /// Opaque internal identifier, immutable.
    pub id: String,
    /// Human-facing order code (`ECO...`), unique and immutable.
    pub order_code: String,
    pub status: OrderStatus,
    pub customer_email: String,
    pub customer_name: String,
    pub farmer_email: String,
    pub farmer_name: String,
    /// Shipping provider's own order id; webhook correlation key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub courier_order_id: Option<String>,
    /// Courier company code (`jne`, `sicepat`, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub courier_code: Option<String>,
    /// Last raw courier status observed; finer-grained than `status`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub courier_status: Option<String>,
    /// Courier-assigned waybill, set once when issued.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waybill_id: Option<String>,
    /// Provider-internal tracking id accompanying the waybill.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub courier_tracking_id: Option<String>,
    pub shipping_cost: i64,
    pub subtotal: i64,
    pub total_amount: i64,
    /// Set exactly once, the first time `shipped` is reached.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipped_at: Option<DateTime<Utc>>,
    /// Set exactly once, the first time `delivered` or later is reached.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency counter.
    pub version: i64,
}

impl Order {
    /// Creates a fresh order at the start of the lifecycle. Checkout owns
    /// order creation in production; the reconciliation core only needs this
    /// for seeding and tests.
    #[must_use]
    pub fn new(
        order_code: impl Into<String>,
        customer_email: impl Into<String>,
        customer_name: impl Into<String>,
        farmer_email: impl Into<String>,
        farmer_name: impl Into<String>,
        subtotal: i64,
        shipping_cost: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            order_code: order_code.into(),
            status: OrderStatus::Pending,
            customer_email: customer_email.into(),
            customer_name: customer_name.into(),
            farmer_email: farmer_email.into(),
            farmer_name: farmer_name.into(),
            courier_order_id: None,
            courier_code: None,
            courier_status: None,
            waybill_id: None,
            courier_tracking_id: None,
            shipping_cost,
            subtotal,
            total_amount: subtotal + shipping_cost,
            shipped_at: None,
            delivered_at: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Returns true if the order has left the reconciliation core.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// One append-only history row. `status` carries the external system's own
/// vocabulary (courier or gateway strings), not just the internal enum, so
/// the ledger preserves detail the lifecycle collapses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub order_id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub source: TransitionSource,
    /// Event time as reported by the external system, not receipt time.
    pub tracked_at: DateTime<Utc>,
}

impl HistoryEntry {
    #[must_use]
    pub fn new(
        order_id: impl Into<String>,
        status: impl Into<String>,
        source: TransitionSource,
        tracked_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            order_id: order_id.into(),
            status: status.into(),
            note: None,
            location: None,
            source,
            tracked_at,
        }
    }

    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

/// External system a webhook came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookSource {
    Biteship,
    Midtrans,
}

impl WebhookSource {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Biteship => "biteship",
            Self::Midtrans => "midtrans",
        }
    }
}

impl std::fmt::Display for WebhookSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One verbatim inbound webhook payload, appended to the order's audit log
/// before any interpretation. Rows are never rewritten, so replay and
/// debugging stay possible even when interpretation logic is wrong.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub id: String,
    pub order_id: String,
    pub source: WebhookSource,
    pub event_type: String,
    pub payload: String,
    pub received_at: DateTime<Utc>,
}

impl AuditRecord {
    #[must_use]
    pub fn new(
        order_id: impl Into<String>,
        source: WebhookSource,
        event_type: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            order_id: order_id.into(),
            source,
            event_type: event_type.into(),
            payload: payload.into(),
            received_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_order_starts_pending_with_summed_total() {
        let order = Order::new(
            "ECO001",
            "buyer@example.com",
            "Budi",
            "farmer@example.com",
            "Pak Tani",
            100_000,
            15_000,
        );
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total_amount, 115_000);
        assert_eq!(order.version, 0);
        assert!(order.shipped_at.is_none());
        assert!(order.delivered_at.is_none());
        assert!(!order.is_terminal());
    }

    #[test]
    fn history_entry_builders_attach_context() {
        let entry = HistoryEntry::new("oid", "picked", TransitionSource::Webhook, Utc::now())
            .with_note("Paket diambil kurir")
            .with_location("Jakarta Selatan");
        assert_eq!(entry.status, "picked");
        assert_eq!(entry.note.as_deref(), Some("Paket diambil kurir"));
        assert_eq!(entry.location.as_deref(), Some("Jakarta Selatan"));
        assert_eq!(entry.source, TransitionSource::Webhook);
    }

    #[test]
    fn source_tags_round_trip() {
        for source in [
            TransitionSource::Webhook,
            TransitionSource::Cron,
            TransitionSource::Manual,
            TransitionSource::System,
        ] {
            let parsed: TransitionSource = source.as_str().parse().expect("known source");
            assert_eq!(parsed, source);
        }
    }
}
