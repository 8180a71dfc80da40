//! Order persistence interface.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::order::{AuditRecord, HistoryEntry, Order, OrderStatus};

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Order not found: {key}")]
    NotFound { key: String },

    #[error("Version conflict on order {order_id}: expected {expected}")]
    VersionConflict { order_id: String, expected: i64 },

    #[error("Event already processed: {event_key}")]
    DuplicateEvent { event_key: String },

    #[error("Corrupt stored value: {0}")]
    Corrupt(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Atomic write set for one status-affecting webhook, cron, or manual event.
///
/// Everything in here lands in a single database transaction: the
/// conditional order update (guarded by `expected_version`), the history
/// append, the verbatim audit row, and the replay-ledger key. A ledger-key
/// collision aborts the whole set with [`StorageError::DuplicateEvent`];
/// a stale `expected_version` aborts it with
/// [`StorageError::VersionConflict`].
#[derive(Debug, Clone)]
pub struct TransitionWrite {
    pub order_id: String,
    pub expected_version: i64,
    /// New lifecycle status; `None` records courier/gateway context without
    /// moving the internal state.
    pub status: Option<OrderStatus>,
    /// Raw courier status to record alongside, when the event carried one.
    pub courier_status: Option<String>,
    /// Milestone timestamps, only ever set by the applier when currently
    /// null on the row.
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub history: HistoryEntry,
    pub audit: Option<AuditRecord>,
    pub ledger_key: Option<String>,
}

/// Atomic write set for a courier price revision (`order.price`).
#[derive(Debug, Clone)]
pub struct PriceWrite {
    pub order_id: String,
    pub expected_version: i64,
    pub shipping_cost: i64,
    pub total_amount: i64,
    pub updated_at: DateTime<Utc>,
    pub audit: AuditRecord,
    pub ledger_key: String,
}

/// Atomic write set for waybill assignment (`order.waybill_id`).
#[derive(Debug, Clone)]
pub struct WaybillWrite {
    pub order_id: String,
    pub expected_version: i64,
    pub waybill_id: Option<String>,
    pub courier_tracking_id: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub audit: AuditRecord,
    pub ledger_key: String,
}

/// Compact row for operator debugging when a webhook matches nothing.
#[derive(Debug, Clone)]
pub struct OrderDigest {
    pub order_code: String,
    pub courier_order_id: Option<String>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

/// Interface for order persistence.
///
/// Implementations:
/// - `SqliteOrderStore`: SQLite storage
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persist a new order. Checkout owns creation in production; the
    /// reconciliation core uses this for seeding and tests.
    async fn insert(&self, order: &Order) -> Result<()>;

    /// Fetch by internal id.
    async fn get(&self, id: &str) -> Result<Order>;

    /// Fetch by the human-facing order code.
    async fn get_by_code(&self, order_code: &str) -> Result<Order>;

    /// Fetch by the shipping provider's order id (webhook correlation).
    async fn get_by_courier_order_id(&self, courier_order_id: &str) -> Result<Order>;

    /// Orders in `shipped` that carry both a waybill and a courier code,
    /// i.e. the delivery-status poller's working set.
    async fn list_awaiting_delivery(&self) -> Result<Vec<Order>>;

    /// Orders in `shipped` or `delivered`, the auto-completion poller's
    /// candidate set. Grace-window age is filtered by the caller so the
    /// boundary comparison stays exact.
    async fn list_completion_candidates(&self) -> Result<Vec<Order>>;

    /// Apply one atomic transition/context write set.
    async fn commit_transition(&self, write: &TransitionWrite) -> Result<Order>;

    /// Apply one atomic price revision.
    async fn commit_price(&self, write: &PriceWrite) -> Result<Order>;

    /// Apply one atomic waybill assignment. Already-set identifiers are
    /// kept (set-once semantics); the audit and ledger rows still land.
    async fn commit_waybill(&self, write: &WaybillWrite) -> Result<Order>;

    /// Append externally-reported tracking history, deduplicated on
    /// `(order_id, status, tracked_at)`. Returns how many rows were new.
    async fn append_tracking_history(&self, entries: &[HistoryEntry]) -> Result<u64>;

    /// Full history for an order, oldest first.
    async fn history(&self, order_id: &str) -> Result<Vec<HistoryEntry>>;

    /// Verbatim webhook payloads received for an order, oldest first.
    async fn audit_log(&self, order_id: &str) -> Result<Vec<AuditRecord>>;

    /// True if an inbound event key is already in the replay ledger.
    async fn is_event_processed(&self, event_key: &str) -> Result<bool>;

    /// Most recently created orders, newest first, for webhook-miss
    /// debugging.
    async fn recent_orders(&self, limit: u64) -> Result<Vec<OrderDigest>>;
}
