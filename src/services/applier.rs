//! Status transition applier.
//!
//! Every status change in the system, whatever triggered it, funnels through
//! [`TransitionApplier::apply`]: validation against the lifecycle table,
//! idempotent short-circuit, milestone timestamps, the transactional write,
//! and best-effort notification fan-out. Call sites cannot bypass
//! validation because nothing else writes the status column.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::BusinessConfig;
use crate::interfaces::order_store::{OrderStore, StorageError, TransitionWrite};
use crate::interfaces::{NotificationKind, Notifier};
use crate::order::{AuditRecord, HistoryEntry, Order, OrderStatus, TransitionSource};

/// Result type for transition application.
pub type Result<T> = std::result::Result<T, TransitionError>;

/// Errors from applying a status transition.
#[derive(Debug, thiserror::Error)]
pub enum TransitionError {
    #[error("Order not found: {key}")]
    NotFound { key: String },

    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Storage failure: {0}")]
    Storage(#[from] StorageError),
}

fn map_storage(e: StorageError) -> TransitionError {
    match e {
        StorageError::NotFound { key } => TransitionError::NotFound { key },
        other => TransitionError::Storage(other),
    }
}

/// One requested status change with its provenance and evidence.
#[derive(Debug, Clone)]
pub struct TransitionRequest {
    /// Internal order id.
    pub order_id: String,
    /// Target lifecycle status.
    pub target: OrderStatus,
    /// Subsystem requesting the change.
    pub source: TransitionSource,
    /// Free-text context for the history entry.
    pub note: Option<String>,
    pub location: Option<String>,
    /// Event time as reported externally; defaults to now.
    pub tracked_at: Option<DateTime<Utc>>,
    /// Raw courier status to record alongside the internal move.
    pub courier_status: Option<String>,
    /// Verbatim payload evidence, persisted in the same transaction.
    pub audit: Option<AuditRecord>,
    /// Replay-ledger key; a collision makes the whole apply a no-op.
    pub ledger_key: Option<String>,
}

impl TransitionRequest {
    #[must_use]
    pub fn new(order_id: impl Into<String>, target: OrderStatus, source: TransitionSource) -> Self {
        Self {
            order_id: order_id.into(),
            target,
            source,
            note: None,
            location: None,
            tracked_at: None,
            courier_status: None,
            audit: None,
            ledger_key: None,
        }
    }

    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    #[must_use]
    pub fn with_tracked_at(mut self, tracked_at: DateTime<Utc>) -> Self {
        self.tracked_at = Some(tracked_at);
        self
    }

    #[must_use]
    pub fn with_courier_status(mut self, courier_status: impl Into<String>) -> Self {
        self.courier_status = Some(courier_status.into());
        self
    }

    #[must_use]
    pub fn with_evidence(mut self, audit: AuditRecord, ledger_key: impl Into<String>) -> Self {
        self.audit = Some(audit);
        self.ledger_key = Some(ledger_key.into());
        self
    }
}

/// Maximum reload-and-retry attempts when a conditional update loses a race.
const MAX_COMMIT_ATTEMPTS: u32 = 3;

/// Applies validated status transitions and fans out notifications.
pub struct TransitionApplier {
    store: Arc<dyn OrderStore>,
    notifier: Arc<dyn Notifier>,
    business: BusinessConfig,
}

impl TransitionApplier {
    pub fn new(
        store: Arc<dyn OrderStore>,
        notifier: Arc<dyn Notifier>,
        business: BusinessConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            business,
        }
    }

    /// Apply one transition.
    ///
    /// Re-applying the order's current status is a no-op success: no history
    /// row, no notification. A version conflict reloads the order and
    /// revalidates, up to [`MAX_COMMIT_ATTEMPTS`] times, so racing webhook
    /// and cron invocations converge instead of failing spuriously.
    pub async fn apply(&self, request: TransitionRequest) -> Result<Order> {
        let mut attempts = 0;
        loop {
            let order = self
                .store
                .get(&request.order_id)
                .await
                .map_err(map_storage)?;

            if order.status == request.target {
                debug!(
                    order_code = %order.order_code,
                    status = %order.status,
                    source = %request.source,
                    "transition already applied, no-op"
                );
                return Ok(order);
            }

            if !order.status.can_transition_to(request.target) {
                warn!(
                    order_code = %order.order_code,
                    from = %order.status,
                    to = %request.target,
                    source = %request.source,
                    "rejecting invalid transition"
                );
                return Err(TransitionError::InvalidTransition {
                    from: order.status,
                    to: request.target,
                });
            }

            let now = Utc::now();
            let mut history = HistoryEntry::new(
                &order.id,
                request.target.as_str(),
                request.source,
                request.tracked_at.unwrap_or(now),
            );
            if let Some(note) = &request.note {
                history = history.with_note(note.clone());
            }
            if let Some(location) = &request.location {
                history = history.with_location(location.clone());
            }

            let write = TransitionWrite {
                order_id: order.id.clone(),
                expected_version: order.version,
                status: Some(request.target),
                courier_status: request.courier_status.clone(),
                shipped_at: milestone(
                    order.shipped_at,
                    request.target,
                    &[
                        OrderStatus::Shipped,
                        OrderStatus::Delivered,
                        OrderStatus::Completed,
                    ],
                    now,
                ),
                delivered_at: milestone(
                    order.delivered_at,
                    request.target,
                    &[OrderStatus::Delivered, OrderStatus::Completed],
                    now,
                ),
                updated_at: now,
                history,
                audit: request.audit.clone(),
                ledger_key: request.ledger_key.clone(),
            };

            match self.store.commit_transition(&write).await {
                Ok(updated) => {
                    info!(
                        order_code = %updated.order_code,
                        from = %order.status,
                        to = %updated.status,
                        source = %request.source,
                        "applied status transition"
                    );
                    self.dispatch_notifications(&updated, request.target).await;
                    return Ok(updated);
                }
                Err(StorageError::VersionConflict { .. }) if attempts + 1 < MAX_COMMIT_ATTEMPTS => {
                    attempts += 1;
                    debug!(
                        order_code = %order.order_code,
                        attempt = attempts,
                        "version conflict, reloading order"
                    );
                }
                Err(StorageError::DuplicateEvent { event_key }) => {
                    debug!(
                        order_code = %order.order_code,
                        event_key = %event_key,
                        "replayed event absorbed by ledger"
                    );
                    return Ok(order);
                }
                Err(e) => return Err(map_storage(e)),
            }
        }
    }

    /// Best-effort notification fan-out. Failures are logged and never roll
    /// back the transition that triggered them.
    async fn dispatch_notifications(&self, order: &Order, target: OrderStatus) {
        match target {
            OrderStatus::Delivered => {
                self.send(
                    &order.customer_email,
                    NotificationKind::OrderDelivered,
                    json!({
                        "orderCode": order.order_code,
                        "customerName": order.customer_name,
                        "totalAmount": order.total_amount,
                    }),
                )
                .await;
                self.send(
                    &order.customer_email,
                    NotificationKind::ConfirmDeliveryReminder,
                    json!({
                        "orderCode": order.order_code,
                        "customerName": order.customer_name,
                    }),
                )
                .await;
            }
            OrderStatus::Completed => {
                self.send(
                    &order.customer_email,
                    NotificationKind::OrderCompleted,
                    json!({
                        "orderCode": order.order_code,
                        "customerName": order.customer_name,
                        "totalAmount": order.total_amount,
                    }),
                )
                .await;
                self.send(
                    &order.farmer_email,
                    NotificationKind::EarningsCredited,
                    json!({
                        "orderCode": order.order_code,
                        "farmerName": order.farmer_name,
                        "subtotal": order.subtotal,
                        "netEarnings": self.business.net_earnings(order.subtotal),
                    }),
                )
                .await;
            }
            _ => {}
        }
    }

    async fn send(&self, recipient: &str, kind: NotificationKind, context: serde_json::Value) {
        if let Err(e) = self.notifier.notify(recipient, kind, context).await {
            warn!(
                recipient = %recipient,
                kind = %kind,
                error = %e,
                "notification dispatch failed"
            );
        }
    }
}

/// A milestone timestamp is written at most once: only when currently null
/// and the target reaches the milestone.
fn milestone(
    current: Option<DateTime<Utc>>,
    target: OrderStatus,
    reached_by: &[OrderStatus],
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if current.is_none() && reached_by.contains(&target) {
        Some(now)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::mock::RecordingNotifier;
    use crate::storage::SqliteOrderStore;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup() -> (Arc<SqliteOrderStore>, Arc<RecordingNotifier>, TransitionApplier) {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory pool");
        let store = Arc::new(SqliteOrderStore::new(pool));
        store.init().await.expect("schema init");

        let notifier = Arc::new(RecordingNotifier::default());
        let applier = TransitionApplier::new(
            Arc::clone(&store) as Arc<dyn OrderStore>,
            Arc::clone(&notifier) as Arc<dyn Notifier>,
            BusinessConfig::default(),
        );
        (store, notifier, applier)
    }

    async fn seed(store: &SqliteOrderStore, status: OrderStatus) -> Order {
        let mut order = Order::new(
            "ECO100",
            "buyer@example.com",
            "Budi",
            "farmer@example.com",
            "Pak Tani",
            100_000,
            15_000,
        );
        order.status = status;
        store.insert(&order).await.expect("seed order");
        order
    }

    #[tokio::test]
    async fn forward_transition_appends_history_and_bumps_version() {
        let (store, _notifier, applier) = setup().await;
        let order = seed(&store, OrderStatus::Paid).await;

        let updated = applier
            .apply(TransitionRequest::new(
                &order.id,
                OrderStatus::Shipped,
                TransitionSource::Webhook,
            ))
            .await
            .expect("apply shipped");

        assert_eq!(updated.status, OrderStatus::Shipped);
        assert_eq!(updated.version, order.version + 1);
        assert!(updated.shipped_at.is_some());

        let history = store.history(&order.id).await.expect("history");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, "shipped");
        assert_eq!(history[0].source, TransitionSource::Webhook);
    }

    #[tokio::test]
    async fn reapplying_same_status_is_noop() {
        let (store, notifier, applier) = setup().await;
        let order = seed(&store, OrderStatus::Shipped).await;

        let request = TransitionRequest::new(
            &order.id,
            OrderStatus::Delivered,
            TransitionSource::Cron,
        );
        applier.apply(request.clone()).await.expect("first apply");
        applier.apply(request).await.expect("second apply");

        let history = store.history(&order.id).await.expect("history");
        assert_eq!(history.len(), 1, "no duplicate history entry");
        // One delivered + one reminder, dispatched exactly once.
        assert_eq!(notifier.sent().len(), 2);
    }

    #[tokio::test]
    async fn backward_transition_is_rejected_unchanged() {
        let (store, _notifier, applier) = setup().await;
        let order = seed(&store, OrderStatus::Delivered).await;

        let err = applier
            .apply(TransitionRequest::new(
                &order.id,
                OrderStatus::Shipped,
                TransitionSource::Webhook,
            ))
            .await
            .expect_err("backward move must fail");

        assert!(matches!(
            err,
            TransitionError::InvalidTransition {
                from: OrderStatus::Delivered,
                to: OrderStatus::Shipped,
            }
        ));

        let unchanged = store.get(&order.id).await.expect("reload");
        assert_eq!(unchanged.status, OrderStatus::Delivered);
        assert_eq!(unchanged.version, order.version);
        assert!(store.history(&order.id).await.expect("history").is_empty());
    }

    #[tokio::test]
    async fn shipped_at_is_set_once() {
        let (store, _notifier, applier) = setup().await;
        let order = seed(&store, OrderStatus::Paid).await;

        let shipped = applier
            .apply(TransitionRequest::new(
                &order.id,
                OrderStatus::Shipped,
                TransitionSource::Webhook,
            ))
            .await
            .expect("ship");
        let first_shipped_at = shipped.shipped_at.expect("shipped_at set");

        let delivered = applier
            .apply(TransitionRequest::new(
                &order.id,
                OrderStatus::Delivered,
                TransitionSource::Cron,
            ))
            .await
            .expect("deliver");

        assert_eq!(delivered.shipped_at, Some(first_shipped_at));
        assert!(delivered.delivered_at.is_some());
    }

    #[tokio::test]
    async fn manual_shortcut_to_completed_sets_delivered_at() {
        let (store, notifier, applier) = setup().await;
        let order = seed(&store, OrderStatus::Shipped).await;

        let completed = applier
            .apply(
                TransitionRequest::new(
                    &order.id,
                    OrderStatus::Completed,
                    TransitionSource::Manual,
                )
                .with_note("customer self-confirmed"),
            )
            .await
            .expect("complete");

        assert_eq!(completed.status, OrderStatus::Completed);
        assert!(completed.delivered_at.is_some());

        let sent = notifier.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].recipient, "buyer@example.com");
        assert_eq!(sent[0].kind, NotificationKind::OrderCompleted);
        assert_eq!(sent[1].recipient, "farmer@example.com");
        assert_eq!(sent[1].kind, NotificationKind::EarningsCredited);
        assert_eq!(sent[1].context["netEarnings"], 95_000);
    }

    #[tokio::test]
    async fn failing_notifier_does_not_roll_back_the_transition() {
        let (store, notifier, applier) = setup().await;
        let order = seed(&store, OrderStatus::Shipped).await;
        notifier.set_failing(true);

        let updated = applier
            .apply(TransitionRequest::new(
                &order.id,
                OrderStatus::Delivered,
                TransitionSource::Cron,
            ))
            .await
            .expect("apply succeeds despite dispatch failures");

        assert_eq!(updated.status, OrderStatus::Delivered);
        assert!(updated.delivered_at.is_some());
        assert!(notifier.sent().is_empty());

        // The write committed before dispatch: status and history survive.
        let reloaded = store.get(&order.id).await.expect("reload");
        assert_eq!(reloaded.status, OrderStatus::Delivered);
        assert_eq!(reloaded.version, order.version + 1);
        let history = store.history(&order.id).await.expect("history");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, "delivered");
    }

    #[tokio::test]
    async fn unknown_order_fails_with_not_found() {
        let (_store, _notifier, applier) = setup().await;

        let err = applier
            .apply(TransitionRequest::new(
                "missing",
                OrderStatus::Shipped,
                TransitionSource::Webhook,
            ))
            .await
            .expect_err("must fail");

        assert!(matches!(err, TransitionError::NotFound { .. }));
    }
}
