//! Scheduled reconciler: the two time-driven pollers.
//!
//! Each order is an independent read-validate-write pass; one order's
//! failure is recorded in the run report and never aborts the rest of the
//! batch. Overlapping runs are safe because the applier short-circuits
//! duplicate transitions and the version guard rejects stale writes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::ReconcilerConfig;
use crate::interfaces::order_store::{OrderStore, StorageError};
use crate::interfaces::tracking::TrackingLookup;
use crate::order::{HistoryEntry, Order, OrderStatus, TransitionSource};
use crate::services::applier::{TransitionApplier, TransitionError, TransitionRequest};

/// Courier-vocabulary status that maps to the internal delivered state.
const COURIER_DELIVERED: &str = "delivered";

/// Outcome of one poller run, logged and returned by the cron endpoints.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    /// Orders in the poller's working set.
    pub scanned: usize,
    /// Orders whose status was transitioned this run.
    pub applied: usize,
    /// Orders examined and left as they were.
    pub skipped: usize,
    /// Per-order failures; the run continued past each of them.
    pub errors: Vec<OrderFailure>,
}

/// One isolated per-order failure.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderFailure {
    pub order_code: String,
    pub error: String,
}

/// Runs the delivery-status and auto-completion polls.
pub struct Reconciler {
    store: Arc<dyn OrderStore>,
    applier: Arc<TransitionApplier>,
    tracking: Arc<dyn TrackingLookup>,
    config: ReconcilerConfig,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn OrderStore>,
        applier: Arc<TransitionApplier>,
        tracking: Arc<dyn TrackingLookup>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            store,
            applier,
            tracking,
            config,
        }
    }

    /// Poll the courier integration for every shipped order that carries a
    /// waybill, persist new tracking history, and transition the orders the
    /// courier reports as delivered.
    ///
    /// Each lookup is bounded by its own timeout so one slow courier cannot
    /// stall the batch, and consecutive lookups are paced apart to respect
    /// the aggregator's rate limits.
    pub async fn check_deliveries(&self) -> Result<RunReport, StorageError> {
        let orders = self.store.list_awaiting_delivery().await?;
        let mut report = RunReport {
            scanned: orders.len(),
            ..RunReport::default()
        };

        for (index, order) in orders.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(self.config.lookup_delay()).await;
            }
            self.check_one_delivery(order, &mut report).await;
        }

        info!(
            scanned = report.scanned,
            applied = report.applied,
            skipped = report.skipped,
            errors = report.errors.len(),
            "delivery-status poll finished"
        );
        Ok(report)
    }

    async fn check_one_delivery(&self, order: &Order, report: &mut RunReport) {
        // list_awaiting_delivery guarantees both fields are present.
        let (Some(waybill), Some(courier)) = (&order.waybill_id, &order.courier_code) else {
            report.skipped += 1;
            return;
        };

        let lookup = self.tracking.lookup(waybill, courier);
        let shipment = match timeout(self.config.lookup_timeout(), lookup).await {
            Ok(Ok(shipment)) => shipment,
            Ok(Err(e)) => {
                warn!(order_code = %order.order_code, error = %e, "tracking lookup failed");
                report.errors.push(OrderFailure {
                    order_code: order.order_code.clone(),
                    error: e.to_string(),
                });
                return;
            }
            Err(_) => {
                warn!(order_code = %order.order_code, "tracking lookup timed out");
                report.errors.push(OrderFailure {
                    order_code: order.order_code.clone(),
                    error: "tracking lookup timed out".to_string(),
                });
                return;
            }
        };

        let entries: Vec<HistoryEntry> = shipment
            .history
            .iter()
            .map(|event| {
                let mut entry = HistoryEntry::new(
                    &order.id,
                    &event.status,
                    TransitionSource::Cron,
                    event.tracked_at,
                );
                if let Some(note) = &event.note {
                    entry = entry.with_note(note.clone());
                }
                if let Some(location) = &event.location {
                    entry = entry.with_location(location.clone());
                }
                entry
            })
            .collect();

        match self.store.append_tracking_history(&entries).await {
            Ok(inserted) => {
                debug!(
                    order_code = %order.order_code,
                    reported = entries.len(),
                    inserted,
                    "tracking history appended"
                );
            }
            Err(e) => {
                report.errors.push(OrderFailure {
                    order_code: order.order_code.clone(),
                    error: e.to_string(),
                });
                return;
            }
        }

        if shipment.status != COURIER_DELIVERED {
            report.skipped += 1;
            return;
        }

        let mut request = TransitionRequest::new(
            &order.id,
            OrderStatus::Delivered,
            TransitionSource::Cron,
        )
        .with_courier_status(shipment.status.clone())
        .with_note("Kurir melaporkan paket telah diterima");
        // The history row carries the courier's event time, not the poll time.
        if let Some(event) = shipment
            .history
            .iter()
            .rev()
            .find(|e| e.status == COURIER_DELIVERED)
        {
            request = request.with_tracked_at(event.tracked_at);
        }

        match self.applier.apply(request).await {
            Ok(_) => report.applied += 1,
            Err(TransitionError::InvalidTransition { from, to }) => {
                // A racing webhook moved the order first.
                debug!(order_code = %order.order_code, %from, %to, "delivery transition raced");
                report.skipped += 1;
            }
            Err(e) => report.errors.push(OrderFailure {
                order_code: order.order_code.clone(),
                error: e.to_string(),
            }),
        }
    }

    /// Force-complete every shipped or delivered order whose last update is
    /// older than the grace window.
    pub async fn auto_complete(&self) -> Result<RunReport, StorageError> {
        self.auto_complete_at(Utc::now()).await
    }

    /// Grace-window comparison is strict: an order exactly at the boundary
    /// is left alone until the next run.
    pub async fn auto_complete_at(&self, now: DateTime<Utc>) -> Result<RunReport, StorageError> {
        let orders = self.store.list_completion_candidates().await?;
        let grace = self.config.grace_window();
        let mut report = RunReport {
            scanned: orders.len(),
            ..RunReport::default()
        };

        for order in &orders {
            let age = now.signed_duration_since(order.updated_at);
            if age <= grace {
                report.skipped += 1;
                continue;
            }

            let request = TransitionRequest::new(
                &order.id,
                OrderStatus::Completed,
                TransitionSource::Cron,
            )
            .with_note("Pesanan diselesaikan otomatis setelah masa konfirmasi berakhir");

            match self.applier.apply(request).await {
                Ok(_) => report.applied += 1,
                Err(TransitionError::InvalidTransition { from, to }) => {
                    debug!(order_code = %order.order_code, %from, %to, "auto-completion raced");
                    report.skipped += 1;
                }
                Err(e) => report.errors.push(OrderFailure {
                    order_code: order.order_code.clone(),
                    error: e.to_string(),
                }),
            }
        }

        info!(
            scanned = report.scanned,
            applied = report.applied,
            skipped = report.skipped,
            errors = report.errors.len(),
            "auto-completion poll finished"
        );
        Ok(report)
    }
}
