//! Inbound webhook processing.
//!
//! Both sources run the same pipeline: verify authenticity, check the
//! replay ledger, match the order, persist the verbatim payload, then
//! interpret. Events that cannot move the internal lifecycle still land as
//! audit and history context, so replay and debugging stay possible even
//! when interpretation logic is wrong.

pub mod payment;
pub mod shipping;
pub mod signature;

pub use payment::{payment_intent, PaymentIntent, PaymentNotification};
pub use shipping::{CourierIds, ShippingEvent, ShippingIntent, ShippingOrder};

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::config::WebhookConfig;
use crate::interfaces::order_store::{
    OrderStore, PriceWrite, StorageError, TransitionWrite, WaybillWrite,
};
use crate::order::{
    AuditRecord, HistoryEntry, Order, OrderStatus, TransitionSource, WebhookSource,
};
use crate::services::applier::{TransitionApplier, TransitionError, TransitionRequest};

/// Result type for webhook processing.
pub type Result<T> = std::result::Result<T, WebhookError>;

/// Errors surfaced to the HTTP edge.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Webhook signature verification failed")]
    InvalidSignature,

    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),

    #[error("No order matches webhook reference: {reference}")]
    UnknownOrder { reference: String },

    #[error("Storage failure: {0}")]
    Storage(#[from] StorageError),
}

/// What processing an event amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The internal lifecycle moved to this status.
    Applied(OrderStatus),
    /// Context recorded (audit, history, price, waybill); no transition.
    Recorded,
    /// Exact replay of an already-processed event; nothing written.
    Duplicate,
}

/// Bounded reload-and-retry for the record-only write paths.
const MAX_RECORD_ATTEMPTS: u32 = 3;

/// Normalizes inbound webhook payloads into order updates.
pub struct WebhookProcessor {
    store: Arc<dyn OrderStore>,
    applier: Arc<TransitionApplier>,
    config: WebhookConfig,
}

impl WebhookProcessor {
    pub fn new(
        store: Arc<dyn OrderStore>,
        applier: Arc<TransitionApplier>,
        config: WebhookConfig,
    ) -> Self {
        Self {
            store,
            applier,
            config,
        }
    }

    /// Process one Biteship shipping event from its raw body and signature
    /// header.
    pub async fn process_shipping(
        &self,
        raw: &[u8],
        signature_header: Option<&str>,
    ) -> Result<Disposition> {
        match &self.config.biteship_signature_key {
            Some(key) => {
                let valid = signature_header
                    .is_some_and(|signature| signature::verify_biteship(key, raw, signature));
                if !valid {
                    return Err(WebhookError::InvalidSignature);
                }
            }
            None => warn!("biteship signature verification disabled, no key configured"),
        }

        let event: ShippingEvent = serde_json::from_slice(raw)
            .map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;
        let intent = event.intent().map_err(WebhookError::InvalidPayload)?;

        let event_key = format!("biteship:{}", signature::body_digest(raw));
        if self.store.is_event_processed(&event_key).await? {
            return Ok(Disposition::Duplicate);
        }

        let order = self.match_order(&event.order.id, true).await?;
        let audit = AuditRecord::new(
            &order.id,
            WebhookSource::Biteship,
            &event.event,
            String::from_utf8_lossy(raw),
        );

        let disposition = match intent {
            ShippingIntent::Status {
                courier_status,
                mapped,
            } => {
                self.process_status(&order, &courier_status, mapped, audit, &event_key)
                    .await?
            }
            ShippingIntent::Price { courier_price } => {
                self.process_price(&order, courier_price, audit, &event_key)
                    .await?
            }
            ShippingIntent::Waybill {
                waybill_id,
                tracking_id,
            } => {
                self.process_waybill(&order, waybill_id, tracking_id, audit, &event_key)
                    .await?
            }
        };

        info!(
            order_code = %order.order_code,
            event = %event.event,
            disposition = ?disposition,
            "shipping webhook processed"
        );
        Ok(disposition)
    }

    /// Process one Midtrans payment notification from its raw body. The
    /// signature travels inside the payload.
    pub async fn process_payment(&self, raw: &[u8]) -> Result<Disposition> {
        let notification: PaymentNotification = serde_json::from_slice(raw)
            .map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;

        match &self.config.midtrans_server_key {
            Some(server_key) => {
                let valid = match (
                    &notification.status_code,
                    &notification.gross_amount,
                    &notification.signature_key,
                ) {
                    (Some(status_code), Some(gross_amount), Some(signature)) => {
                        signature::verify_midtrans(
                            &notification.order_id,
                            status_code,
                            gross_amount,
                            server_key,
                            signature,
                        )
                    }
                    _ => false,
                };
                if !valid {
                    return Err(WebhookError::InvalidSignature);
                }
            }
            None => warn!("midtrans signature verification disabled, no key configured"),
        }

        let event_key = notification.event_key();
        if self.store.is_event_processed(&event_key).await? {
            return Ok(Disposition::Duplicate);
        }

        let order = self.match_order(&notification.order_id, false).await?;
        let audit = AuditRecord::new(
            &order.id,
            WebhookSource::Midtrans,
            format!("payment.{}", notification.transaction_status),
            String::from_utf8_lossy(raw),
        );

        let intent = payment_intent(
            &notification.transaction_status,
            notification.fraud_status.as_deref(),
        );

        let disposition = match intent {
            PaymentIntent::Transition(target) => {
                if order.status == target || !order.status.can_transition_to(target) {
                    self.record_context(
                        &order,
                        &notification.transaction_status,
                        None,
                        audit,
                        &event_key,
                    )
                    .await?
                } else {
                    let request = TransitionRequest::new(
                        &order.id,
                        target,
                        TransitionSource::Webhook,
                    )
                    .with_note(format!(
                        "payment gateway reported {}",
                        notification.transaction_status
                    ))
                    .with_evidence(audit.clone(), event_key.clone());

                    match self.applier.apply(request).await {
                        Ok(_) => Disposition::Applied(target),
                        Err(TransitionError::InvalidTransition { .. }) => {
                            self.record_context(
                                &order,
                                &notification.transaction_status,
                                None,
                                audit,
                                &event_key,
                            )
                            .await?
                        }
                        Err(TransitionError::NotFound { .. }) => {
                            return Err(WebhookError::UnknownOrder {
                                reference: notification.order_id.clone(),
                            })
                        }
                        Err(TransitionError::Storage(e)) => return Err(e.into()),
                    }
                }
            }
            PaymentIntent::Record => {
                self.record_context(
                    &order,
                    &notification.transaction_status,
                    None,
                    audit,
                    &event_key,
                )
                .await?
            }
        };

        info!(
            order_code = %order.order_code,
            transaction_status = %notification.transaction_status,
            disposition = ?disposition,
            "payment webhook processed"
        );
        Ok(disposition)
    }

    /// Match the referenced order, logging recent orders on a miss so the
    /// operator can diagnose which side lost the correlation.
    async fn match_order(&self, reference: &str, by_courier_id: bool) -> Result<Order> {
        let lookup = if by_courier_id {
            self.store.get_by_courier_order_id(reference).await
        } else {
            self.store.get_by_code(reference).await
        };

        match lookup {
            Ok(order) => Ok(order),
            Err(StorageError::NotFound { .. }) => {
                let recent = self.store.recent_orders(5).await.unwrap_or_default();
                warn!(
                    reference = %reference,
                    recent = ?recent,
                    "webhook references unknown order"
                );
                Err(WebhookError::UnknownOrder {
                    reference: reference.to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn process_status(
        &self,
        order: &Order,
        courier_status: &str,
        mapped: Option<OrderStatus>,
        audit: AuditRecord,
        event_key: &str,
    ) -> Result<Disposition> {
        let target = mapped.filter(|t| *t != order.status && order.status.can_transition_to(*t));

        let Some(target) = target else {
            // Finer-grained courier status, an idempotent repeat, or a
            // status the lifecycle rejects: keep the context, skip the move.
            return self
                .record_context(order, courier_status, Some(courier_status), audit, event_key)
                .await;
        };

        let request = TransitionRequest::new(&order.id, target, TransitionSource::Webhook)
            .with_courier_status(courier_status)
            .with_evidence(audit.clone(), event_key);

        match self.applier.apply(request).await {
            Ok(_) => Ok(Disposition::Applied(target)),
            Err(TransitionError::InvalidTransition { .. }) => {
                self.record_context(order, courier_status, Some(courier_status), audit, event_key)
                    .await
            }
            Err(TransitionError::NotFound { key }) => {
                Err(WebhookError::UnknownOrder { reference: key })
            }
            Err(TransitionError::Storage(e)) => Err(e.into()),
        }
    }

    /// Persist audit + history (+ optional raw courier status) without a
    /// lifecycle move.
    async fn record_context(
        &self,
        order: &Order,
        external_status: &str,
        courier_status: Option<&str>,
        audit: AuditRecord,
        event_key: &str,
    ) -> Result<Disposition> {
        let mut current = order.clone();
        let mut attempts = 0;
        loop {
            let now = Utc::now();
            let write = TransitionWrite {
                order_id: current.id.clone(),
                expected_version: current.version,
                status: None,
                courier_status: courier_status.map(str::to_string),
                shipped_at: None,
                delivered_at: None,
                // No lifecycle move: updated_at stays put so the
                // auto-completion grace clock keeps counting.
                updated_at: current.updated_at,
                history: HistoryEntry::new(
                    &current.id,
                    external_status,
                    TransitionSource::Webhook,
                    now,
                ),
                audit: Some(audit.clone()),
                ledger_key: Some(event_key.to_string()),
            };

            match self.store.commit_transition(&write).await {
                Ok(_) => return Ok(Disposition::Recorded),
                Err(StorageError::VersionConflict { .. }) if attempts + 1 < MAX_RECORD_ATTEMPTS => {
                    attempts += 1;
                    current = self.store.get(&current.id).await?;
                }
                Err(StorageError::DuplicateEvent { .. }) => return Ok(Disposition::Duplicate),
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Apply a courier price revision: the delta between the new quote and
    /// the stored shipping cost moves the total.
    async fn process_price(
        &self,
        order: &Order,
        courier_price: i64,
        audit: AuditRecord,
        event_key: &str,
    ) -> Result<Disposition> {
        // The provider is the billing source of truth, so the revision is
        // applied as received; surprising revisions are flagged for audit.
        let delta = courier_price - order.shipping_cost;
        if delta < 0 || delta.abs() * 2 > order.shipping_cost {
            warn!(
                order_code = %order.order_code,
                stored = order.shipping_cost,
                revised = courier_price,
                "courier price revision outside the expected range"
            );
        }

        let mut current = order.clone();
        let mut attempts = 0;
        loop {
            let write = PriceWrite {
                order_id: current.id.clone(),
                expected_version: current.version,
                shipping_cost: courier_price,
                total_amount: current.total_amount + (courier_price - current.shipping_cost),
                updated_at: Utc::now(),
                audit: audit.clone(),
                ledger_key: event_key.to_string(),
            };

            match self.store.commit_price(&write).await {
                Ok(updated) => {
                    info!(
                        order_code = %updated.order_code,
                        shipping_cost = updated.shipping_cost,
                        total_amount = updated.total_amount,
                        "courier price revision applied"
                    );
                    return Ok(Disposition::Recorded);
                }
                Err(StorageError::VersionConflict { .. }) if attempts + 1 < MAX_RECORD_ATTEMPTS => {
                    attempts += 1;
                    current = self.store.get(&current.id).await?;
                }
                Err(StorageError::DuplicateEvent { .. }) => return Ok(Disposition::Duplicate),
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn process_waybill(
        &self,
        order: &Order,
        waybill_id: Option<String>,
        tracking_id: Option<String>,
        audit: AuditRecord,
        event_key: &str,
    ) -> Result<Disposition> {
        let mut current = order.clone();
        let mut attempts = 0;
        loop {
            let write = WaybillWrite {
                order_id: current.id.clone(),
                expected_version: current.version,
                waybill_id: waybill_id.clone(),
                courier_tracking_id: tracking_id.clone(),
                updated_at: Utc::now(),
                audit: audit.clone(),
                ledger_key: event_key.to_string(),
            };

            match self.store.commit_waybill(&write).await {
                Ok(updated) => {
                    info!(
                        order_code = %updated.order_code,
                        waybill = ?updated.waybill_id,
                        "waybill identifiers recorded"
                    );
                    return Ok(Disposition::Recorded);
                }
                Err(StorageError::VersionConflict { .. }) if attempts + 1 < MAX_RECORD_ATTEMPTS => {
                    attempts += 1;
                    current = self.store.get(&current.id).await?;
                }
                Err(StorageError::DuplicateEvent { .. }) => return Ok(Disposition::Duplicate),
                Err(e) => return Err(e.into()),
            }
        }
    }
}
