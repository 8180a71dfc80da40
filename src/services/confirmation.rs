//! Manual delivery confirmation.
//!
//! The only customer-initiated path into `completed`, and the one place a
//! lifecycle skip over `delivered` is intentional: the customer holding the
//! package outranks the courier's reporting lag.

use std::sync::Arc;

use tracing::info;

use crate::interfaces::order_store::{OrderStore, StorageError};
use crate::order::{Order, OrderStatus, TransitionSource};
use crate::services::applier::{TransitionApplier, TransitionError, TransitionRequest};

/// Result type for manual confirmation.
pub type Result<T> = std::result::Result<T, ConfirmError>;

/// Errors from a manual confirmation attempt. The HTTP layer translates
/// these into customer-facing Indonesian messages.
#[derive(Debug, thiserror::Error)]
pub enum ConfirmError {
    #[error("Order not found: {order_code}")]
    NotFound { order_code: String },

    #[error("Requester is not the order's customer")]
    Forbidden,

    #[error("Order cannot be confirmed from status {current}")]
    InvalidState { current: OrderStatus },

    #[error(transparent)]
    Transition(TransitionError),
}

/// Customer self-confirmation of receipt.
pub struct ConfirmationService {
    store: Arc<dyn OrderStore>,
    applier: Arc<TransitionApplier>,
}

impl ConfirmationService {
    pub fn new(store: Arc<dyn OrderStore>, applier: Arc<TransitionApplier>) -> Self {
        Self { store, applier }
    }

    /// Confirm delivery of `order_code` on behalf of `requester_email`.
    ///
    /// The requester must be the order's customer and the order must be in
    /// `shipped` or `delivered`; on success the order is completed with
    /// source tag `manual`.
    pub async fn confirm_delivery(
        &self,
        order_code: &str,
        requester_email: &str,
    ) -> Result<Order> {
        let order = match self.store.get_by_code(order_code).await {
            Ok(order) => order,
            Err(StorageError::NotFound { .. }) => {
                return Err(ConfirmError::NotFound {
                    order_code: order_code.to_string(),
                })
            }
            Err(e) => return Err(ConfirmError::Transition(TransitionError::Storage(e))),
        };

        if !order.customer_email.eq_ignore_ascii_case(requester_email) {
            return Err(ConfirmError::Forbidden);
        }

        if !matches!(
            order.status,
            OrderStatus::Shipped | OrderStatus::Delivered
        ) {
            return Err(ConfirmError::InvalidState {
                current: order.status,
            });
        }

        let request = TransitionRequest::new(
            &order.id,
            OrderStatus::Completed,
            TransitionSource::Manual,
        )
        .with_note("customer self-confirmed");

        let updated = self
            .applier
            .apply(request)
            .await
            .map_err(ConfirmError::Transition)?;

        info!(
            order_code = %updated.order_code,
            customer = %updated.customer_email,
            "customer confirmed delivery"
        );
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::mock::RecordingNotifier;
    use crate::config::BusinessConfig;
    use crate::interfaces::Notifier;
    use crate::storage::SqliteOrderStore;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup() -> (Arc<SqliteOrderStore>, ConfirmationService) {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory pool");
        let store = Arc::new(SqliteOrderStore::new(pool));
        store.init().await.expect("schema init");

        let applier = Arc::new(TransitionApplier::new(
            Arc::clone(&store) as Arc<dyn OrderStore>,
            Arc::new(RecordingNotifier::default()) as Arc<dyn Notifier>,
            BusinessConfig::default(),
        ));
        let service =
            ConfirmationService::new(Arc::clone(&store) as Arc<dyn OrderStore>, applier);
        (store, service)
    }

    async fn seed(store: &SqliteOrderStore, status: OrderStatus) -> Order {
        let mut order = Order::new(
            "ECO002",
            "buyer@example.com",
            "Budi",
            "farmer@example.com",
            "Pak Tani",
            50_000,
            10_000,
        );
        order.status = status;
        store.insert(&order).await.expect("seed order");
        order
    }

    #[tokio::test]
    async fn shipped_order_confirms_directly_to_completed() {
        let (store, service) = setup().await;
        let order = seed(&store, OrderStatus::Shipped).await;

        let updated = service
            .confirm_delivery("ECO002", "buyer@example.com")
            .await
            .expect("confirm");
        assert_eq!(updated.status, OrderStatus::Completed);

        let history = store.history(&order.id).await.expect("history");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].source, TransitionSource::Manual);
        assert_eq!(history[0].note.as_deref(), Some("customer self-confirmed"));
    }

    #[tokio::test]
    async fn wrong_identity_is_forbidden_regardless_of_status() {
        let (store, service) = setup().await;
        seed(&store, OrderStatus::Delivered).await;

        let err = service
            .confirm_delivery("ECO002", "intruder@example.com")
            .await
            .expect_err("must be forbidden");
        assert!(matches!(err, ConfirmError::Forbidden));
    }

    #[tokio::test]
    async fn identity_comparison_ignores_case() {
        let (store, service) = setup().await;
        seed(&store, OrderStatus::Shipped).await;

        service
            .confirm_delivery("ECO002", "Buyer@Example.com")
            .await
            .expect("case-insensitive match");
    }

    #[tokio::test]
    async fn wrong_status_names_the_current_state() {
        let (store, service) = setup().await;
        seed(&store, OrderStatus::Processing).await;

        let err = service
            .confirm_delivery("ECO002", "buyer@example.com")
            .await
            .expect_err("must fail");
        assert!(matches!(
            err,
            ConfirmError::InvalidState {
                current: OrderStatus::Processing
            }
        ));
    }

    #[tokio::test]
    async fn unknown_order_is_not_found() {
        let (_store, service) = setup().await;

        let err = service
            .confirm_delivery("ECO999", "buyer@example.com")
            .await
            .expect_err("must fail");
        assert!(matches!(err, ConfirmError::NotFound { .. }));
    }
}
