//! HTTP surface for the reconciliation core.
//!
//! Handlers translate typed core failures into an HTTP status plus a JSON
//! error body and never panic; 5xx is reserved for persistence/internal
//! failures so webhook senders retry exactly when retrying can help.

pub mod cron;
pub mod orders;
pub mod webhooks;

use std::sync::Arc;

use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::CronConfig;
use crate::interfaces::order_store::OrderStore;
use crate::services::{ConfirmationService, Reconciler};
use crate::webhooks::WebhookProcessor;

/// Shared state for axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn OrderStore>,
    pub processor: Arc<WebhookProcessor>,
    pub reconciler: Arc<Reconciler>,
    pub confirmation: Arc<ConfirmationService>,
    pub cron: CronConfig,
}

/// Start the HTTP server on the given address.
///
/// When `port` is 0, the OS assigns an ephemeral port. The actual bound
/// port is always logged so it can be discovered.
pub async fn serve(
    state: AppState,
    host: &str,
    port: u16,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = router(state);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let actual_port = listener.local_addr()?.port();
    info!(port = actual_port, "fulfillment HTTP API listening");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Build the axum router (separated for testing).
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/webhooks/shipping", post(webhooks::shipping))
        .route("/api/webhooks/payment", post(webhooks::payment))
        .route("/api/cron/check-delivery", post(cron::check_delivery))
        .route("/api/cron/auto-complete", post(cron::auto_complete))
        .route("/api/orders/confirm-delivery", post(orders::confirm_delivery))
        .route("/api/orders/{order_code}", get(orders::get_order))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health() -> StatusCode {
    StatusCode::OK
}

/// HTTP status + JSON error body.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<crate::interfaces::order_store::StorageError> for ApiError {
    fn from(e: crate::interfaces::order_store::StorageError) -> Self {
        use crate::interfaces::order_store::StorageError;
        match e {
            StorageError::NotFound { key } => {
                Self::new(StatusCode::NOT_FOUND, format!("Order not found: {key}"))
            }
            other => Self::internal(other.to_string()),
        }
    }
}
