//! Inbound webhook endpoints.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde_json::{json, Value};
use tracing::error;

use crate::webhooks::{Disposition, WebhookError};

use super::{ApiError, AppState};

/// Header Biteship signs the raw body into.
const BITESHIP_SIGNATURE_HEADER: &str = "x-biteship-signature";

fn disposition_body(disposition: Disposition) -> Json<Value> {
    let label = match disposition {
        Disposition::Applied(status) => format!("applied:{status}"),
        Disposition::Recorded => "recorded".to_string(),
        Disposition::Duplicate => "duplicate".to_string(),
    };
    Json(json!({ "status": "ok", "disposition": label }))
}

/// `POST /api/webhooks/shipping`
///
/// 200 on successful interpretation (even if no-op), 401 on a bad
/// signature, 404 for an unknown order so the sender retries nothing it
/// should, 500 on internal failure so it retries what it should.
pub async fn shipping(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let signature = headers
        .get(BITESHIP_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    match state.processor.process_shipping(&body, signature).await {
        Ok(disposition) => Ok(disposition_body(disposition)),
        Err(WebhookError::InvalidSignature) => Err(ApiError::new(
            StatusCode::UNAUTHORIZED,
            "invalid webhook signature",
        )),
        Err(WebhookError::InvalidPayload(message)) => {
            Err(ApiError::new(StatusCode::BAD_REQUEST, message))
        }
        Err(WebhookError::UnknownOrder { reference }) => Err(ApiError::new(
            StatusCode::NOT_FOUND,
            format!("no order matches courier reference {reference}"),
        )),
        Err(WebhookError::Storage(e)) => {
            error!(error = %e, "shipping webhook persistence failure");
            Err(ApiError::internal("persistence failure"))
        }
    }
}

/// `POST /api/webhooks/payment`
///
/// 200 on success, 400 on a rejected or invalid notification (including a
/// bad embedded signature), 404 for an unknown order, 500 on internal
/// failure.
pub async fn payment(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    match state.processor.process_payment(&body).await {
        Ok(disposition) => Ok(disposition_body(disposition)),
        Err(WebhookError::InvalidSignature) => Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "invalid notification signature",
        )),
        Err(WebhookError::InvalidPayload(message)) => {
            Err(ApiError::new(StatusCode::BAD_REQUEST, message))
        }
        Err(WebhookError::UnknownOrder { reference }) => Err(ApiError::new(
            StatusCode::NOT_FOUND,
            format!("no order matches {reference}"),
        )),
        Err(WebhookError::Storage(e)) => {
            error!(error = %e, "payment webhook persistence failure");
            Err(ApiError::internal("persistence failure"))
        }
    }
}
