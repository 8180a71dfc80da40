//! Customer-facing order endpoints.
//!
//! Error messages on the confirmation path are customer-visible and stay in
//! Indonesian; internal failures keep English messages.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::error;

use crate::services::ConfirmError;

use super::{ApiError, AppState};

const USER_EMAIL_HEADER: &str = "x-user-email";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmDeliveryRequest {
    // The mobile client sends `orderId`; it carries the human-facing code.
    #[serde(alias = "orderId")]
    pub order_code: String,
}

/// `POST /api/orders/confirm-delivery`
///
/// The caller's identity arrives in `x-user-email` (the API gateway
/// authenticates upstream and forwards the verified address).
pub async fn confirm_delivery(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ConfirmDeliveryRequest>,
) -> Result<Json<Value>, ApiError> {
    let Some(email) = headers
        .get(USER_EMAIL_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
    else {
        return Err(ApiError::new(
            StatusCode::UNAUTHORIZED,
            "Anda harus masuk terlebih dahulu",
        ));
    };

    match state
        .confirmation
        .confirm_delivery(&request.order_code, email)
        .await
    {
        Ok(order) => Ok(Json(json!({
            "message": "Pesanan telah dikonfirmasi diterima",
            "order": order,
        }))),
        Err(ConfirmError::NotFound { .. }) => Err(ApiError::new(
            StatusCode::NOT_FOUND,
            "Pesanan tidak ditemukan",
        )),
        Err(ConfirmError::Forbidden) => Err(ApiError::new(
            StatusCode::FORBIDDEN,
            "Anda tidak memiliki akses ke pesanan ini",
        )),
        Err(ConfirmError::InvalidState { current }) => Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            format!("Pesanan belum bisa dikonfirmasi (status saat ini: {current})"),
        )),
        Err(ConfirmError::Transition(e)) => {
            error!(error = %e, order_code = %request.order_code, "confirmation failed");
            Err(ApiError::internal("confirmation failed"))
        }
    }
}

/// `GET /api/orders/{order_code}` — order record plus its status history.
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_code): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let order = state.store.get_by_code(&order_code).await?;
    let history = state.store.history(&order.id).await?;
    Ok(Json(json!({ "order": order, "history": history })))
}
