//! Cron trigger endpoints for external schedulers.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use tracing::error;

use crate::config::CronConfig;
use crate::services::RunReport;

use super::{ApiError, AppState};

const CRON_SECRET_HEADER: &str = "x-cron-secret";

/// Compare the shared secret against `x-cron-secret` or a bearer token.
/// With no secret configured every request is rejected.
fn authorize(config: &CronConfig, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = &config.secret else {
        return Err(ApiError::new(
            StatusCode::UNAUTHORIZED,
            "cron trigger disabled: no secret configured",
        ));
    };

    let from_header = headers
        .get(CRON_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|provided| provided == expected);
    let from_bearer = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|provided| provided == expected);

    if from_header || from_bearer {
        Ok(())
    } else {
        Err(ApiError::new(StatusCode::UNAUTHORIZED, "invalid cron secret"))
    }
}

/// `POST /api/cron/check-delivery` — run the delivery-status poll.
pub async fn check_delivery(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<RunReport>, ApiError> {
    authorize(&state.cron, &headers)?;

    state
        .reconciler
        .check_deliveries()
        .await
        .map(Json)
        .map_err(|e| {
            error!(error = %e, "delivery-status poll failed");
            ApiError::internal("delivery-status poll failed")
        })
}

/// `POST /api/cron/auto-complete` — run the auto-completion poll.
pub async fn auto_complete(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<RunReport>, ApiError> {
    authorize(&state.cron, &headers)?;

    state
        .reconciler
        .auto_complete()
        .await
        .map(Json)
        .map_err(|e| {
            error!(error = %e, "auto-completion poll failed");
            ApiError::internal("auto-completion poll failed")
        })
}
