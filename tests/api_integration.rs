//! HTTP API integration tests.
//!
//! Exercises the full axum router against an in-memory SQLite store via
//! `tower::ServiceExt::oneshot`, no network involved.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use sqlx::sqlite::SqlitePoolOptions;
use tower::ServiceExt;

use ecomaggie_fulfillment::clients::mock::{RecordingNotifier, ScriptedTracker};
use ecomaggie_fulfillment::config::{
    BusinessConfig, CronConfig, ReconcilerConfig, WebhookConfig,
};
use ecomaggie_fulfillment::handlers::{router, AppState};
use ecomaggie_fulfillment::interfaces::notifier::Notifier;
use ecomaggie_fulfillment::interfaces::order_store::OrderStore;
use ecomaggie_fulfillment::interfaces::tracking::TrackingLookup;
use ecomaggie_fulfillment::order::{Order, OrderStatus};
use ecomaggie_fulfillment::services::{ConfirmationService, Reconciler, TransitionApplier};
use ecomaggie_fulfillment::storage::SqliteOrderStore;
use ecomaggie_fulfillment::webhooks::signature;
use ecomaggie_fulfillment::webhooks::WebhookProcessor;

const BITESHIP_KEY: &str = "biteship-test-key";
const MIDTRANS_KEY: &str = "midtrans-test-key";
const CRON_SECRET: &str = "cron-test-secret";

struct Fixture {
    store: Arc<SqliteOrderStore>,
    app: axum::Router,
}

async fn setup() -> Fixture {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory pool");
    let store = Arc::new(SqliteOrderStore::new(pool));
    store.init().await.expect("schema init");

    let dyn_store: Arc<dyn OrderStore> = Arc::clone(&store) as Arc<dyn OrderStore>;
    let notifier = Arc::new(RecordingNotifier::default());
    let tracker = Arc::new(ScriptedTracker::default());

    let applier = Arc::new(TransitionApplier::new(
        Arc::clone(&dyn_store),
        Arc::clone(&notifier) as Arc<dyn Notifier>,
        BusinessConfig::default(),
    ));
    let processor = Arc::new(WebhookProcessor::new(
        Arc::clone(&dyn_store),
        Arc::clone(&applier),
        WebhookConfig {
            biteship_signature_key: Some(BITESHIP_KEY.to_string()),
            midtrans_server_key: Some(MIDTRANS_KEY.to_string()),
        },
    ));
    let reconciler = Arc::new(Reconciler::new(
        Arc::clone(&dyn_store),
        Arc::clone(&applier),
        Arc::clone(&tracker) as Arc<dyn TrackingLookup>,
        ReconcilerConfig {
            lookup_delay_ms: 0,
            lookup_timeout_secs: 1,
            ..ReconcilerConfig::default()
        },
    ));
    let confirmation = Arc::new(ConfirmationService::new(
        Arc::clone(&dyn_store),
        Arc::clone(&applier),
    ));

    let state = AppState {
        store: dyn_store,
        processor,
        reconciler,
        confirmation,
        cron: CronConfig {
            secret: Some(CRON_SECRET.to_string()),
        },
    };

    Fixture {
        store,
        app: router(state),
    }
}

async fn seed(store: &SqliteOrderStore, code: &str, status: OrderStatus) -> Order {
    let mut order = Order::new(
        code,
        "buyer@example.com",
        "Budi",
        "farmer@example.com",
        "Pak Tani",
        100_000,
        15_000,
    );
    order.status = status;
    order.courier_order_id = Some(format!("bs-{code}"));
    store.insert(&order).await.expect("seed order");
    order
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}

fn post(uri: &str) -> axum::http::request::Builder {
    Request::builder().method("POST").uri(uri)
}

#[tokio::test]
async fn health_returns_ok() {
    let fx = setup().await;
    let response = fx
        .app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn signed_shipping_webhook_moves_the_order() {
    let fx = setup().await;
    let order = seed(&fx.store, "ECO100", OrderStatus::Processing).await;

    let body = format!(
        r#"{{"event":"order.status","order":{{"id":"{}","status":"picked"}}}}"#,
        order.courier_order_id.as_deref().expect("courier id")
    );
    let sig = signature::sign_biteship(BITESHIP_KEY, body.as_bytes());

    let response = fx
        .app
        .oneshot(
            post("/api/webhooks/shipping")
                .header("x-biteship-signature", sig)
                .header("content-type", "application/json")
                .body(Body::from(body))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["disposition"], "applied:shipped");

    let updated = fx.store.get(&order.id).await.expect("reload");
    assert_eq!(updated.status, OrderStatus::Shipped);
}

#[tokio::test]
async fn unsigned_shipping_webhook_is_unauthorized() {
    let fx = setup().await;
    let order = seed(&fx.store, "ECO101", OrderStatus::Processing).await;

    let body = format!(
        r#"{{"event":"order.status","order":{{"id":"{}","status":"picked"}}}}"#,
        order.courier_order_id.as_deref().expect("courier id")
    );

    let response = fx
        .app
        .clone()
        .oneshot(
            post("/api/webhooks/shipping")
                .header("content-type", "application/json")
                .body(Body::from(body.clone()))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = fx
        .app
        .oneshot(
            post("/api/webhooks/shipping")
                .header("x-biteship-signature", "deadbeef")
                .header("content-type", "application/json")
                .body(Body::from(body))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let unchanged = fx.store.get(&order.id).await.expect("reload");
    assert_eq!(unchanged.status, OrderStatus::Processing);
}

#[tokio::test]
async fn shipping_webhook_for_unknown_order_is_not_found() {
    let fx = setup().await;

    let body = r#"{"event":"order.status","order":{"id":"bs-nope","status":"picked"}}"#;
    let sig = signature::sign_biteship(BITESHIP_KEY, body.as_bytes());

    let response = fx
        .app
        .oneshot(
            post("/api/webhooks/shipping")
                .header("x-biteship-signature", sig)
                .header("content-type", "application/json")
                .body(Body::from(body))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_shipping_payload_is_bad_request() {
    let fx = setup().await;

    let body = r#"{"event":"order.refund","order":{"id":"bs-1"}}"#;
    let sig = signature::sign_biteship(BITESHIP_KEY, body.as_bytes());

    let response = fx
        .app
        .oneshot(
            post("/api/webhooks/shipping")
                .header("x-biteship-signature", sig)
                .header("content-type", "application/json")
                .body(Body::from(body))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn settled_payment_webhook_pays_the_order() {
    let fx = setup().await;
    let order = seed(&fx.store, "ECO102", OrderStatus::Pending).await;

    let sig = signature::midtrans_signature("ECO102", "200", "115000.00", MIDTRANS_KEY);
    let body = format!(
        r#"{{"order_id":"ECO102","transaction_status":"settlement","transaction_id":"txn-9","status_code":"200","gross_amount":"115000.00","signature_key":"{sig}"}}"#
    );

    let response = fx
        .app
        .oneshot(
            post("/api/webhooks/payment")
                .header("content-type", "application/json")
                .body(Body::from(body))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let updated = fx.store.get(&order.id).await.expect("reload");
    assert_eq!(updated.status, OrderStatus::Paid);
}

#[tokio::test]
async fn payment_webhook_with_bad_signature_is_bad_request() {
    let fx = setup().await;
    let order = seed(&fx.store, "ECO103", OrderStatus::Pending).await;

    let body = r#"{"order_id":"ECO103","transaction_status":"settlement","transaction_id":"txn-9","status_code":"200","gross_amount":"115000.00","signature_key":"bogus"}"#;

    let response = fx
        .app
        .oneshot(
            post("/api/webhooks/payment")
                .header("content-type", "application/json")
                .body(Body::from(body))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let unchanged = fx.store.get(&order.id).await.expect("reload");
    assert_eq!(unchanged.status, OrderStatus::Pending);
}

#[tokio::test]
async fn cron_endpoints_require_the_shared_secret() {
    let fx = setup().await;

    // No credential.
    let response = fx
        .app
        .clone()
        .oneshot(
            post("/api/cron/check-delivery")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Wrong credential.
    let response = fx
        .app
        .clone()
        .oneshot(
            post("/api/cron/auto-complete")
                .header("x-cron-secret", "wrong")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Header form.
    let response = fx
        .app
        .clone()
        .oneshot(
            post("/api/cron/check-delivery")
                .header("x-cron-secret", CRON_SECRET)
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    // Bearer form.
    let response = fx
        .app
        .oneshot(
            post("/api/cron/auto-complete")
                .header("authorization", format!("Bearer {CRON_SECRET}"))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["scanned"], 0);
    assert_eq!(json["applied"], 0);
}

#[tokio::test]
async fn confirm_delivery_requires_identity() {
    let fx = setup().await;
    seed(&fx.store, "ECO104", OrderStatus::Shipped).await;

    let response = fx
        .app
        .oneshot(
            post("/api/orders/confirm-delivery")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"orderCode":"ECO104"}"#))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn confirm_delivery_localizes_not_found() {
    let fx = setup().await;

    let response = fx
        .app
        .oneshot(
            post("/api/orders/confirm-delivery")
                .header("x-user-email", "buyer@example.com")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"orderCode":"ECO999"}"#))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let json = body_json(response).await;
    assert_eq!(json["error"], "Pesanan tidak ditemukan");
}

#[tokio::test]
async fn confirm_delivery_forbids_other_customers() {
    let fx = setup().await;
    seed(&fx.store, "ECO105", OrderStatus::Shipped).await;

    let response = fx
        .app
        .oneshot(
            post("/api/orders/confirm-delivery")
                .header("x-user-email", "intruder@example.com")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"orderCode":"ECO105"}"#))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let json = body_json(response).await;
    assert_eq!(json["error"], "Anda tidak memiliki akses ke pesanan ini");
}

#[tokio::test]
async fn confirm_delivery_rejects_wrong_status_with_localized_message() {
    let fx = setup().await;
    seed(&fx.store, "ECO106", OrderStatus::Processing).await;

    let response = fx
        .app
        .oneshot(
            post("/api/orders/confirm-delivery")
                .header("x-user-email", "buyer@example.com")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"orderCode":"ECO106"}"#))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = body_json(response).await;
    let message = json["error"].as_str().expect("error message");
    assert!(message.contains("belum bisa dikonfirmasi"));
    assert!(message.contains("processing"));
}

#[tokio::test]
async fn confirm_delivery_completes_a_shipped_order() {
    let fx = setup().await;
    let order = seed(&fx.store, "ECO107", OrderStatus::Shipped).await;

    let response = fx
        .app
        .oneshot(
            post("/api/orders/confirm-delivery")
                .header("x-user-email", "buyer@example.com")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"orderCode":"ECO107"}"#))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["order"]["status"], "completed");

    let updated = fx.store.get(&order.id).await.expect("reload");
    assert_eq!(updated.status, OrderStatus::Completed);
    assert!(updated.delivered_at.is_some());
}

#[tokio::test]
async fn get_order_returns_record_and_history() {
    let fx = setup().await;
    let order = seed(&fx.store, "ECO108", OrderStatus::Processing).await;

    let body = format!(
        r#"{{"event":"order.status","order":{{"id":"{}","status":"picked"}}}}"#,
        order.courier_order_id.as_deref().expect("courier id")
    );
    let sig = signature::sign_biteship(BITESHIP_KEY, body.as_bytes());
    fx.app
        .clone()
        .oneshot(
            post("/api/webhooks/shipping")
                .header("x-biteship-signature", sig)
                .header("content-type", "application/json")
                .body(Body::from(body))
                .expect("request"),
        )
        .await
        .expect("webhook response");

    let response = fx
        .app
        .oneshot(
            Request::builder()
                .uri("/api/orders/ECO108")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["order"]["orderCode"], "ECO108");
    assert_eq!(json["order"]["status"], "shipped");
    let history = json["history"].as_array().expect("history array");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["status"], "shipped");
    assert_eq!(history[0]["source"], "webhook");
}

#[tokio::test]
async fn get_unknown_order_is_not_found() {
    let fx = setup().await;

    let response = fx
        .app
        .oneshot(
            Request::builder()
                .uri("/api/orders/ECO999")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
