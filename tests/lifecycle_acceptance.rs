//! End-to-end lifecycle scenarios.
//!
//! Drives webhook processing, the reconciler polls, and manual confirmation
//! against one shared in-memory store, the way the deployed system mixes
//! them on a single order.

use std::sync::Arc;

use sqlx::sqlite::SqlitePoolOptions;

use ecomaggie_fulfillment::clients::mock::{RecordingNotifier, ScriptedTracker};
use ecomaggie_fulfillment::config::{BusinessConfig, ReconcilerConfig, WebhookConfig};
use ecomaggie_fulfillment::interfaces::notifier::{NotificationKind, Notifier};
use ecomaggie_fulfillment::interfaces::order_store::OrderStore;
use ecomaggie_fulfillment::interfaces::tracking::{ShipmentTracking, TrackingEvent, TrackingLookup};
use ecomaggie_fulfillment::order::{Order, OrderStatus, TransitionSource};
use ecomaggie_fulfillment::services::{ConfirmationService, Reconciler, TransitionApplier};
use ecomaggie_fulfillment::storage::SqliteOrderStore;
use ecomaggie_fulfillment::webhooks::{Disposition, WebhookProcessor};

struct World {
    store: Arc<SqliteOrderStore>,
    notifier: Arc<RecordingNotifier>,
    tracker: Arc<ScriptedTracker>,
    processor: WebhookProcessor,
    reconciler: Reconciler,
    confirmation: ConfirmationService,
}

async fn setup() -> World {
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
    // No signature keys: these scenarios exercise interpretation, the
    // signature paths have their own tests.
    let processor = WebhookProcessor::new(
        Arc::clone(&dyn_store),
        Arc::clone(&applier),
        WebhookConfig::default(),
    );
    let config = ReconcilerConfig {
        lookup_delay_ms: 0,
        lookup_timeout_secs: 1,
        ..ReconcilerConfig::default()
    };
    let reconciler = Reconciler::new(
        Arc::clone(&dyn_store),
        Arc::clone(&applier),
        Arc::clone(&tracker) as Arc<dyn TrackingLookup>,
        config,
    );
    let confirmation = ConfirmationService::new(Arc::clone(&dyn_store), applier);

    World {
        store,
        notifier,
        tracker,
        processor,
        reconciler,
        confirmation,
    }
}

async fn seed(world: &World, code: &str, status: OrderStatus) -> Order {
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
    order.courier_code = Some("jne".to_string());
    world.store.insert(&order).await.expect("seed order");
    order
}

fn shipping_body(courier_order_id: &str, event: &str, extra: &str) -> Vec<u8> {
    format!(r#"{{"event":"{event}","order":{{"id":"{courier_order_id}"{extra}}}}}"#).into_bytes()
}

#[tokio::test]
async fn full_courier_reported_lifecycle() {
    let world = setup().await;
    let order = seed(&world, "ECO001", OrderStatus::Pending).await;
    let courier_id = order.courier_order_id.clone().expect("courier id");

    // Payment settles.
    let payment = br#"{"order_id":"ECO001","transaction_status":"settlement","transaction_id":"txn-1"}"#;
    let disposition = world
        .processor
        .process_payment(payment)
        .await
        .expect("payment");
    assert_eq!(disposition, Disposition::Applied(OrderStatus::Paid));

    // Seller-side stages (confirmed, processing) are owned by the
    // marketplace app. The courier reports pickup directly: paid -> shipped
    // is a legal forward skip.
    let picked = shipping_body(&courier_id, "order.status", r#","status":"picked""#);
    let disposition = world
        .processor
        .process_shipping(&picked, None)
        .await
        .expect("picked webhook");
    assert_eq!(disposition, Disposition::Applied(OrderStatus::Shipped));

    // Waybill arrives.
    let waybill = shipping_body(
        &courier_id,
        "order.waybill_id",
        r#","courier":{"waybill_id":"WB-1","tracking_id":"TRK-1"}"#,
    );
    world
        .processor
        .process_shipping(&waybill, None)
        .await
        .expect("waybill webhook");

    // The delivery poll finds the courier reporting delivered.
    let tracked_at = "2026-08-20T03:15:00Z".parse().expect("timestamp");
    world.tracker.script(
        "WB-1",
        ShipmentTracking {
            status: "delivered".to_string(),
            history: vec![TrackingEvent {
                status: "delivered".to_string(),
                note: Some("Diterima oleh penghuni".to_string()),
                location: None,
                tracked_at,
            }],
        },
    );
    let report = world.reconciler.check_deliveries().await.expect("poll");
    assert_eq!(report.applied, 1);

    let delivered = world.store.get(&order.id).await.expect("reload");
    assert_eq!(delivered.status, OrderStatus::Delivered);
    assert!(delivered.shipped_at.is_some());
    assert!(delivered.delivered_at.is_some());

    // The customer never confirms; past the grace window the
    // auto-completion poll closes the order.
    let past_grace = delivered.updated_at
        + ReconcilerConfig::default().grace_window()
        + chrono::Duration::seconds(1);
    let report = world
        .reconciler
        .auto_complete_at(past_grace)
        .await
        .expect("auto-complete");
    assert_eq!(report.applied, 1);

    let completed = world.store.get(&order.id).await.expect("reload");
    assert_eq!(completed.status, OrderStatus::Completed);

    // Notifications: delivered pair to the customer, then completion to
    // the customer and earnings (95% of subtotal) to the farmer.
    let sent = world.notifier.sent();
    let kinds: Vec<NotificationKind> = sent.iter().map(|n| n.kind).collect();
    assert_eq!(
        kinds,
        vec![
            NotificationKind::OrderDelivered,
            NotificationKind::ConfirmDeliveryReminder,
            NotificationKind::OrderCompleted,
            NotificationKind::EarningsCredited,
        ]
    );
    let earnings = sent.last().expect("earnings notification");
    assert_eq!(earnings.recipient, "farmer@example.com");
    assert_eq!(earnings.context["netEarnings"], 95_000);

    // The full paper trail survives.
    let history = world.store.history(&order.id).await.expect("history");
    let statuses: Vec<&str> = history.iter().map(|h| h.status.as_str()).collect();
    assert!(statuses.contains(&"paid"));
    assert!(statuses.contains(&"shipped"));
    assert!(statuses.contains(&"delivered"));
    assert!(statuses.contains(&"completed"));
    assert!(history
        .iter()
        .any(|h| h.status == "completed" && h.source == TransitionSource::Cron));
}

#[tokio::test]
async fn customer_confirms_before_the_courier_reports() {
    let world = setup().await;
    let order = seed(&world, "ECO002", OrderStatus::Shipped).await;

    let confirmed = world
        .confirmation
        .confirm_delivery("ECO002", "buyer@example.com")
        .await
        .expect("confirm");
    assert_eq!(confirmed.status, OrderStatus::Completed);
    assert!(confirmed.delivered_at.is_some());

    // The courier's late delivered report is now a backward move; it must
    // be absorbed without disturbing the completed order.
    let courier_id = order.courier_order_id.clone().expect("courier id");
    let late = shipping_body(&courier_id, "order.status", r#","status":"delivered""#);
    let disposition = world
        .processor
        .process_shipping(&late, None)
        .await
        .expect("late webhook");
    assert_eq!(disposition, Disposition::Recorded);

    let unchanged = world.store.get(&order.id).await.expect("reload");
    assert_eq!(unchanged.status, OrderStatus::Completed);

    // The raw courier report still landed as history context.
    let history = world.store.history(&order.id).await.expect("history");
    assert!(history
        .iter()
        .any(|h| h.status == "delivered" && h.source == TransitionSource::Webhook));
}

#[tokio::test]
async fn replayed_webhook_is_absorbed_once() {
    let world = setup().await;
    let order = seed(&world, "ECO003", OrderStatus::Processing).await;
    let courier_id = order.courier_order_id.clone().expect("courier id");

    let picked = shipping_body(&courier_id, "order.status", r#","status":"picked""#);
    let first = world
        .processor
        .process_shipping(&picked, None)
        .await
        .expect("first delivery");
    assert_eq!(first, Disposition::Applied(OrderStatus::Shipped));

    let replay = world
        .processor
        .process_shipping(&picked, None)
        .await
        .expect("replay");
    assert_eq!(replay, Disposition::Duplicate);

    let history = world.store.history(&order.id).await.expect("history");
    assert_eq!(history.len(), 1);
    let audit = world.store.audit_log(&order.id).await.expect("audit");
    assert_eq!(audit.len(), 1);
}

#[tokio::test]
async fn cancelled_payment_releases_the_order() {
    let world = setup().await;
    let order = seed(&world, "ECO004", OrderStatus::Pending).await;

    let expired = br#"{"order_id":"ECO004","transaction_status":"expire","transaction_id":"txn-4"}"#;
    let disposition = world
        .processor
        .process_payment(expired)
        .await
        .expect("expire notification");
    assert_eq!(disposition, Disposition::Applied(OrderStatus::Cancelled));

    let cancelled = world.store.get(&order.id).await.expect("reload");
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert!(cancelled.is_terminal());

    // Terminal orders ignore later courier traffic.
    let courier_id = order.courier_order_id.clone().expect("courier id");
    let picked = shipping_body(&courier_id, "order.status", r#","status":"picked""#);
    let disposition = world
        .processor
        .process_shipping(&picked, None)
        .await
        .expect("late courier webhook");
    assert_eq!(disposition, Disposition::Recorded);

    let unchanged = world.store.get(&order.id).await.expect("reload");
    assert_eq!(unchanged.status, OrderStatus::Cancelled);
}
