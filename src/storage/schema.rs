//! Database schema definitions using sea-query.
//!
//! These define the table and column identifiers for type-safe query building.

use sea_query::Iden;

/// Orders table schema.
#[derive(Iden)]
pub enum Orders {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "order_code"]
    OrderCode,
    #[iden = "status"]
    Status,
    #[iden = "customer_email"]
    CustomerEmail,
    #[iden = "customer_name"]
    CustomerName,
    #[iden = "farmer_email"]
    FarmerEmail,
    #[iden = "farmer_name"]
    FarmerName,
    #[iden = "courier_order_id"]
    CourierOrderId,
    #[iden = "courier_code"]
    CourierCode,
    #[iden = "courier_status"]
    CourierStatus,
    #[iden = "waybill_id"]
    WaybillId,
    #[iden = "courier_tracking_id"]
    CourierTrackingId,
    #[iden = "shipping_cost"]
    ShippingCost,
    #[iden = "subtotal"]
    Subtotal,
    #[iden = "total_amount"]
    TotalAmount,
    #[iden = "shipped_at"]
    ShippedAt,
    #[iden = "delivered_at"]
    DeliveredAt,
    #[iden = "created_at"]
    CreatedAt,
    #[iden = "updated_at"]
    UpdatedAt,
    #[iden = "version"]
    Version,
}

/// Status history table schema.
#[derive(Iden)]
pub enum OrderHistory {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "order_id"]
    OrderId,
    #[iden = "status"]
    Status,
    #[iden = "note"]
    Note,
    #[iden = "location"]
    Location,
    #[iden = "source"]
    Source,
    #[iden = "tracked_at"]
    TrackedAt,
}

/// Webhook audit log table schema.
#[derive(Iden)]
pub enum WebhookAudit {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "order_id"]
    OrderId,
    #[iden = "source"]
    Source,
    #[iden = "event_type"]
    EventType,
    #[iden = "payload"]
    Payload,
    #[iden = "received_at"]
    ReceivedAt,
}

/// Webhook replay ledger table schema.
#[derive(Iden)]
pub enum WebhookLedger {
    Table,
    #[iden = "event_key"]
    EventKey,
    #[iden = "source"]
    Source,
    #[iden = "received_at"]
    ReceivedAt,
}

/// SQL for creating the orders table.
pub const CREATE_ORDERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS orders (
    id TEXT PRIMARY KEY,
    order_code TEXT NOT NULL UNIQUE,
    status TEXT NOT NULL,
    customer_email TEXT NOT NULL,
    customer_name TEXT NOT NULL,
    farmer_email TEXT NOT NULL,
    farmer_name TEXT NOT NULL,
    courier_order_id TEXT,
    courier_code TEXT,
    courier_status TEXT,
    waybill_id TEXT,
    courier_tracking_id TEXT,
    shipping_cost INTEGER NOT NULL,
    subtotal INTEGER NOT NULL,
    total_amount INTEGER NOT NULL,
    shipped_at TEXT,
    delivered_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    version INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_orders_status ON orders(status);
CREATE INDEX IF NOT EXISTS idx_orders_courier_order_id ON orders(courier_order_id);
"#;

/// SQL for creating the status history table.
///
/// The unique constraint backs the on-conflict-do-nothing deduplication of
/// externally-reported tracking batches.
pub const CREATE_ORDER_HISTORY_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS order_history (
    id TEXT PRIMARY KEY,
    order_id TEXT NOT NULL,
    status TEXT NOT NULL,
    note TEXT,
    location TEXT,
    source TEXT NOT NULL,
    tracked_at TEXT NOT NULL,
    UNIQUE (order_id, status, tracked_at)
);

CREATE INDEX IF NOT EXISTS idx_order_history_order_id ON order_history(order_id);
"#;

/// SQL for creating the webhook audit log table.
pub const CREATE_WEBHOOK_AUDIT_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS webhook_audit (
    id TEXT PRIMARY KEY,
    order_id TEXT NOT NULL,
    source TEXT NOT NULL,
    event_type TEXT NOT NULL,
    payload TEXT NOT NULL,
    received_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_webhook_audit_order_id ON webhook_audit(order_id);
"#;

/// SQL for creating the webhook replay ledger table.
pub const CREATE_WEBHOOK_LEDGER_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS webhook_ledger (
    event_key TEXT PRIMARY KEY,
    source TEXT NOT NULL,
    received_at TEXT NOT NULL
);
"#;
