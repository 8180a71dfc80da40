//! SQLite implementation of the order store.
//!
//! All status-affecting writes go through single transactions: the replay
//! ledger insert, the conditional order update (guarded by the expected
//! version), the history append, and the audit row land together or not at
//! all.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_query::{Expr, Func, OnConflict, Order as SortOrder, Query, SqliteQueryBuilder};
use sqlx::sqlite::SqliteRow;
use sqlx::{Acquire, Row, SqlitePool};

use crate::interfaces::order_store::{
    OrderDigest, OrderStore, PriceWrite, Result, StorageError, TransitionWrite, WaybillWrite,
};
use crate::order::{HistoryEntry, Order, OrderStatus};

use super::schema::{
    OrderHistory, Orders, WebhookAudit, WebhookLedger, CREATE_ORDERS_TABLE,
    CREATE_ORDER_HISTORY_TABLE, CREATE_WEBHOOK_AUDIT_TABLE, CREATE_WEBHOOK_LEDGER_TABLE,
};

/// SQLite implementation of [`OrderStore`].
pub struct SqliteOrderStore {
    pool: SqlitePool,
}

impl SqliteOrderStore {
    /// Create a new SQLite order store.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the database schema.
    pub async fn init(&self) -> Result<()> {
        // raw_sql: each script carries its index statements too.
        sqlx::raw_sql(CREATE_ORDERS_TABLE)
            .execute(&self.pool)
            .await?;
        sqlx::raw_sql(CREATE_ORDER_HISTORY_TABLE)
            .execute(&self.pool)
            .await?;
        sqlx::raw_sql(CREATE_WEBHOOK_AUDIT_TABLE)
            .execute(&self.pool)
            .await?;
        sqlx::raw_sql(CREATE_WEBHOOK_LEDGER_TABLE)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    fn select_order() -> sea_query::SelectStatement {
        Query::select()
            .columns([
                Orders::Id,
                Orders::OrderCode,
                Orders::Status,
                Orders::CustomerEmail,
                Orders::CustomerName,
                Orders::FarmerEmail,
                Orders::FarmerName,
                Orders::CourierOrderId,
                Orders::CourierCode,
                Orders::CourierStatus,
                Orders::WaybillId,
                Orders::CourierTrackingId,
                Orders::ShippingCost,
                Orders::Subtotal,
                Orders::TotalAmount,
                Orders::ShippedAt,
                Orders::DeliveredAt,
                Orders::CreatedAt,
                Orders::UpdatedAt,
                Orders::Version,
            ])
            .from(Orders::Table)
            .to_owned()
    }

    async fn fetch_one_where(&self, column: Orders, value: &str) -> Result<Order> {
        let query = Self::select_order()
            .and_where(Expr::col(column).eq(value))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;
        match row {
            Some(row) => order_from_row(&row),
            None => Err(StorageError::NotFound {
                key: value.to_string(),
            }),
        }
    }

    /// Insert into the replay ledger; a key collision means the event was
    /// already processed and aborts the surrounding transaction.
    async fn insert_ledger(
        tx: &mut sqlx::SqliteConnection,
        event_key: &str,
        source: &str,
    ) -> Result<()> {
        let query = Query::insert()
            .into_table(WebhookLedger::Table)
            .columns([
                WebhookLedger::EventKey,
                WebhookLedger::Source,
                WebhookLedger::ReceivedAt,
            ])
            .values_panic([
                event_key.into(),
                source.into(),
                Utc::now().to_rfc3339().into(),
            ])
            .on_conflict(
                OnConflict::column(WebhookLedger::EventKey)
                    .do_nothing()
                    .to_owned(),
            )
            .to_string(SqliteQueryBuilder);

        let result = sqlx::query(&query).execute(&mut *tx).await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::DuplicateEvent {
                event_key: event_key.to_string(),
            });
        }
        Ok(())
    }

    async fn insert_history(
        tx: &mut sqlx::SqliteConnection,
        entry: &HistoryEntry,
    ) -> Result<u64> {
        let query = Query::insert()
            .into_table(OrderHistory::Table)
            .columns([
                OrderHistory::Id,
                OrderHistory::OrderId,
                OrderHistory::Status,
                OrderHistory::Note,
                OrderHistory::Location,
                OrderHistory::Source,
                OrderHistory::TrackedAt,
            ])
            .values_panic([
                entry.id.clone().into(),
                entry.order_id.clone().into(),
                entry.status.clone().into(),
                entry.note.clone().into(),
                entry.location.clone().into(),
                entry.source.as_str().into(),
                entry.tracked_at.to_rfc3339().into(),
            ])
            .on_conflict(
                OnConflict::columns([
                    OrderHistory::OrderId,
                    OrderHistory::Status,
                    OrderHistory::TrackedAt,
                ])
                .do_nothing()
                .to_owned(),
            )
            .to_string(SqliteQueryBuilder);

        let result = sqlx::query(&query).execute(&mut *tx).await?;
        Ok(result.rows_affected())
    }

    async fn insert_audit(
        tx: &mut sqlx::SqliteConnection,
        audit: &crate::order::AuditRecord,
    ) -> Result<()> {
        let query = Query::insert()
            .into_table(WebhookAudit::Table)
            .columns([
                WebhookAudit::Id,
                WebhookAudit::OrderId,
                WebhookAudit::Source,
                WebhookAudit::EventType,
                WebhookAudit::Payload,
                WebhookAudit::ReceivedAt,
            ])
            .values_panic([
                audit.id.clone().into(),
                audit.order_id.clone().into(),
                audit.source.as_str().into(),
                audit.event_type.clone().into(),
                audit.payload.clone().into(),
                audit.received_at.to_rfc3339().into(),
            ])
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&mut *tx).await?;
        Ok(())
    }

    /// Classify a zero-row conditional update: the order either does not
    /// exist or was written concurrently since the caller read it.
    async fn classify_conflict(
        tx: &mut sqlx::SqliteConnection,
        order_id: &str,
        expected: i64,
    ) -> StorageError {
        let query = Query::select()
            .column(Orders::Id)
            .from(Orders::Table)
            .and_where(Expr::col(Orders::Id).eq(order_id))
            .to_string(SqliteQueryBuilder);

        match sqlx::query(&query).fetch_optional(&mut *tx).await {
            Ok(Some(_)) => StorageError::VersionConflict {
                order_id: order_id.to_string(),
                expected,
            },
            Ok(None) => StorageError::NotFound {
                key: order_id.to_string(),
            },
            Err(e) => StorageError::Database(e),
        }
    }
}

#[async_trait]
impl OrderStore for SqliteOrderStore {
    async fn insert(&self, order: &Order) -> Result<()> {
        let query = Query::insert()
            .into_table(Orders::Table)
            .columns([
                Orders::Id,
                Orders::OrderCode,
                Orders::Status,
                Orders::CustomerEmail,
                Orders::CustomerName,
                Orders::FarmerEmail,
                Orders::FarmerName,
                Orders::CourierOrderId,
                Orders::CourierCode,
                Orders::CourierStatus,
                Orders::WaybillId,
                Orders::CourierTrackingId,
                Orders::ShippingCost,
                Orders::Subtotal,
                Orders::TotalAmount,
                Orders::ShippedAt,
                Orders::DeliveredAt,
                Orders::CreatedAt,
                Orders::UpdatedAt,
                Orders::Version,
            ])
            .values_panic([
                order.id.clone().into(),
                order.order_code.clone().into(),
                order.status.as_str().into(),
                order.customer_email.clone().into(),
                order.customer_name.clone().into(),
                order.farmer_email.clone().into(),
                order.farmer_name.clone().into(),
                order.courier_order_id.clone().into(),
                order.courier_code.clone().into(),
                order.courier_status.clone().into(),
                order.waybill_id.clone().into(),
                order.courier_tracking_id.clone().into(),
                order.shipping_cost.into(),
                order.subtotal.into(),
                order.total_amount.into(),
                order.shipped_at.map(|t| t.to_rfc3339()).into(),
                order.delivered_at.map(|t| t.to_rfc3339()).into(),
                order.created_at.to_rfc3339().into(),
                order.updated_at.to_rfc3339().into(),
                order.version.into(),
            ])
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&self.pool).await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Order> {
        self.fetch_one_where(Orders::Id, id).await
    }

    async fn get_by_code(&self, order_code: &str) -> Result<Order> {
        self.fetch_one_where(Orders::OrderCode, order_code).await
    }

    async fn get_by_courier_order_id(&self, courier_order_id: &str) -> Result<Order> {
        self.fetch_one_where(Orders::CourierOrderId, courier_order_id)
            .await
    }

    async fn list_awaiting_delivery(&self) -> Result<Vec<Order>> {
        let query = Self::select_order()
            .and_where(Expr::col(Orders::Status).eq(OrderStatus::Shipped.as_str()))
            .and_where(Expr::col(Orders::WaybillId).is_not_null())
            .and_where(Expr::col(Orders::CourierCode).is_not_null())
            .order_by(Orders::CreatedAt, SortOrder::Asc)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(order_from_row).collect()
    }

    async fn list_completion_candidates(&self) -> Result<Vec<Order>> {
        let query = Self::select_order()
            .and_where(
                Expr::col(Orders::Status).is_in([
                    OrderStatus::Shipped.as_str(),
                    OrderStatus::Delivered.as_str(),
                ]),
            )
            .order_by(Orders::CreatedAt, SortOrder::Asc)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(order_from_row).collect()
    }

    async fn commit_transition(&self, write: &TransitionWrite) -> Result<Order> {
        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        if let Some(key) = &write.ledger_key {
            let source = write
                .audit
                .as_ref()
                .map_or("internal", |a| a.source.as_str());
            Self::insert_ledger(&mut tx, key, source).await?;
        }

        let query = {
            let mut stmt = Query::update();
            stmt.table(Orders::Table)
                .value(Orders::UpdatedAt, write.updated_at.to_rfc3339())
                .value(Orders::Version, Expr::col(Orders::Version).add(1))
                .and_where(Expr::col(Orders::Id).eq(&write.order_id))
                .and_where(Expr::col(Orders::Version).eq(write.expected_version));

            if let Some(status) = write.status {
                stmt.value(Orders::Status, status.as_str());
            }
            if let Some(courier_status) = &write.courier_status {
                stmt.value(Orders::CourierStatus, courier_status.clone());
            }
            if let Some(shipped_at) = write.shipped_at {
                stmt.value(Orders::ShippedAt, shipped_at.to_rfc3339());
            }
            if let Some(delivered_at) = write.delivered_at {
                stmt.value(Orders::DeliveredAt, delivered_at.to_rfc3339());
            }

            stmt.to_string(SqliteQueryBuilder)
        };
        let result = sqlx::query(&query).execute(&mut *tx).await?;
        if result.rows_affected() == 0 {
            return Err(
                Self::classify_conflict(&mut tx, &write.order_id, write.expected_version).await,
            );
        }

        Self::insert_history(&mut tx, &write.history).await?;

        if let Some(audit) = &write.audit {
            Self::insert_audit(&mut tx, audit).await?;
        }

        tx.commit().await?;
        drop(conn);

        self.get(&write.order_id).await
    }

    async fn commit_price(&self, write: &PriceWrite) -> Result<Order> {
        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        Self::insert_ledger(&mut tx, &write.ledger_key, write.audit.source.as_str()).await?;

        let query = Query::update()
            .table(Orders::Table)
            .value(Orders::ShippingCost, write.shipping_cost)
            .value(Orders::TotalAmount, write.total_amount)
            .value(Orders::UpdatedAt, write.updated_at.to_rfc3339())
            .value(Orders::Version, Expr::col(Orders::Version).add(1))
            .and_where(Expr::col(Orders::Id).eq(&write.order_id))
            .and_where(Expr::col(Orders::Version).eq(write.expected_version))
            .to_string(SqliteQueryBuilder);

        let result = sqlx::query(&query).execute(&mut *tx).await?;
        if result.rows_affected() == 0 {
            return Err(
                Self::classify_conflict(&mut tx, &write.order_id, write.expected_version).await,
            );
        }

        Self::insert_audit(&mut tx, &write.audit).await?;
        tx.commit().await?;
        drop(conn);

        self.get(&write.order_id).await
    }

    async fn commit_waybill(&self, write: &WaybillWrite) -> Result<Order> {
        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        Self::insert_ledger(&mut tx, &write.ledger_key, write.audit.source.as_str()).await?;

        // COALESCE keeps an already-assigned identifier (set-once semantics).
        let query = Query::update()
            .table(Orders::Table)
            .value(
                Orders::WaybillId,
                Func::coalesce([
                    Expr::col(Orders::WaybillId).into(),
                    write.waybill_id.clone().into(),
                ]),
            )
            .value(
                Orders::CourierTrackingId,
                Func::coalesce([
                    Expr::col(Orders::CourierTrackingId).into(),
                    write.courier_tracking_id.clone().into(),
                ]),
            )
            .value(Orders::UpdatedAt, write.updated_at.to_rfc3339())
            .value(Orders::Version, Expr::col(Orders::Version).add(1))
            .and_where(Expr::col(Orders::Id).eq(&write.order_id))
            .and_where(Expr::col(Orders::Version).eq(write.expected_version))
            .to_string(SqliteQueryBuilder);

        let result = sqlx::query(&query).execute(&mut *tx).await?;
        if result.rows_affected() == 0 {
            return Err(
                Self::classify_conflict(&mut tx, &write.order_id, write.expected_version).await,
            );
        }

        Self::insert_audit(&mut tx, &write.audit).await?;
        tx.commit().await?;
        drop(conn);

        self.get(&write.order_id).await
    }

    async fn append_tracking_history(&self, entries: &[HistoryEntry]) -> Result<u64> {
        if entries.is_empty() {
            return Ok(0);
        }

        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let mut inserted = 0;
        for entry in entries {
            inserted += Self::insert_history(&mut tx, entry).await?;
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn history(&self, order_id: &str) -> Result<Vec<HistoryEntry>> {
        let query = Query::select()
            .columns([
                OrderHistory::Id,
                OrderHistory::OrderId,
                OrderHistory::Status,
                OrderHistory::Note,
                OrderHistory::Location,
                OrderHistory::Source,
                OrderHistory::TrackedAt,
            ])
            .from(OrderHistory::Table)
            .and_where(Expr::col(OrderHistory::OrderId).eq(order_id))
            .order_by(OrderHistory::TrackedAt, SortOrder::Asc)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(history_from_row).collect()
    }

    async fn audit_log(&self, order_id: &str) -> Result<Vec<crate::order::AuditRecord>> {
        let query = Query::select()
            .columns([
                WebhookAudit::Id,
                WebhookAudit::OrderId,
                WebhookAudit::Source,
                WebhookAudit::EventType,
                WebhookAudit::Payload,
                WebhookAudit::ReceivedAt,
            ])
            .from(WebhookAudit::Table)
            .and_where(Expr::col(WebhookAudit::OrderId).eq(order_id))
            .order_by(WebhookAudit::ReceivedAt, SortOrder::Asc)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| {
                let source: String = row.get("source");
                Ok(crate::order::AuditRecord {
                    id: row.get("id"),
                    order_id: row.get("order_id"),
                    source: match source.as_str() {
                        "biteship" => crate::order::WebhookSource::Biteship,
                        "midtrans" => crate::order::WebhookSource::Midtrans,
                        other => {
                            return Err(StorageError::Corrupt(format!(
                                "unknown webhook source: {other}"
                            )))
                        }
                    },
                    event_type: row.get("event_type"),
                    payload: row.get("payload"),
                    received_at: parse_timestamp(&row.get::<String, _>("received_at"))?,
                })
            })
            .collect()
    }

    async fn is_event_processed(&self, event_key: &str) -> Result<bool> {
        let query = Query::select()
            .column(WebhookLedger::EventKey)
            .from(WebhookLedger::Table)
            .and_where(Expr::col(WebhookLedger::EventKey).eq(event_key))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;
        Ok(row.is_some())
    }

    async fn recent_orders(&self, limit: u64) -> Result<Vec<OrderDigest>> {
        let query = Query::select()
            .columns([
                Orders::OrderCode,
                Orders::CourierOrderId,
                Orders::Status,
                Orders::CreatedAt,
            ])
            .from(Orders::Table)
            .order_by(Orders::CreatedAt, SortOrder::Desc)
            .limit(limit)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| {
                Ok(OrderDigest {
                    order_code: row.get("order_code"),
                    courier_order_id: row.get("courier_order_id"),
                    status: parse_status(&row.get::<String, _>("status"))?,
                    created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
                })
            })
            .collect()
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StorageError::Corrupt(format!("timestamp {raw:?}: {e}")))
}

fn parse_status(raw: &str) -> Result<OrderStatus> {
    raw.parse()
        .map_err(|e: crate::order::UnknownStatus| StorageError::Corrupt(e.to_string()))
}

fn order_from_row(row: &SqliteRow) -> Result<Order> {
    Ok(Order {
        id: row.get("id"),
        order_code: row.get("order_code"),
        status: parse_status(&row.get::<String, _>("status"))?,
        customer_email: row.get("customer_email"),
        customer_name: row.get("customer_name"),
        farmer_email: row.get("farmer_email"),
        farmer_name: row.get("farmer_name"),
        courier_order_id: row.get("courier_order_id"),
        courier_code: row.get("courier_code"),
        courier_status: row.get("courier_status"),
        waybill_id: row.get("waybill_id"),
        courier_tracking_id: row.get("courier_tracking_id"),
        shipping_cost: row.get("shipping_cost"),
        subtotal: row.get("subtotal"),
        total_amount: row.get("total_amount"),
        shipped_at: row
            .get::<Option<String>, _>("shipped_at")
            .as_deref()
            .map(parse_timestamp)
            .transpose()?,
        delivered_at: row
            .get::<Option<String>, _>("delivered_at")
            .as_deref()
            .map(parse_timestamp)
            .transpose()?,
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
        updated_at: parse_timestamp(&row.get::<String, _>("updated_at"))?,
        version: row.get("version"),
    })
}

fn history_from_row(row: &SqliteRow) -> Result<HistoryEntry> {
    let source: String = row.get("source");
    Ok(HistoryEntry {
        id: row.get("id"),
        order_id: row.get("order_id"),
        status: row.get("status"),
        note: row.get("note"),
        location: row.get("location"),
        source: source
            .parse()
            .map_err(|e: crate::order::UnknownStatus| StorageError::Corrupt(e.to_string()))?,
        tracked_at: parse_timestamp(&row.get::<String, _>("tracked_at"))?,
    })
}
