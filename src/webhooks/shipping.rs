//! Biteship shipping webhook payloads and their normalization.

use serde::Deserialize;

use crate::order::OrderStatus;

/// Inbound shipping webhook body.
#[derive(Debug, Clone, Deserialize)]
pub struct ShippingEvent {
    /// Event type: `order.status`, `order.price`, or `order.waybill_id`.
    pub event: String,
    pub order: ShippingOrder,
}

/// Order sub-object of a shipping event.
#[derive(Debug, Clone, Deserialize)]
pub struct ShippingOrder {
    /// Biteship's own order id; the webhook correlation key.
    pub id: String,
    /// Courier-vocabulary status (`order.status` events).
    pub status: Option<String>,
    /// Revised courier-quoted shipping price in rupiah (`order.price`).
    pub price: Option<i64>,
    /// Courier identifiers (`order.waybill_id`).
    pub courier: Option<CourierIds>,
}

/// Courier identifiers delivered by `order.waybill_id` events.
#[derive(Debug, Clone, Deserialize)]
pub struct CourierIds {
    pub waybill_id: Option<String>,
    pub tracking_id: Option<String>,
}

/// The internal update a shipping event asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShippingIntent {
    /// Courier status report. `mapped` is the internal status the fixed
    /// lookup table assigns, when it assigns one; the raw courier status is
    /// recorded either way.
    Status {
        courier_status: String,
        mapped: Option<OrderStatus>,
    },
    /// Courier revised the shipping price.
    Price { courier_price: i64 },
    /// Courier issued waybill/tracking identifiers.
    Waybill {
        waybill_id: Option<String>,
        tracking_id: Option<String>,
    },
}

impl ShippingEvent {
    /// Extract the status-update intent, or explain why the payload cannot
    /// carry one.
    pub fn intent(&self) -> Result<ShippingIntent, String> {
        match self.event.as_str() {
            "order.status" => {
                let courier_status = self
                    .order
                    .status
                    .clone()
                    .ok_or("order.status event without a status field")?;
                let mapped = OrderStatus::from_courier_status(&courier_status);
                Ok(ShippingIntent::Status {
                    courier_status,
                    mapped,
                })
            }
            "order.price" => {
                let courier_price = self
                    .order
                    .price
                    .ok_or("order.price event without a price field")?;
                Ok(ShippingIntent::Price { courier_price })
            }
            "order.waybill_id" => {
                let courier = self
                    .order
                    .courier
                    .clone()
                    .ok_or("order.waybill_id event without courier identifiers")?;
                Ok(ShippingIntent::Waybill {
                    waybill_id: courier.waybill_id,
                    tracking_id: courier.tracking_id,
                })
            }
            other => Err(format!("unsupported shipping event type: {other}")),
        }
    }
}
