//! Midtrans payment notification payloads and their normalization.

use serde::Deserialize;

use crate::order::OrderStatus;

/// Inbound payment gateway notification.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentNotification {
    /// The marketplace order code (our `order_code`).
    pub order_id: String,
    pub transaction_status: String,
    pub transaction_id: Option<String>,
    pub payment_type: Option<String>,
    pub fraud_status: Option<String>,
    /// Decimal string, e.g. `"115000.00"`.
    pub gross_amount: Option<String>,
    pub status_code: Option<String>,
    /// Embedded SHA-512 signature.
    pub signature_key: Option<String>,
}

impl PaymentNotification {
    /// Replay-ledger key: one per gateway transaction and status, so a
    /// re-sent notification is recognized and a later status for the same
    /// transaction is not.
    #[must_use]
    pub fn event_key(&self) -> String {
        let transaction = self.transaction_id.as_deref().unwrap_or(&self.order_id);
        format!("midtrans:{}:{}", transaction, self.transaction_status)
    }
}

/// The internal update a payment notification asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentIntent {
    /// Payment settled; move to `paid`.
    Transition(OrderStatus),
    /// Nothing conclusive yet (pending, fraud challenge); record only.
    Record,
}

/// Map the gateway's transaction/fraud status pair onto the lifecycle.
#[must_use]
pub fn payment_intent(transaction_status: &str, fraud_status: Option<&str>) -> PaymentIntent {
    match transaction_status {
        "capture" => match fraud_status {
            Some("accept") | None => PaymentIntent::Transition(OrderStatus::Paid),
            Some("challenge") => PaymentIntent::Record,
            Some(_) => PaymentIntent::Transition(OrderStatus::Cancelled),
        },
        "settlement" => PaymentIntent::Transition(OrderStatus::Paid),
        "deny" | "cancel" | "expire" | "failure" => {
            PaymentIntent::Transition(OrderStatus::Cancelled)
        }
        _ => PaymentIntent::Record,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settled_and_accepted_captures_pay_the_order() {
        assert_eq!(
            payment_intent("settlement", None),
            PaymentIntent::Transition(OrderStatus::Paid)
        );
        assert_eq!(
            payment_intent("capture", Some("accept")),
            PaymentIntent::Transition(OrderStatus::Paid)
        );
    }

    #[test]
    fn failed_payments_cancel_the_order() {
        for status in ["deny", "cancel", "expire", "failure"] {
            assert_eq!(
                payment_intent(status, None),
                PaymentIntent::Transition(OrderStatus::Cancelled)
            );
        }
        assert_eq!(
            payment_intent("capture", Some("deny")),
            PaymentIntent::Transition(OrderStatus::Cancelled)
        );
    }

    #[test]
    fn inconclusive_statuses_are_recorded_only() {
        assert_eq!(payment_intent("pending", None), PaymentIntent::Record);
        assert_eq!(
            payment_intent("capture", Some("challenge")),
            PaymentIntent::Record
        );
        assert_eq!(payment_intent("refund", None), PaymentIntent::Record);
    }

    #[test]
    fn event_key_prefers_the_gateway_transaction_id() {
        let notification: PaymentNotification = serde_json::from_str(
            r#"{"order_id":"ECO001","transaction_status":"settlement","transaction_id":"txn-1"}"#,
        )
        .expect("valid payload");
        assert_eq!(notification.event_key(), "midtrans:txn-1:settlement");

        let notification: PaymentNotification = serde_json::from_str(
            r#"{"order_id":"ECO001","transaction_status":"pending"}"#,
        )
        .expect("valid payload");
        assert_eq!(notification.event_key(), "midtrans:ECO001:pending");
    }
}
