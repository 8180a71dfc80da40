//! Fulfillment lifecycle states and the transition table.
//!
//! Every status change in the system goes through
//! [`OrderStatus::can_transition_to`]; call sites never compare status
//! strings directly. The lifecycle is forward-only with skips allowed
//! (e.g. `shipped -> completed` for customer self-confirmation), and
//! `cancelled` absorbs from any non-terminal state.

use serde::{Deserialize, Serialize};

/// Internal order status enumeration.
///
/// Courier-side statuses are a finer vocabulary and are kept separately on
/// the order (`courier_status`); only the mapped subset moves this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Created at checkout, payment not yet settled.
    Pending,
    /// Payment settled by the gateway.
    Paid,
    /// Accepted by the farmer.
    Confirmed,
    /// Being prepared.
    Processing,
    /// Ready for customer pickup (alternative to courier delivery).
    ReadyPickup,
    /// Handed to the courier.
    Shipped,
    /// Courier reported delivery.
    Delivered,
    /// Receipt confirmed (by the customer or by the grace-window poller).
    Completed,
    /// Absorbing failure state.
    Cancelled,
}

impl OrderStatus {
    /// Position in the fulfillment ordering. `ReadyPickup` and `Shipped`
    /// are alternatives at the same stage, not successive ones.
    const fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Paid => 1,
            Self::Confirmed => 2,
            Self::Processing => 3,
            Self::ReadyPickup | Self::Shipped => 4,
            Self::Delivered => 5,
            Self::Completed => 6,
            Self::Cancelled => 7,
        }
    }

    /// Returns true if no further transitions are permitted.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Returns true if the move from `self` to `target` is a permitted
    /// transition: strictly forward in the lifecycle, or into `cancelled`
    /// from any non-terminal state. Same-status re-application is not a
    /// transition; the applier short-circuits it before consulting this.
    #[must_use]
    pub fn can_transition_to(self, target: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        if matches!(target, Self::Cancelled) {
            return true;
        }
        self.rank() < target.rank()
    }

    /// Maps the courier's status vocabulary onto the internal lifecycle.
    /// Unmapped courier statuses are recorded verbatim on the order without
    /// forcing an internal transition.
    #[must_use]
    pub fn from_courier_status(status: &str) -> Option<Self> {
        match status {
            "picked" => Some(Self::Shipped),
            "delivered" => Some(Self::Delivered),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Wire/storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Confirmed => "confirmed",
            Self::Processing => "processing",
            Self::ReadyPickup => "ready_pickup",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl Default for OrderStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a stored or inbound status string is not part of the
/// lifecycle enumeration.
#[derive(Debug, thiserror::Error)]
#[error("unknown order status: {0}")]
pub struct UnknownStatus(pub String);

impl std::str::FromStr for OrderStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "confirmed" => Ok(Self::Confirmed),
            "processing" => Ok(Self::Processing),
            "ready_pickup" => Ok(Self::ReadyPickup),
            "shipped" => Ok(Self::Shipped),
            "delivered" => Ok(Self::Delivered),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}
