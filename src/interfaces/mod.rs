//! Abstract interfaces for the reconciliation core.
//!
//! These traits define the contracts for:
//! - Order persistence (orders, history, audit log, replay ledger)
//! - Notification dispatch (email/WhatsApp collaborator)
//! - Shipment tracking lookup (courier integration)

pub mod notifier;
pub mod order_store;
pub mod tracking;

pub use notifier::{NotificationKind, Notifier, NotifyError};
pub use order_store::{
    OrderDigest, OrderStore, PriceWrite, StorageError, TransitionWrite, WaybillWrite,
};
pub use tracking::{ShipmentTracking, TrackingError, TrackingEvent, TrackingLookup};
