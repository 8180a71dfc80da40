//! Shipment tracking lookup interface.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result type for tracking lookups.
pub type Result<T> = std::result::Result<T, TrackingError>;

/// Errors that can occur querying the courier integration.
#[derive(Debug, thiserror::Error)]
pub enum TrackingError {
    #[error("Tracking transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Tracking provider rejected lookup: status={status}")]
    Rejected { status: u16 },

    #[error("Tracking response malformed: {0}")]
    Malformed(String),
}

/// One externally-reported tracking event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingEvent {
    pub status: String,
    pub note: Option<String>,
    pub location: Option<String>,
    /// Event time as reported by the courier, not lookup time.
    pub tracked_at: DateTime<Utc>,
}

/// Snapshot of a shipment as the courier integration reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipmentTracking {
    /// Courier-vocabulary status (`picked`, `delivered`, ...).
    pub status: String,
    pub history: Vec<TrackingEvent>,
}

/// Interface for querying a shipment's current state by waybill.
///
/// Implementations:
/// - `BiteshipTracker`: HTTP courier aggregator lookup
#[async_trait]
pub trait TrackingLookup: Send + Sync {
    async fn lookup(&self, waybill_id: &str, courier_code: &str) -> Result<ShipmentTracking>;
}
