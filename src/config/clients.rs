//! Outbound collaborator configuration.

use std::time::Duration;

use serde::Deserialize;

/// Notification dispatch collaborator.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// Delivery collaborator endpoint. None = structured-log only.
    pub endpoint: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: 10,
        }
    }
}

impl NotifierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Shipment tracking collaborator (Biteship).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Courier aggregator base URL.
    pub base_url: String,
    /// API key sent in the Authorization header.
    pub api_key: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.biteship.com".to_string(),
            api_key: None,
            timeout_secs: 15,
        }
    }
}

impl TrackingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
