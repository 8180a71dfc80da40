//! Scheduled reconciler configuration.

use std::time::Duration;

use serde::Deserialize;

/// Cadences and limits for the two pollers.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Delivery-status poll interval in seconds. Default: 6 hours.
    pub check_delivery_interval_secs: u64,
    /// Auto-completion poll interval in seconds. Default: daily.
    pub auto_complete_interval_secs: u64,
    /// Grace window in hours before a shipped-but-unconfirmed order is
    /// auto-completed. Default: 3 days.
    pub grace_window_hours: i64,
    /// Per-call timeout for one tracking lookup, in seconds.
    pub lookup_timeout_secs: u64,
    /// Pause between consecutive tracking lookups within one run, in
    /// milliseconds, to respect the courier aggregator's rate limits.
    pub lookup_delay_ms: u64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            check_delivery_interval_secs: 6 * 60 * 60,
            auto_complete_interval_secs: 24 * 60 * 60,
            grace_window_hours: 72,
            lookup_timeout_secs: 15,
            lookup_delay_ms: 500,
        }
    }
}

impl ReconcilerConfig {
    pub fn check_delivery_interval(&self) -> Duration {
        Duration::from_secs(self.check_delivery_interval_secs)
    }

    pub fn auto_complete_interval(&self) -> Duration {
        Duration::from_secs(self.auto_complete_interval_secs)
    }

    pub fn grace_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.grace_window_hours)
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_secs(self.lookup_timeout_secs)
    }

    pub fn lookup_delay(&self) -> Duration {
        Duration::from_millis(self.lookup_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconciler_defaults() {
        let config = ReconcilerConfig::default();
        assert_eq!(config.check_delivery_interval(), Duration::from_secs(21600));
        assert_eq!(config.auto_complete_interval(), Duration::from_secs(86400));
        assert_eq!(config.grace_window(), chrono::Duration::days(3));
        assert_eq!(config.lookup_delay(), Duration::from_millis(500));
    }
}
