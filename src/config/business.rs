//! Marketplace business parameters.

use serde::Deserialize;

/// Platform commission and related business figures.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BusinessConfig {
    /// Platform commission in basis points, deducted from the farmer's
    /// subtotal when computing net earnings. Default: 5%.
    pub commission_bps: i64,
}

impl Default for BusinessConfig {
    fn default() -> Self {
        Self { commission_bps: 500 }
    }
}

impl BusinessConfig {
    /// Net earnings credited to the farmer: subtotal minus commission.
    /// Integer rupiah arithmetic, rounded down.
    #[must_use]
    pub fn net_earnings(&self, subtotal: i64) -> i64 {
        subtotal - subtotal * self.commission_bps / 10_000
    }
}
