//! Inbound webhook authenticity configuration.

use serde::Deserialize;

/// Signature keys for the two inbound webhook sources.
///
/// An unset key skips verification for that source and logs a warning on
/// every inbound event; production deployments are expected to set both.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Biteship webhook signature key (HMAC-SHA256 over the raw body).
    pub biteship_signature_key: Option<String>,
    /// Midtrans server key (feeds the SHA-512 signature field check).
    pub midtrans_server_key: Option<String>,
}
