//! Webhook authenticity checks.
//!
//! Biteship signs the raw request body with HMAC-SHA256; Midtrans embeds a
//! SHA-512 digest of `order_id + status_code + gross_amount + server_key`
//! in the notification itself. Neither payload is trusted before its check
//! passes.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256, Sha512};

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 of the raw body, hex-encoded. Exposed so tests can produce
/// valid signatures.
#[must_use]
pub fn sign_biteship(signature_key: &str, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(signature_key.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a Biteship webhook signature against the raw body.
#[must_use]
pub fn verify_biteship(signature_key: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let mut mac =
        HmacSha256::new_from_slice(signature_key.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// The signature Midtrans embeds in each notification.
#[must_use]
pub fn midtrans_signature(
    order_id: &str,
    status_code: &str,
    gross_amount: &str,
    server_key: &str,
) -> String {
    let mut hasher = Sha512::new();
    hasher.update(order_id.as_bytes());
    hasher.update(status_code.as_bytes());
    hasher.update(gross_amount.as_bytes());
    hasher.update(server_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Verify the embedded Midtrans signature field.
#[must_use]
pub fn verify_midtrans(
    order_id: &str,
    status_code: &str,
    gross_amount: &str,
    server_key: &str,
    signature: &str,
) -> bool {
    let expected = midtrans_signature(order_id, status_code, gross_amount, server_key);
    // Both sides are fixed-length hex digests; compare without early exit.
    let provided = signature.trim().to_ascii_lowercase();
    if provided.len() != expected.len() {
        return false;
    }
    expected
        .bytes()
        .zip(provided.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

/// SHA-256 of the raw body, hex-encoded; the replay-ledger key for events
/// whose sender supplies no event id.
#[must_use]
pub fn body_digest(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}
