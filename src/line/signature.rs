//! `x-line-signature` is the base64 HMAC-SHA256 of the raw request body,
//! keyed by the channel secret.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

/// Compute the signature the platform would send for `body`.
#[must_use]
pub fn compute_signature(channel_secret: &str, body: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(channel_secret.as_bytes()).ok()?;
    mac.update(body);
    Some(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Check a webhook body against its signature header.
///
/// The MAC comparison is constant-time.
#[must_use]
pub fn verify_signature(channel_secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = STANDARD.decode(signature.trim()) else {
        warn!("Webhook signature is not valid base64");
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(channel_secret.as_bytes()) else {
        warn!("Failed to create HMAC");
        return false;
    };

    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}
