use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::error;

/// Header LiveChat puts the body signature in.
pub const SIGNATURE_HEADER: &str = "x-livechat-signature";

fn body_mac(request_body: &[u8], secret: &str) -> Option<Hmac<Sha256>> {
    match Hmac::<Sha256>::new_from_slice(secret.as_bytes()) {
        Ok(mut mac) => {
            mac.update(request_body);
            Some(mac)
        }
        Err(e) => {
            error!("Failed to create HMAC: {}", e);
            None
        }
    }
}

/// Check a hex HMAC-SHA256 of the raw request body against `signature`.
///
/// An optional `sha256=` prefix on the header value is accepted.
pub fn verify_livechat_signature(request_body: &[u8], signature: &str, secret: &str) -> bool {
    let signature = signature.trim();
    let signature = signature.strip_prefix("sha256=").unwrap_or(signature);

    let Ok(expected) = hex::decode(signature) else {
        error!("Signature header is not valid hex");
        return false;
    };

    let Some(mac) = body_mac(request_body, secret) else {
        return false;
    };

    if mac.verify_slice(&expected).is_ok() {
        true
    } else {
        error!("Webhook signature verification failed");
        false
    }
}

/// Fallback for webhooks that carry the shared secret in the payload's
/// `secret_key` field instead of a signature header.
pub fn verify_secret_key(provided: Option<&str>, secret: &str) -> bool {
    let Some(provided) = provided else {
        error!("Webhook carried neither a signature nor a secret key");
        return false;
    };

    // Both sides are hashed to a fixed-length digest so the comparison does
    // not leak the secret's length.
    let provided_hash = Sha256::digest(provided.as_bytes());
    let secret_hash = Sha256::digest(secret.as_bytes());

    let matches = bool::from(provided_hash.as_slice().ct_eq(secret_hash.as_slice()));
    if !matches {
        error!("Webhook secret key mismatch");
    }
    matches
}

/// Hex signature LiveChat would send for `request_body`.
pub fn compute_signature(request_body: &[u8], secret: &str) -> String {
    body_mac(request_body, secret)
        .map(|mac| hex::encode(mac.finalize().into_bytes()))
        .unwrap_or_default()
}
