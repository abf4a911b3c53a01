//! HMAC-SHA256 signatures for outbound webhook bodies.
//!
//! The signed message is `"{timestamp}.{payload}"`, so a receiver can reject
//! replays by checking the timestamp before comparing signatures.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SigningError {
    #[error("Invalid secret: cannot be empty.")]
    EmptySecret,
    #[error("Invalid secret: {0}")]
    InvalidSecret(String),
}

fn mac_for(payload: &str, secret: &str, timestamp: i64) -> Result<HmacSha256, SigningError> {
    // `new_from_slice` accepts empty keys, so reject them here.
    if secret.is_empty() {
        return Err(SigningError::EmptySecret);
    }
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| SigningError::InvalidSecret(e.to_string()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload.as_bytes());
    Ok(mac)
}

/// Hex-encoded HMAC-SHA256 of `"{timestamp}.{payload}"`.
pub fn sign(payload: &str, secret: &str, timestamp: i64) -> Result<String, SigningError> {
    let mac = mac_for(payload, secret, timestamp)?;
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time check of a hex signature. Malformed hex or an empty secret is
/// simply not a valid signature.
pub fn verify(payload: &str, signature: &str, secret: &str, timestamp: i64) -> bool {
    let Ok(expected) = hex::decode(signature) else {
        return false;
    };
    match mac_for(payload, secret, timestamp) {
        Ok(mac) => mac.verify_slice(&expected).is_ok(),
        Err(_) => false,
    }
}
