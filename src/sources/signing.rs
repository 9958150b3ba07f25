//! Request signing shared by the exchange clients.

use anyhow::{Context, Result};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256, Sha512};

type HmacSha256 = Hmac<Sha256>;
type HmacSha512 = Hmac<Sha512>;

/// Hex HMAC-SHA256 of `payload` (Binance, BingX, ByBit).
pub fn hmac_sha256_hex(secret: &str, payload: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .context("Invalid HMAC secret length")?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Hex HMAC-SHA512 of `payload` (Gate).
pub fn hmac_sha512_hex(secret: &str, payload: &str) -> Result<String> {
    let mut mac = HmacSha512::new_from_slice(secret.as_bytes())
        .context("Invalid HMAC secret length")?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

pub fn sha512_hex(payload: &str) -> String {
    hex::encode(Sha512::digest(payload.as_bytes()))
}

/// `k1=v1&k2=v2` in the given order, values left as-is.
pub fn query_string(params: &[(&str, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

pub fn timestamp_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
