//! Double-submit CSRF protection. The token is self-validating:
//! `nonce.expires_unix.signature`, signed with the server HMAC secret, so
//! verification needs no server-side session state. State-changing methods
//! must present a header token equal to the cookie token; both comparisons
//! are constant-time.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

use crate::error::GatewayError;

type HmacSha256 = Hmac<Sha256>;

pub const CSRF_COOKIE: &str = "csrf_token";
pub const CSRF_HEADER: &str = "x-csrf-token";

/// POST/PUT/PATCH/DELETE require a token; GET/HEAD/OPTIONS are exempt.
pub fn requires_csrf(method: &str) -> bool {
    matches!(method, "POST" | "PUT" | "PATCH" | "DELETE")
}

fn signature(secret: &[u8], nonce: &str, expires_unix: i64) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(nonce.as_bytes());
    mac.update(b".");
    mac.update(expires_unix.to_string().as_bytes());
    URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
}

pub fn issue(secret: &[u8], now: DateTime<Utc>, ttl_secs: i64) -> String {
    let mut nonce_bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = URL_SAFE_NO_PAD.encode(nonce_bytes);
    let expires_unix = now.timestamp() + ttl_secs;
    let sig = signature(secret, &nonce, expires_unix);
    format!("{nonce}.{expires_unix}.{sig}")
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Verifies the header token against the cookie token, the signature, and
/// the expiry. Any failure maps to the same `CsrfMismatch` so a caller
/// can't distinguish forged from expired.
pub fn verify(
    secret: &[u8],
    header_token: &str,
    cookie_token: &str,
    now: DateTime<Utc>,
) -> Result<(), GatewayError> {
    if !constant_time_eq(header_token.as_bytes(), cookie_token.as_bytes()) {
        return Err(GatewayError::CsrfMismatch);
    }

    let mut parts = header_token.splitn(3, '.');
    let (nonce, expires_raw, sig) = match (parts.next(), parts.next(), parts.next()) {
        (Some(n), Some(e), Some(s)) => (n, e, s),
        _ => return Err(GatewayError::CsrfMismatch),
    };
    let expires_unix: i64 = expires_raw.parse().map_err(|_| GatewayError::CsrfMismatch)?;

    let expected = signature(secret, nonce, expires_unix);
    if !constant_time_eq(expected.as_bytes(), sig.as_bytes()) {
        return Err(GatewayError::CsrfMismatch);
    }

    if now.timestamp() > expires_unix {
        return Err(GatewayError::CsrfMismatch);
    }

    Ok(())
}
