//! Bitget v2 request signing.
//!
//! Every authenticated request carries an HMAC-SHA256 signature over
//! `timestamp + METHOD + path(+query) + body`, base64 encoded, together with
//! the key, timestamp, and passphrase headers.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use perp_scalper_core::{GatewayError, GatewayResult};

type HmacSha256 = Hmac<Sha256>;

/// Computes the `ACCESS-SIGN` header value.
///
/// `path` must include the query string for GET requests (Bitget signs the
/// full request path); `body` is the exact JSON string sent, empty for GET.
pub fn sign_request(
    secret: &str,
    timestamp: &str,
    method: &str,
    path: &str,
    body: &str,
) -> GatewayResult<String> {
    let payload = format!("{timestamp}{}{path}{body}", method.to_uppercase());

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| GatewayError::Authentication(format!("invalid API secret: {e}")))?;
    mac.update(payload.as_bytes());

    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

/// Builds a canonical query string with keys in sorted order, as Bitget
/// expects for signing.
#[must_use]
pub fn canonical_query(params: &[(&str, &str)]) -> String {
    let mut sorted: Vec<_> = params.to_vec();
    sorted.sort_by_key(|(k, _)| *k);
    sorted
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}
