use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::BTreeMap;

#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("missing signature")] Missing,
    #[error("invalid signature")] Invalid,
    #[error("expired")] Expired,
}

// Endpoint path plus sorted parameters excluding `sig`, so a signature for
// one endpoint cannot be replayed against another.
fn canonical_string(endpoint: &str, params: &BTreeMap<String, String>) -> String {
    let pairs: Vec<String> = params
        .iter()
        .filter(|(k, _)| k.as_str() != "sig")
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();
    format!("{}?{}", endpoint, pairs.join("&"))
}

fn mac_for(endpoint: &str, params: &BTreeMap<String, String>, secret: &str) -> Hmac<Sha256> {
    // HMAC accepts keys of any length.
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("HMAC takes keys of any size"));
    mac.update(canonical_string(endpoint, params).as_bytes());
    mac
}

/// Hex HMAC-SHA256 over `endpoint` and `params`, for hosts building signed URLs.
pub fn sign(endpoint: &str, params: &BTreeMap<String, String>, secret: &str) -> String {
    hex::encode(mac_for(endpoint, params, secret).finalize().into_bytes())
}

/// Checks `sig` against `params`. A `t` parameter is an expiry in Unix seconds.
pub fn verify_signature(
    endpoint: &str,
    params: &BTreeMap<String, String>,
    sig: &str,
    secret: &str,
) -> Result<(), SignatureError> {
    if sig.is_empty() { return Err(SignatureError::Missing); }

    let raw = hex::decode(sig).map_err(|_| SignatureError::Invalid)?;
    mac_for(endpoint, params, secret)
        .verify_slice(&raw)
        .map_err(|_| SignatureError::Invalid)?;

    // Expiry is only trusted once the signature covers it
    if let Some(ts) = params.get("t") {
        let epoch = ts.parse::<i64>().map_err(|_| SignatureError::Invalid)?;
        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        if epoch < now { return Err(SignatureError::Expired); }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn signature_validates() {
        let p = params(&[("path", "@media/a.jpg"), ("w", "400"), ("h", "300")]);
        let sig = sign("/thumb", &p, "s");
        assert!(verify_signature("/thumb", &p, &sig, "s").is_ok());
    }

    #[test]
    fn signature_rejects_tamper_and_other_endpoint() {
        let p = params(&[("path", "@media/a.jpg"), ("w", "400")]);
        let sig = sign("/thumb", &p, "s");

        let tampered = params(&[("path", "@media/b.jpg"), ("w", "400")]);
        assert!(matches!(verify_signature("/thumb", &tampered, &sig, "s"), Err(SignatureError::Invalid)));
        assert!(matches!(verify_signature("/cache", &p, &sig, "s"), Err(SignatureError::Invalid)));
        assert!(matches!(verify_signature("/thumb", &p, &sig, "other"), Err(SignatureError::Invalid)));
        assert!(matches!(verify_signature("/thumb", &p, "zz", "s"), Err(SignatureError::Invalid)));
        assert!(matches!(verify_signature("/thumb", &p, "", "s"), Err(SignatureError::Missing)));
    }

    #[test]
    fn signature_expires() {
        let p = params(&[("t", "1000000000")]);
        let sig = sign("/cache", &p, "s");
        assert!(matches!(verify_signature("/cache", &p, &sig, "s"), Err(SignatureError::Expired)));
    }
}
