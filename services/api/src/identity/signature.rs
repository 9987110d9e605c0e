//! Svix-style webhook signature verification.
//!
//! The provider signs `"{id}.{timestamp}.{body}"` with HMAC-SHA256 using the
//! base64 secret that follows the `whsec_` prefix, and sends the result as one
//! or more space-separated `v1,<base64>` entries in `svix-signature`. Deliveries
//! whose timestamp is more than five minutes away from now are rejected to
//! limit replay.
use axum::http::HeaderMap;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

pub const TIMESTAMP_TOLERANCE_SECS: i64 = 5 * 60;

const SECRET_PREFIX: &str = "whsec_";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("webhook secret is not valid base64")]
    InvalidSecret,
    #[error("missing {0} header")]
    MissingHeader(&'static str),
    #[error("invalid timestamp header")]
    InvalidTimestamp,
    #[error("timestamp outside tolerance")]
    TimestampOutOfTolerance,
    #[error("no matching signature")]
    InvalidSignature,
}

#[derive(Clone)]
pub struct WebhookVerifier {
    mac: HmacSha256,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier").finish_non_exhaustive()
    }
}

/// Read `svix-*` headers, falling back to the unbranded `webhook-*` names.
fn header<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<&'a str, SignatureError> {
    let fallback = name.replacen("svix-", "webhook-", 1);
    headers
        .get(name)
        .or_else(|| headers.get(fallback.as_str()))
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(SignatureError::MissingHeader(name))
}

impl WebhookVerifier {
    pub fn new(secret: &str) -> Result<Self, SignatureError> {
        let encoded = secret.trim();
        let encoded = encoded.strip_prefix(SECRET_PREFIX).unwrap_or(encoded);
        let key = STANDARD
            .decode(encoded)
            .map_err(|_| SignatureError::InvalidSecret)?;
        if key.is_empty() {
            return Err(SignatureError::InvalidSecret);
        }
        let mac = HmacSha256::new_from_slice(&key).map_err(|_| SignatureError::InvalidSecret)?;
        Ok(Self { mac })
    }

    pub fn verify(&self, headers: &HeaderMap, payload: &[u8]) -> Result<(), SignatureError> {
        self.verify_at(headers, payload, Utc::now())
    }

    pub fn verify_at(
        &self,
        headers: &HeaderMap,
        payload: &[u8],
        now: DateTime<Utc>,
    ) -> Result<(), SignatureError> {
        let msg_id = header(headers, "svix-id")?;
        let timestamp: i64 = header(headers, "svix-timestamp")?
            .parse()
            .map_err(|_| SignatureError::InvalidTimestamp)?;
        let signatures = header(headers, "svix-signature")?;

        if now.timestamp().abs_diff(timestamp) > TIMESTAMP_TOLERANCE_SECS.unsigned_abs() {
            return Err(SignatureError::TimestampOutOfTolerance);
        }

        let expected = self.compute(msg_id, timestamp, payload);
        let matched = signatures
            .split_whitespace()
            .filter_map(|entry| entry.split_once(','))
            .filter(|(version, _)| *version == "v1")
            .filter_map(|(_, sig)| STANDARD.decode(sig).ok())
            .any(|candidate| bool::from(candidate.ct_eq(&expected)));
        if matched {
            Ok(())
        } else {
            Err(SignatureError::InvalidSignature)
        }
    }

    /// The `v1,<base64>` header entry for a payload. Used by delivery tooling
    /// and tests to produce valid deliveries.
    pub fn sign(&self, msg_id: &str, timestamp: i64, payload: &[u8]) -> String {
        format!(
            "v1,{}",
            STANDARD.encode(self.compute(msg_id, timestamp, payload))
        )
    }

    fn compute(&self, msg_id: &str, timestamp: i64, payload: &[u8]) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(msg_id.as_bytes());
        mac.update(b".");
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        mac.finalize().into_bytes().to_vec()
    }
}
