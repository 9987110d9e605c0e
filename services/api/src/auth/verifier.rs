//! Bearer token verification against the cached provider key set.
//!
//! # Security boundary
//! This is the only place an inbound bearer token is trusted. Every failure is
//! a distinct [`VerifyError`] so logs and metrics can tell them apart, but the
//! HTTP layer collapses all of them into the same 401.
//!
//! # Validation steps
//! 1. Reject empty tokens.
//! 2. Decode the header; the algorithm must be on the allow-list and a `kid`
//!    must be present.
//! 3. Look the key up in the cached [`KeySet`](crate::auth::keyset::KeySet)
//!    and check its type matches the algorithm.
//! 4. Verify the signature, then `exp` (required), `nbf` (when present), and
//!    `iss`/`aud` when configured.
//! 5. The `sub` claim becomes the [`Principal`].
use crate::auth::keyset::{KeySetCache, KeySetError};
use crate::auth::principal::Principal;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, Validation, decode, decode_header};
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("missing bearer token")]
    MissingToken,
    #[error("key set unavailable: {0}")]
    KeySet(#[from] KeySetError),
    #[error("malformed token: {0}")]
    Malformed(jsonwebtoken::errors::Error),
    #[error("unsupported algorithm {0:?}")]
    UnsupportedAlgorithm(Algorithm),
    #[error("missing key id")]
    MissingKeyId,
    #[error("unknown key id {0}")]
    UnknownKey(String),
    #[error("key {0} does not match token algorithm")]
    KeyAlgorithmMismatch(String),
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("token not yet valid")]
    NotYetValid,
    #[error("invalid issuer")]
    InvalidIssuer,
    #[error("invalid audience")]
    InvalidAudience,
    #[error("missing required claim {0}")]
    MissingClaim(String),
    #[error("missing subject claim")]
    MissingSubject,
}

impl VerifyError {
    /// Stable label for logs and the auth failure counter.
    pub fn reason(&self) -> &'static str {
        match self {
            VerifyError::MissingToken => "missing_token",
            VerifyError::KeySet(_) => "key_set_unavailable",
            VerifyError::Malformed(_) => "malformed",
            VerifyError::UnsupportedAlgorithm(_) => "unsupported_algorithm",
            VerifyError::MissingKeyId => "missing_kid",
            VerifyError::UnknownKey(_) => "unknown_kid",
            VerifyError::KeyAlgorithmMismatch(_) => "key_algorithm_mismatch",
            VerifyError::InvalidSignature => "invalid_signature",
            VerifyError::Expired => "expired",
            VerifyError::NotYetValid => "not_yet_valid",
            VerifyError::InvalidIssuer => "invalid_issuer",
            VerifyError::InvalidAudience => "invalid_audience",
            VerifyError::MissingClaim(_) => "missing_claim",
            VerifyError::MissingSubject => "missing_subject",
        }
    }

    fn from_jwt(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => VerifyError::Expired,
            ErrorKind::ImmatureSignature => VerifyError::NotYetValid,
            ErrorKind::InvalidSignature => VerifyError::InvalidSignature,
            ErrorKind::InvalidIssuer => VerifyError::InvalidIssuer,
            ErrorKind::InvalidAudience => VerifyError::InvalidAudience,
            ErrorKind::MissingRequiredClaim(claim) => VerifyError::MissingClaim(claim.clone()),
            _ => VerifyError::Malformed(err),
        }
    }
}

/// Verifies bearer tokens and yields the authenticated [`Principal`].
///
/// # Example
/// ```rust,no_run
/// use clearflow::auth::keyset::{HttpKeySetFetcher, KeySetCache, SystemClock};
/// use clearflow::auth::verifier::TokenVerifier;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// async fn check(token: &str) {
///     let fetcher = HttpKeySetFetcher::new("https://issuer.example/jwks", None).unwrap();
///     let cache = KeySetCache::new(
///         Arc::new(fetcher),
///         Arc::new(SystemClock),
///         Duration::from_secs(86_400),
///         Duration::from_secs(5),
///     );
///     let verifier = TokenVerifier::new(Arc::new(cache));
///     let _ = verifier.verify(token).await;
/// }
/// ```
#[derive(Clone)]
pub struct TokenVerifier {
    keys: Arc<KeySetCache>,
    allowed_algorithms: Vec<Algorithm>,
    issuer: Option<String>,
    audience: Option<String>,
    leeway_seconds: u64,
}

impl TokenVerifier {
    pub fn new(keys: Arc<KeySetCache>) -> Self {
        Self {
            keys,
            allowed_algorithms: vec![Algorithm::RS256, Algorithm::ES256, Algorithm::EdDSA],
            issuer: None,
            audience: None,
            leeway_seconds: 0,
        }
    }

    pub fn with_allowed_algorithms(mut self, algorithms: Vec<Algorithm>) -> Self {
        self.allowed_algorithms = algorithms;
        self
    }

    pub fn with_issuer(mut self, issuer: Option<String>) -> Self {
        self.issuer = issuer;
        self
    }

    pub fn with_audience(mut self, audience: Option<String>) -> Self {
        self.audience = audience;
        self
    }

    pub fn with_leeway(mut self, leeway_seconds: u64) -> Self {
        self.leeway_seconds = leeway_seconds;
        self
    }

    pub fn key_cache(&self) -> &Arc<KeySetCache> {
        &self.keys
    }

    /// Verify `token` (without the `Bearer ` prefix).
    pub async fn verify(&self, token: &str) -> Result<Principal, VerifyError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(VerifyError::MissingToken);
        }

        let header = decode_header(token).map_err(VerifyError::Malformed)?;
        if !self.allowed_algorithms.contains(&header.alg) {
            return Err(VerifyError::UnsupportedAlgorithm(header.alg));
        }
        let kid = header
            .kid
            .as_deref()
            .filter(|kid| !kid.is_empty())
            .ok_or(VerifyError::MissingKeyId)?;

        let keys = self.keys.get().await?;
        let key = keys
            .get(kid)
            .ok_or_else(|| VerifyError::UnknownKey(kid.to_string()))?;
        if !key.supports(header.alg) {
            return Err(VerifyError::KeyAlgorithmMismatch(kid.to_string()));
        }

        let mut validation = Validation::new(header.alg);
        validation.leeway = self.leeway_seconds;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        match &self.issuer {
            Some(issuer) => {
                validation.set_issuer(&[issuer.as_str()]);
                validation.required_spec_claims.insert("iss".to_string());
            }
            None => validation.iss = None,
        }
        match &self.audience {
            Some(audience) => {
                validation.set_audience(&[audience.as_str()]);
                validation.required_spec_claims.insert("aud".to_string());
            }
            None => validation.validate_aud = false,
        }

        let data = decode::<Value>(token, key.decoding_key(), &validation)
            .map_err(VerifyError::from_jwt)?;
        let subject = data
            .claims
            .get("sub")
            .and_then(Value::as_str)
            .filter(|sub| !sub.is_empty())
            .ok_or(VerifyError::MissingSubject)?;
        Ok(Principal {
            subject_id: subject.to_string(),
        })
    }
}
