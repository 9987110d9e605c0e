//! JWKS key sets and the time-bounded cache in front of them.
//!
//! # Purpose
//! Avoid fetching the identity provider's published keys on every request
//! while bounding how stale they can get.
//!
//! # Key invariants
//! - A [`KeySet`] is immutable once built; a refresh replaces it wholesale.
//! - The cache state is `Option<CachedKeySet>`: a timestamp never exists
//!   without the key set it describes.
//! - While a fresh entry exists readers only take the shared lock.
//! - Concurrent misses collapse into one upstream fetch: the exclusive lock is
//!   re-checked after acquisition.
//! - A failed refresh leaves the previous entry in place and surfaces the
//!   error to the caller; the next caller simply tries again.
//!
//! # Concurrency model
//! One `tokio::sync::RwLock` guards the entry. The fetch runs while the write
//! lock is held, bounded by its own timeout so a slow provider cannot pin the
//! lock for longer than that deadline.
use crate::observability;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::jwk::{
    AlgorithmParameters, EllipticCurve, Jwk, JwkSet, KeyAlgorithm, PublicKeyUse,
};
use jsonwebtoken::{Algorithm, DecodingKey};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

#[derive(Debug, thiserror::Error)]
pub enum KeySetError {
    #[error("jwks request failed: {0}")]
    Http(String),
    #[error("jwks endpoint returned status {0}")]
    Status(u16),
    #[error("malformed jwks document: {0}")]
    Malformed(String),
    #[error("jwks document contains no usable signing keys")]
    Empty,
    #[error("jwks fetch timed out after {0:?}")]
    Timeout(Duration),
}

/// One verification key taken from a JWKS document.
#[derive(Clone)]
pub struct VerificationKey {
    kid: String,
    jwk: Jwk,
    decoding_key: DecodingKey,
}

impl VerificationKey {
    fn from_jwk(jwk: &Jwk) -> Result<Self, String> {
        let kid = jwk
            .common
            .key_id
            .clone()
            .filter(|kid| !kid.is_empty())
            .ok_or_else(|| "missing kid".to_string())?;
        if matches!(jwk.algorithm, AlgorithmParameters::OctetKey(_)) {
            return Err(format!("symmetric key {kid} is not a public key"));
        }
        let decoding_key = DecodingKey::from_jwk(jwk).map_err(|err| format!("{kid}: {err}"))?;
        Ok(Self {
            kid,
            jwk: jwk.clone(),
            decoding_key,
        })
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }

    /// Whether a token signed with `alg` may be checked against this key.
    ///
    /// The key type and curve must match the algorithm family, and a declared
    /// `alg` on the JWK must match exactly.
    pub fn supports(&self, alg: Algorithm) -> bool {
        if let Some(declared) = self.jwk.common.key_algorithm {
            if declared_algorithm(declared) != Some(alg) {
                return false;
            }
        }
        match (&self.jwk.algorithm, alg) {
            (
                AlgorithmParameters::RSA(_),
                Algorithm::RS256
                | Algorithm::RS384
                | Algorithm::RS512
                | Algorithm::PS256
                | Algorithm::PS384
                | Algorithm::PS512,
            ) => true,
            (AlgorithmParameters::EllipticCurve(params), Algorithm::ES256) => {
                params.curve == EllipticCurve::P256
            }
            (AlgorithmParameters::EllipticCurve(params), Algorithm::ES384) => {
                params.curve == EllipticCurve::P384
            }
            (AlgorithmParameters::OctetKeyPair(params), Algorithm::EdDSA) => {
                params.curve == EllipticCurve::Ed25519
            }
            _ => false,
        }
    }
}

fn declared_algorithm(alg: KeyAlgorithm) -> Option<Algorithm> {
    match alg {
        KeyAlgorithm::RS256 => Some(Algorithm::RS256),
        KeyAlgorithm::RS384 => Some(Algorithm::RS384),
        KeyAlgorithm::RS512 => Some(Algorithm::RS512),
        KeyAlgorithm::PS256 => Some(Algorithm::PS256),
        KeyAlgorithm::PS384 => Some(Algorithm::PS384),
        KeyAlgorithm::PS512 => Some(Algorithm::PS512),
        KeyAlgorithm::ES256 => Some(Algorithm::ES256),
        KeyAlgorithm::ES384 => Some(Algorithm::ES384),
        KeyAlgorithm::EdDSA => Some(Algorithm::EdDSA),
        _ => None,
    }
}

/// Verification keys indexed by `kid`.
#[derive(Clone, Default)]
pub struct KeySet {
    keys: HashMap<String, VerificationKey>,
}

impl fmt::Debug for KeySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kids: Vec<&str> = self.keys.keys().map(String::as_str).collect();
        kids.sort_unstable();
        f.debug_struct("KeySet").field("kids", &kids).finish()
    }
}

impl KeySet {
    /// Build a key set from a parsed JWKS document.
    ///
    /// Encryption keys and keys that cannot be turned into verification keys
    /// are skipped with a warning. A document left with no keys is an error.
    pub fn from_jwk_set(set: &JwkSet) -> Result<Self, KeySetError> {
        let mut keys = HashMap::new();
        for jwk in &set.keys {
            if matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption)) {
                continue;
            }
            match VerificationKey::from_jwk(jwk) {
                Ok(key) => {
                    keys.insert(key.kid.clone(), key);
                }
                Err(reason) => tracing::warn!(%reason, "skipping unusable jwk"),
            }
        }
        if keys.is_empty() {
            return Err(KeySetError::Empty);
        }
        Ok(Self { keys })
    }

    pub fn from_json(body: &[u8]) -> Result<Self, KeySetError> {
        let set: JwkSet =
            serde_json::from_slice(body).map_err(|err| KeySetError::Malformed(err.to_string()))?;
        Self::from_jwk_set(&set)
    }

    pub fn get(&self, kid: &str) -> Option<&VerificationKey> {
        self.keys.get(kid)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Source of key sets; the production implementation is [`HttpKeySetFetcher`].
#[async_trait]
pub trait KeySetFetcher: Send + Sync {
    async fn fetch(&self) -> Result<KeySet, KeySetError>;
}

/// Fetches a JWKS document over HTTP.
///
/// Any non-2xx status or unparsable body is a fetch failure.
#[derive(Debug, Clone)]
pub struct HttpKeySetFetcher {
    client: reqwest::Client,
    url: String,
    bearer: Option<String>,
}

impl HttpKeySetFetcher {
    pub fn new(url: impl Into<String>, bearer: Option<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
            bearer,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl KeySetFetcher for HttpKeySetFetcher {
    async fn fetch(&self) -> Result<KeySet, KeySetError> {
        let mut request = self.client.get(&self.url);
        if let Some(secret) = &self.bearer {
            request = request.bearer_auth(secret);
        }
        let response = request
            .send()
            .await
            .map_err(|err| KeySetError::Http(err.without_url().to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(KeySetError::Status(status.as_u16()));
        }
        let body = response
            .bytes()
            .await
            .map_err(|err| KeySetError::Http(err.without_url().to_string()))?;
        KeySet::from_json(&body)
    }
}

#[derive(Debug, Clone)]
struct CachedKeySet {
    keys: Arc<KeySet>,
    fetched_at: DateTime<Utc>,
}

/// Time-bounded, single-flight cache over a [`KeySetFetcher`].
pub struct KeySetCache {
    fetcher: Arc<dyn KeySetFetcher>,
    clock: Arc<dyn Clock>,
    cache_duration: Duration,
    fetch_timeout: Duration,
    entry: RwLock<Option<CachedKeySet>>,
}

impl KeySetCache {
    pub fn new(
        fetcher: Arc<dyn KeySetFetcher>,
        clock: Arc<dyn Clock>,
        cache_duration: Duration,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            fetcher,
            clock,
            cache_duration,
            fetch_timeout,
            entry: RwLock::new(None),
        }
    }

    /// Return the current key set, refreshing it when missing or expired.
    pub async fn get(&self) -> Result<Arc<KeySet>, KeySetError> {
        self.get_at(self.clock.now()).await
    }

    /// Same as [`KeySetCache::get`] with an explicit notion of "now".
    ///
    /// # Errors
    /// - The fetcher's error, or [`KeySetError::Timeout`] when the fetch does
    ///   not finish within the fetch timeout. Either way the previous entry
    ///   (if any) is kept.
    pub async fn get_at(&self, now: DateTime<Utc>) -> Result<Arc<KeySet>, KeySetError> {
        {
            let entry = self.entry.read().await;
            if let Some(keys) = self.fresh(entry.as_ref(), now) {
                return Ok(keys);
            }
        }

        let mut entry = self.entry.write().await;
        // Another task may have refreshed while we waited for the write lock.
        if let Some(keys) = self.fresh(entry.as_ref(), now) {
            return Ok(keys);
        }

        let fetched = match tokio::time::timeout(self.fetch_timeout, self.fetcher.fetch()).await {
            Ok(Ok(keys)) => keys,
            Ok(Err(err)) => {
                record_refresh("error");
                tracing::warn!(error = %err, stale = entry.is_some(), "jwks refresh failed");
                return Err(err);
            }
            Err(_) => {
                record_refresh("timeout");
                tracing::warn!(timeout = ?self.fetch_timeout, stale = entry.is_some(), "jwks refresh timed out");
                return Err(KeySetError::Timeout(self.fetch_timeout));
            }
        };

        let keys = Arc::new(fetched);
        *entry = Some(CachedKeySet {
            keys: Arc::clone(&keys),
            fetched_at: now,
        });
        record_refresh("success");
        tracing::info!(keys = keys.len(), "jwks cache refreshed");
        Ok(keys)
    }

    /// When the current entry was fetched, if there is one.
    pub async fn fetched_at(&self) -> Option<DateTime<Utc>> {
        self.entry.read().await.as_ref().map(|cached| cached.fetched_at)
    }

    fn fresh(&self, entry: Option<&CachedKeySet>, now: DateTime<Utc>) -> Option<Arc<KeySet>> {
        let cached = entry?;
        // A caller holding an older "now" than the entry sees it as fresh.
        let is_fresh = match (now - cached.fetched_at).to_std() {
            Ok(age) => age < self.cache_duration,
            Err(_) => true,
        };
        is_fresh.then(|| Arc::clone(&cached.keys))
    }
}

fn record_refresh(outcome: &'static str) {
    metrics::counter!(observability::JWKS_REFRESH_TOTAL, "outcome" => outcome).increment(1);
}
