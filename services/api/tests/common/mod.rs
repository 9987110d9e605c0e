//! Shared fixtures for router-level integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use clearflow::app::{AppState, HttpSettings, build_router_with};
use clearflow::auth::keyset::{KeySet, KeySetCache, KeySetError, KeySetFetcher, SystemClock};
use clearflow::auth::verifier::TokenVerifier;
use clearflow::identity::signature::WebhookVerifier;
use clearflow::store::FinanceStore;
use clearflow::store::memory::InMemoryStore;
use ed25519_dalek::SigningKey;
use ed25519_dalek::pkcs8::EncodePrivateKey;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use std::sync::Arc;
use std::time::Duration;

pub const WEBHOOK_SECRET: &str = "whsec_MfKQ9r8GKYqrTwjUPD8ILPZIo2LaLaSw";
pub const KID: &str = "test-key";
pub const SEED: u8 = 7;

pub type App = axum::routing::RouterIntoService<Body, ()>;

pub async fn read_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

pub fn ed25519_jwk(kid: &str, seed: u8) -> serde_json::Value {
    let signing_key = SigningKey::from_bytes(&[seed; 32]);
    serde_json::json!({
        "kty": "OKP",
        "crv": "Ed25519",
        "kid": kid,
        "alg": "EdDSA",
        "use": "sig",
        "x": URL_SAFE_NO_PAD.encode(signing_key.verifying_key().to_bytes()),
    })
}

pub fn mint_token(seed: u8, kid: &str, claims: serde_json::Value) -> String {
    let signing_key = SigningKey::from_bytes(&[seed; 32]);
    let der = signing_key.to_pkcs8_der().expect("pkcs8 der");
    let mut header = Header::new(Algorithm::EdDSA);
    header.kid = Some(kid.to_string());
    jsonwebtoken::encode(&header, &claims, &EncodingKey::from_ed_der(der.as_bytes()))
        .expect("token")
}

/// A token for `subject` valid for five minutes.
pub fn token_for(subject: &str) -> String {
    let exp = chrono::Utc::now().timestamp() + 300;
    mint_token(SEED, KID, serde_json::json!({ "sub": subject, "exp": exp }))
}

struct StaticFetcher(KeySet);

#[async_trait]
impl KeySetFetcher for StaticFetcher {
    async fn fetch(&self) -> Result<KeySet, KeySetError> {
        Ok(self.0.clone())
    }
}

pub fn static_verifier() -> Arc<TokenVerifier> {
    let body = serde_json::json!({ "keys": [ed25519_jwk(KID, SEED)] }).to_string();
    let keys = KeySet::from_json(body.as_bytes()).expect("key set");
    let cache = KeySetCache::new(
        Arc::new(StaticFetcher(keys)),
        Arc::new(SystemClock),
        Duration::from_secs(3600),
        Duration::from_secs(5),
    );
    Arc::new(TokenVerifier::new(Arc::new(cache)))
}

pub struct TestApp {
    pub app: App,
    pub store: Arc<InMemoryStore>,
    pub signer: WebhookVerifier,
}

pub fn test_app() -> TestApp {
    test_app_with(HttpSettings::default(), Some(WEBHOOK_SECRET))
}

pub fn test_app_with(settings: HttpSettings, webhook_secret: Option<&str>) -> TestApp {
    let store = Arc::new(InMemoryStore::new());
    let webhook_verifier =
        webhook_secret.map(|secret| WebhookVerifier::new(secret).expect("webhook secret"));
    let state = AppState::new(
        store.clone() as Arc<dyn FinanceStore>,
        static_verifier(),
        webhook_verifier,
    );
    TestApp {
        app: build_router_with(state, &settings).into_service(),
        store,
        signer: WebhookVerifier::new(WEBHOOK_SECRET).expect("webhook secret"),
    }
}

pub fn authed_request(
    method: &str,
    uri: &str,
    token: &str,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {token}"));
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request")
}
