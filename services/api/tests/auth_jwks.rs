//! Token verification against a JWKS document served over HTTP.
//!
//! # Purpose
//! Drive the real [`HttpKeySetFetcher`] against a local Axum server so the
//! cache, fetch and verification path is exercised end to end.
//!
//! # Key invariants
//! - Many verifications within the cache window cost one upstream fetch.
//! - Upstream failures surface as key-set errors and never as a principal.
//! - The configured bearer credential is presented to the JWKS endpoint.
mod common;

use axum::Router;
use axum::http::{HeaderMap, StatusCode};
use clearflow::app::{AppState, build_router};
use clearflow::auth::keyset::{HttpKeySetFetcher, KeySetCache, KeySetError, SystemClock};
use clearflow::auth::verifier::{TokenVerifier, VerifyError};
use clearflow::store::memory::InMemoryStore;
use common::{KID, SEED, ed25519_jwk, read_json, token_for};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tower::ServiceExt;

struct JwksServer {
    addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    task: tokio::task::JoinHandle<()>,
}

impl Drop for JwksServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn spawn_jwks_server(status: StatusCode, required_bearer: Option<&'static str>) -> JwksServer {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let app = Router::new().route(
        "/.well-known/jwks.json",
        axum::routing::get(move |headers: HeaderMap| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                if let Some(expected) = required_bearer {
                    let presented = headers
                        .get("authorization")
                        .and_then(|value| value.to_str().ok());
                    if presented != Some(&format!("Bearer {expected}")[..]) {
                        return (StatusCode::UNAUTHORIZED, String::new());
                    }
                }
                let body = serde_json::json!({ "keys": [ed25519_jwk(KID, SEED)] });
                (status, body.to_string())
            }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind jwks");
    let addr = listener.local_addr().expect("addr");
    let task = tokio::spawn(async move {
        let _ = axum::serve(listener, app.into_make_service()).await;
    });
    JwksServer { addr, hits, task }
}

fn verifier_for(server: &JwksServer, bearer: Option<&str>) -> TokenVerifier {
    let url = format!("http://{}/.well-known/jwks.json", server.addr);
    let fetcher = HttpKeySetFetcher::new(url, bearer.map(str::to_string)).expect("client");
    let cache = KeySetCache::new(
        Arc::new(fetcher),
        Arc::new(SystemClock),
        Duration::from_secs(24 * 60 * 60),
        Duration::from_secs(5),
    );
    TokenVerifier::new(Arc::new(cache))
}

#[tokio::test]
async fn tokens_verify_with_one_upstream_fetch() {
    let server = spawn_jwks_server(StatusCode::OK, None).await;
    let verifier = Arc::new(verifier_for(&server, None));

    let mut tasks = Vec::new();
    for i in 0..8 {
        let verifier = verifier.clone();
        tasks.push(tokio::spawn(async move {
            verifier.verify(&token_for(&format!("user_{i}"))).await
        }));
    }
    for (i, task) in tasks.into_iter().enumerate() {
        let principal = task.await.expect("join").expect("verified");
        assert_eq!(principal.subject_id, format!("user_{i}"));
    }
    assert_eq!(server.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn upstream_errors_reject_tokens() {
    let server = spawn_jwks_server(StatusCode::INTERNAL_SERVER_ERROR, None).await;
    let verifier = verifier_for(&server, None);
    let err = verifier.verify(&token_for("user_1")).await.unwrap_err();
    assert!(matches!(err, VerifyError::KeySet(KeySetError::Status(500))));
}

#[tokio::test]
async fn bearer_credential_is_presented() {
    let server = spawn_jwks_server(StatusCode::OK, Some("sk_test_123")).await;

    let without = verifier_for(&server, None);
    let err = without.verify(&token_for("user_1")).await.unwrap_err();
    assert!(matches!(err, VerifyError::KeySet(KeySetError::Status(401))));

    let with = verifier_for(&server, Some("sk_test_123"));
    let principal = with.verify(&token_for("user_1")).await.expect("verified");
    assert_eq!(principal.subject_id, "user_1");
}

#[tokio::test]
async fn router_authenticates_against_remote_key_set() {
    let server = spawn_jwks_server(StatusCode::OK, None).await;
    let state = AppState::new(
        Arc::new(InMemoryStore::new()),
        Arc::new(verifier_for(&server, None)),
        None,
    );
    let app = build_router(state).into_service();

    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/api/v1/users")
        .header("authorization", format!("Bearer {}", token_for("user_remote")))
        .header("content-type", "application/json")
        .body(axum::body::Body::from(
            serde_json::json!({ "email": "remote@example.com" }).to_string(),
        ))
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("register");
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(read_json(response).await["external_id"], "user_remote");
}

#[tokio::test]
async fn unreachable_endpoint_is_a_fetch_error() {
    let fetcher = HttpKeySetFetcher::new("http://127.0.0.1:1/.well-known/jwks.json", None)
        .expect("client");
    let cache = KeySetCache::new(
        Arc::new(fetcher),
        Arc::new(SystemClock),
        Duration::from_secs(60),
        Duration::from_secs(2),
    );
    let err = cache.get().await.unwrap_err();
    assert!(matches!(
        err,
        KeySetError::Http(_) | KeySetError::Timeout(_)
    ));
}
