mod common;

use async_trait::async_trait;
use axum::http::StatusCode;
use clearflow::app::{AppState, HttpSettings, build_router, build_router_with};
use clearflow::model::{Category, Expense, NewCategory, NewExpense, User, UserUpsert};
use clearflow::store::{
    CategoryStore, ExpenseStore, FinanceStore, Page, StoreError, StoreResult, UserStore,
};
use common::{authed_request, read_json, test_app, test_app_with, token_for};
use http_helpers::{get_request, json_request};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

/// A store whose backing database is unreachable.
struct DownStore;

fn down<T>() -> StoreResult<T> {
    Err(StoreError::Unexpected(anyhow::anyhow!("connection refused")))
}

#[async_trait]
impl UserStore for DownStore {
    async fn upsert_user_by_external_id(&self, _user: UserUpsert) -> StoreResult<User> {
        down()
    }
    async fn delete_user_by_external_id(&self, _external_id: &str) -> StoreResult<()> {
        down()
    }
    async fn find_user_id_by_external_id(&self, _external_id: &str) -> StoreResult<Uuid> {
        down()
    }
    async fn get_user_by_external_id(&self, _external_id: &str) -> StoreResult<User> {
        down()
    }
}

#[async_trait]
impl CategoryStore for DownStore {
    async fn list_categories(&self, _user_id: Uuid, _page: Page) -> StoreResult<Vec<Category>> {
        down()
    }
    async fn get_category(&self, _category_id: i64) -> StoreResult<Category> {
        down()
    }
    async fn create_category(&self, _category: NewCategory) -> StoreResult<Category> {
        down()
    }
}

#[async_trait]
impl ExpenseStore for DownStore {
    async fn list_expenses(&self, _user_id: Uuid, _page: Page) -> StoreResult<Vec<Expense>> {
        down()
    }
    async fn create_expense(&self, _expense: NewExpense) -> StoreResult<Expense> {
        down()
    }
}

#[async_trait]
impl FinanceStore for DownStore {
    async fn health_check(&self) -> StoreResult<()> {
        down()
    }
    fn is_durable(&self) -> bool {
        true
    }
    fn backend_name(&self) -> &'static str {
        "down"
    }
}

async fn register(app: &common::App, subject: &str) {
    let response = app
        .clone()
        .oneshot(authed_request(
            "POST",
            "/api/v1/users",
            &token_for(subject),
            Some(serde_json::json!({ "email": format!("{subject}@example.com") })),
        ))
        .await
        .expect("register");
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn healthz_reports_ok() {
    let harness = test_app();
    let response = harness
        .app
        .clone()
        .oneshot(get_request("/healthz"))
        .await
        .expect("healthz");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await["status"], "ok");
}

#[tokio::test]
async fn healthz_reports_unavailable_when_store_is_down() {
    let state = AppState::new(Arc::new(DownStore), common::static_verifier(), None);
    let app = build_router(state).into_service();
    let response = app
        .clone()
        .oneshot(get_request("/healthz"))
        .await
        .expect("healthz");
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(read_json(response).await["code"], "unavailable");

    // Store failures behind authenticated routes are opaque 500s.
    let response = app
        .oneshot(authed_request(
            "GET",
            "/api/v1/expenses",
            &token_for("user_1"),
            None,
        ))
        .await
        .expect("expenses");
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = read_json(response).await;
    assert_eq!(body["error"], "failed to list expenses");
}

#[tokio::test]
async fn protected_routes_reject_missing_and_bad_tokens() {
    let harness = test_app();
    let expired = common::mint_token(
        common::SEED,
        common::KID,
        serde_json::json!({ "sub": "user_1", "exp": chrono::Utc::now().timestamp() - 60 }),
    );
    let wrong_key = common::mint_token(
        99,
        common::KID,
        serde_json::json!({ "sub": "user_1", "exp": chrono::Utc::now().timestamp() + 60 }),
    );
    for token in [None, Some("garbage".to_string()), Some(expired), Some(wrong_key)] {
        let request = match &token {
            Some(token) => authed_request("GET", "/api/v1/categories", token, None),
            None => get_request("/api/v1/categories"),
        };
        let response = harness.app.clone().oneshot(request).await.expect("call");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = read_json(response).await;
        assert_eq!(body["code"], "unauthorized");
        assert_eq!(body["error"], "unauthorized");
    }
}

#[tokio::test]
async fn register_user_creates_then_updates() {
    let harness = test_app();
    let token = token_for("user_abc");
    let body = serde_json::json!({
        "email": "abc@example.com",
        "first_name": "Ada",
    });
    let response = harness
        .app
        .clone()
        .oneshot(authed_request("POST", "/api/v1/users", &token, Some(body)))
        .await
        .expect("register");
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = read_json(response).await;
    assert_eq!(created["external_id"], "user_abc");
    assert_eq!(created["created_at"], created["updated_at"]);

    let response = harness
        .app
        .clone()
        .oneshot(authed_request(
            "POST",
            "/api/v1/users",
            &token,
            Some(serde_json::json!({ "email": "ada@example.com" })),
        ))
        .await
        .expect("update");
    assert_eq!(response.status(), StatusCode::OK);
    let updated = read_json(response).await;
    assert_eq!(updated["id"], created["id"]);
    assert_eq!(updated["email"], "ada@example.com");

    let response = harness
        .app
        .clone()
        .oneshot(authed_request("GET", "/api/v1/users/me", &token, None))
        .await
        .expect("me");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await["email"], "ada@example.com");
}

#[tokio::test]
async fn register_rejects_client_supplied_identity() {
    let harness = test_app();
    let response = harness
        .app
        .clone()
        .oneshot(authed_request(
            "POST",
            "/api/v1/users",
            &token_for("user_1"),
            Some(serde_json::json!({
                "email": "a@example.com",
                "external_id": "someone_else"
            })),
        ))
        .await
        .expect("register");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(read_json(response).await["code"], "validation_error");
}

#[tokio::test]
async fn categories_and_expenses_round_trip() {
    let harness = test_app();
    register(&harness.app, "alice").await;
    let token = token_for("alice");

    let response = harness
        .app
        .clone()
        .oneshot(authed_request(
            "POST",
            "/api/v1/categories",
            &token,
            Some(serde_json::json!({ "name": "Groceries", "color_hex": "#22AA55" })),
        ))
        .await
        .expect("category");
    assert_eq!(response.status(), StatusCode::CREATED);
    let category = read_json(response).await;
    assert_eq!(category["name"], "Groceries");

    for (amount, description) in [(12.5, "bread"), (40.0, "vegetables")] {
        let response = harness
            .app
            .clone()
            .oneshot(authed_request(
                "POST",
                "/api/v1/expenses",
                &token,
                Some(serde_json::json!({
                    "amount": amount,
                    "description": description,
                    "purchase_date": "2024-05-01",
                    "bill_date": "2024-06-01",
                    "category_id": category["id"],
                })),
            ))
            .await
            .expect("expense");
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let response = harness
        .app
        .clone()
        .oneshot(authed_request("GET", "/api/v1/expenses", &token, None))
        .await
        .expect("list");
    assert_eq!(response.status(), StatusCode::OK);
    let items = read_json(response).await["items"].clone();
    let items = items.as_array().expect("items");
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["description"], "vegetables");
    assert_eq!(items[1]["purchase_date"], "2024-05-01");

    let response = harness
        .app
        .clone()
        .oneshot(authed_request(
            "GET",
            "/api/v1/expenses?limit=1&offset=1",
            &token,
            None,
        ))
        .await
        .expect("page");
    let items = read_json(response).await["items"].clone();
    assert_eq!(items.as_array().map(Vec::len), Some(1));
    assert_eq!(items[0]["description"], "bread");

    let response = harness
        .app
        .clone()
        .oneshot(authed_request("GET", "/api/v1/categories", &token, None))
        .await
        .expect("categories");
    let items = read_json(response).await["items"].clone();
    assert_eq!(items.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn expense_cannot_use_another_users_category() {
    let harness = test_app();
    register(&harness.app, "alice").await;
    register(&harness.app, "bob").await;

    let response = harness
        .app
        .clone()
        .oneshot(authed_request(
            "POST",
            "/api/v1/categories",
            &token_for("alice"),
            Some(serde_json::json!({ "name": "Rent" })),
        ))
        .await
        .expect("category");
    let category = read_json(response).await;

    let expense = |category_id: serde_json::Value| {
        serde_json::json!({
            "amount": 900.0,
            "description": "rent",
            "purchase_date": "2024-05-01",
            "bill_date": "2024-05-01",
            "category_id": category_id,
        })
    };
    let response = harness
        .app
        .clone()
        .oneshot(authed_request(
            "POST",
            "/api/v1/expenses",
            &token_for("bob"),
            Some(expense(category["id"].clone())),
        ))
        .await
        .expect("forbidden");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = harness
        .app
        .clone()
        .oneshot(authed_request(
            "POST",
            "/api/v1/expenses",
            &token_for("bob"),
            Some(expense(serde_json::json!(4242))),
        ))
        .await
        .expect("missing");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unregistered_principal_gets_not_registered() {
    let harness = test_app();
    let response = harness
        .app
        .clone()
        .oneshot(authed_request(
            "GET",
            "/api/v1/expenses",
            &token_for("ghost"),
            None,
        ))
        .await
        .expect("list");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(read_json(response).await["code"], "user_not_registered");

    let response = harness
        .app
        .clone()
        .oneshot(authed_request(
            "GET",
            "/api/v1/users/me",
            &token_for("ghost"),
            None,
        ))
        .await
        .expect("me");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_input_is_rejected_with_field_errors() {
    let harness = test_app();
    register(&harness.app, "alice").await;
    let token = token_for("alice");

    let response = harness
        .app
        .clone()
        .oneshot(authed_request(
            "POST",
            "/api/v1/expenses",
            &token,
            Some(serde_json::json!({
                "amount": 0,
                "description": "",
                "purchase_date": "yesterday",
                "bill_date": "2024-06-01",
            })),
        ))
        .await
        .expect("expense");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert_eq!(body["code"], "validation_error");
    assert_eq!(body["errors"].as_array().map(Vec::len), Some(3));

    let response = harness
        .app
        .clone()
        .oneshot(authed_request(
            "GET",
            "/api/v1/categories?limit=500",
            &token,
            None,
        ))
        .await
        .expect("categories");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        read_json(response).await["error"],
        "limit must be at most 100"
    );

    let mut request = json_request("POST", "/api/v1/categories", serde_json::json!({}));
    request.headers_mut().insert(
        "authorization",
        format!("Bearer {token}").parse().expect("header"),
    );
    let response = harness.app.clone().oneshot(request).await.expect("category");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(read_json(response).await["error"], "name is required");
}

#[tokio::test]
async fn plain_http_is_redirected_when_https_is_enforced() {
    let settings = HttpSettings {
        enforce_https: true,
        ..HttpSettings::default()
    };
    let harness = test_app_with(settings, None);
    let mut request = get_request("/api/v1/expenses?limit=5");
    request
        .headers_mut()
        .insert("x-forwarded-proto", "http".parse().expect("header"));
    request
        .headers_mut()
        .insert("host", "api.clearflow.test".parse().expect("header"));
    request
        .headers_mut()
        .insert("x-forwarded-host", "phish.example".parse().expect("header"));
    let response = harness.app.clone().oneshot(request).await.expect("redirect");
    assert_eq!(response.status(), StatusCode::PERMANENT_REDIRECT);
    assert_eq!(
        response.headers()["location"],
        "https://api.clearflow.test/api/v1/expenses?limit=5"
    );

    let response = harness
        .app
        .clone()
        .oneshot(get_request("/healthz"))
        .await
        .expect("healthz");
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn cors_preflight_allows_configured_origin() {
    let harness = test_app();
    let request = axum::http::Request::builder()
        .method("OPTIONS")
        .uri("/api/v1/expenses")
        .header("origin", "http://localhost:3000")
        .header("access-control-request-method", "POST")
        .header("access-control-request-headers", "authorization")
        .body(axum::body::Body::empty())
        .expect("request");
    let response = harness.app.clone().oneshot(request).await.expect("preflight");
    assert_eq!(
        response.headers()["access-control-allow-origin"],
        "http://localhost:3000"
    );
    assert_eq!(response.headers()["access-control-max-age"], "300");
}

#[tokio::test]
async fn openapi_document_is_served() {
    let harness = test_app();
    let response = harness
        .app
        .clone()
        .oneshot(get_request("/v1/openapi.json"))
        .await
        .expect("openapi");
    assert_eq!(response.status(), StatusCode::OK);
    let doc = read_json(response).await;
    assert!(doc["paths"]["/api/v1/expenses"].is_object());
    assert!(doc["paths"]["/webhooks/clerk"].is_object());
}

#[tokio::test]
async fn build_router_with_default_settings_serves_health() {
    let state = AppState::new(
        Arc::new(clearflow::store::memory::InMemoryStore::new()),
        common::static_verifier(),
        None,
    );
    let app = build_router_with(state, &HttpSettings::default()).into_service();
    let response = app.oneshot(get_request("/healthz")).await.expect("healthz");
    assert_eq!(response.status(), StatusCode::OK);
}
