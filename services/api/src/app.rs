//! HTTP application wiring.
//!
//! # Purpose
//! Builds the Axum router, configures middleware, and defines the shared
//! application state injected into handlers.
//!
//! # Notes
//! Route composition lives here so `main` stays small and the router can be
//! driven directly from tests.
use crate::api;
use crate::api::openapi::ApiDoc;
use crate::auth::verifier::TokenVerifier;
use crate::config::{AppConfig, DEFAULT_ALLOWED_ORIGINS, DEFAULT_REQUEST_TIMEOUT_SECS};
use crate::finance::FinanceService;
use crate::identity::reconciler::IdentityReconciler;
use crate::identity::signature::WebhookVerifier;
use crate::observability;
use crate::store::FinanceStore;
use axum::Router;
use axum::http::{HeaderName, HeaderValue, Method, header};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_opentelemetry::OpenTelemetrySpanExt;
use utoipa::OpenApi;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn FinanceStore>,
    pub verifier: Arc<TokenVerifier>,
    pub finance: Arc<FinanceService<dyn FinanceStore>>,
    pub reconciler: Arc<IdentityReconciler<dyn FinanceStore>>,
    /// `None` when no signing secret is configured; webhook calls then fail.
    pub webhook_verifier: Option<Arc<WebhookVerifier>>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn FinanceStore>,
        verifier: Arc<TokenVerifier>,
        webhook_verifier: Option<WebhookVerifier>,
    ) -> Self {
        Self {
            finance: Arc::new(FinanceService::new(store.clone())),
            reconciler: Arc::new(IdentityReconciler::new(store.clone())),
            store,
            verifier,
            webhook_verifier: webhook_verifier.map(Arc::new),
        }
    }
}

/// Router-level middleware settings.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub allowed_origins: Vec<String>,
    pub enforce_https: bool,
    pub request_timeout: Duration,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            allowed_origins: vec![DEFAULT_ALLOWED_ORIGINS.to_string()],
            enforce_https: false,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl From<&AppConfig> for HttpSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            allowed_origins: config.allowed_origins.clone(),
            enforce_https: config.enforce_https,
            request_timeout: config.request_timeout,
        }
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::ACCEPT,
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-csrf-token"),
        ])
        .expose_headers([header::LINK])
        .max_age(Duration::from_secs(300))
}

pub fn build_router(state: AppState) -> Router {
    build_router_with(state, &HttpSettings::default())
}

pub fn build_router_with(state: AppState, settings: &HttpSettings) -> Router {
    let trace_layer =
        TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
            let parent = observability::trace_context_from_headers(request.headers());
            let span = tracing::info_span!(
                "http.request",
                method = %request.method(),
                uri = %request.uri(),
                version = ?request.version()
            );
            span.set_parent(parent);
            span
        });

    let router = Router::new()
        .route("/healthz", axum::routing::get(api::system::healthz))
        .route(
            "/webhooks/clerk",
            axum::routing::post(api::webhooks::clerk_webhook),
        )
        .route(
            "/api/v1/users",
            axum::routing::post(api::users::register_user),
        )
        .route(
            "/api/v1/users/me",
            axum::routing::get(api::users::current_user),
        )
        .route(
            "/api/v1/expenses",
            axum::routing::get(api::expenses::list_expenses).post(api::expenses::create_expense),
        )
        .route(
            "/api/v1/categories",
            axum::routing::get(api::categories::list_categories)
                .post(api::categories::create_category),
        )
        .merge(
            utoipa_swagger_ui::SwaggerUi::new("/docs").url("/v1/openapi.json", ApiDoc::openapi()),
        )
        .layer(TimeoutLayer::new(settings.request_timeout))
        .layer(cors_layer(&settings.allowed_origins));

    let router = if settings.enforce_https {
        router.layer(axum::middleware::from_fn(api::middleware::enforce_https))
    } else {
        router
    };

    router.layer(trace_layer).with_state(state)
}
