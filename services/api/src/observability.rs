//! Logging, trace export and Prometheus metrics for the API process.
//!
//! Logs always go to stdout through `tracing-subscriber`. Spans are exported
//! over OTLP only when `OTEL_EXPORTER_OTLP_ENDPOINT` is set. Inbound
//! `traceparent` headers parent the request span either way.
//!
//! Every counter the crate emits is listed in [`COUNTERS`] and described on
//! startup, so a scrape carries help text even before the first increment.
use axum::Router;
use axum::http::HeaderMap;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::propagation::Extractor;
use opentelemetry::trace::TracerProvider;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::SdkTracerProvider;
use std::net::SocketAddr;
use std::sync::{Once, OnceLock};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub const JWKS_REFRESH_TOTAL: &str = "clearflow_jwks_refresh_total";
pub const AUTH_FAILURES_TOTAL: &str = "clearflow_auth_failures_total";
pub const IDENTITY_EVENTS_TOTAL: &str = "clearflow_identity_events_total";
pub const WEBHOOK_REJECTIONS_TOTAL: &str = "clearflow_webhook_rejections_total";

/// Counter names paired with their help text.
pub const COUNTERS: [(&str, &str); 4] = [
    (JWKS_REFRESH_TOTAL, "Key set refresh attempts by outcome"),
    (AUTH_FAILURES_TOTAL, "Rejected bearer tokens by reason"),
    (
        IDENTITY_EVENTS_TOTAL,
        "Identity provider events by type and outcome",
    ),
    (
        WEBHOOK_REJECTIONS_TOTAL,
        "Webhook deliveries rejected before processing",
    ),
];

const OTLP_ENDPOINT_VAR: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";

static TRACING: Once = Once::new();
static PROPAGATOR: Once = Once::new();
static RECORDER: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install logging, tracing and the metrics recorder. Safe to call more than
/// once; later calls return the handle from the first.
pub fn init_observability(service_name: &str) -> PrometheusHandle {
    TRACING.call_once(|| init_tracing(service_name));
    metrics_handle()
}

fn init_tracing(service_name: &str) {
    install_propagator();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer());

    let Some(endpoint) = std::env::var(OTLP_ENDPOINT_VAR)
        .ok()
        .filter(|value| !value.trim().is_empty())
    else {
        let _ = registry.try_init();
        return;
    };
    match span_exporter(service_name) {
        Ok(provider) => {
            let tracer = provider.tracer(service_name.to_string());
            global::set_tracer_provider(provider);
            let _ = registry
                .with(tracing_opentelemetry::layer().with_tracer(tracer))
                .try_init();
            tracing::info!(%endpoint, "exporting spans over OTLP");
        }
        Err(err) => {
            let _ = registry.try_init();
            tracing::warn!(%endpoint, error = %err, "OTLP exporter unavailable; spans stay local");
        }
    }
}

fn span_exporter(service_name: &str) -> Result<SdkTracerProvider, String> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .build()
        .map_err(|err| err.to_string())?;
    let resource = Resource::builder_empty()
        .with_attributes([
            KeyValue::new("service.name", service_name.to_string()),
            KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
        ])
        .build();
    Ok(SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(resource)
        .build())
}

fn install_propagator() {
    PROPAGATOR.call_once(|| global::set_text_map_propagator(TraceContextPropagator::new()));
}

/// The W3C trace context carried by `headers`, or an empty context.
pub fn trace_context_from_headers(headers: &HeaderMap) -> opentelemetry::Context {
    install_propagator();
    global::get_text_map_propagator(|propagator| propagator.extract(&RequestHeaders(headers)))
}

struct RequestHeaders<'a>(&'a HeaderMap);

impl Extractor for RequestHeaders<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|value| value.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|name| name.as_str()).collect()
    }
}

/// Handle onto the process-wide Prometheus recorder, installing it on first
/// use.
pub fn metrics_handle() -> PrometheusHandle {
    RECORDER
        .get_or_init(|| {
            let handle = match PrometheusBuilder::new().install_recorder() {
                Ok(handle) => handle,
                Err(err) => {
                    // Someone else owns the global recorder; scrapes stay empty.
                    tracing::warn!(error = %err, "metrics recorder already installed");
                    PrometheusBuilder::new().build_recorder().handle()
                }
            };
            for (name, help) in COUNTERS {
                metrics::describe_counter!(name, help);
            }
            handle
        })
        .clone()
}

pub fn metrics_router(handle: PrometheusHandle) -> Router {
    Router::new().route(
        "/metrics",
        axum::routing::get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    )
}

/// Serve `/metrics` on `addr` until the task is dropped.
pub async fn serve_metrics(handle: PrometheusHandle, addr: SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "metrics listening");
    axum::serve(listener, metrics_router(handle).into_make_service()).await
}
