//! Clearflow API service entry point.
//!
//! # Purpose
//! Wires configuration, storage, token verification, and the HTTP router,
//! then serves the API alongside the metrics listener.
//!
//! # Notes
//! The `build_state` helper keeps wiring testable and minimizes main setup logic.
use anyhow::Context;
use clap::Parser;
use clearflow::app::{AppState, HttpSettings, build_router_with};
use clearflow::auth::keyset::{HttpKeySetFetcher, KeySetCache, SystemClock};
use clearflow::auth::verifier::TokenVerifier;
use clearflow::config::{AppConfig, StorageBackend};
use clearflow::identity::signature::WebhookVerifier;
use clearflow::observability;
use clearflow::store::FinanceStore;
use clearflow::store::memory::InMemoryStore;
use clearflow::store::postgres::PostgresStore;
use std::future::Future;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "clearflow-api", version, about = "Clearflow personal finance API")]
struct Cli {
    /// Connect to the configured store, ping it, and exit.
    #[arg(long)]
    check_db: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::from_env_or_yaml().context("load configuration")?;
    if cli.check_db {
        return check_db(&config).await;
    }
    run_with_shutdown(config, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await
}

async fn check_db(config: &AppConfig) -> anyhow::Result<()> {
    observability::init_observability("clearflow-api");
    let store = build_store(config).await?;
    store
        .health_check()
        .await
        .context("store health check failed")?;
    tracing::info!(backend = store.backend_name(), "store reachable");
    Ok(())
}

async fn run_with_shutdown<F>(config: AppConfig, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let metrics_handle = observability::init_observability("clearflow-api");
    let state = build_state(&config).await?;
    tracing::info!(
        backend = state.store.backend_name(),
        durable = state.store.is_durable(),
        environment = %config.environment,
        jwks_url = %config.auth.jwks_url,
        "clearflow state ready"
    );
    let metrics_task = tokio::spawn(observability::serve_metrics(
        metrics_handle,
        config.metrics_bind,
    ));

    let app = build_router_with(state, &HttpSettings::from(&config));

    let addr = config.bind_addr;
    tracing::info!(%addr, "clearflow api listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tokio::pin!(shutdown);
    tokio::select! {
        result = axum::serve(listener, app.into_make_service()) => {
            result?;
        }
        _ = &mut shutdown => {}
    }

    metrics_task.abort();
    let _ = metrics_task.await;
    Ok(())
}

async fn build_store(config: &AppConfig) -> anyhow::Result<Arc<dyn FinanceStore>> {
    let store: Arc<dyn FinanceStore> = match config.storage {
        StorageBackend::Memory => Arc::new(InMemoryStore::new()),
        StorageBackend::Postgres => {
            let pg = config
                .postgres
                .as_ref()
                .context("postgres configuration missing")?;
            Arc::new(
                PostgresStore::connect(pg)
                    .await
                    .context("connect to postgres")?,
            )
        }
    };
    Ok(store)
}

async fn build_state(config: &AppConfig) -> anyhow::Result<AppState> {
    let store = build_store(config).await?;

    let fetcher = HttpKeySetFetcher::new(&config.auth.jwks_url, config.auth.jwks_bearer.clone())
        .context("build JWKS client")?;
    let keys = Arc::new(KeySetCache::new(
        Arc::new(fetcher),
        Arc::new(SystemClock),
        config.auth.cache_duration,
        config.auth.fetch_timeout,
    ));
    let verifier = TokenVerifier::new(keys)
        .with_allowed_algorithms(config.auth.allowed_algorithms.clone())
        .with_issuer(config.auth.issuer.clone())
        .with_audience(config.auth.audience.clone())
        .with_leeway(config.auth.clock_skew_seconds);

    let webhook_verifier = match &config.clerk_webhook_secret {
        Some(secret) => Some(WebhookVerifier::new(secret).context("parse CLERK_WEBHOOK_SECRET")?),
        None => {
            tracing::warn!("CLERK_WEBHOOK_SECRET not set; identity webhooks will be rejected");
            None
        }
    };

    Ok(AppState::new(store, Arc::new(verifier), webhook_verifier))
}
