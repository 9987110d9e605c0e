//! Service configuration sourced from the environment with an optional YAML
//! override file named by `CLEARFLOW_CONFIG`.
//!
//! Missing required settings are fatal at startup: the binary refuses to run
//! without a database URL (postgres backend) or a derivable JWKS endpoint.
use anyhow::{Context, Result, anyhow, bail};
use jsonwebtoken::Algorithm;
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_METRICS_BIND: &str = "0.0.0.0:9090";
pub const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000";
pub const DEFAULT_ENVIRONMENT: &str = "development";
pub const DEFAULT_JWKS_CACHE_SECS: u64 = 24 * 60 * 60;
pub const DEFAULT_JWKS_FETCH_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const CLERK_JWKS_URL: &str = "https://api.clerk.com/v1/jwks";
const CLERK_API_PREFIX: &str = "https://api.clerk.com/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Postgres,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            other => bail!("unknown storage backend '{other}'"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_ms: u64,
    pub acquire_timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwks_url: String,
    /// Sent as a bearer credential when fetching the key set (Clerk backend API).
    pub jwks_bearer: Option<String>,
    pub issuer: Option<String>,
    pub audience: Option<String>,
    pub cache_duration: Duration,
    pub fetch_timeout: Duration,
    pub clock_skew_seconds: u64,
    pub allowed_algorithms: Vec<Algorithm>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub metrics_bind: SocketAddr,
    pub environment: String,
    pub allowed_origins: Vec<String>,
    pub enforce_https: bool,
    pub request_timeout: Duration,
    pub storage: StorageBackend,
    pub postgres: Option<PostgresConfig>,
    pub auth: AuthConfig,
    pub clerk_webhook_secret: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AppConfigOverride {
    bind_addr: Option<String>,
    metrics_bind: Option<String>,
    environment: Option<String>,
    allowed_origins: Option<Vec<String>>,
    enforce_https: Option<bool>,
    request_timeout_secs: Option<u64>,
    storage: Option<String>,
    database_url: Option<String>,
    jwks_url: Option<String>,
    issuer: Option<String>,
    audience: Option<String>,
    jwks_cache_secs: Option<u64>,
    clock_skew_secs: Option<u64>,
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key).filter(|value| !value.trim().is_empty()) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|err| anyhow!("parse {key}={value}: {err}")),
        None => Ok(default),
    }
}

fn non_empty(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn stack_auth_jwks_url(project_id: &str) -> String {
    format!("https://api.stack-auth.com/api/v1/projects/{project_id}/.well-known/jwks.json")
}

fn parse_algorithms(raw: &str) -> Result<Vec<Algorithm>> {
    raw.split(',')
        .map(str::trim)
        .filter(|alg| !alg.is_empty())
        .map(|alg| Algorithm::from_str(alg).map_err(|_| anyhow!("unknown algorithm '{alg}'")))
        .collect()
}

/// The Clerk secret only ever goes to Clerk's own API.
fn clerk_bearer(jwks_url: &str, secret: Option<String>) -> Option<String> {
    secret.filter(|_| jwks_url.starts_with(CLERK_API_PREFIX))
}

fn is_local_environment(environment: &str) -> bool {
    matches!(environment, "local" | "development" | "test")
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup; `from_env` passes the
    /// process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let port: u16 = parse_var(&lookup, "PORT", DEFAULT_PORT)?;
        let bind_addr = SocketAddr::from(([0, 0, 0, 0], port));
        let metrics_bind = non_empty(&lookup, "METRICS_BIND")
            .unwrap_or_else(|| DEFAULT_METRICS_BIND.to_string())
            .parse()
            .with_context(|| "parse METRICS_BIND")?;
        let environment =
            non_empty(&lookup, "ENV").unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string());
        let allowed_origins = split_origins(
            &non_empty(&lookup, "ALLOWED_ORIGINS")
                .unwrap_or_else(|| DEFAULT_ALLOWED_ORIGINS.to_string()),
        );
        let enforce_https = parse_var(
            &lookup,
            "ENFORCE_HTTPS",
            !is_local_environment(&environment),
        )?;
        let request_timeout = Duration::from_secs(parse_var(
            &lookup,
            "REQUEST_TIMEOUT_SECS",
            DEFAULT_REQUEST_TIMEOUT_SECS,
        )?);

        let storage: StorageBackend = parse_var(&lookup, "STORAGE_BACKEND", StorageBackend::Postgres)?;
        let postgres = non_empty(&lookup, "DATABASE_URL")
            .map(|url| -> Result<PostgresConfig> {
                Ok(PostgresConfig {
                    url,
                    max_connections: parse_var(
                        &lookup,
                        "DATABASE_MAX_CONNECTIONS",
                        DEFAULT_MAX_CONNECTIONS,
                    )?,
                    connect_timeout_ms: 5_000,
                    acquire_timeout_ms: 5_000,
                })
            })
            .transpose()?;

        let clerk_secret = non_empty(&lookup, "CLERK_SECRET_KEY");
        let (jwks_url, jwks_bearer) = match (
            non_empty(&lookup, "AUTH_JWKS_URL"),
            non_empty(&lookup, "STACK_AUTH_PROJECT_ID"),
            clerk_secret,
        ) {
            (Some(url), _, secret) => {
                let bearer = clerk_bearer(&url, secret);
                (url, bearer)
            }
            (None, Some(project_id), _) => (stack_auth_jwks_url(&project_id), None),
            (None, None, Some(secret)) => (CLERK_JWKS_URL.to_string(), Some(secret)),
            (None, None, None) => (String::new(), None),
        };
        let allowed_algorithms = match non_empty(&lookup, "AUTH_ALLOWED_ALGORITHMS") {
            Some(raw) => parse_algorithms(&raw)?,
            None => vec![Algorithm::RS256, Algorithm::ES256, Algorithm::EdDSA],
        };
        let auth = AuthConfig {
            jwks_url,
            jwks_bearer,
            issuer: non_empty(&lookup, "AUTH_ISSUER"),
            audience: non_empty(&lookup, "AUTH_AUDIENCE"),
            cache_duration: Duration::from_secs(parse_var(
                &lookup,
                "AUTH_JWKS_CACHE_SECS",
                DEFAULT_JWKS_CACHE_SECS,
            )?),
            fetch_timeout: Duration::from_millis(parse_var(
                &lookup,
                "AUTH_JWKS_FETCH_TIMEOUT_MS",
                DEFAULT_JWKS_FETCH_TIMEOUT_MS,
            )?),
            clock_skew_seconds: parse_var(&lookup, "AUTH_CLOCK_SKEW_SECS", 0)?,
            allowed_algorithms,
        };

        let config = Self {
            bind_addr,
            metrics_bind,
            environment,
            allowed_origins,
            enforce_https,
            request_timeout,
            storage,
            postgres,
            auth,
            clerk_webhook_secret: non_empty(&lookup, "CLERK_WEBHOOK_SECRET"),
        };
        Ok(config)
    }

    pub fn from_env_or_yaml() -> Result<Self> {
        let mut config = Self::from_env()?;
        if let Ok(path) = std::env::var("CLEARFLOW_CONFIG") {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("read CLEARFLOW_CONFIG: {path}"))?;
            config.apply_yaml(&contents)?;
        }
        config.validate()?;
        Ok(config)
    }

    fn apply_yaml(&mut self, contents: &str) -> Result<()> {
        let override_cfg: AppConfigOverride =
            serde_yaml::from_str(contents).with_context(|| "parse clearflow config yaml")?;
        if let Some(value) = override_cfg.bind_addr {
            self.bind_addr = value.parse().with_context(|| "parse bind_addr")?;
        }
        if let Some(value) = override_cfg.metrics_bind {
            self.metrics_bind = value.parse().with_context(|| "parse metrics_bind")?;
        }
        if let Some(value) = override_cfg.environment {
            self.environment = value;
        }
        if let Some(value) = override_cfg.allowed_origins {
            self.allowed_origins = value;
        }
        if let Some(value) = override_cfg.enforce_https {
            self.enforce_https = value;
        }
        if let Some(value) = override_cfg.request_timeout_secs {
            self.request_timeout = Duration::from_secs(value);
        }
        if let Some(value) = override_cfg.storage {
            self.storage = value.parse()?;
        }
        if let Some(url) = override_cfg.database_url {
            match &mut self.postgres {
                Some(pg) => pg.url = url,
                None => {
                    self.postgres = Some(PostgresConfig {
                        url,
                        max_connections: DEFAULT_MAX_CONNECTIONS,
                        connect_timeout_ms: 5_000,
                        acquire_timeout_ms: 5_000,
                    })
                }
            }
        }
        if let Some(value) = override_cfg.jwks_url {
            self.auth.jwks_bearer = clerk_bearer(&value, self.auth.jwks_bearer.take());
            self.auth.jwks_url = value;
        }
        if let Some(value) = override_cfg.issuer {
            self.auth.issuer = Some(value);
        }
        if let Some(value) = override_cfg.audience {
            self.auth.audience = Some(value);
        }
        if let Some(value) = override_cfg.jwks_cache_secs {
            self.auth.cache_duration = Duration::from_secs(value);
        }
        if let Some(value) = override_cfg.clock_skew_secs {
            self.auth.clock_skew_seconds = value;
        }
        Ok(())
    }

    /// Reject configurations the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.storage == StorageBackend::Postgres && self.postgres.is_none() {
            bail!("DATABASE_URL is required for the postgres storage backend");
        }
        if self.auth.jwks_url.is_empty() {
            bail!("no JWKS endpoint configured: set AUTH_JWKS_URL, STACK_AUTH_PROJECT_ID, or CLERK_SECRET_KEY");
        }
        if self.auth.allowed_algorithms.is_empty() {
            bail!("AUTH_ALLOWED_ALGORITHMS must name at least one algorithm");
        }
        if self.auth.cache_duration.is_zero() {
            bail!("AUTH_JWKS_CACHE_SECS must be positive");
        }
        if self.auth.fetch_timeout.is_zero() {
            bail!("AUTH_JWKS_FETCH_TIMEOUT_MS must be positive");
        }
        if self.request_timeout.is_zero() {
            bail!("REQUEST_TIMEOUT_SECS must be positive");
        }
        Ok(())
    }
}
