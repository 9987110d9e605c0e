//! The authenticated caller and its Axum extractor.
//!
//! Handlers that take a [`Principal`] argument are authenticated: the extractor
//! runs the [`TokenVerifier`](crate::auth::verifier::TokenVerifier) and rejects
//! the request with 401 before the handler body runs. Identity always comes
//! from here, never from client-supplied IDs.
use crate::api::error::{ApiError, api_unauthorized};
use crate::app::AppState;
use crate::observability;
use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// The identity provider's subject (`sub` claim).
    pub subject_id: String,
}

/// Extract the token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

fn reject(reason: &'static str) -> ApiError {
    metrics::counter!(observability::AUTH_FAILURES_TOTAL, "reason" => reason).increment(1);
    api_unauthorized("unauthorized")
}

#[async_trait]
impl FromRequestParts<AppState> for Principal {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer_token(&parts.headers) else {
            tracing::warn!(reason = "missing_token", "rejecting unauthenticated request");
            return Err(reject("missing_token"));
        };
        match state.verifier.verify(token).await {
            Ok(principal) => {
                tracing::debug!(subject = %principal.subject_id, "authenticated request");
                Ok(principal)
            }
            Err(err) => {
                tracing::warn!(reason = err.reason(), error = %err, "token verification failed");
                Err(reject(err.reason()))
            }
        }
    }
}
