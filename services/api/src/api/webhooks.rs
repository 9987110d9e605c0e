//! Identity provider webhook endpoint.
//!
//! # Key invariants and assumptions
//! - The signature is checked against the raw bytes before anything parses
//!   the payload.
//! - Bodies above [`MAX_WEBHOOK_BODY_BYTES`] are rejected unread.
//! - Redelivery is expected: a delete for an absent user is acknowledged.
use crate::api::error::{ApiError, api_internal, api_internal_message, api_unauthorized, api_validation_error};
use crate::api::types::WebhookAck;
use crate::app::AppState;
use crate::identity::events::IdentityEvent;
use crate::identity::reconciler::ReconcileError;
use crate::observability;
use axum::Json;
use axum::body::Body;
use axum::extract::State;
use axum::http::HeaderMap;

pub const MAX_WEBHOOK_BODY_BYTES: usize = 1 << 20;

fn ack(outcome: &str) -> Json<WebhookAck> {
    Json(WebhookAck {
        status: "ok".to_string(),
        outcome: outcome.to_string(),
    })
}

#[utoipa::path(
    post,
    path = "/webhooks/clerk",
    tag = "webhooks",
    request_body(content = String, description = "Signed identity event", content_type = "application/json"),
    responses(
        (status = 200, description = "Event applied or ignored", body = WebhookAck),
        (status = 400, description = "Unreadable or malformed payload", body = crate::api::types::ErrorResponse),
        (status = 401, description = "Signature verification failed", body = crate::api::types::ErrorResponse),
        (status = 500, description = "Webhook secret missing or store failure", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn clerk_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<WebhookAck>, ApiError> {
    let Some(verifier) = state.webhook_verifier.as_ref() else {
        tracing::error!("webhook received but CLERK_WEBHOOK_SECRET is not configured");
        return Err(api_internal_message("webhook secret not configured"));
    };
    let payload = axum::body::to_bytes(body, MAX_WEBHOOK_BODY_BYTES)
        .await
        .map_err(|err| {
            tracing::warn!(error = %err, "failed to read webhook body");
            api_validation_error("request body unreadable or too large")
        })?;
    if let Err(err) = verifier.verify(&headers, &payload) {
        tracing::warn!(error = %err, "webhook signature rejected");
        metrics::counter!(observability::WEBHOOK_REJECTIONS_TOTAL, "reason" => "signature")
            .increment(1);
        return Err(api_unauthorized("invalid webhook signature"));
    }
    let event: IdentityEvent = serde_json::from_slice(&payload).map_err(|err| {
        tracing::warn!(error = %err, "webhook payload is not an event");
        api_validation_error("invalid event payload")
    })?;

    match state.reconciler.apply(&event).await {
        Ok(outcome) => Ok(ack(outcome.label())),
        Err(ReconcileError::UserNotFound(external_id)) => {
            tracing::info!(%external_id, "delete for unknown user acknowledged");
            Ok(ack("not_found"))
        }
        Err(ReconcileError::InvalidPayload { event_type, source }) => {
            tracing::warn!(%event_type, error = %source, "malformed identity event data");
            Err(api_validation_error(&format!("invalid {event_type} payload")))
        }
        Err(ReconcileError::Store(err)) => Err(api_internal("failed to apply identity event", &err)),
    }
}
