//! Self-service user endpoints.
//!
//! The caller can only ever read or register itself: the external id comes
//! from the verified token, the body only carries profile fields.
use crate::api::error::{ApiError, api_internal, api_not_found, api_validation_errors};
use crate::api::json_body;
use crate::api::types::RegisterUserRequest;
use crate::app::AppState;
use crate::auth::principal::Principal;
use crate::model::{User, UserUpsert};
use crate::store::StoreError;
use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;

#[utoipa::path(
    post,
    path = "/api/v1/users",
    tag = "users",
    request_body = RegisterUserRequest,
    responses(
        (status = 201, description = "User registered", body = User),
        (status = 200, description = "Existing user updated", body = User),
        (status = 400, description = "Invalid body", body = crate::api::types::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::api::types::ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub(crate) async fn register_user(
    principal: Principal,
    State(state): State<AppState>,
    payload: Result<Json<RegisterUserRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let body = json_body(payload)?;
    body.validate().map_err(api_validation_errors)?;
    let user = state
        .store
        .upsert_user_by_external_id(UserUpsert {
            external_id: principal.subject_id,
            email: body.email.trim().to_string(),
            first_name: body.first_name,
            last_name: body.last_name,
            image_url: body.image_url,
        })
        .await
        .map_err(|err| api_internal("failed to register user", &err))?;
    let status = if user.is_freshly_created() {
        tracing::info!(user_id = %user.id, "user registered");
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(user)))
}

#[utoipa::path(
    get,
    path = "/api/v1/users/me",
    tag = "users",
    responses(
        (status = 200, description = "The caller's user record", body = User),
        (status = 401, description = "Missing or invalid token", body = crate::api::types::ErrorResponse),
        (status = 404, description = "Not registered", body = crate::api::types::ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub(crate) async fn current_user(
    principal: Principal,
    State(state): State<AppState>,
) -> Result<Json<User>, ApiError> {
    match state.store.get_user_by_external_id(&principal.subject_id).await {
        Ok(user) => Ok(Json(user)),
        Err(StoreError::NotFound(_)) => Err(api_not_found("user not found")),
        Err(err) => Err(api_internal("failed to load user", &err)),
    }
}
