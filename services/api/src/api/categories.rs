//! Category API handlers.
use crate::api::error::{ApiError, api_finance_error, api_validation_errors};
use crate::api::types::{CategoryListResponse, CreateCategoryRequest};
use crate::api::{DEFAULT_CATEGORY_LIMIT, json_body, parse_page};
use crate::app::AppState;
use crate::auth::principal::Principal;
use crate::model::Category;
use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use std::collections::HashMap;

#[utoipa::path(
    get,
    path = "/api/v1/categories",
    tag = "categories",
    params(
        ("limit" = Option<u32>, Query, description = "Page size, 1-100 (default 100)"),
        ("offset" = Option<u32>, Query, description = "Rows to skip (default 0)")
    ),
    responses(
        (status = 200, description = "The caller's categories, newest first", body = CategoryListResponse),
        (status = 400, description = "Invalid paging parameters", body = crate::api::types::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::api::types::ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub(crate) async fn list_categories(
    principal: Principal,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<AppState>,
) -> Result<Json<CategoryListResponse>, ApiError> {
    let page = parse_page(&params, DEFAULT_CATEGORY_LIMIT)?;
    let items = state
        .finance
        .list_categories(&principal, page)
        .await
        .map_err(|err| api_finance_error("list categories", err))?;
    Ok(Json(CategoryListResponse { items }))
}

#[utoipa::path(
    post,
    path = "/api/v1/categories",
    tag = "categories",
    request_body = CreateCategoryRequest,
    responses(
        (status = 201, description = "Category created", body = Category),
        (status = 400, description = "Invalid body", body = crate::api::types::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::api::types::ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub(crate) async fn create_category(
    principal: Principal,
    State(state): State<AppState>,
    payload: Result<Json<CreateCategoryRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let input = json_body(payload)?
        .into_input()
        .map_err(api_validation_errors)?;
    let category = state
        .finance
        .create_category(&principal, input)
        .await
        .map_err(|err| api_finance_error("create category", err))?;
    Ok((StatusCode::CREATED, Json(category)))
}
