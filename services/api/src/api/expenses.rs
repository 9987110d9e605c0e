//! Expense API handlers.
use crate::api::error::{ApiError, api_finance_error, api_validation_errors};
use crate::api::types::{CreateExpenseRequest, ExpenseListResponse};
use crate::api::{DEFAULT_EXPENSE_LIMIT, json_body, parse_page};
use crate::app::AppState;
use crate::auth::principal::Principal;
use crate::model::Expense;
use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use std::collections::HashMap;

#[utoipa::path(
    get,
    path = "/api/v1/expenses",
    tag = "expenses",
    params(
        ("limit" = Option<u32>, Query, description = "Page size, 1-100 (default 10)"),
        ("offset" = Option<u32>, Query, description = "Rows to skip (default 0)")
    ),
    responses(
        (status = 200, description = "The caller's expenses, newest first", body = ExpenseListResponse),
        (status = 400, description = "Invalid paging parameters", body = crate::api::types::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::api::types::ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub(crate) async fn list_expenses(
    principal: Principal,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<AppState>,
) -> Result<Json<ExpenseListResponse>, ApiError> {
    let page = parse_page(&params, DEFAULT_EXPENSE_LIMIT)?;
    let items = state
        .finance
        .list_expenses(&principal, page)
        .await
        .map_err(|err| api_finance_error("list expenses", err))?;
    Ok(Json(ExpenseListResponse { items }))
}

#[utoipa::path(
    post,
    path = "/api/v1/expenses",
    tag = "expenses",
    request_body = CreateExpenseRequest,
    responses(
        (status = 201, description = "Expense created", body = Expense),
        (status = 400, description = "Invalid body", body = crate::api::types::ErrorResponse),
        (status = 403, description = "Category owned by another user", body = crate::api::types::ErrorResponse),
        (status = 404, description = "Category or user not found", body = crate::api::types::ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub(crate) async fn create_expense(
    principal: Principal,
    State(state): State<AppState>,
    payload: Result<Json<CreateExpenseRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let input = json_body(payload)?
        .into_input()
        .map_err(api_validation_errors)?;
    let expense = state
        .finance
        .create_expense(&principal, input)
        .await
        .map_err(|err| api_finance_error("create expense", err))?;
    Ok((StatusCode::CREATED, Json(expense)))
}
