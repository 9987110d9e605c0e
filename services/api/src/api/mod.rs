//! Clearflow HTTP API module.
//!
//! # Purpose
//! Exposes route handler modules plus the shared helpers for pagination
//! query parameters and JSON body rejections.
pub mod categories;
pub mod error;
pub mod expenses;
pub mod middleware;
pub mod openapi;
pub mod system;
pub mod types;
pub mod users;
pub mod webhooks;

use crate::api::error::{ApiError, api_validation_error, api_validation_errors};
use crate::store::Page;
use axum::Json;
use axum::extract::rejection::JsonRejection;
use std::collections::HashMap;

pub const MAX_PAGE_LIMIT: i64 = 100;
pub const DEFAULT_EXPENSE_LIMIT: u32 = 10;
pub const DEFAULT_CATEGORY_LIMIT: u32 = 100;

fn parse_bound(
    params: &HashMap<String, String>,
    name: &str,
    default: i64,
    min: i64,
    max: i64,
    errors: &mut Vec<String>,
) -> i64 {
    let Some(raw) = params.get(name).map(|value| value.trim()) else {
        return default;
    };
    match raw.parse::<i64>() {
        Ok(value) if value < min => {
            errors.push(format!("{name} must be at least {min}"));
            default
        }
        Ok(value) if value > max => {
            errors.push(format!("{name} must be at most {max}"));
            default
        }
        Ok(value) => value,
        Err(_) => {
            errors.push(format!("{name} must be an integer"));
            default
        }
    }
}

/// Read `limit` (1..=100) and `offset` (>= 0) from the query string.
pub(crate) fn parse_page(
    params: &HashMap<String, String>,
    default_limit: u32,
) -> Result<Page, ApiError> {
    let mut errors = Vec::new();
    let limit = parse_bound(
        params,
        "limit",
        i64::from(default_limit),
        1,
        MAX_PAGE_LIMIT,
        &mut errors,
    );
    let offset = parse_bound(params, "offset", 0, 0, i64::from(u32::MAX), &mut errors);
    if !errors.is_empty() {
        return Err(api_validation_errors(errors));
    }
    Ok(Page {
        limit: limit as u32,
        offset: offset as u32,
    })
}

/// Unwrap a JSON body, turning Axum's rejection into our error envelope.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    match payload {
        Ok(Json(value)) => Ok(value),
        Err(rejection) => Err(api_validation_error(&rejection.body_text())),
    }
}
