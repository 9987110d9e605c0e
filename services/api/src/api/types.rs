//! HTTP API request/response types.
//!
//! # Purpose
//! Defines payload shapes for the REST API and OpenAPI schema generation,
//! plus the field-level validation applied to request bodies.
use crate::finance::{CategoryInput, ExpenseInput};
use crate::model::{Category, Expense};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const MAX_TEXT_LEN: usize = 255;

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct ErrorResponse {
    pub code: String,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct HealthStatus {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct WebhookAck {
    pub status: String,
    pub outcome: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
#[serde(deny_unknown_fields)]
pub struct RegisterUserRequest {
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
#[serde(deny_unknown_fields)]
pub struct CreateExpenseRequest {
    pub amount: Option<f64>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub purchase_date: String,
    #[serde(default)]
    pub bill_date: String,
    #[serde(default)]
    pub category_id: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
#[serde(deny_unknown_fields)]
pub struct CreateCategoryRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub color_hex: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct ExpenseListResponse {
    pub items: Vec<Expense>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct CategoryListResponse {
    pub items: Vec<Category>,
}

fn check_text(field: &str, value: &str, required: bool, errors: &mut Vec<String>) {
    let len = value.chars().count();
    if required && value.trim().is_empty() {
        errors.push(format!("{field} is required"));
    } else if len > MAX_TEXT_LEN {
        errors.push(format!(
            "{field} must be at most {MAX_TEXT_LEN} characters long"
        ));
    }
}

fn check_date(field: &str, value: &str, errors: &mut Vec<String>) -> Option<NaiveDate> {
    if value.trim().is_empty() {
        errors.push(format!("{field} is required"));
        return None;
    }
    match NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d") {
        Ok(date) => Some(date),
        Err(_) => {
            errors.push(format!("{field} must be a date in YYYY-MM-DD format"));
            None
        }
    }
}

fn is_hex_color(value: &str) -> bool {
    value.len() == 7
        && value.starts_with('#')
        && value[1..].chars().all(|c| c.is_ascii_hexdigit())
}

impl RegisterUserRequest {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if self.email.trim().is_empty() {
            errors.push("email is required".to_string());
        } else if !self.email.contains('@') {
            errors.push("email is invalid".to_string());
        }
        for (field, value) in [
            ("first_name", &self.first_name),
            ("last_name", &self.last_name),
            ("image_url", &self.image_url),
        ] {
            if let Some(value) = value {
                check_text(field, value, false, &mut errors);
            }
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

impl CreateExpenseRequest {
    pub fn into_input(self) -> Result<ExpenseInput, Vec<String>> {
        let mut errors = Vec::new();
        let amount = match self.amount {
            None => {
                errors.push("amount is required".to_string());
                0.0
            }
            Some(amount) if !amount.is_finite() || amount <= 0.0 => {
                errors.push("amount must be greater than 0".to_string());
                amount
            }
            Some(amount) => amount,
        };
        check_text("description", &self.description, true, &mut errors);
        let purchase_date = check_date("purchase_date", &self.purchase_date, &mut errors);
        let bill_date = check_date("bill_date", &self.bill_date, &mut errors);
        if matches!(self.category_id, Some(id) if id <= 0) {
            errors.push("category_id is invalid".to_string());
        }
        match (purchase_date, bill_date) {
            (Some(purchase_date), Some(bill_date)) if errors.is_empty() => Ok(ExpenseInput {
                category_id: self.category_id,
                amount,
                description: self.description.trim().to_string(),
                purchase_date,
                bill_date,
            }),
            _ => Err(errors),
        }
    }
}

impl CreateCategoryRequest {
    pub fn into_input(self) -> Result<CategoryInput, Vec<String>> {
        let mut errors = Vec::new();
        check_text("name", &self.name, true, &mut errors);
        check_text("description", &self.description, false, &mut errors);
        let color_hex = self
            .color_hex
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        if let Some(color) = &color_hex {
            if !is_hex_color(color) {
                errors.push("color_hex must be a #RRGGBB color".to_string());
            }
        }
        if !errors.is_empty() {
            return Err(errors);
        }
        Ok(CategoryInput {
            name: self.name.trim().to_string(),
            description: self.description.trim().to_string(),
            color_hex,
        })
    }
}
