//! Expense records.
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq)]
pub struct Expense {
    pub id: i64,
    pub user_id: Uuid,
    pub category_id: Option<i64>,
    pub amount: f64,
    pub description: String,
    pub purchase_date: NaiveDate,
    pub bill_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload; `category_id` ownership is checked before the store sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct NewExpense {
    pub user_id: Uuid,
    pub category_id: Option<i64>,
    pub amount: f64,
    pub description: String,
    pub purchase_date: NaiveDate,
    pub bill_date: NaiveDate,
}
