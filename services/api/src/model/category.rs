//! Expense categories owned by a single user.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq)]
pub struct Category {
    pub id: i64,
    pub user_id: Uuid,
    pub name: String,
    pub description: String,
    pub color_hex: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewCategory {
    pub user_id: Uuid,
    pub name: String,
    pub description: String,
    pub color_hex: Option<String>,
}
