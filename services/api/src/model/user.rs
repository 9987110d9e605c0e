//! Local user records keyed by the identity provider's subject.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// A user as stored locally.
///
/// `id` is assigned on first insert and never changes. `external_id` is the
/// identity provider's subject and the natural key for reconciliation.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub external_id: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// True when the record has never been updated since insert.
    pub fn is_freshly_created(&self) -> bool {
        self.created_at == self.updated_at
    }
}

/// Fields written by an upsert keyed on `external_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct UserUpsert {
    pub external_id: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub image_url: Option<String>,
}
