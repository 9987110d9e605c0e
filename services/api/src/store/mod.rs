//! Persistence capabilities for users, categories, and expenses.
//!
//! # Purpose
//! Each consumer depends on the narrowest trait it needs: the identity
//! reconciler only sees [`UserStore`], finance handlers see the category and
//! expense traits. [`FinanceStore`] bundles everything the HTTP layer holds.
use crate::model::{Category, Expense, NewCategory, NewExpense, User, UserUpsert};
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

pub mod memory;
pub mod postgres;

/// Limit/offset window for newest-first listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: u32,
    pub offset: u32,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert or update the user identified by `external_id`.
    ///
    /// A fresh insert returns a record with `created_at == updated_at`; an
    /// update keeps `created_at` and advances `updated_at`.
    async fn upsert_user_by_external_id(&self, user: UserUpsert) -> StoreResult<User>;
    /// Remove the user and everything they own. `NotFound` when absent.
    async fn delete_user_by_external_id(&self, external_id: &str) -> StoreResult<()>;
    async fn find_user_id_by_external_id(&self, external_id: &str) -> StoreResult<Uuid>;
    async fn get_user_by_external_id(&self, external_id: &str) -> StoreResult<User>;
}

#[async_trait]
pub trait CategoryStore: Send + Sync {
    async fn list_categories(&self, user_id: Uuid, page: Page) -> StoreResult<Vec<Category>>;
    async fn get_category(&self, category_id: i64) -> StoreResult<Category>;
    async fn create_category(&self, category: NewCategory) -> StoreResult<Category>;
}

#[async_trait]
pub trait ExpenseStore: Send + Sync {
    async fn list_expenses(&self, user_id: Uuid, page: Page) -> StoreResult<Vec<Expense>>;
    async fn create_expense(&self, expense: NewExpense) -> StoreResult<Expense>;
}

#[async_trait]
pub trait FinanceStore: UserStore + CategoryStore + ExpenseStore {
    async fn health_check(&self) -> StoreResult<()>;
    fn is_durable(&self) -> bool;
    fn backend_name(&self) -> &'static str;
}
