//! In-memory implementation of the Clearflow store.
//!
//! # Purpose
//! Implements every store capability with `HashMap`s guarded by
//! `tokio::sync::RwLock`. Used for local development, tests, and deployments
//! that do not need durability.
//!
//! # Durability and consistency
//! - **Not durable**: all state is lost on process restart.
//! - Mutations take the write lock for every map they touch, in a fixed order
//!   (users, categories, expenses), so cascades are atomic within the process.
//!
//! # Timestamps
//! `updated_at` is forced strictly past the previous value on update so that
//! "was this an insert" stays answerable by comparing timestamps, even when two
//! writes land inside the same clock tick.
use super::{
    CategoryStore, ExpenseStore, FinanceStore, Page, StoreError, StoreResult, UserStore,
};
use crate::model::{Category, Expense, NewCategory, NewExpense, User, UserUpsert};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryStore {
    /// Users keyed by `external_id`.
    users: Arc<RwLock<HashMap<String, User>>>,
    categories: Arc<RwLock<HashMap<i64, Category>>>,
    expenses: Arc<RwLock<HashMap<i64, Expense>>>,
    next_category_id: AtomicI64,
    next_expense_id: AtomicI64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn bump_timestamp(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = Utc::now();
    if now > previous {
        now
    } else {
        previous + Duration::microseconds(1)
    }
}

/// Newest first, ties broken by id so paging is stable.
fn page_newest_first<T, F>(mut items: Vec<T>, page: Page, key: F) -> Vec<T>
where
    F: Fn(&T) -> (DateTime<Utc>, i64),
{
    items.sort_by(|a, b| key(b).cmp(&key(a)));
    items
        .into_iter()
        .skip(page.offset as usize)
        .take(page.limit as usize)
        .collect()
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn upsert_user_by_external_id(&self, user: UserUpsert) -> StoreResult<User> {
        let mut users = self.users.write().await;
        if let Some(existing) = users.get_mut(&user.external_id) {
            existing.email = user.email;
            existing.first_name = user.first_name;
            existing.last_name = user.last_name;
            existing.image_url = user.image_url;
            existing.updated_at = bump_timestamp(existing.updated_at);
            return Ok(existing.clone());
        }
        let now = Utc::now();
        let record = User {
            id: Uuid::new_v4(),
            external_id: user.external_id.clone(),
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            image_url: user.image_url,
            created_at: now,
            updated_at: now,
        };
        users.insert(user.external_id, record.clone());
        Ok(record)
    }

    async fn delete_user_by_external_id(&self, external_id: &str) -> StoreResult<()> {
        let mut users = self.users.write().await;
        let mut categories = self.categories.write().await;
        let mut expenses = self.expenses.write().await;
        let removed = users
            .remove(external_id)
            .ok_or_else(|| StoreError::NotFound(format!("user {external_id}")))?;
        categories.retain(|_, category| category.user_id != removed.id);
        expenses.retain(|_, expense| expense.user_id != removed.id);
        Ok(())
    }

    async fn find_user_id_by_external_id(&self, external_id: &str) -> StoreResult<Uuid> {
        self.get_user_by_external_id(external_id)
            .await
            .map(|user| user.id)
    }

    async fn get_user_by_external_id(&self, external_id: &str) -> StoreResult<User> {
        self.users
            .read()
            .await
            .get(external_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("user {external_id}")))
    }
}

#[async_trait]
impl CategoryStore for InMemoryStore {
    async fn list_categories(&self, user_id: Uuid, page: Page) -> StoreResult<Vec<Category>> {
        let categories = self.categories.read().await;
        let owned = categories
            .values()
            .filter(|category| category.user_id == user_id)
            .cloned()
            .collect();
        Ok(page_newest_first(owned, page, |c| (c.created_at, c.id)))
    }

    async fn get_category(&self, category_id: i64) -> StoreResult<Category> {
        self.categories
            .read()
            .await
            .get(&category_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("category {category_id}")))
    }

    async fn create_category(&self, category: NewCategory) -> StoreResult<Category> {
        let users = self.users.read().await;
        if !users.values().any(|user| user.id == category.user_id) {
            return Err(StoreError::NotFound(format!("user {}", category.user_id)));
        }
        let mut categories = self.categories.write().await;
        let id = self.next_category_id.fetch_add(1, Ordering::SeqCst) + 1;
        let now = Utc::now();
        let record = Category {
            id,
            user_id: category.user_id,
            name: category.name,
            description: category.description,
            color_hex: category.color_hex,
            created_at: now,
            updated_at: now,
        };
        categories.insert(id, record.clone());
        Ok(record)
    }
}

#[async_trait]
impl ExpenseStore for InMemoryStore {
    async fn list_expenses(&self, user_id: Uuid, page: Page) -> StoreResult<Vec<Expense>> {
        let expenses = self.expenses.read().await;
        let owned = expenses
            .values()
            .filter(|expense| expense.user_id == user_id)
            .cloned()
            .collect();
        Ok(page_newest_first(owned, page, |e| (e.created_at, e.id)))
    }

    async fn create_expense(&self, expense: NewExpense) -> StoreResult<Expense> {
        let users = self.users.read().await;
        if !users.values().any(|user| user.id == expense.user_id) {
            return Err(StoreError::NotFound(format!("user {}", expense.user_id)));
        }
        let categories = self.categories.read().await;
        if let Some(category_id) = expense.category_id {
            if !categories.contains_key(&category_id) {
                return Err(StoreError::NotFound(format!("category {category_id}")));
            }
        }
        let mut expenses = self.expenses.write().await;
        let id = self.next_expense_id.fetch_add(1, Ordering::SeqCst) + 1;
        let now = Utc::now();
        let record = Expense {
            id,
            user_id: expense.user_id,
            category_id: expense.category_id,
            amount: expense.amount,
            description: expense.description,
            purchase_date: expense.purchase_date,
            bill_date: expense.bill_date,
            created_at: now,
            updated_at: now,
        };
        expenses.insert(id, record.clone());
        Ok(record)
    }
}

#[async_trait]
impl FinanceStore for InMemoryStore {
    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    fn is_durable(&self) -> bool {
        false
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
