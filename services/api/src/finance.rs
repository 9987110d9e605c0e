//! Expense and category rules for an authenticated principal.
//!
//! Every operation starts from the [`Principal`] and resolves it to the local
//! user id; the id is never taken from the request. A principal without a
//! local record gets [`FinanceError::UserNotRegistered`].
use crate::auth::principal::Principal;
use crate::model::{Category, Expense, NewCategory, NewExpense};
use crate::store::{CategoryStore, ExpenseStore, Page, StoreError, UserStore};
use chrono::NaiveDate;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum FinanceError {
    #[error("no local user for subject {0}")]
    UserNotRegistered(String),
    #[error("category {0} not found")]
    CategoryNotFound(i64),
    #[error("category {0} belongs to another user")]
    CategoryForbidden(i64),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExpenseInput {
    pub category_id: Option<i64>,
    pub amount: f64,
    pub description: String,
    pub purchase_date: NaiveDate,
    pub bill_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryInput {
    pub name: String,
    pub description: String,
    pub color_hex: Option<String>,
}

pub struct FinanceService<S: ?Sized> {
    store: Arc<S>,
}

impl<S> FinanceService<S>
where
    S: UserStore + CategoryStore + ExpenseStore + ?Sized,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    async fn resolve_user(&self, principal: &Principal) -> Result<Uuid, FinanceError> {
        match self
            .store
            .find_user_id_by_external_id(&principal.subject_id)
            .await
        {
            Ok(id) => Ok(id),
            Err(StoreError::NotFound(_)) => {
                Err(FinanceError::UserNotRegistered(principal.subject_id.clone()))
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn list_expenses(
        &self,
        principal: &Principal,
        page: Page,
    ) -> Result<Vec<Expense>, FinanceError> {
        let user_id = self.resolve_user(principal).await?;
        Ok(self.store.list_expenses(user_id, page).await?)
    }

    /// Create an expense; a referenced category must exist and belong to the
    /// same user.
    pub async fn create_expense(
        &self,
        principal: &Principal,
        input: ExpenseInput,
    ) -> Result<Expense, FinanceError> {
        let user_id = self.resolve_user(principal).await?;
        if let Some(category_id) = input.category_id {
            let category = match self.store.get_category(category_id).await {
                Ok(category) => category,
                Err(StoreError::NotFound(_)) => {
                    return Err(FinanceError::CategoryNotFound(category_id));
                }
                Err(err) => return Err(err.into()),
            };
            if category.user_id != user_id {
                tracing::warn!(
                    subject = %principal.subject_id,
                    category_id,
                    "expense references a category owned by another user"
                );
                return Err(FinanceError::CategoryForbidden(category_id));
            }
        }
        let expense = self
            .store
            .create_expense(NewExpense {
                user_id,
                category_id: input.category_id,
                amount: input.amount,
                description: input.description,
                purchase_date: input.purchase_date,
                bill_date: input.bill_date,
            })
            .await?;
        tracing::info!(expense_id = expense.id, %user_id, "expense created");
        Ok(expense)
    }

    pub async fn list_categories(
        &self,
        principal: &Principal,
        page: Page,
    ) -> Result<Vec<Category>, FinanceError> {
        let user_id = self.resolve_user(principal).await?;
        Ok(self.store.list_categories(user_id, page).await?)
    }

    pub async fn create_category(
        &self,
        principal: &Principal,
        input: CategoryInput,
    ) -> Result<Category, FinanceError> {
        let user_id = self.resolve_user(principal).await?;
        let category = self
            .store
            .create_category(NewCategory {
                user_id,
                name: input.name,
                description: input.description,
                color_hex: input.color_hex,
            })
            .await?;
        tracing::info!(category_id = category.id, %user_id, "category created");
        Ok(category)
    }
}
