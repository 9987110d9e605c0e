//! Postgres-backed implementation of the Clearflow store.
//!
//! # Key invariants
//! - `users.external_id` is unique; upserts rely on `ON CONFLICT (external_id)`
//!   so concurrent deliveries of the same identity event stay idempotent
//!   without application-level locks.
//! - Both timestamps default to `NOW()` on insert (one statement, one value),
//!   and the conflict branch sets `updated_at` to
//!   `GREATEST(NOW(), users.updated_at + INTERVAL '1 microsecond')`, so an
//!   update always moves it strictly forward and `created_at == updated_at`
//!   identifies a fresh insert.
//! - Deleting a user cascades to categories and expenses via foreign keys.
//!
//! # Operational notes
//! - Migrations run at startup via `sqlx::migrate!("./migrations")`.
//! - Connection and acquire timeouts are explicit so a dead database fails
//!   fast instead of hanging request tasks.
//! - Database URLs may contain credentials; never log them.
use super::{
    CategoryStore, ExpenseStore, FinanceStore, Page, StoreError, StoreResult, UserStore,
};
use crate::config::PostgresConfig;
use crate::model::{Category, Expense, NewCategory, NewExpense, User, UserUpsert};
use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// Durable store backed by a shared `PgPool`.
///
/// # Example
/// ```rust,no_run
/// use clearflow::config::PostgresConfig;
/// use clearflow::store::postgres::PostgresStore;
///
/// async fn open(pg: PostgresConfig) {
///     let _ = PostgresStore::connect(&pg).await;
/// }
/// ```
pub struct PostgresStore {
    pool: PgPool,
}

const USER_COLUMNS: &str =
    "id, external_id, email, first_name, last_name, image_url, created_at, updated_at";
const CATEGORY_COLUMNS: &str =
    "id, user_id, name, description, color_hex, created_at, updated_at";
const EXPENSE_COLUMNS: &str = "id, user_id, category_id, amount, description, purchase_date, \
     bill_date, created_at, updated_at";

#[derive(Debug, Clone, FromRow)]
struct DbUser {
    id: Uuid,
    external_id: String,
    email: String,
    first_name: Option<String>,
    last_name: Option<String>,
    image_url: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
struct DbCategory {
    id: i64,
    user_id: Uuid,
    name: String,
    description: String,
    color_hex: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
struct DbExpense {
    id: i64,
    user_id: Uuid,
    category_id: Option<i64>,
    amount: f64,
    description: String,
    purchase_date: NaiveDate,
    bill_date: NaiveDate,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<DbUser> for User {
    fn from(row: DbUser) -> Self {
        User {
            id: row.id,
            external_id: row.external_id,
            email: row.email,
            first_name: row.first_name,
            last_name: row.last_name,
            image_url: row.image_url,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl From<DbCategory> for Category {
    fn from(row: DbCategory) -> Self {
        Category {
            id: row.id,
            user_id: row.user_id,
            name: row.name,
            description: row.description,
            color_hex: row.color_hex,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl From<DbExpense> for Expense {
    fn from(row: DbExpense) -> Self {
        Expense {
            id: row.id,
            user_id: row.user_id,
            category_id: row.category_id,
            amount: row.amount,
            description: row.description,
            purchase_date: row.purchase_date,
            bill_date: row.bill_date,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Unexpected(anyhow::Error::new(err))
    }
}

impl PostgresStore {
    /// Connect, apply pending migrations, and return a ready store.
    pub async fn connect(pg: &PostgresConfig) -> StoreResult<Self> {
        let options = PgConnectOptions::from_str(&pg.url)
            .map_err(|err| StoreError::Unexpected(anyhow!("invalid database url: {err}")))?;
        let pool = tokio::time::timeout(
            Duration::from_millis(pg.connect_timeout_ms),
            PgPoolOptions::new()
                .max_connections(pg.max_connections)
                .acquire_timeout(Duration::from_millis(pg.acquire_timeout_ms))
                .connect_with(options),
        )
        .await
        .map_err(|_| StoreError::Unexpected(anyhow!("timed out connecting to postgres")))??;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|err| StoreError::Unexpected(anyhow!("run migrations: {err}")))?;
        tracing::info!(max_connections = pg.max_connections, "postgres store ready");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn limit_offset(page: Page) -> (i64, i64) {
    (i64::from(page.limit), i64::from(page.offset))
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        return db_err.code().map(|code| code == "23503").unwrap_or(false);
    }
    false
}

#[async_trait]
impl UserStore for PostgresStore {
    async fn upsert_user_by_external_id(&self, user: UserUpsert) -> StoreResult<User> {
        let sql = format!(
            "INSERT INTO users (external_id, email, first_name, last_name, image_url) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (external_id) DO UPDATE SET \
                 email = EXCLUDED.email, \
                 first_name = EXCLUDED.first_name, \
                 last_name = EXCLUDED.last_name, \
                 image_url = EXCLUDED.image_url, \
                 updated_at = GREATEST(NOW(), users.updated_at + INTERVAL '1 microsecond') \
             RETURNING {USER_COLUMNS}"
        );
        let row: DbUser = sqlx::query_as(&sql)
            .bind(&user.external_id)
            .bind(&user.email)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(&user.image_url)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into())
    }

    async fn delete_user_by_external_id(&self, external_id: &str) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM users WHERE external_id = $1")
            .bind(external_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("user {external_id}")));
        }
        Ok(())
    }

    async fn find_user_id_by_external_id(&self, external_id: &str) -> StoreResult<Uuid> {
        let id: Option<Uuid> = sqlx::query_scalar("SELECT id FROM users WHERE external_id = $1")
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?;
        id.ok_or_else(|| StoreError::NotFound(format!("user {external_id}")))
    }

    async fn get_user_by_external_id(&self, external_id: &str) -> StoreResult<User> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE external_id = $1");
        let row: Option<DbUser> = sqlx::query_as(&sql)
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(User::from)
            .ok_or_else(|| StoreError::NotFound(format!("user {external_id}")))
    }
}

#[async_trait]
impl CategoryStore for PostgresStore {
    async fn list_categories(&self, user_id: Uuid, page: Page) -> StoreResult<Vec<Category>> {
        let (limit, offset) = limit_offset(page);
        let sql = format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories WHERE user_id = $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3"
        );
        let rows: Vec<DbCategory> = sqlx::query_as(&sql)
            .bind(user_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Category::from).collect())
    }

    async fn get_category(&self, category_id: i64) -> StoreResult<Category> {
        let sql = format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = $1");
        let row: Option<DbCategory> = sqlx::query_as(&sql)
            .bind(category_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Category::from)
            .ok_or_else(|| StoreError::NotFound(format!("category {category_id}")))
    }

    async fn create_category(&self, category: NewCategory) -> StoreResult<Category> {
        let sql = format!(
            "INSERT INTO categories (user_id, name, description, color_hex) \
             VALUES ($1, $2, $3, $4) RETURNING {CATEGORY_COLUMNS}"
        );
        let row: DbCategory = sqlx::query_as(&sql)
            .bind(category.user_id)
            .bind(&category.name)
            .bind(&category.description)
            .bind(&category.color_hex)
            .fetch_one(&self.pool)
            .await
            .map_err(|err| {
                if is_foreign_key_violation(&err) {
                    StoreError::NotFound(format!("user {}", category.user_id))
                } else {
                    StoreError::from(err)
                }
            })?;
        Ok(row.into())
    }
}

#[async_trait]
impl ExpenseStore for PostgresStore {
    async fn list_expenses(&self, user_id: Uuid, page: Page) -> StoreResult<Vec<Expense>> {
        let (limit, offset) = limit_offset(page);
        let sql = format!(
            "SELECT {EXPENSE_COLUMNS} FROM expenses WHERE user_id = $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3"
        );
        let rows: Vec<DbExpense> = sqlx::query_as(&sql)
            .bind(user_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Expense::from).collect())
    }

    async fn create_expense(&self, expense: NewExpense) -> StoreResult<Expense> {
        let sql = format!(
            "INSERT INTO expenses \
                 (user_id, category_id, amount, description, purchase_date, bill_date) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {EXPENSE_COLUMNS}"
        );
        let row: DbExpense = sqlx::query_as(&sql)
            .bind(expense.user_id)
            .bind(expense.category_id)
            .bind(expense.amount)
            .bind(&expense.description)
            .bind(expense.purchase_date)
            .bind(expense.bill_date)
            .fetch_one(&self.pool)
            .await
            .map_err(|err| {
                if is_foreign_key_violation(&err) {
                    StoreError::NotFound("user or category".to_string())
                } else {
                    StoreError::from(err)
                }
            })?;
        Ok(row.into())
    }
}

#[async_trait]
impl FinanceStore for PostgresStore {
    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn is_durable(&self) -> bool {
        true
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
