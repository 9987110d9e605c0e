//! Clearflow data model module.
//!
//! # Purpose
//! Re-exports the user, category, and expense records shared by the store,
//! identity reconciliation, and HTTP API layers.
mod category;
mod expense;
mod user;

pub use category::{Category, NewCategory};
pub use expense::{Expense, NewExpense};
pub use user::{User, UserUpsert};
