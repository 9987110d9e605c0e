//! OpenAPI document for the Clearflow API.
use crate::api::types::{
    CategoryListResponse, CreateCategoryRequest, CreateExpenseRequest, ErrorResponse,
    ExpenseListResponse, HealthStatus, RegisterUserRequest, WebhookAck,
};
use crate::api::{categories, expenses, system, users, webhooks};
use crate::model::{Category, Expense, User};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "clearflow-api",
        version = "v1",
        description = "Clearflow personal finance API"
    ),
    paths(
        system::healthz,
        webhooks::clerk_webhook,
        users::register_user,
        users::current_user,
        expenses::list_expenses,
        expenses::create_expense,
        categories::list_categories,
        categories::create_category,
    ),
    components(schemas(
        ErrorResponse,
        HealthStatus,
        WebhookAck,
        RegisterUserRequest,
        CreateExpenseRequest,
        CreateCategoryRequest,
        ExpenseListResponse,
        CategoryListResponse,
        User,
        Expense,
        Category,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "system", description = "Service health"),
        (name = "webhooks", description = "Identity provider events"),
        (name = "users", description = "The authenticated user"),
        (name = "expenses", description = "Expenses owned by the caller"),
        (name = "categories", description = "Categories owned by the caller")
    )
)]
pub struct ApiDoc;
