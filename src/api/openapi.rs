//! OpenAPI documentation

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{auth, books, health, loans, members, stats, wallet};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Bibliotheca API",
        version = "1.0.0",
        description = "Library lending REST API"
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Auth
        auth::register,
        auth::login,
        auth::me,
        // Books
        books::list_books,
        books::get_book,
        books::create_book,
        books::update_book,
        books::delete_book,
        books::adjust_copies,
        // Members
        members::list_members,
        members::get_member,
        members::create_member,
        members::update_member,
        members::delete_member,
        members::member_loans,
        // Loans
        loans::request_loan,
        loans::get_loan,
        loans::update_loan_status,
        loans::list_pending,
        loans::list_due_today,
        loans::list_overdue,
        loans::approve_loan,
        loans::reject_loan,
        loans::return_loan,
        loans::delete_loan,
        // Wallet
        wallet::get_balance,
        wallet::top_up,
        // Stats
        stats::get_stats,
    ),
    components(
        schemas(
            // Auth
            crate::models::auth::LoginRequest,
            crate::models::auth::LoginResponse,
            crate::models::auth::RegisterRequest,
            // Books
            crate::models::book::Book,
            crate::models::book::CreateBook,
            crate::models::book::UpdateBook,
            crate::models::book::AdjustCopies,
            crate::models::page::BookPage,
            crate::models::page::SortOrder,
            // Members
            crate::models::member::Member,
            crate::models::member::Role,
            crate::models::member::CreateMember,
            crate::models::member::UpdateMember,
            crate::models::member::WalletBalance,
            crate::models::page::MemberPage,
            // Loans
            crate::models::loan::Loan,
            crate::models::loan::LoanStatus,
            crate::models::loan::LoanDetails,
            crate::models::loan::OverdueLoan,
            crate::models::loan::CreateLoanRequest,
            crate::models::loan::UpdateLoanStatus,
            crate::models::page::LoanPage,
            // Wallet
            wallet::TopUpRequest,
            // Stats
            crate::services::stats::DashboardCounts,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "auth", description = "Registration and login"),
        (name = "books", description = "Catalog management"),
        (name = "members", description = "Member management"),
        (name = "loans", description = "Loan requests, decisions and ledger queries"),
        (name = "wallet", description = "Member wallet"),
        (name = "stats", description = "Dashboard statistics")
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
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

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
