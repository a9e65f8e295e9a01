//! OpenAPI documentation

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{health, loans, users};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Lendtrack API",
        version = "0.3.0",
        description = "Library lending lifecycle REST API"
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Users
        users::register_borrower,
        users::list_users,
        users::get_ledger,
        users::get_cart,
        users::get_history,
        users::get_eligibility,
        // Loans
        loans::create_loan,
        loans::accept_loan,
        loans::request_return,
        loans::confirm_return,
        loans::request_renewal,
        loans::approve_renewal,
        loans::reject_renewal,
        loans::archive_loan,
        // Admin queues
        loans::borrow_requests,
        loans::return_requests,
        loans::renewal_requests,
    ),
    components(
        schemas(
            // Users
            crate::models::RegisterBorrower,
            crate::models::LedgerView,
            crate::models::Role,
            crate::services::eligibility::Eligibility,
            // Loans
            crate::models::LoanRecordView,
            crate::models::ItemRef,
            crate::models::Borrower,
            crate::models::CheckoutForm,
            crate::models::LoanStatus,
            crate::models::RenewalStatus,
            loans::CreateLoanRequest,
            loans::RenewalRequest,
            loans::ApproveRenewalRequest,
            loans::LoanResponse,
            crate::services::loans::QueueEntry,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "users", description = "Borrower registration and ledger views"),
        (name = "loans", description = "Loan lifecycle"),
        (name = "admin", description = "Admin work queues")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
