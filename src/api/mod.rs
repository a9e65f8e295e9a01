//! API handlers for the lending REST endpoints

pub mod health;
pub mod loans;
pub mod openapi;
pub mod users;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{error::AppError, models::user::UserClaims, AppState};

/// Extractor for authenticated user from JWT token
pub struct AuthenticatedUser(pub UserClaims);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::Authentication("Missing authorization header".to_string()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Authentication("Invalid authorization header format".to_string()))?;

        let claims = UserClaims::from_token(token, &state.config.auth.jwt_secret)
            .map_err(|e| AppError::Authentication(e.to_string()))?;

        Ok(AuthenticatedUser(claims))
    }
}

/// Build the application router with all routes
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_v1 = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        // Borrowers
        .route("/users", post(users::register_borrower).get(users::list_users))
        .route("/users/:user_id", get(users::get_ledger))
        .route("/users/:user_id/cart", get(users::get_cart))
        .route("/users/:user_id/history", get(users::get_history))
        .route("/users/:user_id/eligibility", get(users::get_eligibility))
        // Loan lifecycle
        .route("/users/:user_id/loans", post(loans::create_loan))
        .route("/users/:user_id/loans/:item_id/accept", put(loans::accept_loan))
        .route(
            "/users/:user_id/loans/:item_id/return",
            post(loans::request_return).put(loans::confirm_return),
        )
        .route(
            "/users/:user_id/loans/:item_id/renewal",
            post(loans::request_renewal)
                .put(loans::approve_renewal)
                .delete(loans::reject_renewal),
        )
        .route("/users/:user_id/loans/:item_id/archive", post(loans::archive_loan))
        // Admin queues
        .route("/admin/borrow-requests", get(loans::borrow_requests))
        .route("/admin/return-requests", get(loans::return_requests))
        .route("/admin/renewal-requests", get(loans::renewal_requests))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi::create_openapi_router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
