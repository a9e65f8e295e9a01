//! Borrower endpoints: registration and read views of the ledger

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    models::{LedgerView, LoanRecordView, RegisterBorrower},
    services::eligibility::Eligibility,
    AppState,
};

use super::AuthenticatedUser;

/// Register a borrower (admin only)
#[utoipa::path(
    post,
    path = "/users",
    tag = "users",
    security(("bearer_auth" = [])),
    request_body = RegisterBorrower,
    responses(
        (status = 201, description = "Borrower registered", body = LedgerView),
        (status = 400, description = "Invalid identity data", body = crate::error::ErrorResponse),
        (status = 403, description = "Administrator privileges required", body = crate::error::ErrorResponse),
        (status = 409, description = "Email or identity number already registered", body = crate::error::ErrorResponse)
    )
)]
pub async fn register_borrower(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<RegisterBorrower>,
) -> AppResult<(StatusCode, Json<LedgerView>)> {
    claims.require_admin()?;

    let profile = request.into_profile()?;
    let user = state.services.loans.register(profile).await?;

    Ok((StatusCode::CREATED, Json(LedgerView::from(&user))))
}

/// List registered users with their carts and histories (admin only)
#[utoipa::path(
    get,
    path = "/users",
    tag = "users",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Registered users", body = Vec<LedgerView>),
        (status = 403, description = "Administrator privileges required", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_users(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<LedgerView>>> {
    claims.require_admin()?;

    let users = state.services.loans.list_users().await?;
    Ok(Json(users.iter().map(LedgerView::from).collect()))
}

/// Get a user with cart and history
#[utoipa::path(
    get,
    path = "/users/{user_id}",
    tag = "users",
    security(("bearer_auth" = [])),
    params(("user_id" = i32, Path, description = "User ID")),
    responses(
        (status = 200, description = "User ledger", body = LedgerView),
        (status = 403, description = "Not the owner", body = crate::error::ErrorResponse),
        (status = 404, description = "User not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_ledger(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(user_id): Path<i32>,
) -> AppResult<Json<LedgerView>> {
    claims.require_self_or_admin(user_id)?;

    let user = state.services.loans.get_ledger(user_id).await?;
    Ok(Json(LedgerView::from(&user)))
}

/// In-flight loan records, in insertion order
#[utoipa::path(
    get,
    path = "/users/{user_id}/cart",
    tag = "users",
    security(("bearer_auth" = [])),
    params(("user_id" = i32, Path, description = "User ID")),
    responses(
        (status = 200, description = "Cart records", body = Vec<LoanRecordView>),
        (status = 404, description = "User not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_cart(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(user_id): Path<i32>,
) -> AppResult<Json<Vec<LoanRecordView>>> {
    claims.require_self_or_admin(user_id)?;

    let user = state.services.loans.get_ledger(user_id).await?;
    Ok(Json(user.cart().values().map(LoanRecordView::from).collect()))
}

/// Archived loan records, oldest first
#[utoipa::path(
    get,
    path = "/users/{user_id}/history",
    tag = "users",
    security(("bearer_auth" = [])),
    params(("user_id" = i32, Path, description = "User ID")),
    responses(
        (status = 200, description = "History records", body = Vec<LoanRecordView>),
        (status = 404, description = "User not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_history(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(user_id): Path<i32>,
) -> AppResult<Json<Vec<LoanRecordView>>> {
    claims.require_self_or_admin(user_id)?;

    let user = state.services.loans.get_ledger(user_id).await?;
    Ok(Json(user.history().iter().map(LoanRecordView::from).collect()))
}

/// Whether the user may open a new loan
#[utoipa::path(
    get,
    path = "/users/{user_id}/eligibility",
    tag = "users",
    security(("bearer_auth" = [])),
    params(("user_id" = i32, Path, description = "User ID")),
    responses(
        (status = 200, description = "Eligibility report", body = Eligibility),
        (status = 404, description = "User not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_eligibility(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(user_id): Path<i32>,
) -> AppResult<Json<Eligibility>> {
    claims.require_self_or_admin(user_id)?;

    let report = state.services.loans.check_eligibility(user_id).await?;
    Ok(Json(report))
}
