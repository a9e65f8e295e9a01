//! Loan lifecycle endpoints

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{LoanRecordView, NewLoan},
    services::loans::{LoanOutcome, QueueEntry, RenewalClaim},
    AppState,
};

use super::AuthenticatedUser;

/// Borrow request
#[derive(Deserialize, Validate, ToSchema)]
pub struct CreateLoanRequest {
    /// Catalog item to borrow
    #[validate(range(min = 1, message = "Item ID must be positive"))]
    pub item_id: i32,
    /// Defaults to now
    pub borrow_date: Option<DateTime<Utc>>,
    /// Expected return date
    pub return_date: DateTime<Utc>,
}

/// Renewal request, carrying the borrower's identity number.
///
/// Only the number matching the caller's role is read; it is compared as
/// given with the one stored on the loan.
#[derive(Deserialize, ToSchema)]
pub struct RenewalRequest {
    /// Requested new return date
    pub new_return_date: DateTime<Utc>,
    /// Staff number (staff and admins)
    pub staff_no: Option<String>,
    /// Admission number (students)
    pub admission_no: Option<String>,
}

/// Renewal approval; without a date the requested one is used
#[derive(Deserialize, ToSchema, Default)]
pub struct ApproveRenewalRequest {
    pub new_return_date: Option<DateTime<Utc>>,
}

/// Result of a lifecycle operation
#[derive(Serialize, ToSchema)]
pub struct LoanResponse {
    /// Status message
    pub message: String,
    /// The loan record after the operation
    pub loan: LoanRecordView,
    /// True when the record was moved to history
    pub archived: bool,
}

impl LoanResponse {
    fn new(message: &str, outcome: &LoanOutcome) -> Self {
        Self {
            message: message.to_string(),
            loan: LoanRecordView::from(&outcome.record),
            archived: outcome.archived(),
        }
    }
}

/// Submit a borrow request
#[utoipa::path(
    post,
    path = "/users/{user_id}/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(("user_id" = i32, Path, description = "Borrower ID")),
    request_body = CreateLoanRequest,
    responses(
        (status = 201, description = "Borrow request created", body = LoanResponse),
        (status = 400, description = "Invalid dates", body = crate::error::ErrorResponse),
        (status = 403, description = "Not the owner, or borrower not eligible", body = crate::error::ErrorResponse),
        (status = 404, description = "User or item not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Item already in the cart", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_loan(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(user_id): Path<i32>,
    Json(request): Json<CreateLoanRequest>,
) -> AppResult<(StatusCode, Json<LoanResponse>)> {
    request.validate()?;

    let new_loan = NewLoan {
        item_id: request.item_id,
        borrow_date: request.borrow_date,
        return_date: request.return_date,
    };
    let outcome = state.services.loans.create_loan(&claims.actor(), user_id, new_loan).await?;

    Ok((
        StatusCode::CREATED,
        Json(LoanResponse::new("Borrow request submitted", &outcome)),
    ))
}

/// Accept a pending borrow request (admin)
#[utoipa::path(
    put,
    path = "/users/{user_id}/loans/{item_id}/accept",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("user_id" = i32, Path, description = "Borrower ID"),
        ("item_id" = i32, Path, description = "Item ID")
    ),
    responses(
        (status = 200, description = "Loan accepted", body = LoanResponse),
        (status = 403, description = "Administrator privileges required", body = crate::error::ErrorResponse),
        (status = 404, description = "Loan not found", body = crate::error::ErrorResponse),
        (status = 422, description = "Loan is not pending", body = crate::error::ErrorResponse)
    )
)]
pub async fn accept_loan(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path((user_id, item_id)): Path<(i32, i32)>,
) -> AppResult<Json<LoanResponse>> {
    let outcome = state.services.loans.accept(&claims.actor(), user_id, item_id).await?;
    Ok(Json(LoanResponse::new("Borrow request accepted", &outcome)))
}

/// Hand a borrowed item back (borrower)
#[utoipa::path(
    post,
    path = "/users/{user_id}/loans/{item_id}/return",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("user_id" = i32, Path, description = "Borrower ID"),
        ("item_id" = i32, Path, description = "Item ID")
    ),
    responses(
        (status = 200, description = "Return requested", body = LoanResponse),
        (status = 403, description = "Not the owner", body = crate::error::ErrorResponse),
        (status = 404, description = "Loan not found", body = crate::error::ErrorResponse),
        (status = 422, description = "Loan is not active", body = crate::error::ErrorResponse)
    )
)]
pub async fn request_return(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path((user_id, item_id)): Path<(i32, i32)>,
) -> AppResult<Json<LoanResponse>> {
    let outcome = state.services.loans.request_return(&claims.actor(), user_id, item_id).await?;
    Ok(Json(LoanResponse::new("Return requested", &outcome)))
}

/// Confirm a return and archive the loan (admin)
#[utoipa::path(
    put,
    path = "/users/{user_id}/loans/{item_id}/return",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("user_id" = i32, Path, description = "Borrower ID"),
        ("item_id" = i32, Path, description = "Item ID")
    ),
    responses(
        (status = 200, description = "Return confirmed and loan archived", body = LoanResponse),
        (status = 403, description = "Administrator privileges required", body = crate::error::ErrorResponse),
        (status = 404, description = "Loan not found", body = crate::error::ErrorResponse),
        (status = 422, description = "No return pending", body = crate::error::ErrorResponse)
    )
)]
pub async fn confirm_return(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path((user_id, item_id)): Path<(i32, i32)>,
) -> AppResult<Json<LoanResponse>> {
    let outcome = state.services.loans.confirm_return(&claims.actor(), user_id, item_id).await?;
    Ok(Json(LoanResponse::new("Return confirmed", &outcome)))
}

/// Ask for a later return date (borrower)
#[utoipa::path(
    post,
    path = "/users/{user_id}/loans/{item_id}/renewal",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("user_id" = i32, Path, description = "Borrower ID"),
        ("item_id" = i32, Path, description = "Item ID")
    ),
    request_body = RenewalRequest,
    responses(
        (status = 200, description = "Renewal requested", body = LoanResponse),
        (status = 400, description = "Invalid date or identity", body = crate::error::ErrorResponse),
        (status = 403, description = "Identity does not match the loan", body = crate::error::ErrorResponse),
        (status = 404, description = "Loan not found", body = crate::error::ErrorResponse),
        (status = 422, description = "Loan cannot be renewed", body = crate::error::ErrorResponse)
    )
)]
pub async fn request_renewal(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path((user_id, item_id)): Path<(i32, i32)>,
    Json(request): Json<RenewalRequest>,
) -> AppResult<Json<LoanResponse>> {
    let claim = RenewalClaim {
        staff_no: request.staff_no,
        admission_no: request.admission_no,
        new_return_date: request.new_return_date,
    };
    let outcome = state
        .services
        .loans
        .request_renewal(&claims.actor(), user_id, item_id, claim)
        .await?;

    Ok(Json(LoanResponse::new("Renewal requested", &outcome)))
}

/// Approve a renewal request (admin)
#[utoipa::path(
    put,
    path = "/users/{user_id}/loans/{item_id}/renewal",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("user_id" = i32, Path, description = "Borrower ID"),
        ("item_id" = i32, Path, description = "Item ID")
    ),
    request_body(content = ApproveRenewalRequest, description = "Optional; an empty body keeps the requested date"),
    responses(
        (status = 200, description = "Renewal approved", body = LoanResponse),
        (status = 400, description = "Malformed body", body = crate::error::ErrorResponse),
        (status = 403, description = "Administrator privileges required", body = crate::error::ErrorResponse),
        (status = 404, description = "Loan not found", body = crate::error::ErrorResponse),
        (status = 422, description = "No renewal pending", body = crate::error::ErrorResponse)
    )
)]
pub async fn approve_renewal(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path((user_id, item_id)): Path<(i32, i32)>,
    body: Bytes,
) -> AppResult<Json<LoanResponse>> {
    let request = parse_optional_body::<ApproveRenewalRequest>(&body)?;

    let outcome = state
        .services
        .loans
        .approve_renewal(&claims.actor(), user_id, item_id, request.new_return_date)
        .await?;

    Ok(Json(LoanResponse::new("Renewal approved", &outcome)))
}

/// Reject a renewal request (admin)
#[utoipa::path(
    delete,
    path = "/users/{user_id}/loans/{item_id}/renewal",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("user_id" = i32, Path, description = "Borrower ID"),
        ("item_id" = i32, Path, description = "Item ID")
    ),
    responses(
        (status = 200, description = "Renewal rejected", body = LoanResponse),
        (status = 403, description = "Administrator privileges required", body = crate::error::ErrorResponse),
        (status = 404, description = "Loan not found", body = crate::error::ErrorResponse),
        (status = 422, description = "No renewal pending", body = crate::error::ErrorResponse)
    )
)]
pub async fn reject_renewal(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path((user_id, item_id)): Path<(i32, i32)>,
) -> AppResult<Json<LoanResponse>> {
    let outcome = state.services.loans.reject_renewal(&claims.actor(), user_id, item_id).await?;
    Ok(Json(LoanResponse::new("Renewal rejected", &outcome)))
}

/// Re-run archival of a returned loan (admin)
#[utoipa::path(
    post,
    path = "/users/{user_id}/loans/{item_id}/archive",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("user_id" = i32, Path, description = "Borrower ID"),
        ("item_id" = i32, Path, description = "Item ID")
    ),
    responses(
        (status = 200, description = "Loan is archived", body = LoanResponse),
        (status = 403, description = "Administrator privileges required", body = crate::error::ErrorResponse),
        (status = 404, description = "Loan not found", body = crate::error::ErrorResponse),
        (status = 422, description = "Loan is not returned", body = crate::error::ErrorResponse)
    )
)]
pub async fn archive_loan(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path((user_id, item_id)): Path<(i32, i32)>,
) -> AppResult<Json<LoanResponse>> {
    let outcome = state.services.loans.archive(&claims.actor(), user_id, item_id).await?;
    Ok(Json(LoanResponse::new("Loan archived", &outcome)))
}

/// Pending borrow requests (admin)
#[utoipa::path(
    get,
    path = "/admin/borrow-requests",
    tag = "admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Pending borrow requests", body = Vec<QueueEntry>),
        (status = 403, description = "Administrator privileges required", body = crate::error::ErrorResponse)
    )
)]
pub async fn borrow_requests(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<QueueEntry>>> {
    claims.require_admin()?;
    Ok(Json(state.services.loans.borrow_requests().await?))
}

/// Returns awaiting confirmation (admin)
#[utoipa::path(
    get,
    path = "/admin/return-requests",
    tag = "admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Returns awaiting confirmation", body = Vec<QueueEntry>),
        (status = 403, description = "Administrator privileges required", body = crate::error::ErrorResponse)
    )
)]
pub async fn return_requests(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<QueueEntry>>> {
    claims.require_admin()?;
    Ok(Json(state.services.loans.return_requests().await?))
}

/// Renewal requests awaiting a decision (admin)
#[utoipa::path(
    get,
    path = "/admin/renewal-requests",
    tag = "admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Renewal requests", body = Vec<QueueEntry>),
        (status = 403, description = "Administrator privileges required", body = crate::error::ErrorResponse)
    )
)]
pub async fn renewal_requests(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<QueueEntry>>> {
    claims.require_admin()?;
    Ok(Json(state.services.loans.renewal_requests().await?))
}

/// An empty body gives the default request; anything else must be valid JSON
fn parse_optional_body<T: DeserializeOwned + Default>(body: &[u8]) -> AppResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| AppError::Validation(format!("Invalid request body: {}", e)))
}
