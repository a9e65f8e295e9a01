//! Borrowing eligibility guard

use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::{AppError, AppResult},
    models::LedgerUser,
};

/// User-level summary flag: any record, in cart or history, is an accepted loan
pub fn derive_is_borrowed(user: &LedgerUser) -> bool {
    user.cart()
        .values()
        .chain(user.history().iter())
        .any(|record| record.is_borrowed())
}

/// Guard evaluated before a new loan record is created
pub fn check_eligibility(user: &LedgerUser, single_active_loan: bool) -> AppResult<()> {
    if single_active_loan && derive_is_borrowed(user) {
        return Err(AppError::IneligibleBorrower(format!(
            "User {} already holds a borrowed item",
            user.id
        )));
    }
    Ok(())
}

/// Eligibility as reported to callers
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Eligibility {
    pub user_id: i32,
    pub can_borrow: bool,
    pub is_borrowed: bool,
}

impl Eligibility {
    pub fn evaluate(user: &LedgerUser, single_active_loan: bool) -> Self {
        Self {
            user_id: user.id,
            can_borrow: check_eligibility(user, single_active_loan).is_ok(),
            is_borrowed: derive_is_borrowed(user),
        }
    }
}
