//! Role and ownership checks for every mutating lending operation

use crate::{
    error::{AppError, AppResult},
    models::{Actor, Role},
};

/// Mutating operations on a user's ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    CreateLoan,
    Accept,
    RequestReturn,
    ConfirmReturn,
    RequestRenewal,
    ApproveRenewal,
    RejectRenewal,
    Archive,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::CreateLoan => "createLoan",
            Action::Accept => "accept",
            Action::RequestReturn => "requestReturn",
            Action::ConfirmReturn => "confirmReturn",
            Action::RequestRenewal => "requestRenewal",
            Action::ApproveRenewal => "approveRenewal",
            Action::RejectRenewal => "rejectRenewal",
            Action::Archive => "archive",
        }
    }

    /// Admin-only actions; all others are reserved to the owning user
    pub fn requires_admin(&self) -> bool {
        match self {
            Action::Accept
            | Action::ConfirmReturn
            | Action::ApproveRenewal
            | Action::RejectRenewal
            | Action::Archive => true,
            Action::CreateLoan | Action::RequestReturn | Action::RequestRenewal => false,
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Role part of the gate, independent of ownership
pub fn require_role(role: Role, action: Action) -> AppResult<()> {
    if action.requires_admin() && !role.is_admin() {
        return Err(AppError::Unauthorized(format!(
            "{} requires administrator privileges",
            action
        )));
    }
    Ok(())
}

/// Decide whether `actor` may perform `action` on the ledger of `owner_id`.
///
/// Admin actions are never gated by ownership; owner actions are refused to
/// anyone but the owner, admins included.
pub fn authorize(actor: &Actor, owner_id: i32, action: Action) -> AppResult<()> {
    require_role(actor.role, action)?;

    if !action.requires_admin() && actor.user_id != owner_id {
        return Err(AppError::Unauthorized(format!(
            "{} may only be performed by the owning user",
            action
        )));
    }

    Ok(())
}
