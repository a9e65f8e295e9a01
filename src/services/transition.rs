//! Lending lifecycle state machine
//!
//! ```text
//! pending    --accept(admin)--------> accepted
//! accepted   --requestReturn(owner)-> processing
//! processing --confirmReturn(admin)-> returned   (terminal, archived by the ledger)
//! accepted   --requestRenewal(owner)> accepted   renewal: none|rejected -> requested
//! accepted   --approveRenewal(admin)> renewed    renewal: requested -> renewed, return date moved
//! accepted   --rejectRenewal(admin)-> accepted   renewal: requested -> rejected
//! ```
//!
//! `renewed` behaves exactly like `accepted` as a source status. `apply` is
//! pure: it never touches the input record and either returns the complete
//! next state or an error.

use chrono::{DateTime, Utc};

use super::authorization::{require_role, Action};
use crate::{
    error::{AppError, AppResult},
    models::{LoanRecord, LoanStatus, RenewalStatus, Role},
};

/// A requested transition and its payload
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Accept,
    RequestReturn,
    ConfirmReturn,
    /// `identity_no` is the number the requester gives for its own role
    /// (admission number for students, staff number otherwise); it must equal
    /// the one stored on the record.
    RequestRenewal {
        identity_no: String,
        new_return_date: DateTime<Utc>,
    },
    /// Without an explicit date the requested renewal date is used
    ApproveRenewal {
        new_return_date: Option<DateTime<Utc>>,
    },
    RejectRenewal,
}

impl Transition {
    pub fn action(&self) -> Action {
        match self {
            Transition::Accept => Action::Accept,
            Transition::RequestReturn => Action::RequestReturn,
            Transition::ConfirmReturn => Action::ConfirmReturn,
            Transition::RequestRenewal { .. } => Action::RequestRenewal,
            Transition::ApproveRenewal { .. } => Action::ApproveRenewal,
            Transition::RejectRenewal => Action::RejectRenewal,
        }
    }
}

/// Validate and apply `transition` to `record` on behalf of `actor_role`
pub fn apply(record: &LoanRecord, transition: &Transition, actor_role: Role) -> AppResult<LoanRecord> {
    let action = transition.action();
    require_role(actor_role, action)?;

    let mut next = record.clone();

    match transition {
        Transition::Accept => {
            expect_status(record, action, |s| s == LoanStatus::Pending)?;
            next.set_status(LoanStatus::Accepted);
        }
        Transition::RequestReturn => {
            expect_status(record, action, |s| s.is_active())?;
            next.set_status(LoanStatus::Processing);
        }
        Transition::ConfirmReturn => {
            expect_status(record, action, |s| s == LoanStatus::Processing)?;
            next.set_status(LoanStatus::Returned);
        }
        Transition::RequestRenewal {
            identity_no,
            new_return_date,
        } => {
            let stored = match actor_role {
                Role::Student => record.borrower.admission_no(),
                Role::Staff | Role::Admin => record.borrower.staff_no(),
            };
            if stored != Some(identity_no.as_str()) {
                return Err(AppError::Unauthorized(format!(
                    "Identity does not match the borrower of loan {}",
                    record.id
                )));
            }
            expect_status(record, action, |s| s.is_active())?;
            if !record.renewal_status().accepts_request() {
                return Err(invalid(record, action));
            }
            if *new_return_date <= record.checkout_form().return_date() {
                return Err(AppError::Validation(format!(
                    "Renewal date {} must be after the current return date {}",
                    new_return_date,
                    record.checkout_form().return_date()
                )));
            }
            // checked for the window invariant only; the form changes on approval
            record.checkout_form().with_return_date(*new_return_date)?;
            next.set_renewal(RenewalStatus::Requested, Some(*new_return_date));
        }
        Transition::ApproveRenewal { new_return_date } => {
            expect_status(record, action, |s| s.is_active())?;
            if record.renewal_status() != RenewalStatus::Requested {
                return Err(invalid(record, action));
            }
            let return_date = new_return_date
                .or(record.renewal_request_date())
                .ok_or_else(|| invalid(record, action))?;
            next.set_checkout_form(record.checkout_form().with_return_date(return_date)?);
            next.set_renewal(RenewalStatus::Renewed, None);
            next.set_status(LoanStatus::Renewed);
        }
        Transition::RejectRenewal => {
            expect_status(record, action, |s| s.is_active())?;
            if record.renewal_status() != RenewalStatus::Requested {
                return Err(invalid(record, action));
            }
            next.set_renewal(RenewalStatus::Rejected, None);
        }
    }

    Ok(next)
}

fn expect_status(record: &LoanRecord, action: Action, allowed: impl Fn(LoanStatus) -> bool) -> AppResult<()> {
    if allowed(record.status()) {
        Ok(())
    } else {
        Err(invalid(record, action))
    }
}

fn invalid(record: &LoanRecord, action: Action) -> AppError {
    AppError::InvalidTransition(format!(
        "Cannot {} loan {} (status {}, renewal {})",
        action,
        record.id,
        record.status(),
        record.renewal_status()
    ))
}
