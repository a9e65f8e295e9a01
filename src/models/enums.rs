//! Shared domain enums

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// Role of a borrower or of the acting user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Staff,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Staff => "staff",
            Role::Admin => "admin",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "staff" => Ok(Role::Staff),
            "admin" => Ok(Role::Admin),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

// ---------------------------------------------------------------------------
// LoanStatus
// ---------------------------------------------------------------------------

/// Status of a loan record
///
/// `Renewed` is the display form of an accepted loan whose renewal was
/// approved; every transition treats it exactly like `Accepted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Pending,
    Accepted,
    Processing,
    Returned,
    Renewed,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Pending => "pending",
            LoanStatus::Accepted => "accepted",
            LoanStatus::Processing => "processing",
            LoanStatus::Returned => "returned",
            LoanStatus::Renewed => "renewed",
        }
    }

    /// The item is out with the borrower
    pub fn is_active(&self) -> bool {
        matches!(self, LoanStatus::Accepted | LoanStatus::Renewed)
    }

    /// Terminal status: the record belongs in history
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoanStatus::Returned)
    }
}

impl std::fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// RenewalStatus
// ---------------------------------------------------------------------------

/// Renewal sub-state of an active loan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RenewalStatus {
    #[default]
    None,
    Requested,
    Renewed,
    Rejected,
}

impl RenewalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenewalStatus::None => "none",
            RenewalStatus::Requested => "requested",
            RenewalStatus::Renewed => "renewed",
            RenewalStatus::Rejected => "rejected",
        }
    }

    /// A new renewal request may be filed from this sub-state
    pub fn accepts_request(&self) -> bool {
        matches!(self, RenewalStatus::None | RenewalStatus::Rejected)
    }
}

impl std::fmt::Display for RenewalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
