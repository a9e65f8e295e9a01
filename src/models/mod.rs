//! Data models for the lending ledger

pub mod enums;
pub mod item;
pub mod loan;
pub mod user;

// Re-export commonly used types
pub use enums::{LoanStatus, RenewalStatus, Role};
pub use item::CatalogEntry;
pub use loan::{Borrower, CheckoutForm, ItemRef, LoanRecord, LoanRecordView, NewLoan};
pub use user::{Actor, BorrowerProfile, LedgerUser, LedgerView, RegisterBorrower, UserClaims};
