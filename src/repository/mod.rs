//! Record store and catalog adapters
//!
//! The lending core only talks to the two traits below; the Postgres and
//! in-memory modules provide interchangeable implementations.

pub mod items;
pub mod memory;
pub mod users;

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{Pool, Postgres};

use crate::{
    error::AppResult,
    models::{BorrowerProfile, CatalogEntry, LedgerUser, LoanRecord, LoanStatus, RenewalStatus},
};

/// Persistence of ledger users (profile, cart and history as one document)
///
/// `save` is atomic per user and optimistic: it fails with `Conflict` when the
/// stored version differs from `user.version()`, and returns the user with
/// its new version on success.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn load(&self, user_id: i32) -> AppResult<LedgerUser>;

    async fn save(&self, user_id: i32, user: &LedgerUser) -> AppResult<LedgerUser>;

    async fn create(&self, profile: &BorrowerProfile) -> AppResult<LedgerUser>;

    /// Users holding at least one cart record matching `filter`
    async fn find_with_cart_status(&self, filter: CartFilter) -> AppResult<Vec<LedgerUser>>;

    /// Every user, ordered by id
    async fn list(&self) -> AppResult<Vec<LedgerUser>>;

    /// Cheap connectivity check
    async fn ping(&self) -> AppResult<()>;
}

/// Read-only catalog metadata lookup
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogLookup: Send + Sync {
    async fn resolve(&self, item_id: i32) -> AppResult<CatalogEntry>;
}

/// Admin work queues over cart records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartFilter {
    /// Borrow requests waiting for acceptance
    PendingBorrow,
    /// Returns waiting for confirmation
    ReturnRequested,
    RenewalRequested,
}

impl CartFilter {
    pub fn matches(&self, record: &LoanRecord) -> bool {
        match self {
            CartFilter::PendingBorrow => record.status() == LoanStatus::Pending,
            CartFilter::ReturnRequested => record.status() == LoanStatus::Processing,
            CartFilter::RenewalRequested => {
                record.is_borrowed() && record.renewal_status() == RenewalStatus::Requested
            }
        }
    }

    /// JSON field and value pre-selecting candidate records in a stored cart
    pub(crate) fn json_predicate(&self) -> (&'static str, &'static str) {
        match self {
            CartFilter::PendingBorrow => ("status", LoanStatus::Pending.as_str()),
            CartFilter::ReturnRequested => ("status", LoanStatus::Processing.as_str()),
            CartFilter::RenewalRequested => ("renewal_status", RenewalStatus::Requested.as_str()),
        }
    }
}

/// Main repository struct holding the store adapters
#[derive(Clone)]
pub struct Repository {
    pub records: Arc<dyn RecordStore>,
    pub catalog: Arc<dyn CatalogLookup>,
}

impl Repository {
    /// Create a Postgres-backed repository with the given database pool
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            records: Arc::new(users::PgRecordStore::new(pool.clone())),
            catalog: Arc::new(items::PgCatalog::new(pool)),
        }
    }

    /// Create a repository over arbitrary adapters
    pub fn with_stores(records: Arc<dyn RecordStore>, catalog: Arc<dyn CatalogLookup>) -> Self {
        Self { records, catalog }
    }
}
