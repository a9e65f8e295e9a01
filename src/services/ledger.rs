//! User ledger: owner of every user's cart and history
//!
//! All mutation of loan records goes through this type. Each operation runs
//! under the (user, item) lock, loads the user document, changes it in memory
//! and persists it with a single versioned `save`. A stale-version conflict
//! restarts the operation from the load, so a retried operation never applies
//! its effect twice.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::locks::KeyLocks;
use crate::{
    config::LendingConfig,
    error::{AppError, AppResult},
    models::{BorrowerProfile, LedgerUser, LoanRecord, LoanStatus},
    repository::{CartFilter, RecordStore},
};

#[derive(Clone)]
pub struct UserLedger {
    store: Arc<dyn RecordStore>,
    locks: Arc<KeyLocks>,
    store_timeout: Duration,
    max_conflict_retries: u32,
}

impl UserLedger {
    pub fn new(store: Arc<dyn RecordStore>, config: &LendingConfig) -> Self {
        Self {
            store,
            locks: Arc::new(KeyLocks::new(config.lock_stripes, config.lock_timeout())),
            store_timeout: config.store_timeout(),
            max_conflict_retries: config.max_conflict_retries,
        }
    }

    /// Load a user with its cart and history
    pub async fn user(&self, user_id: i32) -> AppResult<LedgerUser> {
        self.bounded("load", self.store.load(user_id)).await
    }

    /// Every registered user, ordered by id
    pub async fn users(&self) -> AppResult<Vec<LedgerUser>> {
        self.bounded("list", self.store.list()).await
    }

    /// Check that the record store answers
    pub async fn ping(&self) -> AppResult<()> {
        self.bounded("ping", self.store.ping()).await
    }

    /// Register a new borrower with empty collections
    pub async fn register(&self, profile: &BorrowerProfile) -> AppResult<LedgerUser> {
        self.bounded("create", self.store.create(profile)).await
    }

    /// The unique cart record of `user_id` for `item_id`
    pub async fn find_active(&self, user_id: i32, item_id: i32) -> AppResult<LoanRecord> {
        let user = self.user(user_id).await?;
        user.cart_entry(item_id)
            .cloned()
            .ok_or_else(|| not_in_cart(user_id, item_id))
    }

    /// Recompute the user-level borrowed flag
    pub async fn derive_is_borrowed_flag(&self, user_id: i32) -> AppResult<bool> {
        let user = self.user(user_id).await?;
        Ok(super::eligibility::derive_is_borrowed(&user))
    }

    /// Cart records matching `filter`, across all users
    pub async fn queue(&self, filter: CartFilter) -> AppResult<Vec<(i32, LoanRecord)>> {
        let users = self.bounded("scan", self.store.find_with_cart_status(filter)).await?;
        Ok(users
            .iter()
            .flat_map(|user| {
                user.cart()
                    .values()
                    .filter(|record| filter.matches(record))
                    .map(|record| (user.id, record.clone()))
                    .collect::<Vec<_>>()
            })
            .collect())
    }

    /// Add a new record to the cart of `user_id`.
    ///
    /// `build` runs against the freshly loaded user and may refuse creation
    /// (eligibility); an existing cart entry for the item is a `Conflict` and
    /// is reported without retrying.
    pub async fn create<F>(&self, user_id: i32, item_id: i32, build: F) -> AppResult<(LedgerUser, LoanRecord)>
    where
        F: Fn(&LedgerUser) -> AppResult<LoanRecord> + Send + Sync,
    {
        let _guard = self.locks.acquire(user_id, item_id).await?;
        let build = &build;

        self.retry_on_conflict(user_id, item_id, move || async move {
            let mut user = self.user(user_id).await?;
            if user.cart_entry(item_id).is_some() {
                return Err(AppError::Conflict(format!(
                    "User {} already has an in-flight loan for item {}",
                    user_id, item_id
                ))
                .into());
            }

            let record = build(&user)?;
            user.insert_cart(record.clone())?;
            let user = self.commit(user_id, &user).await?;
            Ok::<_, AttemptError>((user, record))
        })
        .await
    }

    /// Apply `transition` to the cart record of (user, item) and persist it.
    ///
    /// `transition` sees the whole user as loaded, so it can check rules that
    /// span several records. A record reaching a terminal status is archived
    /// in the same save.
    pub async fn mutate<F>(&self, user_id: i32, item_id: i32, transition: F) -> AppResult<(LedgerUser, LoanRecord)>
    where
        F: Fn(&LedgerUser, &LoanRecord) -> AppResult<LoanRecord> + Send + Sync,
    {
        let _guard = self.locks.acquire(user_id, item_id).await?;
        let transition = &transition;

        self.retry_on_conflict(user_id, item_id, move || async move {
            let mut user = self.user(user_id).await?;
            let current = user
                .cart_entry(item_id)
                .ok_or_else(|| not_in_cart(user_id, item_id))?;

            let next = transition(&user, current)?;
            let terminal = next.status().is_terminal();
            user.replace_cart(next.clone())?;
            if terminal {
                user.move_to_history(item_id);
            }

            let user = self.commit(user_id, &user).await?;
            if terminal {
                tracing::info!(user_id, item_id, loan_id = %next.id, "Loan archived to history");
            }
            Ok::<_, AttemptError>((user, next))
        })
        .await
    }

    /// Move a returned cart record to history.
    ///
    /// Safe to retry: when the record is already archived this is a no-op
    /// returning the archived record.
    pub async fn archive(&self, user_id: i32, item_id: i32) -> AppResult<(LedgerUser, LoanRecord)> {
        let _guard = self.locks.acquire(user_id, item_id).await?;

        self.retry_on_conflict(user_id, item_id, move || async move {
            let mut user = self.user(user_id).await?;

            match user.cart_entry(item_id).map(|r| r.status()) {
                Some(LoanStatus::Returned) => {
                    let record = user
                        .move_to_history(item_id)
                        .cloned()
                        .ok_or_else(|| not_in_cart(user_id, item_id))?;
                    let user = self.commit(user_id, &user).await?;
                    tracing::info!(user_id, item_id, loan_id = %record.id, "Loan archived to history");
                    Ok::<_, AttemptError>((user, record))
                }
                Some(status) => Err(AppError::InvalidTransition(format!(
                    "Cannot archive loan of item {} in status {}",
                    item_id, status
                ))
                .into()),
                None => {
                    let archived = user
                        .history()
                        .iter()
                        .rev()
                        .find(|r| r.item_id() == item_id && r.status() == LoanStatus::Returned)
                        .cloned()
                        .ok_or_else(|| not_in_cart(user_id, item_id))?;
                    tracing::debug!(user_id, item_id, "Loan already archived");
                    Ok((user, archived))
                }
            }
        })
        .await
    }

    /// Save inside an attempt; only a lost version race may be replayed
    async fn commit(&self, user_id: i32, user: &LedgerUser) -> Result<LedgerUser, AttemptError> {
        self.bounded("save", self.store.save(user_id, user))
            .await
            .map_err(|e| match e {
                AppError::Conflict(_) => AttemptError::Stale(e),
                other => AttemptError::Failed(other),
            })
    }

    /// Bound a store call by the configured timeout
    async fn bounded<T>(&self, operation: &str, call: impl Future<Output = AppResult<T>>) -> AppResult<T> {
        tokio::time::timeout(self.store_timeout, call)
            .await
            .map_err(|_| {
                AppError::StoreFailure(format!(
                    "Record store {} timed out after {:?}",
                    operation, self.store_timeout
                ))
            })?
    }

    async fn retry_on_conflict<T, F, Fut>(&self, user_id: i32, item_id: i32, mut attempt: F) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AttemptError>>,
    {
        let mut retries = 0;
        loop {
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(AttemptError::Stale(e)) if retries < self.max_conflict_retries => {
                    retries += 1;
                    tracing::debug!(user_id, item_id, retries, "Retrying after conflict: {}", e);
                }
                Err(AttemptError::Stale(e)) | Err(AttemptError::Failed(e)) => return Err(e),
            }
        }
    }
}

/// Outcome of one failed load-change-save attempt
enum AttemptError {
    /// The save lost a version race; the attempt can start over from the load
    Stale(AppError),
    Failed(AppError),
}

impl From<AppError> for AttemptError {
    fn from(e: AppError) -> Self {
        AttemptError::Failed(e)
    }
}

fn not_in_cart(user_id: i32, item_id: i32) -> AppError {
    AppError::NotFound(format!("Item {} not found in cart of user {}", item_id, user_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Borrower, CheckoutForm, ItemRef, Role};
    use crate::repository::MockRecordStore;
    use crate::services::transition::{apply, Transition};
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, Utc};

    fn config() -> LendingConfig {
        LendingConfig {
            store_timeout_ms: 50,
            lock_timeout_ms: 50,
            ..LendingConfig::default()
        }
    }

    fn profile() -> BorrowerProfile {
        BorrowerProfile {
            full_name: "Kemi Bello".into(),
            email: None,
            borrower: Borrower::new(Role::Student, None, Some("ADM77".into())).unwrap(),
        }
    }

    fn pending(item_id: i32) -> LoanRecord {
        let now = Utc::now();
        LoanRecord::new(
            ItemRef { item_id, title: "Purple Hibiscus".into(), author: "Chimamanda Ngozi Adichie".into() },
            profile().borrower,
            CheckoutForm::new(now, now + ChronoDuration::days(14)).unwrap(),
        )
    }

    fn user_with_pending(item_id: i32, version: i64) -> LedgerUser {
        LedgerUser::from_parts(1, profile(), vec![pending(item_id)], Vec::new(), version)
    }

    fn accept(_user: &LedgerUser, record: &LoanRecord) -> AppResult<LoanRecord> {
        apply(record, &Transition::Accept, Role::Admin)
    }

    #[tokio::test]
    async fn test_store_failure_surfaces_without_retry() {
        let mut store = MockRecordStore::new();
        store.expect_load().times(1).returning(|_| Ok(user_with_pending(9, 0)));
        store
            .expect_save()
            .times(1)
            .returning(|_, _| Err(AppError::StoreFailure("disk full".into())));

        let ledger = UserLedger::new(Arc::new(store), &config());
        let result = ledger.mutate(1, 9, accept).await;
        assert!(matches!(result, Err(AppError::StoreFailure(_))));
    }

    #[tokio::test]
    async fn test_stale_version_is_retried_from_load() {
        let mut store = MockRecordStore::new();
        let mut seq = mockall::Sequence::new();
        store
            .expect_load()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(user_with_pending(9, 0)));
        store
            .expect_save()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(AppError::Conflict("stale".into())));
        store
            .expect_load()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(user_with_pending(9, 1)));
        store
            .expect_save()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|_, user| user.version() == 1)
            .returning(|_, user| {
                let mut saved = LedgerUser::clone(user);
                saved.set_version(2);
                Ok(saved)
            });

        let ledger = UserLedger::new(Arc::new(store), &config());
        let (user, record) = ledger.mutate(1, 9, accept).await.unwrap();
        assert_eq!(user.version(), 2);
        assert_eq!(record.status(), LoanStatus::Accepted);
    }

    #[tokio::test]
    async fn test_conflicts_give_up_after_retry_budget() {
        let mut store = MockRecordStore::new();
        let attempts = config().max_conflict_retries as usize + 1;
        store.expect_load().times(attempts).returning(|_| Ok(user_with_pending(9, 0)));
        store
            .expect_save()
            .times(attempts)
            .returning(|_, _| Err(AppError::Conflict("stale".into())));

        let ledger = UserLedger::new(Arc::new(store), &config());
        assert!(matches!(ledger.mutate(1, 9, accept).await, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_rejected_transition_never_saves() {
        let mut store = MockRecordStore::new();
        store.expect_load().times(1).returning(|_| Ok(user_with_pending(9, 0)));
        store.expect_save().never();

        let ledger = UserLedger::new(Arc::new(store), &config());
        let result = ledger
            .mutate(1, 9, |_, r| apply(r, &Transition::ConfirmReturn, Role::Admin))
            .await;
        assert!(matches!(result, Err(AppError::InvalidTransition(_))));
    }

    #[tokio::test]
    async fn test_missing_cart_entry_is_not_found() {
        let mut store = MockRecordStore::new();
        store.expect_load().returning(|_| Ok(user_with_pending(9, 0)));
        store.expect_save().never();

        let ledger = UserLedger::new(Arc::new(store), &config());
        assert!(matches!(ledger.mutate(1, 10, accept).await, Err(AppError::NotFound(_))));
        assert!(matches!(ledger.find_active(1, 10).await, Err(AppError::NotFound(_))));
        assert!(ledger.find_active(1, 9).await.is_ok());
    }

    #[tokio::test]
    async fn test_duplicate_request_is_reported_after_one_load() {
        let mut store = MockRecordStore::new();
        store.expect_load().times(1).returning(|_| Ok(user_with_pending(9, 0)));
        store.expect_save().never();

        let ledger = UserLedger::new(Arc::new(store), &config());
        let result = ledger.create(1, 9, |_| Ok(pending(9))).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_transition_sees_the_loaded_user() {
        let mut store = MockRecordStore::new();
        store.expect_load().times(1).returning(|_| {
            Ok(LedgerUser::from_parts(1, profile(), vec![pending(9), pending(10)], Vec::new(), 0))
        });
        store.expect_save().never();

        let ledger = UserLedger::new(Arc::new(store), &config());
        let result = ledger
            .mutate(1, 9, |user, _| Err(AppError::IneligibleBorrower(format!("{} records", user.cart().len()))))
            .await;
        assert!(matches!(result, Err(AppError::IneligibleBorrower(msg)) if msg == "2 records"));
    }

    #[tokio::test]
    async fn test_borrowed_flag_follows_accepted_records() {
        let mut store = MockRecordStore::new();
        let mut seq = mockall::Sequence::new();
        store
            .expect_load()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(user_with_pending(9, 0)));
        store.expect_load().times(1).in_sequence(&mut seq).returning(|_| {
            let accepted = apply(&pending(9), &Transition::Accept, Role::Admin)?;
            Ok(LedgerUser::from_parts(1, profile(), vec![accepted], Vec::new(), 1))
        });

        let ledger = UserLedger::new(Arc::new(store), &config());
        assert!(!ledger.derive_is_borrowed_flag(1).await.unwrap());
        assert!(ledger.derive_is_borrowed_flag(1).await.unwrap());
    }

    struct SlowStore;

    #[async_trait]
    impl RecordStore for SlowStore {
        async fn load(&self, _user_id: i32) -> AppResult<LedgerUser> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(user_with_pending(9, 0))
        }

        async fn save(&self, _user_id: i32, user: &LedgerUser) -> AppResult<LedgerUser> {
            Ok(user.clone())
        }

        async fn create(&self, profile: &BorrowerProfile) -> AppResult<LedgerUser> {
            Ok(LedgerUser::new(1, profile.clone()))
        }

        async fn find_with_cart_status(&self, _filter: CartFilter) -> AppResult<Vec<LedgerUser>> {
            Ok(Vec::new())
        }

        async fn list(&self) -> AppResult<Vec<LedgerUser>> {
            Ok(Vec::new())
        }

        async fn ping(&self) -> AppResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_store_timeout_is_a_store_failure() {
        let ledger = UserLedger::new(Arc::new(SlowStore), &config());
        assert!(matches!(ledger.mutate(1, 9, accept).await, Err(AppError::StoreFailure(_))));
    }
}
