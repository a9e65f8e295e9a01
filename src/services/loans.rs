//! Loan lifecycle service: the operations exposed to callers

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use super::{
    authorization::{authorize, Action},
    eligibility::{check_eligibility, Eligibility},
    ledger::UserLedger,
    transition::{self, Transition},
};
use crate::{
    config::LendingConfig,
    error::{AppError, AppResult},
    models::{
        Actor, BorrowerProfile, CheckoutForm, LedgerUser, LoanRecord, LoanRecordView, NewLoan,
        Role,
    },
    repository::{CartFilter, Repository},
};

/// Result of a lending operation: the affected record and the saved user
#[derive(Debug, Clone)]
pub struct LoanOutcome {
    pub user: LedgerUser,
    pub record: LoanRecord,
}

impl LoanOutcome {
    /// Whether the record now lives in history
    pub fn archived(&self) -> bool {
        self.user.cart_entry(self.record.item_id()).is_none()
            && self.user.history().iter().any(|r| r.id == self.record.id)
    }
}

/// Identity and date supplied with a renewal request
#[derive(Debug, Clone)]
pub struct RenewalClaim {
    pub staff_no: Option<String>,
    pub admission_no: Option<String>,
    pub new_return_date: DateTime<Utc>,
}

/// A cart record waiting for an admin decision
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QueueEntry {
    pub user_id: i32,
    pub loan: LoanRecordView,
}

#[derive(Clone)]
pub struct LoansService {
    repository: Repository,
    ledger: UserLedger,
    single_active_loan: bool,
}

impl LoansService {
    pub fn new(repository: Repository, config: &LendingConfig) -> Self {
        Self {
            ledger: UserLedger::new(repository.records.clone(), config),
            repository,
            single_active_loan: config.single_active_loan,
        }
    }

    /// Check that the record store answers
    pub async fn ping(&self) -> AppResult<()> {
        self.ledger.ping().await
    }

    /// Register a borrower
    pub async fn register(&self, profile: BorrowerProfile) -> AppResult<LedgerUser> {
        let user = self.ledger.register(&profile).await?;
        tracing::info!(user_id = user.id, role = %user.role(), "Borrower registered");
        Ok(user)
    }

    /// Every registered user, ordered by id
    pub async fn list_users(&self) -> AppResult<Vec<LedgerUser>> {
        self.ledger.users().await
    }

    /// Get a user with its cart and history
    pub async fn get_ledger(&self, user_id: i32) -> AppResult<LedgerUser> {
        self.ledger.user(user_id).await
    }

    /// Check whether a user may open a new loan
    pub async fn check_eligibility(&self, user_id: i32) -> AppResult<Eligibility> {
        let user = self.ledger.user(user_id).await?;
        Ok(Eligibility::evaluate(&user, self.single_active_loan))
    }

    /// Submit a borrow request; the record starts out pending
    pub async fn create_loan(&self, actor: &Actor, user_id: i32, request: NewLoan) -> AppResult<LoanOutcome> {
        authorize(actor, user_id, Action::CreateLoan)?;

        let checkout_form = CheckoutForm::new(request.borrow_date.unwrap_or_else(Utc::now), request.return_date)?;
        let entry = self.repository.catalog.resolve(request.item_id).await?;
        let single_active_loan = self.single_active_loan;

        let (user, record) = self
            .ledger
            .create(user_id, request.item_id, |user| {
                check_eligibility(user, single_active_loan)?;
                Ok(LoanRecord::new(
                    entry.clone().into(),
                    user.borrower.clone(),
                    checkout_form.clone(),
                ))
            })
            .await
            .map_err(|e| {
                tracing::debug!(user_id, item_id = request.item_id, "Borrow request refused: {}", e);
                e
            })?;

        tracing::info!(
            user_id,
            item_id = record.item_id(),
            loan_id = %record.id,
            "Borrow request created"
        );
        Ok(LoanOutcome { user, record })
    }

    /// Admin accepts a pending borrow request
    pub async fn accept(&self, actor: &Actor, user_id: i32, item_id: i32) -> AppResult<LoanOutcome> {
        self.transition(actor, user_id, item_id, Transition::Accept).await
    }

    /// Borrower hands the item back
    pub async fn request_return(&self, actor: &Actor, user_id: i32, item_id: i32) -> AppResult<LoanOutcome> {
        self.transition(actor, user_id, item_id, Transition::RequestReturn).await
    }

    /// Admin confirms the return; the record is archived
    pub async fn confirm_return(&self, actor: &Actor, user_id: i32, item_id: i32) -> AppResult<LoanOutcome> {
        self.transition(actor, user_id, item_id, Transition::ConfirmReturn).await
    }

    /// Borrower asks for a later return date
    pub async fn request_renewal(
        &self,
        actor: &Actor,
        user_id: i32,
        item_id: i32,
        claim: RenewalClaim,
    ) -> AppResult<LoanOutcome> {
        authorize(actor, user_id, Action::RequestRenewal)?;
        let identity_no = match actor.role {
            Role::Student => claim.admission_no,
            Role::Staff | Role::Admin => claim.staff_no,
        }
        .ok_or_else(|| {
            AppError::Validation(format!("An identity number is required to renew as {}", actor.role))
        })?;

        self.transition(
            actor,
            user_id,
            item_id,
            Transition::RequestRenewal {
                identity_no,
                new_return_date: claim.new_return_date,
            },
        )
        .await
    }

    /// Admin approves a renewal request, optionally with another date
    pub async fn approve_renewal(
        &self,
        actor: &Actor,
        user_id: i32,
        item_id: i32,
        new_return_date: Option<DateTime<Utc>>,
    ) -> AppResult<LoanOutcome> {
        self.transition(actor, user_id, item_id, Transition::ApproveRenewal { new_return_date })
            .await
    }

    /// Admin rejects a renewal request
    pub async fn reject_renewal(&self, actor: &Actor, user_id: i32, item_id: i32) -> AppResult<LoanOutcome> {
        self.transition(actor, user_id, item_id, Transition::RejectRenewal).await
    }

    /// Re-run archival of a returned record
    pub async fn archive(&self, actor: &Actor, user_id: i32, item_id: i32) -> AppResult<LoanOutcome> {
        authorize(actor, user_id, Action::Archive)?;
        let (user, record) = self.ledger.archive(user_id, item_id).await?;
        Ok(LoanOutcome { user, record })
    }

    /// Pending borrow requests of all users
    pub async fn borrow_requests(&self) -> AppResult<Vec<QueueEntry>> {
        self.queue(CartFilter::PendingBorrow).await
    }

    /// Returns waiting for confirmation
    pub async fn return_requests(&self) -> AppResult<Vec<QueueEntry>> {
        self.queue(CartFilter::ReturnRequested).await
    }

    /// Renewal requests waiting for a decision
    pub async fn renewal_requests(&self) -> AppResult<Vec<QueueEntry>> {
        self.queue(CartFilter::RenewalRequested).await
    }

    async fn queue(&self, filter: CartFilter) -> AppResult<Vec<QueueEntry>> {
        let entries = self.ledger.queue(filter).await?;
        Ok(entries
            .iter()
            .map(|(user_id, record)| QueueEntry {
                user_id: *user_id,
                loan: record.into(),
            })
            .collect())
    }

    async fn transition(
        &self,
        actor: &Actor,
        user_id: i32,
        item_id: i32,
        requested: Transition,
    ) -> AppResult<LoanOutcome> {
        let action = requested.action();
        authorize(actor, user_id, action)?;

        let role = actor.role;
        let single_active_loan = self.single_active_loan;
        let result = self
            .ledger
            .mutate(user_id, item_id, |user, record| {
                let next = transition::apply(record, &requested, role)?;
                // acceptance is the only step that makes a record active
                if requested == Transition::Accept {
                    check_eligibility(user, single_active_loan)?;
                }
                Ok(next)
            })
            .await;

        match result {
            Ok((user, record)) => {
                tracing::info!(
                    user_id,
                    item_id,
                    actor_id = actor.user_id,
                    transition = %action,
                    status = %record.status(),
                    renewal = %record.renewal_status(),
                    "Loan transition applied"
                );
                Ok(LoanOutcome { user, record })
            }
            Err(e) => {
                match &e {
                    AppError::Unauthorized(_) => {
                        tracing::warn!(user_id, item_id, actor_id = actor.user_id, transition = %action, "{}", e)
                    }
                    _ => tracing::debug!(user_id, item_id, transition = %action, "{}", e),
                }
                Err(e)
            }
        }
    }
}
