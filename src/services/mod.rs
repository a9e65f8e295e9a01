//! Business logic services

pub mod authorization;
pub mod eligibility;
pub mod ledger;
pub mod loans;
pub mod locks;
pub mod transition;

use crate::{config::LendingConfig, repository::Repository};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub loans: loans::LoansService,
}

impl Services {
    /// Create all services with the given repository
    pub fn new(repository: Repository, lending_config: &LendingConfig) -> Self {
        Self {
            loans: loans::LoansService::new(repository, lending_config),
        }
    }
}
