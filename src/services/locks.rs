//! Striped per-(user, item) locks
//!
//! Keys hash onto a fixed set of async mutexes. Two operations on the same
//! (user, item) pair always share a stripe and therefore run one after the
//! other; unrelated pairs usually land on different stripes and proceed in
//! parallel.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};

use crate::error::{AppError, AppResult};

pub struct KeyLocks {
    stripes: Vec<Mutex<()>>,
    timeout: Duration,
}

impl KeyLocks {
    pub fn new(num_stripes: usize, timeout: Duration) -> Self {
        let stripes = (0..num_stripes.max(1)).map(|_| Mutex::new(())).collect();
        Self { stripes, timeout }
    }

    fn stripe_index(&self, user_id: i32, item_id: i32) -> usize {
        let mut hasher = DefaultHasher::new();
        (user_id, item_id).hash(&mut hasher);
        (hasher.finish() as usize) % self.stripes.len()
    }

    /// Wait for exclusive access to the (user, item) pair.
    ///
    /// Gives up with `Conflict` once the configured timeout elapses.
    pub async fn acquire(&self, user_id: i32, item_id: i32) -> AppResult<MutexGuard<'_, ()>> {
        let stripe = &self.stripes[self.stripe_index(user_id, item_id)];

        tokio::time::timeout(self.timeout, stripe.lock())
            .await
            .map_err(|_| {
                tracing::warn!(user_id, item_id, "Timed out waiting for loan lock");
                AppError::Conflict(format!(
                    "Loan of item {} for user {} is being modified by another request",
                    item_id, user_id
                ))
            })
    }
}
