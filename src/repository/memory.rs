//! In-memory record store and catalog

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{CartFilter, CatalogLookup, RecordStore};
use crate::{
    error::{AppError, AppResult},
    models::{BorrowerProfile, CatalogEntry, LedgerUser},
};

/// Record store keeping every user document in a map
#[derive(Default)]
pub struct MemoryRecordStore {
    users: RwLock<HashMap<i32, LedgerUser>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn load(&self, user_id: i32) -> AppResult<LedgerUser> {
        self.users
            .read()
            .await
            .get(&user_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", user_id)))
    }

    async fn save(&self, user_id: i32, user: &LedgerUser) -> AppResult<LedgerUser> {
        let mut users = self.users.write().await;
        let stored = users
            .get_mut(&user_id)
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", user_id)))?;

        if stored.version() != user.version() {
            return Err(AppError::Conflict(format!(
                "User {} was modified concurrently (version {} is stale)",
                user_id,
                user.version()
            )));
        }

        let mut saved = user.clone();
        saved.set_version(user.version() + 1);
        *stored = saved.clone();
        Ok(saved)
    }

    async fn create(&self, profile: &BorrowerProfile) -> AppResult<LedgerUser> {
        let mut users = self.users.write().await;

        let duplicate = users.values().any(|u| {
            u.borrower == profile.borrower
                || (profile.email.is_some() && u.email == profile.email)
        });
        if duplicate {
            return Err(AppError::Conflict(
                "A user with this email or identity number already exists".to_string(),
            ));
        }

        let id = users.keys().max().copied().unwrap_or(0) + 1;
        let user = LedgerUser::new(id, profile.clone());
        users.insert(id, user.clone());
        Ok(user)
    }

    async fn find_with_cart_status(&self, filter: CartFilter) -> AppResult<Vec<LedgerUser>> {
        let users = self.users.read().await;
        let mut found: Vec<LedgerUser> = users
            .values()
            .filter(|u| u.cart().values().any(|r| filter.matches(r)))
            .cloned()
            .collect();
        found.sort_by_key(|u| u.id);
        Ok(found)
    }

    async fn list(&self) -> AppResult<Vec<LedgerUser>> {
        let mut users: Vec<LedgerUser> = self.users.read().await.values().cloned().collect();
        users.sort_by_key(|u| u.id);
        Ok(users)
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}

/// Catalog backed by a map, seeded through `insert`
#[derive(Default)]
pub struct MemoryCatalog {
    items: RwLock<HashMap<i32, CatalogEntry>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, entry: CatalogEntry) {
        self.items.write().await.insert(entry.id, entry);
    }
}

#[async_trait]
impl CatalogLookup for MemoryCatalog {
    async fn resolve(&self, item_id: i32) -> AppResult<CatalogEntry> {
        self.items
            .read()
            .await
            .get(&item_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Item with id {} not found", item_id)))
    }
}
