//! Catalog items repository (read-only)

use async_trait::async_trait;
use sqlx::{Pool, Postgres};

use super::CatalogLookup;
use crate::{
    error::{AppError, AppResult},
    models::CatalogEntry,
};

#[derive(Clone)]
pub struct PgCatalog {
    pool: Pool<Postgres>,
}

impl PgCatalog {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogLookup for PgCatalog {
    /// Get display metadata for an item
    async fn resolve(&self, item_id: i32) -> AppResult<CatalogEntry> {
        sqlx::query_as::<_, CatalogEntry>("SELECT id, title, author FROM catalog_items WHERE id = $1")
            .bind(item_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Item with id {} not found", item_id)))
    }
}
