//! Catalog item metadata consumed at borrow time

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use super::loan::ItemRef;

/// Display metadata resolved from the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct CatalogEntry {
    pub id: i32,
    pub title: String,
    pub author: String,
}

impl From<CatalogEntry> for ItemRef {
    fn from(entry: CatalogEntry) -> Self {
        ItemRef {
            item_id: entry.id,
            title: entry.title,
            author: entry.author,
        }
    }
}
