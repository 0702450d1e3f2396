//! Shared content cache
//!
//! Cross-tenant item_id → text store. A hit lets the orchestrator skip
//! acquisition entirely; entries are never invalidated, staleness is an
//! accepted trade-off.

use std::sync::Arc;

use crate::db::Database;
use crate::error::Result;

#[derive(Clone)]
pub struct ContentCache {
    db: Arc<Database>,
}

impl ContentCache {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// A miss is `Ok(None)`; reading the cache never blocks acquisition.
    pub async fn get(&self, item_id: &str) -> Result<Option<String>> {
        self.db.get_cached_content(item_id).await
    }

    /// Idempotent upsert keyed by item id.
    pub async fn put(&self, item_id: &str, text: &str) -> Result<()> {
        self.db.put_cached_content(item_id, text).await
    }
}
