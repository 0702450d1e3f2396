//! Per-tenant duplicate-work guard
//!
//! A tenant must never get two review entries for the same post. The guard
//! consults both the pending queue and the completed history.

use std::sync::Arc;

use crate::db::Database;
use crate::error::Result;

#[derive(Clone)]
pub struct DedupGuard {
    db: Arc<Database>,
}

impl DedupGuard {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub async fn has_processed(&self, tenant_id: i64, item_id: &str) -> Result<bool> {
        self.db.has_processed(tenant_id, item_id).await
    }
}
