//! Credential pool assembly
//!
//! A tenant's effective pool is the shared system sub-pool (config order)
//! followed by the tenant's private sub-pool (stored order). The pool is
//! rebuilt from the authoritative stores on every call so secrets never
//! live in memory beyond one resolution.

use std::sync::Arc;

use crate::db::Database;
use crate::error::Result;
use crate::types::Credential;

pub struct CredentialPool {
    system: Vec<Credential>,
    db: Arc<Database>,
}

impl CredentialPool {
    pub fn new(system: Vec<Credential>, db: Arc<Database>) -> Self {
        Self { system, db }
    }

    /// All credentials available to a tenant: system pool first, then the
    /// tenant's own. An empty result means "not configured" — callers must
    /// not treat it as a transient failure.
    pub async fn credentials_for(&self, tenant_id: i64) -> Result<Vec<Credential>> {
        let mut pool = self.system.clone();
        pool.extend(self.db.tenant_credentials(tenant_id).await?);
        Ok(pool)
    }
}
