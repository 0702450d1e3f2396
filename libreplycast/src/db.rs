//! Database operations for Replycast
//!
//! Single SQLite store holding the pending-review queue, completed history,
//! the shared content cache, durable activity logs, tenant credential
//! sub-pools, and daily counters. All mutations are single statements or
//! short transactions; cache writes are idempotent upserts.

use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use std::path::Path;

use crate::error::{DbError, Result};
use crate::types::{Credential, DailyStats, HistoryEntry, LogEntry, LogLevel, QueueItem};

/// Which daily counter to bump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatKind {
    Acquired,
    Generated,
    Queued,
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection
    pub async fn new(db_path: &str) -> Result<Self> {
        // Expand path and create parent directories
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
        }

        // mode=rwc creates the database file if it doesn't exist; forward
        // slashes keep the URL valid on Windows too
        let db_url = format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"));

        let pool = SqlitePool::connect(&db_url)
            .await
            .map_err(DbError::SqlxError)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        Ok(Self { pool })
    }

    /// Open an in-memory database with migrations applied. Test support.
    /// Capped at one connection: every new `:memory:` connection would
    /// otherwise get its own empty database.
    pub async fn in_memory() -> Result<Self> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(DbError::SqlxError)?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ========================================================================
    // Content cache
    // ========================================================================

    /// Look up cached text for an item. A miss is `Ok(None)`, never an error.
    pub async fn get_cached_content(&self, item_id: &str) -> Result<Option<String>> {
        let row = sqlx::query(
            r#"
            SELECT content FROM content_cache WHERE item_id = ?
            "#,
        )
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(row.map(|r| r.get("content")))
    }

    /// Idempotent upsert of resolved text, shared across all tenants.
    pub async fn put_cached_content(&self, item_id: &str, content: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO content_cache (item_id, content, cached_at)
            VALUES (?, ?, ?)
            ON CONFLICT(item_id)
            DO UPDATE SET content = excluded.content, cached_at = excluded.cached_at
            "#,
        )
        .bind(item_id)
        .bind(content)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    // ========================================================================
    // Queue and history
    // ========================================================================

    /// True if the tenant already has this item in its pending queue or its
    /// completed history.
    pub async fn has_processed(&self, tenant_id: i64, item_id: &str) -> Result<bool> {
        let queued = sqlx::query(
            r#"
            SELECT 1 FROM queue WHERE tenant_id = ? AND item_id = ? LIMIT 1
            "#,
        )
        .bind(tenant_id)
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        if queued.is_some() {
            return Ok(true);
        }

        let recorded = sqlx::query(
            r#"
            SELECT 1 FROM history WHERE tenant_id = ? AND item_id = ? LIMIT 1
            "#,
        )
        .bind(tenant_id)
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(recorded.is_some())
    }

    /// Append a generated draft to the tenant's pending-review queue.
    pub async fn enqueue(
        &self,
        tenant_id: i64,
        item_id: &str,
        source_text: &str,
        reply_text: &str,
    ) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO queue (tenant_id, item_id, source_text, reply_text, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(tenant_id)
        .bind(item_id)
        .bind(source_text)
        .bind(reply_text)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.last_insert_rowid())
    }

    pub async fn list_queue(&self, tenant_id: i64) -> Result<Vec<QueueItem>> {
        let rows = sqlx::query(
            r#"
            SELECT id, tenant_id, item_id, source_text, reply_text, created_at
            FROM queue WHERE tenant_id = ? ORDER BY created_at DESC
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows
            .iter()
            .map(|r| QueueItem {
                id: r.get("id"),
                tenant_id: r.get("tenant_id"),
                item_id: r.get("item_id"),
                source_text: r.get("source_text"),
                reply_text: r.get("reply_text"),
                created_at: r.get("created_at"),
            })
            .collect())
    }

    /// Remove a queue item. Returns false when the id does not belong to the
    /// tenant.
    pub async fn remove_from_queue(&self, queue_id: i64, tenant_id: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM queue WHERE id = ? AND tenant_id = ?
            "#,
        )
        .bind(queue_id)
        .bind(tenant_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() > 0)
    }

    /// Move a queue item into history as approved. Transactional so the item
    /// never exists in both places or neither.
    pub async fn approve_queue_item(&self, queue_id: i64, tenant_id: i64) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(DbError::SqlxError)?;

        let row = sqlx::query(
            r#"
            SELECT item_id, source_text, reply_text FROM queue
            WHERE id = ? AND tenant_id = ?
            "#,
        )
        .bind(queue_id)
        .bind(tenant_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(DbError::SqlxError)?;

        let Some(row) = row else {
            return Ok(false);
        };

        let item_id: String = row.get("item_id");
        let source_text: Option<String> = row.get("source_text");
        let reply_text: String = row.get("reply_text");

        sqlx::query(
            r#"
            INSERT INTO history (tenant_id, item_id, source_text, reply_text, status, recorded_at)
            VALUES (?, ?, ?, ?, 'approved', ?)
            "#,
        )
        .bind(tenant_id)
        .bind(&item_id)
        .bind(&source_text)
        .bind(&reply_text)
        .bind(chrono::Utc::now().timestamp())
        .execute(&mut *tx)
        .await
        .map_err(DbError::SqlxError)?;

        sqlx::query(
            r#"
            DELETE FROM queue WHERE id = ? AND tenant_id = ?
            "#,
        )
        .bind(queue_id)
        .bind(tenant_id)
        .execute(&mut *tx)
        .await
        .map_err(DbError::SqlxError)?;

        tx.commit().await.map_err(DbError::SqlxError)?;
        Ok(true)
    }

    pub async fn add_history(
        &self,
        tenant_id: i64,
        item_id: &str,
        source_text: Option<&str>,
        reply_text: &str,
        status: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO history (tenant_id, item_id, source_text, reply_text, status, recorded_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(tenant_id)
        .bind(item_id)
        .bind(source_text)
        .bind(reply_text)
        .bind(status)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn recent_history(&self, tenant_id: i64, limit: usize) -> Result<Vec<HistoryEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, tenant_id, item_id, source_text, reply_text, status, recorded_at
            FROM history WHERE tenant_id = ? ORDER BY recorded_at DESC LIMIT ?
            "#,
        )
        .bind(tenant_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows
            .iter()
            .map(|r| HistoryEntry {
                id: r.get("id"),
                tenant_id: r.get("tenant_id"),
                item_id: r.get("item_id"),
                source_text: r.get("source_text"),
                reply_text: r.get("reply_text"),
                status: r.get("status"),
                recorded_at: r.get("recorded_at"),
            })
            .collect())
    }

    // ========================================================================
    // Activity log
    // ========================================================================

    pub async fn append_log(&self, tenant_id: i64, message: &str, level: LogLevel) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO logs (tenant_id, message, level, logged_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(tenant_id)
        .bind(message)
        .bind(level.to_string())
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Most recent log lines, oldest first.
    pub async fn recent_logs(&self, tenant_id: i64, limit: usize) -> Result<Vec<LogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, tenant_id, message, level, logged_at
            FROM logs WHERE tenant_id = ? ORDER BY logged_at DESC, id DESC LIMIT ?
            "#,
        )
        .bind(tenant_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        let mut entries: Vec<LogEntry> = rows
            .iter()
            .map(|r| LogEntry {
                id: r.get("id"),
                tenant_id: r.get("tenant_id"),
                message: r.get("message"),
                level: match r.get::<String, _>("level").as_str() {
                    "warning" => LogLevel::Warning,
                    "error" => LogLevel::Error,
                    "success" => LogLevel::Success,
                    _ => LogLevel::Info,
                },
                logged_at: r.get("logged_at"),
            })
            .collect();

        entries.reverse();
        Ok(entries)
    }

    // ========================================================================
    // Daily stats
    // ========================================================================

    pub async fn bump_stat(&self, tenant_id: i64, kind: StatKind) -> Result<()> {
        let day = chrono::Utc::now().format("%Y-%m-%d").to_string();

        let sql = match kind {
            StatKind::Acquired => {
                r#"
                INSERT INTO stats (tenant_id, day, acquired) VALUES (?, ?, 1)
                ON CONFLICT(tenant_id, day) DO UPDATE SET acquired = acquired + 1
                "#
            }
            StatKind::Generated => {
                r#"
                INSERT INTO stats (tenant_id, day, generated) VALUES (?, ?, 1)
                ON CONFLICT(tenant_id, day) DO UPDATE SET generated = generated + 1
                "#
            }
            StatKind::Queued => {
                r#"
                INSERT INTO stats (tenant_id, day, queued) VALUES (?, ?, 1)
                ON CONFLICT(tenant_id, day) DO UPDATE SET queued = queued + 1
                "#
            }
        };

        sqlx::query(sql)
            .bind(tenant_id)
            .bind(&day)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Today's counters for a tenant; zeros when no activity yet.
    pub async fn stats_today(&self, tenant_id: i64) -> Result<DailyStats> {
        let day = chrono::Utc::now().format("%Y-%m-%d").to_string();

        let row = sqlx::query(
            r#"
            SELECT day, acquired, generated, queued FROM stats
            WHERE tenant_id = ? AND day = ?
            "#,
        )
        .bind(tenant_id)
        .bind(&day)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(row
            .map(|r| DailyStats {
                day: r.get("day"),
                acquired: r.get("acquired"),
                generated: r.get("generated"),
                queued: r.get("queued"),
            })
            .unwrap_or(DailyStats {
                day,
                ..Default::default()
            }))
    }

    // ========================================================================
    // Tenant credentials
    // ========================================================================

    /// The tenant's private credential sub-pool in stored order.
    pub async fn tenant_credentials(&self, tenant_id: i64) -> Result<Vec<Credential>> {
        let rows = sqlx::query(
            r#"
            SELECT api_key, api_secret, access_token, access_secret, bearer
            FROM tenant_credentials WHERE tenant_id = ? ORDER BY position, id
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows
            .iter()
            .map(|r| Credential {
                api_key: r.get("api_key"),
                api_secret: r.get("api_secret"),
                access_token: r.get("access_token"),
                access_secret: r.get("access_secret"),
                bearer: r.get("bearer"),
            })
            .collect())
    }

    /// Append a credential at the end of the tenant's sub-pool.
    pub async fn add_tenant_credential(&self, tenant_id: i64, cred: &Credential) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO tenant_credentials
                (tenant_id, position, api_key, api_secret, access_token, access_secret, bearer)
            VALUES (?,
                COALESCE((SELECT MAX(position) + 1 FROM tenant_credentials WHERE tenant_id = ?), 0),
                ?, ?, ?, ?, ?)
            "#,
        )
        .bind(tenant_id)
        .bind(tenant_id)
        .bind(&cred.api_key)
        .bind(&cred.api_secret)
        .bind(&cred.access_token)
        .bind(&cred.access_secret)
        .bind(&cred.bearer)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.last_insert_rowid())
    }

    pub async fn delete_tenant_credential(&self, cred_id: i64, tenant_id: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM tenant_credentials WHERE id = ? AND tenant_id = ?
            "#,
        )
        .bind(cred_id)
        .bind(tenant_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() > 0)
    }
}
