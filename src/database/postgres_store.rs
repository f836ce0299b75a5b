//! Postgres durable store.
//!
//! One pool serves two tables:
//!
//! - cache ledger: `cache_key` (primary key), `value`, `ttl` (absolute unix
//!   seconds), `created_at` (ISO-8601 text)
//! - task ledger: one row per [`AsyncTask`] plus its own `ttl`
//!
//! Expiry is enforced on read; [`PostgresStore::purge_expired_cache`] and
//! [`PostgresStore::purge_expired_tasks`] reclaim the rows.

use crate::cache::errors::{CacheError, CacheResult};
use crate::cache::traits::DurableCacheStore;
use crate::clock::{to_chrono, SharedClock};
use crate::config::DatabaseConfig;
use crate::models::{AsyncTask, CacheEntry, TaskStatus};
use crate::tasks::errors::{TaskError, TaskResult};
use crate::tasks::ledger::TaskLedger;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
    cache_table: String,
    task_table: String,
    clock: SharedClock,
}

impl PostgresStore {
    /// Connect using the configured URL (or `DATABASE_URL`)
    pub async fn connect(config: &DatabaseConfig, clock: SharedClock) -> Result<Self, sqlx::Error> {
        let url = config.resolved_url().ok_or_else(|| {
            sqlx::Error::Configuration("database.url is not set and DATABASE_URL is missing".into())
        })?;

        let pool = Self::pool_options(config).connect(&url).await?;
        Self::from_pool(pool, config, clock)
    }

    /// Wrap an existing pool
    pub fn from_pool(
        pool: PgPool,
        config: &DatabaseConfig,
        clock: SharedClock,
    ) -> Result<Self, sqlx::Error> {
        for table in [&config.cache_table, &config.task_table] {
            if !is_valid_identifier(table) {
                return Err(sqlx::Error::Configuration(
                    format!("invalid table name: {table:?}").into(),
                ));
            }
        }

        Ok(Self {
            pool,
            cache_table: config.cache_table.clone(),
            task_table: config.task_table.clone(),
            clock,
        })
    }

    fn pool_options(config: &DatabaseConfig) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create both tables if missing
    pub async fn ensure_schema(&self) -> Result<(), sqlx::Error> {
        let statements = [
            format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    cache_key TEXT PRIMARY KEY,
                    value BYTEA NOT NULL,
                    ttl BIGINT NOT NULL,
                    created_at TEXT NOT NULL
                )",
                self.cache_table
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS {0}_ttl_idx ON {0} (ttl)",
                self.cache_table
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    task_id UUID PRIMARY KEY,
                    task_type TEXT NOT NULL,
                    user_id TEXT NOT NULL,
                    status TEXT NOT NULL,
                    created_at TIMESTAMPTZ NOT NULL,
                    started_at TIMESTAMPTZ,
                    completed_at TIMESTAMPTZ,
                    progress DOUBLE PRECISION NOT NULL DEFAULT 0,
                    result JSONB,
                    error TEXT,
                    metadata JSONB,
                    ttl BIGINT NOT NULL
                )",
                self.task_table
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS {0}_user_idx ON {0} (user_id, created_at DESC)",
                self.task_table
            ),
        ];

        for statement in &statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        info!(
            cache_table = %self.cache_table,
            task_table = %self.task_table,
            "🗃️ Durable store schema ready"
        );
        Ok(())
    }

    pub async fn purge_expired_cache(&self, now: DateTime<Utc>) -> Result<u64, sqlx::Error> {
        let sql = format!("DELETE FROM {} WHERE ttl <= $1", self.cache_table);
        let result = sqlx::query(&sql)
            .bind(now.timestamp())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn purge_expired_tasks(&self) -> Result<u64, sqlx::Error> {
        let sql = format!("DELETE FROM {} WHERE ttl <= $1", self.task_table);
        let result = sqlx::query(&sql)
            .bind(self.clock.now().timestamp())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn ping(&self) -> Result<bool, sqlx::Error> {
        let health: i32 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(health == 1)
    }

    fn task_from_row(row: &PgRow) -> TaskResult<AsyncTask> {
        let status: String = row.try_get("status")?;
        let status = status
            .parse::<TaskStatus>()
            .map_err(|e| TaskError::ledger("decode", e))?;
        let metadata: Option<serde_json::Value> = row.try_get("metadata")?;
        let metadata = metadata
            .map(serde_json::from_value::<HashMap<String, serde_json::Value>>)
            .transpose()?;

        Ok(AsyncTask {
            task_id: row.try_get("task_id")?,
            task_type: row.try_get("task_type")?,
            user_id: row.try_get("user_id")?,
            status,
            created_at: row.try_get("created_at")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
            progress: row.try_get("progress")?,
            result: row.try_get("result")?,
            error: row.try_get("error")?,
            metadata,
        })
    }
}

/// Lowercase SQL identifier check for configured table names
fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && name.len() <= 48
}

/// Escape `LIKE` metacharacters so a key prefix matches literally
fn like_prefix(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len() + 1);
    for ch in prefix.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

#[async_trait]
impl DurableCacheStore for PostgresStore {
    async fn get_entry(&self, key: &str, now: DateTime<Utc>) -> CacheResult<Option<CacheEntry>> {
        let sql = format!(
            "SELECT value, ttl, created_at FROM {} WHERE cache_key = $1 AND ttl > $2",
            self.cache_table
        );
        let row = sqlx::query(&sql)
            .bind(key)
            .bind(now.timestamp())
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let value: Vec<u8> = row.try_get("value")?;
        let ttl: i64 = row.try_get("ttl")?;
        let created_at: String = row.try_get("created_at")?;

        let expiry = Utc
            .timestamp_opt(ttl, 0)
            .single()
            .ok_or_else(|| CacheError::SerializationError(format!("invalid ttl {ttl}")))?;
        let created_at = DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(now);

        Ok(Some(CacheEntry::restore(key, value, expiry, created_at)))
    }

    async fn put_entry(&self, entry: &CacheEntry) -> CacheResult<()> {
        let sql = format!(
            "INSERT INTO {} (cache_key, value, ttl, created_at) VALUES ($1, $2, $3, $4)
             ON CONFLICT (cache_key) DO UPDATE
             SET value = EXCLUDED.value, ttl = EXCLUDED.ttl, created_at = EXCLUDED.created_at",
            self.cache_table
        );
        sqlx::query(&sql)
            .bind(&entry.key)
            .bind(entry.value.as_slice())
            .bind(entry.expiry_unix_seconds())
            .bind(entry.created_at.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_entry(&self, key: &str) -> CacheResult<bool> {
        let sql = format!("DELETE FROM {} WHERE cache_key = $1", self.cache_table);
        let result = sqlx::query(&sql).bind(key).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_prefix(&self, prefix: &str) -> CacheResult<Option<u64>> {
        let sql = format!(
            "DELETE FROM {} WHERE cache_key LIKE $1 ESCAPE '\\'",
            self.cache_table
        );
        let result = sqlx::query(&sql)
            .bind(like_prefix(prefix))
            .execute(&self.pool)
            .await?;
        debug!(prefix = prefix, deleted = result.rows_affected(), "Durable prefix DEL");
        Ok(Some(result.rows_affected()))
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> CacheResult<u64> {
        Ok(self.purge_expired_cache(now).await?)
    }

    async fn health_check(&self) -> CacheResult<bool> {
        Ok(self.ping().await?)
    }

    fn provider_name(&self) -> &'static str {
        "postgres"
    }
}

#[async_trait]
impl TaskLedger for PostgresStore {
    async fn put_task(&self, task: &AsyncTask, ttl: Duration) -> TaskResult<()> {
        let expires_at = (self.clock.now() + to_chrono(ttl)).timestamp();
        let metadata = task
            .metadata
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;

        let sql = format!(
            "INSERT INTO {} (task_id, task_type, user_id, status, created_at, started_at,
                             completed_at, progress, result, error, metadata, ttl)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
             ON CONFLICT (task_id) DO UPDATE SET
                status = EXCLUDED.status,
                started_at = EXCLUDED.started_at,
                completed_at = EXCLUDED.completed_at,
                progress = EXCLUDED.progress,
                result = EXCLUDED.result,
                error = EXCLUDED.error,
                metadata = EXCLUDED.metadata,
                ttl = EXCLUDED.ttl",
            self.task_table
        );

        sqlx::query(&sql)
            .bind(task.task_id)
            .bind(&task.task_type)
            .bind(&task.user_id)
            .bind(task.status.as_str())
            .bind(task.created_at)
            .bind(task.started_at)
            .bind(task.completed_at)
            .bind(task.progress)
            .bind(&task.result)
            .bind(&task.error)
            .bind(metadata)
            .bind(expires_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_task(&self, task_id: Uuid) -> TaskResult<Option<AsyncTask>> {
        let sql = format!(
            "SELECT * FROM {} WHERE task_id = $1 AND ttl > $2",
            self.task_table
        );
        let row = sqlx::query(&sql)
            .bind(task_id)
            .bind(self.clock.now().timestamp())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::task_from_row).transpose()
    }

    async fn list_user_tasks(
        &self,
        user_id: &str,
        status: Option<TaskStatus>,
        limit: usize,
    ) -> TaskResult<Vec<AsyncTask>> {
        let sql = format!(
            "SELECT * FROM {} WHERE user_id = $1 AND ttl > $2
               AND ($3::TEXT IS NULL OR status = $3)
             ORDER BY created_at DESC LIMIT $4",
            self.task_table
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .bind(self.clock.now().timestamp())
            .bind(status.map(|s| s.as_str()))
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::task_from_row).collect()
    }

    async fn purge_expired(&self) -> TaskResult<u64> {
        Ok(self.purge_expired_tasks().await?)
    }

    async fn health_check(&self) -> TaskResult<bool> {
        Ok(self.ping().await?)
    }

    fn provider_name(&self) -> &'static str {
        "postgres"
    }
}
