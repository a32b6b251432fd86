//! SQLite storage backend.
//!
//! Durable single-file backend for the settings snapshot:
//! - WAL mode for concurrent readers
//! - Upsert-based writes, last write wins

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

use crate::backend::{validate_key, Entry, StorageBackend};
use crate::error::{Result, SettingsError};

/// SQLite implementation of [`StorageBackend`].
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    /// Open or create a SQLite backend at the given path.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening SQLite settings backend at {:?}", path);

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(|e| SettingsError::ConnectionError(e.to_string()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| SettingsError::ConnectionError(e.to_string()))?;

        let backend = Self { pool };
        backend.init_schema().await?;
        Ok(backend)
    }

    /// Create an in-memory SQLite backend (for testing).
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| SettingsError::ConnectionError(e.to_string()))?;

        // A second connection would open a second, empty database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| SettingsError::ConnectionError(e.to_string()))?;

        let backend = Self { pool };
        backend.init_schema().await?;
        Ok(backend)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS settings_kv (
                key TEXT PRIMARY KEY NOT NULL,
                value BLOB NOT NULL,
                version INTEGER NOT NULL DEFAULT 1,
                updated_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        debug!("SQLite settings schema initialized");
        Ok(())
    }

    fn now_unix() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default()
    }

    fn unix_to_system_time(unix: i64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(unix.max(0) as u64)
    }
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    async fn get(&self, key: &str) -> Result<Option<Entry>> {
        validate_key(key)?;

        let row: Option<(String, Vec<u8>, i64, i64)> = sqlx::query_as(
            "SELECT key, value, version, updated_at FROM settings_kv WHERE key = ?",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(key, value, version, updated_at)| Entry {
            key,
            value,
            version: version as u64,
            updated_at: Self::unix_to_system_time(updated_at),
        }))
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<u64> {
        validate_key(key)?;

        let (version,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO settings_kv (key, value, version, updated_at)
            VALUES (?, ?, 1, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                version = settings_kv.version + 1,
                updated_at = excluded.updated_at
            RETURNING version
            "#,
        )
        .bind(key)
        .bind(&value)
        .bind(Self::now_unix())
        .fetch_one(&self.pool)
        .await?;

        debug!(key, version, bytes = value.len(), "settings record written");
        Ok(version as u64)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        validate_key(key)?;

        sqlx::query("DELETE FROM settings_kv WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
