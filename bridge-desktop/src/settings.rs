//! Sync state persisted in a SQLite key-value table.

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::storage::SettingsStore;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::PathBuf;
use tracing::{debug, trace};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS sync_settings (
    key        TEXT PRIMARY KEY NOT NULL,
    value      TEXT NOT NULL,
    updated_at INTEGER NOT NULL
)";

const UPSERT: &str = "INSERT INTO sync_settings (key, value, updated_at) VALUES (?1, ?2, ?3)
    ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at";

fn db_error(action: &str, e: sqlx::Error) -> BridgeError {
    BridgeError::DatabaseError(format!("{}: {}", action, e))
}

/// [`SettingsStore`] over SQLite.
///
/// Every `set_string` is one autocommitted upsert, so a committed batch's
/// progress is on disk when the call returns.
pub struct SqliteSettingsStore {
    pool: SqlitePool,
}

impl SqliteSettingsStore {
    /// Opens (creating if needed) the database at `db_path`.
    pub async fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await
            .map_err(|e| db_error("Cannot open settings database", e))?;

        debug!(path = %db_path.display(), "Opened settings database");
        Self::with_pool(pool).await
    }

    /// Private database that lives as long as the store.
    pub async fn in_memory() -> Result<Self> {
        // Each `:memory:` connection is its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| db_error("Cannot open in-memory settings database", e))?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::query(SCHEMA)
            .execute(&pool)
            .await
            .map_err(|e| db_error("Cannot create settings table", e))?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl SettingsStore for SqliteSettingsStore {
    async fn set_string(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(UPSERT)
            .bind(key)
            .bind(value)
            .bind(chrono::Utc::now().timestamp())
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Cannot store setting", e))?;
        trace!(key, bytes = value.len(), "Stored setting");
        Ok(())
    }

    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        sqlx::query_scalar::<_, String>("SELECT value FROM sync_settings WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Cannot read setting", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_key_reads_as_none() {
        let store = SqliteSettingsStore::in_memory().await.unwrap();
        assert_eq!(store.get_string("snip_sync.state.vault").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_upsert_replaces_state_document() {
        let store = SqliteSettingsStore::in_memory().await.unwrap();

        store.set_string("state", r#"{"updated_after":null}"#).await.unwrap();
        store
            .set_string("state", r#"{"updated_after":"2024-01-01T00:00:00Z"}"#)
            .await
            .unwrap();

        assert_eq!(
            store.get_string("state").await.unwrap().as_deref(),
            Some(r#"{"updated_after":"2024-01-01T00:00:00Z"}"#)
        );
    }

    #[tokio::test]
    async fn test_file_backed_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join(".snip-sync/settings.db");

        {
            let store = SqliteSettingsStore::new(db_path.clone()).await.unwrap();
            store.set_string("snip_sync.state", "{}").await.unwrap();
        }

        let reopened = SqliteSettingsStore::new(db_path).await.unwrap();
        assert_eq!(
            reopened.get_string("snip_sync.state").await.unwrap().as_deref(),
            Some("{}")
        );
    }
}
