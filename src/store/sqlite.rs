use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};

use super::{migrations, FieldUpdate, ItemRecord, RecordStore};

/// SQLite-backed document store: one JSON document per item.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the store, running migrations if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails or migrations fail.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create database directory: {}", parent.display())
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            // Several archiver processes may write to the same file.
            .busy_timeout(Duration::from_secs(10));

        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open SQLite store: {}", path.display()))?;

        migrations::run(&pool).await?;
        info!(path = %path.display(), "Record store opened");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert a record unless one with the same id already exists.
    ///
    /// Returns `true` if the record was inserted. Used by the ingestion step.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the insert fails.
    pub async fn insert(&self, record: &ItemRecord) -> Result<bool> {
        let document = serde_json::to_string(record).context("Failed to serialize record")?;
        let result = sqlx::query("INSERT INTO items (id, document) VALUES (?, ?) ON CONFLICT(id) DO NOTHING")
            .bind(&record.id)
            .bind(document)
            .execute(&self.pool)
            .await
            .context("Failed to insert record")?;

        Ok(result.rows_affected() > 0)
    }

    /// Fetch a single record by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the stored document is malformed.
    pub async fn get(&self, id: &str) -> Result<Option<ItemRecord>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT document FROM items WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch record")?;

        row.map(|(document,)| parse_document(&document)).transpose()
    }
}

fn parse_document(document: &str) -> Result<ItemRecord> {
    serde_json::from_str(document).context("Failed to parse stored record document")
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn list_all(&self) -> Result<Vec<ItemRecord>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT document FROM items ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list records")?;

        rows.iter()
            .map(|(document,)| parse_document(document))
            .collect()
    }

    async fn update_fields(&self, id: &str, update: &FieldUpdate) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin update")?;

        for (field, value) in update.pairs() {
            let result = sqlx::query(
                r"
                UPDATE items
                SET document = json_set(document, '$.' || ?, json(?)),
                    updated_at = datetime('now')
                WHERE id = ?
                ",
            )
            .bind(field)
            .bind(if value { "true" } else { "false" })
            .bind(id)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to update {field} for record {id}"))?;

            if result.rows_affected() == 0 {
                anyhow::bail!("Record not found: {id}");
            }
        }

        tx.commit().await.context("Failed to commit update")?;
        debug!(item_id = %id, ?update, "Record updated");
        Ok(())
    }
}
