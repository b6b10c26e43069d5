//! Record store abstraction holding one tracking record per channel video.
//!
//! The archiver only needs to list every record and flip the `downloaded` /
//! `uploaded` flags of a single record. Two adapters sit behind the
//! [`RecordStore`] trait: a local SQLite document store and a hosted JSON blob.

mod jsonbin;
mod migrations;
mod sqlite;

pub use jsonbin::JsonBinStore;
pub use sqlite::SqliteStore;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::StoreBackend;

/// Tracking record for one source video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    #[serde(alias = "_id")]
    pub id: String,
    /// Source URL handed to the downloader.
    #[serde(alias = "source_url")]
    pub url: String,
    pub title: String,
    /// Upload date as `YYYYMMDD`.
    pub upload_date: String,
    pub channel_name: String,
    #[serde(default)]
    pub downloaded: bool,
    #[serde(default)]
    pub uploaded: bool,
    /// Free-form fields carried through to the archival metadata.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ItemRecord {
    /// Create a fresh, not yet downloaded record.
    #[must_use]
    pub fn new(id: &str, url: &str, title: &str, upload_date: &str, channel_name: &str) -> Self {
        Self {
            id: id.to_string(),
            url: url.to_string(),
            title: title.to_string(),
            upload_date: upload_date.to_string(),
            channel_name: channel_name.to_string(),
            downloaded: false,
            uploaded: false,
            extra: Map::new(),
        }
    }

    /// Apply a flag update in place.
    pub fn apply(&mut self, update: &FieldUpdate) {
        if let Some(downloaded) = update.downloaded {
            self.downloaded = downloaded;
        }
        if let Some(uploaded) = update.uploaded {
            self.uploaded = uploaded;
        }
    }
}

/// Partial update of a record's progress flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldUpdate {
    pub downloaded: Option<bool>,
    pub uploaded: Option<bool>,
}

impl FieldUpdate {
    #[must_use]
    pub fn downloaded(value: bool) -> Self {
        Self {
            downloaded: Some(value),
            uploaded: None,
        }
    }

    #[must_use]
    pub fn uploaded(value: bool) -> Self {
        Self {
            downloaded: None,
            uploaded: Some(value),
        }
    }

    /// `(field, value)` pairs for the flags this update sets.
    pub fn pairs(&self) -> impl Iterator<Item = (&'static str, bool)> {
        [("downloaded", self.downloaded), ("uploaded", self.uploaded)]
            .into_iter()
            .filter_map(|(name, value)| value.map(|v| (name, v)))
    }
}

/// Durable store of per-item tracking state.
///
/// Several archiver processes may share one store. There is no locking;
/// writers rely on idempotent flag checks and frequent refreshes.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Load every tracked record.
    async fn list_all(&self) -> Result<Vec<ItemRecord>>;

    /// Persist a flag change for one record immediately.
    async fn update_fields(&self, id: &str, update: &FieldUpdate) -> Result<()>;

    /// Re-read the authoritative list so that progress made by peer
    /// workers becomes visible. Called after every processed item.
    async fn refresh(&self) -> Result<Vec<ItemRecord>> {
        self.list_all().await
    }
}

/// Open the record store selected by configuration.
///
/// # Errors
///
/// Returns an error if the backend cannot be opened.
pub async fn open(backend: &StoreBackend) -> Result<Arc<dyn RecordStore>> {
    match backend {
        StoreBackend::Sqlite { path } => Ok(Arc::new(SqliteStore::open(path).await?)),
        StoreBackend::JsonBin {
            api_url,
            master_key,
            bin_id,
        } => Ok(Arc::new(JsonBinStore::new(api_url, master_key, bin_id)?)),
    }
}
