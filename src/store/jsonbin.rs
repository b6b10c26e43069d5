//! Hosted JSON blob record store (jsonbin.io v3 API).
//!
//! The whole record list lives in a single bin. Updates read the latest
//! version, patch the flags of the matching document, and write the full
//! array back. Documents are kept as raw JSON so that key names and fields
//! written by other tools survive the round trip.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Map, Value};
use tracing::debug;

use super::{FieldUpdate, ItemRecord, RecordStore};
use crate::constants::USER_AGENT;

/// Record store kept in one jsonbin.io bin.
#[derive(Clone)]
pub struct JsonBinStore {
    client: Client,
    api_url: String,
    master_key: String,
    bin_id: String,
}

impl JsonBinStore {
    /// Create a client for the given bin.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(api_url: &str, master_key: &str, bin_id: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            master_key: master_key.to_string(),
            bin_id: bin_id.to_string(),
        })
    }

    fn bin_url(&self) -> String {
        format!("{}/b/{}", self.api_url, self.bin_id)
    }

    async fn read_documents(&self) -> Result<Vec<Value>> {
        let url = format!("{}/latest", self.bin_url());
        debug!(url = %url, "Reading record bin");

        let response = self
            .client
            .get(&url)
            .header("X-Master-Key", &self.master_key)
            .header("X-Bin-Meta", "false")
            .send()
            .await
            .context("Failed to read record bin")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("JSONBin read failed: {status} - {body}");
        }

        response
            .json()
            .await
            .context("Failed to parse record bin contents")
    }

    async fn write_all(&self, documents: &[Value]) -> Result<()> {
        let response = self
            .client
            .put(self.bin_url())
            .header("X-Master-Key", &self.master_key)
            .json(documents)
            .send()
            .await
            .context("Failed to send bin update")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("JSONBin update failed: {status} - {body}");
        }

        Ok(())
    }
}

#[async_trait]
impl RecordStore for JsonBinStore {
    async fn list_all(&self) -> Result<Vec<ItemRecord>> {
        self.read_documents()
            .await?
            .into_iter()
            .map(|doc| serde_json::from_value(doc).context("Malformed record in bin"))
            .collect()
    }

    async fn update_fields(&self, id: &str, update: &FieldUpdate) -> Result<()> {
        let mut documents = self.read_documents().await?;
        let document = documents
            .iter_mut()
            .filter_map(Value::as_object_mut)
            .find(|doc| document_id(doc) == Some(id))
            .with_context(|| format!("Record not found: {id}"))?;
        for (field, value) in update.pairs() {
            document.insert(field.to_string(), Value::Bool(value));
        }

        self.write_all(&documents).await?;
        debug!(item_id = %id, ?update, "Record bin updated");
        Ok(())
    }
}

/// Record id under either of the key names ingestion may have used.
fn document_id(doc: &Map<String, Value>) -> Option<&str> {
    doc.get("id")
        .or_else(|| doc.get("_id"))
        .and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_id_accepts_either_key() {
        let plain = serde_json::json!({"id": "a"});
        let mongo = serde_json::json!({"_id": "b"});
        let neither = serde_json::json!({"title": "c"});
        assert_eq!(document_id(plain.as_object().unwrap()), Some("a"));
        assert_eq!(document_id(mongo.as_object().unwrap()), Some("b"));
        assert_eq!(document_id(neither.as_object().unwrap()), None);
    }
}
