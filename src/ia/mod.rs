//! Internet Archive client for checking and creating archival items.
//!
//! Uploads go through the archive's S3-compatible endpoint, one `PUT` per
//! file, with item metadata carried in `x-archive-meta-*` headers. Item
//! lookups use the public metadata API.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Body, Client};
use thiserror::Error;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::constants::USER_AGENT;

/// Archival metadata: each key may carry several values.
pub type Metadata = BTreeMap<String, Vec<String>>;

static RATE_LIMIT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)slow\s*down|reduce your request rate").expect("valid rate limit regex")
});

#[derive(Debug, Error)]
pub enum UploadError {
    /// The archive answered with an HTTP error status.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },
    /// The request never produced a response.
    #[error("upload request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl UploadError {
    /// Whether the archive asked us to back off.
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        match self {
            Self::Http { status, message } => {
                *status == 429 || RATE_LIMIT_PATTERN.is_match(message)
            }
            _ => false,
        }
    }
}

/// An item that already exists in the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingItem {
    /// Account that created the item, if reported.
    pub uploader: Option<String>,
}

/// Per-file result of an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResponse {
    pub file: String,
    pub status_code: u16,
}

/// Durable archival store.
#[async_trait]
pub trait ArchivalUploader: Send + Sync {
    /// Look up an existing item. `None` means the identifier is free.
    async fn get_item_metadata(&self, identifier: &str) -> anyhow::Result<Option<ExistingItem>>;

    /// Upload files into the item `identifier`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::Http`] when the archive rejects a file.
    async fn upload(
        &self,
        identifier: &str,
        files: &[PathBuf],
        metadata: &Metadata,
    ) -> Result<Vec<UploadResponse>, UploadError>;
}

/// Internet Archive client.
#[derive(Clone)]
pub struct InternetArchiveClient {
    http: Client,
    s3_url: String,
    metadata_url: String,
    access_key: String,
    secret_key: String,
}

impl InternetArchiveClient {
    /// Create a new client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        // No overall timeout: large uploads are bounded by the run deadline.
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            s3_url: config.ia_s3_url.trim_end_matches('/').to_string(),
            metadata_url: config.ia_metadata_url.trim_end_matches('/').to_string(),
            access_key: config.ia_access_key.clone(),
            secret_key: config.ia_secret_key.clone(),
        })
    }

    async fn upload_file(
        &self,
        identifier: &str,
        path: &Path,
        headers: &[(HeaderName, HeaderValue)],
    ) -> Result<UploadResponse, UploadError> {
        let filename = path
            .file_name()
            .map_or_else(|| "file".to_string(), |n| n.to_string_lossy().to_string());

        let io_error = |source: std::io::Error| UploadError::Io {
            path: path.to_path_buf(),
            source,
        };
        // Body is streamed from disk, never buffered whole
        let file = tokio::fs::File::open(path).await.map_err(io_error)?;
        let size = file.metadata().await.map_err(io_error)?.len();

        let content_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .to_string();
        let url = format!(
            "{}/{}/{}",
            self.s3_url,
            identifier,
            urlencoding::encode(&filename)
        );

        debug!(identifier = %identifier, file = %filename, size, "Uploading file to archive");

        let mut request = self
            .http
            .put(&url)
            .header(
                "authorization",
                format!("LOW {}:{}", self.access_key, self.secret_key),
            )
            .header("x-amz-auto-make-bucket", "1")
            .header("x-archive-size-hint", size.to_string())
            .header(CONTENT_LENGTH, size)
            .header(CONTENT_TYPE, content_type);
        for (name, value) in headers {
            request = request.header(name.clone(), value.clone());
        }

        let body = Body::wrap_stream(ReaderStream::new(file));
        let response = request.body(body).send().await?;
        let status = response.status();

        if status.is_client_error() || status.is_server_error() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            return Err(UploadError::Http {
                status: status.as_u16(),
                message: format!("{status} for {url}: {body}"),
            });
        }

        info!(identifier = %identifier, file = %filename, status = status.as_u16(), "Uploaded file to archive");

        Ok(UploadResponse {
            file: filename,
            status_code: status.as_u16(),
        })
    }
}

#[async_trait]
impl ArchivalUploader for InternetArchiveClient {
    async fn get_item_metadata(&self, identifier: &str) -> anyhow::Result<Option<ExistingItem>> {
        let url = format!(
            "{}/metadata/{}",
            self.metadata_url,
            urlencoding::encode(identifier)
        );

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .context("Failed to query archive item metadata")?;

        if !response.status().is_success() {
            anyhow::bail!("Archive metadata lookup failed: {}", response.status());
        }

        let json: serde_json::Value = response
            .json()
            .await
            .context("Failed to parse archive item metadata")?;

        Ok(parse_existing_item(&json))
    }

    async fn upload(
        &self,
        identifier: &str,
        files: &[PathBuf],
        metadata: &Metadata,
    ) -> Result<Vec<UploadResponse>, UploadError> {
        let headers = metadata_headers(metadata);
        let mut responses = Vec::with_capacity(files.len());

        for path in files {
            responses.push(self.upload_file(identifier, path, &headers).await?);
        }

        Ok(responses)
    }
}

/// Interpret a metadata API response. An empty object means no such item.
fn parse_existing_item(json: &serde_json::Value) -> Option<ExistingItem> {
    let metadata = json.get("metadata")?;
    if metadata.as_object().is_some_and(serde_json::Map::is_empty) {
        return None;
    }

    Some(ExistingItem {
        uploader: metadata
            .get("uploader")
            .and_then(|u| u.as_str())
            .map(String::from),
    })
}

/// Encode metadata as `x-archive-meta` headers.
///
/// Underscores in keys become `--`. Keys with several values use indexed
/// headers (`x-archive-meta00-key`). Values that are not plain printable
/// ASCII are sent as `uri(<percent-encoded>)`.
fn metadata_headers(metadata: &Metadata) -> Vec<(HeaderName, HeaderValue)> {
    let mut headers = Vec::new();

    for (key, values) in metadata {
        let key = key.to_lowercase().replace('_', "--");
        for (idx, value) in values.iter().enumerate() {
            let name = if values.len() > 1 {
                format!("x-archive-meta{idx:02}-{key}")
            } else {
                format!("x-archive-meta-{key}")
            };

            let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
                warn!(key = %key, "Skipping metadata key that is not a valid header name");
                break;
            };

            let encoded = if needs_uri_encoding(value) {
                format!("uri({})", urlencoding::encode(value))
            } else {
                value.clone()
            };
            match HeaderValue::from_str(&encoded) {
                Ok(value) => headers.push((name, value)),
                Err(e) => warn!(key = %key, "Skipping unencodable metadata value: {e}"),
            }
        }
    }

    headers
}

fn needs_uri_encoding(value: &str) -> bool {
    !value.chars().all(|c| c.is_ascii() && !c.is_ascii_control())
}
