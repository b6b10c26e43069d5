//! Per-item download/upload state machine.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};

use super::identifier::{build_target, fresh_identifier};
use super::metadata::archive_metadata;
use super::worker::ChannelArchiver;
use super::ytdlp::DownloadError;
use crate::ia::{UploadError, UploadResponse};
use crate::store::{FieldUpdate, ItemRecord};

/// Why an item was left pending for this pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Listed in the caller's skip set.
    SkipList,
    /// Both download attempts failed.
    DownloadFailed,
    /// Every rung of the upload ladder failed.
    UploadFailed,
}

/// Result of running one item through the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Already marked uploaded; nothing to do.
    AlreadyUploaded,
    /// Found in the archive under our own account; marked uploaded.
    AlreadyArchived { identifier: String },
    /// Uploaded during this pass.
    Uploaded { identifier: String },
    /// The archive answered without an error but not with 200.
    UploadRejected { status: Option<u16> },
    /// Left pending for the next pass.
    Skipped(SkipReason),
}

impl ChannelArchiver {
    /// Drive one record from wherever it is towards `uploaded`.
    ///
    /// Flag changes are written to the record store as soon as each phase
    /// succeeds. Provider failures end in [`ItemOutcome::Skipped`]; anything
    /// else (store failures, unreadable artifacts) is returned as an error.
    pub(crate) async fn process_item(
        &self,
        mut record: ItemRecord,
        skip: &HashSet<String>,
    ) -> Result<ItemOutcome> {
        if skip.contains(&record.id) {
            debug!(item_id = %record.id, "Skipped (skip list)");
            return Ok(ItemOutcome::Skipped(SkipReason::SkipList));
        }
        if record.uploaded {
            return Ok(ItemOutcome::AlreadyUploaded);
        }

        let target = build_target(&record, &self.settings.media_extension);
        let artifact = self.settings.work_dir.join(&target.filename);

        // A downloaded flag without its file means the artifact was lost
        if record.downloaded && !artifact.exists() {
            warn!(
                item_id = %record.id,
                file = %artifact.display(),
                "Local artifact missing for downloaded item, resetting"
            );
            self.store
                .update_fields(&record.id, &FieldUpdate::downloaded(false))
                .await?;
            record.downloaded = false;
        }

        if !record.downloaded {
            if !self.download(&record, &artifact).await? {
                return Ok(ItemOutcome::Skipped(SkipReason::DownloadFailed));
            }
            self.store
                .update_fields(&record.id, &FieldUpdate::downloaded(true))
                .await?;
            record.downloaded = true;
        }

        self.upload(&record, &artifact, target.identifier).await
    }

    /// Run the download ladder. Returns `false` when no attempt left the artifact on disk.
    async fn download(&self, record: &ItemRecord, artifact: &Path) -> Result<bool> {
        info!(
            item_id = %record.id,
            file = %artifact.display(),
            title = %record.title,
            url = %record.url,
            "Downloading"
        );

        let formats = self
            .settings
            .retry
            .download_formats(&self.settings.preferred_format);
        for (attempt, format) in formats.into_iter().enumerate() {
            match self.downloader.download(&record.url, artifact, format).await {
                Ok(()) if artifact.exists() => return Ok(true),
                Ok(()) => {
                    error!(
                        item_id = %record.id,
                        title = %record.title,
                        url = %record.url,
                        file = %artifact.display(),
                        attempt = attempt + 1,
                        format = ?format,
                        "Downloader reported success but the expected file is missing"
                    );
                }
                Err(DownloadError::Provider(message)) => {
                    error!(
                        item_id = %record.id,
                        title = %record.title,
                        url = %record.url,
                        attempt = attempt + 1,
                        format = ?format,
                        "Download failed: {message}"
                    );
                }
                Err(e @ DownloadError::Spawn(_)) => {
                    return Err(e).context("Downloader could not be started");
                }
            }
        }

        error!(item_id = %record.id, url = %record.url, "All download attempts failed, skipping");
        Ok(false)
    }

    async fn upload(
        &self,
        record: &ItemRecord,
        artifact: &Path,
        mut identifier: String,
    ) -> Result<ItemOutcome> {
        if let Some(existing) = self
            .uploader
            .get_item_metadata(&identifier)
            .await
            .with_context(|| format!("Failed to look up archive item {identifier}"))?
        {
            if existing.uploader.as_deref() == Some(self.settings.owner_email.as_str()) {
                info!(item_id = %record.id, identifier = %identifier, "Already archived under our account");
                self.mark_uploaded(record, artifact).await?;
                return Ok(ItemOutcome::AlreadyArchived { identifier });
            }

            let fresh = fresh_identifier();
            warn!(
                item_id = %record.id,
                identifier = %identifier,
                owner = ?existing.uploader,
                fresh = %fresh,
                "Identifier taken by another account, using a fresh one"
            );
            identifier = fresh;
        }

        let metadata = archive_metadata(
            record,
            &self.settings.collection,
            &self.settings.mediatype,
        );
        let files = [artifact.to_path_buf()];
        debug!(item_id = %record.id, ?metadata, "Upload metadata");

        let responses = self
            .upload_with_retries(record, &files, &metadata, &mut identifier)
            .await?;
        let Some(responses) = responses else {
            error!(
                item_id = %record.id,
                title = %record.title,
                url = %record.url,
                "Failed all attempts to upload, skipping"
            );
            return Ok(ItemOutcome::Skipped(SkipReason::UploadFailed));
        };

        let status = responses.first().map(|r| r.status_code);
        if status == Some(200) {
            self.mark_uploaded(record, artifact).await?;
            info!(item_id = %record.id, identifier = %identifier, "Archived");
            Ok(ItemOutcome::Uploaded { identifier })
        } else {
            error!(
                item_id = %record.id,
                title = %record.title,
                url = %record.url,
                status = ?status,
                "Upload returned unexpected status"
            );
            Ok(ItemOutcome::UploadRejected { status })
        }
    }

    /// Walk the upload ladder. `Ok(None)` means every rung failed with an
    /// HTTP error; other errors abort the ladder.
    async fn upload_with_retries(
        &self,
        record: &ItemRecord,
        files: &[PathBuf],
        metadata: &crate::ia::Metadata,
        identifier: &mut String,
    ) -> Result<Option<Vec<UploadResponse>>> {
        for (attempt, rung) in self.settings.retry.upload_ladder().into_iter().enumerate() {
            if !rung.delay.is_zero() {
                debug!(item_id = %record.id, delay_secs = rung.delay.as_secs(), "Waiting before retrying upload");
                tokio::time::sleep(rung.delay).await;
            }
            if rung.fresh_identifier {
                *identifier = fresh_identifier();
            }

            info!(
                item_id = %record.id,
                identifier = %identifier,
                attempt = attempt + 1,
                title = %record.title,
                url = %record.url,
                "Uploading"
            );

            match self.uploader.upload(identifier, files, metadata).await {
                Ok(responses) => return Ok(Some(responses)),
                Err(e @ UploadError::Http { .. }) => {
                    if e.is_rate_limited() {
                        warn!(item_id = %record.id, identifier = %identifier, attempt = attempt + 1, "Upload rate limited: {e}");
                    } else {
                        error!(item_id = %record.id, identifier = %identifier, attempt = attempt + 1, "Upload failed: {e}");
                    }
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("Upload of {} aborted", record.id));
                }
            }
        }

        Ok(None)
    }

    /// Persist `uploaded=true`, then drop the local artifact.
    async fn mark_uploaded(&self, record: &ItemRecord, artifact: &Path) -> Result<()> {
        self.store
            .update_fields(&record.id, &FieldUpdate::uploaded(true))
            .await?;

        match tokio::fs::remove_file(artifact).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(anyhow::Error::new(e))
                .with_context(|| format!("Failed to remove artifact {}", artifact.display())),
        }
    }
}
