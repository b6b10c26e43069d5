use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use rand::seq::SliceRandom;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::item::{ItemOutcome, SkipReason};
use super::retry::RetryPolicy;
use super::ytdlp::Downloader;
use crate::config::Config;
use crate::ia::ArchivalUploader;
use crate::store::{ItemRecord, RecordStore};

/// Settings the state machine needs from configuration.
#[derive(Debug, Clone)]
pub struct ArchiveSettings {
    pub work_dir: PathBuf,
    pub media_extension: String,
    pub preferred_format: String,
    /// Account identity that owns our archive items.
    pub owner_email: String,
    pub collection: String,
    pub mediatype: String,
    pub retry: RetryPolicy,
}

impl ArchiveSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            work_dir: config.work_dir.clone(),
            media_extension: config.media_extension.clone(),
            preferred_format: config.preferred_format.clone(),
            owner_email: config.archive_user_email.clone(),
            collection: config.ia_collection.clone(),
            mediatype: config.ia_mediatype.clone(),
            retry: RetryPolicy::new(config.upload_retry_delay),
        }
    }
}

/// Tally of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub visited: usize,
    pub uploaded: usize,
    pub already_uploaded: usize,
    pub already_archived: usize,
    pub rejected: usize,
    pub skipped: usize,
    pub download_failed: usize,
    pub upload_failed: usize,
    /// The run stopped at the deadline before every item was visited.
    pub cancelled: bool,
}

impl RunSummary {
    fn record(&mut self, outcome: &ItemOutcome) {
        self.visited += 1;
        match outcome {
            ItemOutcome::AlreadyUploaded => self.already_uploaded += 1,
            ItemOutcome::AlreadyArchived { .. } => self.already_archived += 1,
            ItemOutcome::Uploaded { .. } => self.uploaded += 1,
            ItemOutcome::UploadRejected { .. } => self.rejected += 1,
            ItemOutcome::Skipped(SkipReason::SkipList) => self.skipped += 1,
            ItemOutcome::Skipped(SkipReason::DownloadFailed) => self.download_failed += 1,
            ItemOutcome::Skipped(SkipReason::UploadFailed) => self.upload_failed += 1,
        }
    }
}

/// Reconciles every tracked item against the archive.
pub struct ChannelArchiver {
    pub(crate) store: Arc<dyn RecordStore>,
    pub(crate) downloader: Arc<dyn Downloader>,
    pub(crate) uploader: Arc<dyn ArchivalUploader>,
    pub(crate) settings: ArchiveSettings,
}

impl ChannelArchiver {
    /// Create a new archiver.
    pub fn new(
        store: Arc<dyn RecordStore>,
        downloader: Arc<dyn Downloader>,
        uploader: Arc<dyn ArchivalUploader>,
        settings: ArchiveSettings,
    ) -> Self {
        Self {
            store,
            downloader,
            uploader,
            settings,
        }
    }

    /// Run one reconciliation pass.
    ///
    /// Items are visited one at a time in random order. After each item the
    /// full list is re-read from the store so that progress made by peer
    /// workers is seen before the next item is picked. Each id is visited
    /// at most once per pass.
    ///
    /// When `shutdown` fires, the in-flight item is abandoned and the pass
    /// returns normally with `cancelled` set.
    ///
    /// # Errors
    ///
    /// Returns an error on record store failures and on upload or download
    /// failures that are not provider errors.
    pub async fn run(
        &self,
        skip: &HashSet<String>,
        shutdown: &CancellationToken,
    ) -> Result<RunSummary> {
        tokio::fs::create_dir_all(&self.settings.work_dir)
            .await
            .with_context(|| {
                format!(
                    "Failed to create work directory: {}",
                    self.settings.work_dir.display()
                )
            })?;

        let mut records = self.store.list_all().await?;
        info!(count = records.len(), skip = skip.len(), "Starting reconciliation pass");

        let mut visited: HashSet<String> = HashSet::new();
        let mut summary = RunSummary::default();

        loop {
            if shutdown.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            let Some(record) = next_unvisited(records, &visited) else {
                break;
            };
            visited.insert(record.id.clone());
            let item_id = record.id.clone();

            let outcome = tokio::select! {
                biased;
                () = shutdown.cancelled() => {
                    warn!(item_id = %item_id, "Time limit reached, abandoning current item");
                    summary.cancelled = true;
                    break;
                }
                outcome = self.process_item(record, skip) => {
                    outcome.with_context(|| format!("Failed to process item {item_id}"))?
                }
            };
            debug!(item_id = %item_id, ?outcome, "Item processed");
            summary.record(&outcome);

            records = self.store.refresh().await?;
        }

        info!(
            visited = summary.visited,
            uploaded = summary.uploaded,
            already_uploaded = summary.already_uploaded,
            already_archived = summary.already_archived,
            rejected = summary.rejected,
            skipped = summary.skipped,
            download_failed = summary.download_failed,
            upload_failed = summary.upload_failed,
            cancelled = summary.cancelled,
            "Reconciliation pass finished"
        );

        Ok(summary)
    }
}

/// Shuffle the fresh list and take the first record not yet seen this pass.
///
/// Shuffling keeps concurrent workers from walking the list in lockstep.
fn next_unvisited(mut records: Vec<ItemRecord>, visited: &HashSet<String>) -> Option<ItemRecord> {
    records.shuffle(&mut rand::thread_rng());
    records.into_iter().find(|r| !visited.contains(&r.id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_unvisited_skips_seen_ids() {
        let records = vec![
            ItemRecord::new("a", "u", "t", "20200101", "c"),
            ItemRecord::new("b", "u", "t", "20200101", "c"),
        ];
        let visited: HashSet<String> = ["a".to_string()].into_iter().collect();
        let next = next_unvisited(records.clone(), &visited).unwrap();
        assert_eq!(next.id, "b");

        let all: HashSet<String> = ["a".to_string(), "b".to_string()].into_iter().collect();
        assert!(next_unvisited(records, &all).is_none());
    }

    #[test]
    fn test_summary_counts_outcomes() {
        let mut summary = RunSummary::default();
        summary.record(&ItemOutcome::AlreadyUploaded);
        summary.record(&ItemOutcome::Skipped(SkipReason::UploadFailed));
        summary.record(&ItemOutcome::Uploaded {
            identifier: "x".to_string(),
        });
        assert_eq!(summary.visited, 3);
        assert_eq!(summary.already_uploaded, 1);
        assert_eq!(summary.upload_failed, 1);
        assert_eq!(summary.uploaded, 1);
    }
}
