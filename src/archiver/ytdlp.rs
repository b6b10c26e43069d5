use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Error)]
pub enum DownloadError {
    /// The provider rejected or failed the download. Retryable.
    #[error("download failed: {0}")]
    Provider(String),
    /// The downloader itself could not be run.
    #[error("failed to run downloader: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Fetches media for a source URL into a local file.
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Download `url` to `output`.
    ///
    /// `format` constrains the selected media; `None` lets the provider
    /// pick whatever it can deliver.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Provider`] when the download fails.
    async fn download(
        &self,
        url: &str,
        output: &Path,
        format: Option<&str>,
    ) -> Result<(), DownloadError>;
}

/// Downloader backed by the `yt-dlp` command-line tool.
#[derive(Debug, Clone)]
pub struct YtDlpDownloader {
    program: String,
}

impl YtDlpDownloader {
    #[must_use]
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
        }
    }
}

/// Arguments for a single quiet download to a fixed output path.
fn build_args(url: &str, output: &Path, format: Option<&str>) -> Vec<String> {
    let mut args = vec![
        "--no-playlist".to_string(),
        "--quiet".to_string(),
        "--no-warnings".to_string(),
        "--no-progress".to_string(),
        "--output".to_string(),
        output.to_string_lossy().to_string(),
    ];

    // Merged or remuxed output must land in the container the path names
    if let Some(ext) = output.extension().and_then(|e| e.to_str()) {
        args.extend([
            "--merge-output-format".to_string(),
            ext.to_string(),
            "--remux-video".to_string(),
            ext.to_string(),
        ]);
    }

    if let Some(format) = format {
        args.push("--format".to_string());
        args.push(format.to_string());
    }

    // URL goes last
    args.push(url.to_string());
    args
}

#[async_trait]
impl Downloader for YtDlpDownloader {
    async fn download(
        &self,
        url: &str,
        output: &Path,
        format: Option<&str>,
    ) -> Result<(), DownloadError> {
        let args = build_args(url, output, format);
        debug!(url = %url, output = %output.display(), format = ?format, "Running yt-dlp");

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(DownloadError::Spawn)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = if stderr.trim().is_empty() {
                format!("yt-dlp exited with {}", output.status)
            } else {
                stderr.trim().to_string()
            };
            return Err(DownloadError::Provider(message));
        }

        Ok(())
    }
}
