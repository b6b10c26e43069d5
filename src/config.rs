use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::constants::DEFAULT_TIME_LIMIT_SECS;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("no storage secret found: set DATABASE_PATH or JSONBIN_KEY")]
    NoStorageSecret,
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
}

/// Which record store backend holds the per-item tracking state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    /// Local SQLite document store.
    Sqlite { path: PathBuf },
    /// Hosted JSON blob on jsonbin.io (or a compatible API).
    JsonBin {
        api_url: String,
        master_key: String,
        bin_id: String,
    },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Record store
    pub store: StoreBackend,

    // Internet Archive
    pub ia_access_key: String,
    pub ia_secret_key: String,
    pub archive_user_email: String,
    pub ia_s3_url: String,
    pub ia_metadata_url: String,
    pub ia_collection: String,
    pub ia_mediatype: String,

    // Downloads
    pub yt_dlp_path: String,
    pub work_dir: PathBuf,
    pub media_extension: String,
    pub preferred_format: String,

    // Run
    pub time_limit: Duration,
    pub upload_retry_delay: Duration,
    pub skip_ids: HashSet<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if no record store is configured or a value is malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            // Record store
            store: store_backend_from_env()?,

            // Internet Archive
            ia_access_key: required_env("IA_ACCESS_KEY")?,
            ia_secret_key: required_env("IA_SECRET_KEY")?,
            archive_user_email: required_env("ARCHIVE_USER_EMAIL")?,
            ia_s3_url: env_or_default("IA_S3_URL", "https://s3.us.archive.org"),
            ia_metadata_url: env_or_default("IA_METADATA_URL", "https://archive.org"),
            ia_collection: env_or_default("IA_COLLECTION", "opensource_movies"),
            ia_mediatype: env_or_default("IA_MEDIATYPE", "movies"),

            // Downloads
            yt_dlp_path: env_or_default("YT_DLP_PATH", "yt-dlp"),
            work_dir: PathBuf::from(env_or_default("WORK_DIR", "./data/tmp")),
            media_extension: env_or_default("MEDIA_EXTENSION", "mp4"),
            preferred_format: env_or_default("PREFERRED_FORMAT", "mp4/bestaudio+bestvideo"),

            // Run
            time_limit: Duration::from_secs(parse_env_u64(
                "TIME_LIMIT_SECS",
                DEFAULT_TIME_LIMIT_SECS,
            )?),
            upload_retry_delay: Duration::from_secs(parse_env_u64("UPLOAD_RETRY_DELAY_SECS", 60)?),
            skip_ids: optional_env("SKIP_IDS")
                .map(|v| parse_id_list(&v))
                .unwrap_or_default(),
        })
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.time_limit.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "TIME_LIMIT_SECS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.archive_user_email.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "ARCHIVE_USER_EMAIL".to_string(),
                message: "cannot be empty".to_string(),
            });
        }
        if self.media_extension.is_empty() || self.media_extension.contains('.') {
            return Err(ConfigError::InvalidValue {
                name: "MEDIA_EXTENSION".to_string(),
                message: format!(
                    "must be a bare extension like 'mp4', got '{}'",
                    self.media_extension
                ),
            });
        }
        if let StoreBackend::JsonBin { bin_id, .. } = &self.store {
            if bin_id.is_empty() {
                return Err(ConfigError::InvalidValue {
                    name: "JSONBIN_BIN_ID".to_string(),
                    message: "cannot be empty".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Configuration with fixed values, for tests.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            store: StoreBackend::Sqlite {
                path: PathBuf::from("./data/test.sqlite"),
            },
            ia_access_key: "test-access".to_string(),
            ia_secret_key: "test-secret".to_string(),
            archive_user_email: "archiver@example.com".to_string(),
            ia_s3_url: "http://127.0.0.1:9".to_string(),
            ia_metadata_url: "http://127.0.0.1:9".to_string(),
            ia_collection: "opensource_movies".to_string(),
            ia_mediatype: "movies".to_string(),
            yt_dlp_path: "yt-dlp".to_string(),
            work_dir: PathBuf::from("./data/tmp"),
            media_extension: "mp4".to_string(),
            preferred_format: "mp4/bestaudio+bestvideo".to_string(),
            time_limit: Duration::from_secs(DEFAULT_TIME_LIMIT_SECS),
            upload_retry_delay: Duration::ZERO,
            skip_ids: HashSet::new(),
        }
    }
}

/// Pick the record store from whichever storage secret is present.
///
/// `DATABASE_PATH` wins over `JSONBIN_KEY` when both are set.
fn store_backend_from_env() -> Result<StoreBackend, ConfigError> {
    if let Some(path) = optional_env("DATABASE_PATH") {
        return Ok(StoreBackend::Sqlite {
            path: PathBuf::from(path),
        });
    }

    if let Some(master_key) = optional_env("JSONBIN_KEY") {
        return Ok(StoreBackend::JsonBin {
            api_url: env_or_default("JSONBIN_API_URL", "https://api.jsonbin.io/v3"),
            master_key,
            bin_id: required_env("JSONBIN_BIN_ID")?,
        });
    }

    Err(ConfigError::NoStorageSecret)
}

fn parse_id_list(value: &str) -> HashSet<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn required_env(name: &str) -> Result<String, ConfigError> {
    optional_env(name).ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}
