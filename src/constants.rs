//! Shared constants used across the application.

/// User agent string sent with record store and archival requests.
pub const USER_AGENT: &str = concat!("channel-archiver/", env!("CARGO_PKG_VERSION"));

/// Maximum length of an archival identifier before whitespace stripping.
pub const IDENTIFIER_MAX_LEN: usize = 80;

/// Default wall-clock budget for one run: 5.5 hours.
pub const DEFAULT_TIME_LIMIT_SECS: u64 = 19_800;
