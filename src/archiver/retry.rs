//! Fixed retry ladders for downloads and uploads.

use std::time::Duration;

/// One rung of the upload ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadAttempt {
    /// Wait before this attempt.
    pub delay: Duration,
    /// Upload under a freshly minted identifier instead of the current one.
    pub fresh_identifier: bool,
}

/// Retry strategy for provider failures.
///
/// Downloads get two attempts: the preferred format, then no format
/// constraint at all. Uploads get three: the original identifier, the same
/// identifier again after `upload_retry_delay`, then a fresh identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub upload_retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            upload_retry_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(upload_retry_delay: Duration) -> Self {
        Self { upload_retry_delay }
    }

    /// Format constraint for each download attempt, in order.
    #[must_use]
    pub fn download_formats<'a>(&self, preferred: &'a str) -> [Option<&'a str>; 2] {
        [Some(preferred), None]
    }

    /// Upload attempts, in order.
    #[must_use]
    pub fn upload_ladder(&self) -> [UploadAttempt; 3] {
        [
            UploadAttempt {
                delay: Duration::ZERO,
                fresh_identifier: false,
            },
            UploadAttempt {
                delay: self.upload_retry_delay,
                fresh_identifier: false,
            },
            UploadAttempt {
                delay: Duration::ZERO,
                fresh_identifier: true,
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ladder() {
        let ladder = RetryPolicy::default().upload_ladder();
        assert_eq!(ladder[0].delay, Duration::ZERO);
        assert!(!ladder[0].fresh_identifier);
        assert_eq!(ladder[1].delay, Duration::from_secs(60));
        assert!(!ladder[1].fresh_identifier);
        assert_eq!(ladder[2].delay, Duration::ZERO);
        assert!(ladder[2].fresh_identifier);
    }

    #[test]
    fn test_download_formats_drop_constraint() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.download_formats("mp4/bestaudio+bestvideo"),
            [Some("mp4/bestaudio+bestvideo"), None]
        );
    }
}
