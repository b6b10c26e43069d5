//! Deterministic filenames and archival identifiers for tracked videos.

use uuid::Uuid;

use super::sanitize_title;
use crate::constants::IDENTIFIER_MAX_LEN;
use crate::store::ItemRecord;

/// Where an item lives locally and under which identifier it is archived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveTarget {
    /// Local artifact filename, `YYYY-MM-DD__<title>.<ext>`.
    pub filename: String,
    /// Archival identifier, `YYYY-MM-DD_<channel>_<title>` capped at 80 chars.
    pub identifier: String,
}

/// Derive the local filename and archival identifier for a record.
#[must_use]
pub fn build_target(record: &ItemRecord, extension: &str) -> ArchiveTarget {
    let date = format_date(&record.upload_date);
    let clean_title = sanitize_title(&record.title);

    let filename = format!("{date}__{clean_title}.{extension}");
    let identifier = compose_identifier(&date, &record.channel_name, &clean_title)
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    ArchiveTarget {
        filename,
        identifier,
    }
}

/// `YYYYMMDD` as `YYYY-MM-DD`. Short inputs yield short parts rather than panicking.
#[must_use]
pub fn format_date(upload_date: &str) -> String {
    let part = |start: usize, end: usize| -> String {
        upload_date
            .chars()
            .skip(start)
            .take(end - start)
            .collect()
    };
    format!("{}-{}-{}", part(0, 4), part(4, 6), part(6, 8))
}

/// Join date, channel and as much of the title as fits in the 80-char ceiling.
fn compose_identifier(date: &str, channel_name: &str, clean_title: &str) -> String {
    let base = format!("{date}_{channel_name}");
    let base_len = base.chars().count();

    // One character is reserved for the separator before the title.
    if base_len + 1 >= IDENTIFIER_MAX_LEN {
        return base.chars().take(IDENTIFIER_MAX_LEN).collect();
    }
    if clean_title.is_empty() {
        return base;
    }

    let room = IDENTIFIER_MAX_LEN - (base_len + 1);
    let title: String = clean_title.chars().take(room).collect();
    format!("{base}_{title}")
}

/// Mint a random identifier for when the readable one belongs to someone else.
///
/// Formatted as a version 4 UUID.
#[must_use]
pub fn fresh_identifier() -> String {
    Uuid::new_v4().to_string()
}
