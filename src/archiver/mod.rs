pub mod identifier;
mod item;
pub mod metadata;
pub mod retry;
pub mod worker;
pub mod ytdlp;

pub use identifier::{build_target, fresh_identifier, ArchiveTarget};
pub use item::{ItemOutcome, SkipReason};
pub use retry::{RetryPolicy, UploadAttempt};
pub use worker::{ArchiveSettings, ChannelArchiver, RunSummary};
pub use ytdlp::{DownloadError, Downloader, YtDlpDownloader};

/// Sanitize a video title into a filesystem-safe and identifier-safe string.
///
/// This function:
/// - Folds common accented Latin letters to their ASCII base
/// - Replaces spaces and punctuation with underscores
/// - Collapses runs of underscores and trims them from the edges
/// - Limits length to avoid filesystem issues
///
/// # Examples
///
/// ```
/// # use channel_archiver::archiver::sanitize_title;
/// assert_eq!(sanitize_title("Café Talk!"), "Cafe_Talk");
/// assert_eq!(sanitize_title("Test & Demo?"), "Test_Demo");
/// ```
pub fn sanitize_title(title: &str) -> String {
    let mut mapped = String::with_capacity(title.len());
    for c in title.chars() {
        if let Some(folded) = fold_accent(c) {
            mapped.push_str(folded);
            continue;
        }
        match c {
            // Keep hyphens, underscores and ASCII alphanumerics
            '-' | '_' => mapped.push(c),
            c if c.is_ascii_alphanumeric() => mapped.push(c),
            // Everything else (spaces, punctuation, emoji, other scripts)
            _ => mapped.push('_'),
        }
    }

    // Remove consecutive underscores and trim underscores from edges
    let sanitized = mapped
        .split('_')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("_");

    // Output is pure ASCII, so byte truncation is safe
    const MAX_TITLE_LENGTH: usize = 200;
    if sanitized.len() > MAX_TITLE_LENGTH {
        sanitized[..MAX_TITLE_LENGTH].trim_end_matches('_').to_string()
    } else {
        sanitized
    }
}

fn fold_accent(c: char) -> Option<&'static str> {
    let folded = match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => "a",
        'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' | 'Ā' | 'Ă' | 'Ą' => "A",
        'ç' | 'ć' | 'č' => "c",
        'Ç' | 'Ć' | 'Č' => "C",
        'ď' | 'đ' => "d",
        'Ď' | 'Đ' => "D",
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ė' | 'ę' | 'ě' => "e",
        'È' | 'É' | 'Ê' | 'Ë' | 'Ē' | 'Ė' | 'Ę' | 'Ě' => "E",
        'ğ' => "g",
        'Ğ' => "G",
        'ì' | 'í' | 'î' | 'ï' | 'ī' | 'ı' => "i",
        'Ì' | 'Í' | 'Î' | 'Ï' | 'Ī' | 'İ' => "I",
        'ł' | 'ľ' => "l",
        'Ł' | 'Ľ' => "L",
        'ñ' | 'ń' | 'ň' => "n",
        'Ñ' | 'Ń' | 'Ň' => "N",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ő' => "o",
        'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' | 'Ø' | 'Ō' | 'Ő' => "O",
        'ř' => "r",
        'Ř' => "R",
        'ś' | 'š' | 'ş' => "s",
        'Ś' | 'Š' | 'Ş' => "S",
        'ť' | 'ţ' => "t",
        'Ť' | 'Ţ' => "T",
        'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' | 'ű' => "u",
        'Ù' | 'Ú' | 'Û' | 'Ü' | 'Ū' | 'Ů' | 'Ű' => "U",
        'ý' | 'ÿ' => "y",
        'Ý' | 'Ÿ' => "Y",
        'ź' | 'ż' | 'ž' => "z",
        'Ź' | 'Ż' | 'Ž' => "Z",
        'ß' => "ss",
        'æ' => "ae",
        'Æ' => "AE",
        'œ' => "oe",
        'Œ' => "OE",
        _ => return None,
    };
    Some(folded)
}
