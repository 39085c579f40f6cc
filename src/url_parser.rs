//! Resolve Google Drive file IDs from share URLs.

use regex::Regex;
use std::sync::LazyLock;

use crate::error::{DriveError, Result};

/// URL shapes that carry a file ID, most specific first.
static URL_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^https?://drive\.google\.com/file/d/([a-zA-Z0-9_-]+)",
        r"^https?://drive\.google\.com/drive/(?:u/\d+/)?folders/([a-zA-Z0-9_-]+)",
        r"^https?://drive\.google\.com/(?:open|uc)\?(?:.*&)?id=([a-zA-Z0-9_-]+)",
        r"^https?://docs\.google\.com/(?:document|spreadsheets|presentation|forms)/d/([a-zA-Z0-9_-]+)",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("Invalid Drive URL regex"))
    .collect()
});

/// Valid Google Drive ID pattern (alphanumeric, underscore, hyphen).
static ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]+$").expect("Invalid ID regex"));

/// Extract a Google Drive file ID from a URL or validate a raw ID.
///
/// Accepts a raw ID or any of:
/// - `https://drive.google.com/file/d/<ID>/view`
/// - `https://drive.google.com/drive/folders/<ID>`
/// - `https://drive.google.com/open?id=<ID>`
/// - `https://docs.google.com/document/d/<ID>/edit`
///
/// # Examples
///
/// ```
/// use drive_ops::url_parser::extract_id;
///
/// let id = extract_id("https://drive.google.com/file/d/1AbC_x-9/view?usp=sharing").unwrap();
/// assert_eq!(id, "1AbC_x-9");
///
/// let id = extract_id("1AbC_x-9").unwrap();
/// assert_eq!(id, "1AbC_x-9");
/// ```
pub fn extract_id(input: &str) -> Result<String> {
    let input = input.trim();

    if let Some(id) = URL_PATTERNS
        .iter()
        .find_map(|re| re.captures(input).and_then(|caps| caps.get(1)))
    {
        return Ok(id.as_str().to_string());
    }

    if ID_REGEX.is_match(input) {
        return Ok(input.to_string());
    }

    Err(DriveError::InvalidFileId(input.to_string()))
}
