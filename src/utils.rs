//! Small text and filesystem helpers shared across the pipeline.
//!
//! - Whitespace normalization and character counting (the platform counts
//!   characters, not bytes)
//! - Char-boundary-safe truncation for logging and for headline trimming
//! - HTML stripping for feed summaries
//! - Output directory preparation for the run log and summary files

use scraper::Html;
use std::error::Error;
use std::fs as stdfs;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

/// Collapse every run of whitespace (including `\r` and `\n`) into a single
/// space and trim both ends.
///
/// All length checks in the crate are made on text that went through this
/// function first.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(normalize_whitespace(" a\r\n b\t\tc "), "a b c");
/// ```
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Number of characters (Unicode scalar values) in `s`.
pub fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Keep at most `max` characters of `s`.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut to `max` characters with an ellipsis and a count of
/// the dropped characters appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 chars)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    let len = char_len(s);
    if len <= max {
        s.to_string()
    } else {
        format!("{}…(+{} chars)", truncate_chars(s, max), len - max)
    }
}

/// Strip markup from an HTML fragment and return its normalized text.
///
/// Feed summaries frequently carry `<p>`, `<a>` and `<img>` tags; only the
/// text nodes are kept.
pub fn strip_html(fragment: &str) -> String {
    if !fragment.contains('<') {
        return normalize_whitespace(fragment);
    }
    let doc = Html::parse_fragment(fragment);
    let text = doc.root_element().text().collect::<Vec<_>>().join(" ");
    normalize_whitespace(&text)
}

/// Ensure the parent directory of `path` exists and is writable.
///
/// Creates the directory if needed, then writes and removes a probe file.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or is not writable.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_parent_dir(path: &Path) -> Result<(), Box<dyn Error>> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => return Ok(()),
    };
    fs::create_dir_all(&dir).await?;

    let probe_path = dir.join("..__probe_write__");
    match stdfs::File::create(&probe_path) {
        Ok(_) => {
            let _ = stdfs::remove_file(&probe_path);
            info!(dir = %dir.display(), "Output directory is writable");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_whitespace_collapses_newlines() {
        assert_eq!(normalize_whitespace("a\r\nb"), "a b");
        assert_eq!(normalize_whitespace("  one \n\n two\tthree  "), "one two three");
        assert_eq!(normalize_whitespace(""), "");
    }

    #[test]
    fn test_char_len_counts_chars_not_bytes() {
        assert_eq!(char_len("héllo"), 5);
        assert_eq!("héllo".len(), 6);
    }

    #[test]
    fn test_truncate_chars_multibyte() {
        assert_eq!(truncate_chars("ééé", 2), "éé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abc", 0), "");
    }

    #[test]
    fn test_truncate_for_log_short_string() {
        assert_eq!(truncate_for_log("Hello, world!", 100), "Hello, world!");
    }

    #[test]
    fn test_truncate_for_log_long_string() {
        let s = "a".repeat(500);
        let result = truncate_for_log(&s, 100);
        assert!(result.starts_with(&"a".repeat(100)));
        assert!(result.contains("…(+400 chars)"));
    }

    #[test]
    fn test_strip_html() {
        assert_eq!(
            strip_html("<p>Leaders <b>meet</b> in Geneva.</p>\n<img src=\"x.jpg\">"),
            "Leaders meet in Geneva."
        );
        assert_eq!(strip_html("plain   text"), "plain text");
    }

    #[tokio::test]
    async fn test_ensure_parent_dir_creates_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("nested").join("runs.jsonl");
        ensure_parent_dir(&target).await.unwrap();
        assert!(tmp.path().join("nested").is_dir());
    }
}
