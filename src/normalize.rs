//! Article normalization: raw feed items into canonical [`ArticleRecord`]s.
//!
//! Also home to [`topic_key`], the canonical grouping key derived from a
//! title, and to the timestamp parser used for feed dates.

use crate::models::{ArticleRecord, RawArticle};
use crate::utils::{normalize_whitespace, strip_html};
use chrono::{DateTime, NaiveDateTime, Utc};
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, instrument};

/// First topic delimiter: a colon, or a dash with whitespace on both sides.
static TOPIC_DELIMITER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r":|\s[-–—]\s").expect("static regex"));

/// Derive the topic key of a title.
///
/// Lower-cases and trims the title, cuts it at the first topic delimiter, and
/// trims again. A title that starts with a delimiter keys on its full text
/// instead of on the empty string.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(topic_key("Global Summit Begins: leaders meet"), "global summit begins");
/// assert_eq!(topic_key("Floods - thousands evacuated"), "floods");
/// ```
pub fn topic_key(title: &str) -> String {
    let lowered = title.to_lowercase();
    let trimmed = lowered.trim();
    let head = match TOPIC_DELIMITER.find(trimmed) {
        Some(m) => trimmed[..m.start()].trim(),
        None => trimmed,
    };
    if head.is_empty() {
        normalize_whitespace(trimmed)
    } else {
        normalize_whitespace(head)
    }
}

/// Parse a feed timestamp.
///
/// Accepts RFC 2822 (RSS `pubDate`), RFC 3339 (Atom, `dc:date`) and a naive
/// `YYYY-MM-DD HH:MM:SS` taken as UTC. Anything else yields `None`.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Convert one raw item into a record.
///
/// Returns `None` for items without a title. Bodies are stripped of HTML and
/// whitespace-normalized. An unparseable timestamp is kept as `None`; the
/// recency filter drops such records later.
pub fn normalize_article(raw: RawArticle) -> Option<ArticleRecord> {
    let title = normalize_whitespace(&strip_html(&raw.title));
    if title.is_empty() {
        debug!(link = %raw.link, "Dropping feed item without title");
        return None;
    }
    let published_at = raw.published.as_deref().and_then(parse_timestamp);
    if published_at.is_none() {
        debug!(link = %raw.link, raw = ?raw.published, "Feed item timestamp missing or unparseable");
    }
    Some(ArticleRecord::new(
        title,
        raw.region.trim().to_lowercase(),
        strip_html(&raw.body),
        published_at,
        raw.link.trim(),
        raw.image.filter(|s| !s.trim().is_empty()),
    ))
}

/// Normalize a batch of raw items.
///
/// Items are de-duplicated per region by link (or by title when the link is
/// empty) keeping the first occurrence, so one story syndicated into several
/// feeds of the same region is counted once. The same link carried by feeds
/// of different regions is kept once per region.
#[instrument(level = "info", skip_all, fields(raw = raw.len()))]
pub fn normalize_articles(raw: Vec<RawArticle>) -> Vec<ArticleRecord> {
    let total = raw.len();
    let records: Vec<ArticleRecord> = raw
        .into_iter()
        .filter_map(normalize_article)
        .unique_by(|r| {
            if r.link().is_empty() {
                format!("title:{}|{}", r.region(), r.title())
            } else {
                format!("link:{}|{}", r.region(), r.link())
            }
        })
        .collect();
    info!(total, kept = records.len(), "Normalized feed items");
    records
}
