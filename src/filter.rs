//! Recency filter.

use crate::models::ArticleRecord;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

/// Keep the records published at or after `now - window`, in input order.
///
/// Records without a usable timestamp are skipped silently; that is a
/// filtering decision, not an error. `now` is always passed in so tests can
/// pin it.
pub fn filter_recent(
    records: Vec<ArticleRecord>,
    window: Duration,
    now: DateTime<Utc>,
) -> Vec<ArticleRecord> {
    let cutoff = now - window;
    let total = records.len();
    let mut undated = 0usize;

    let recent: Vec<ArticleRecord> = records
        .into_iter()
        .filter(|r| match r.published_at() {
            Some(ts) => ts >= cutoff,
            None => {
                undated += 1;
                false
            }
        })
        .collect();

    if undated > 0 {
        debug!(undated, "Skipped records without a usable timestamp");
    }
    info!(total, recent = recent.len(), %cutoff, "Applied recency window");
    recent
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(minutes_ago: i64, now: DateTime<Utc>) -> ArticleRecord {
        ArticleRecord::new(
            format!("Item {minutes_ago}"),
            "europe",
            "",
            Some(now - Duration::minutes(minutes_ago)),
            format!("https://example.com/{minutes_ago}"),
            None,
        )
    }

    #[test]
    fn test_filter_keeps_window_inclusive() {
        let now = Utc.with_ymd_and_hms(2025, 5, 6, 12, 0, 0).unwrap();
        let records = vec![at(5, now), at(60, now), at(61, now), at(300, now)];
        let kept = filter_recent(records, Duration::hours(1), now);
        let titles: Vec<&str> = kept.iter().map(|r| r.title()).collect();
        assert_eq!(titles, vec!["Item 5", "Item 60"]);
    }

    #[test]
    fn test_filter_drops_undated_silently() {
        let now = Utc.with_ymd_and_hms(2025, 5, 6, 12, 0, 0).unwrap();
        let undated = ArticleRecord::new("No date", "asia", "", None, "https://x", None);
        let kept = filter_recent(vec![undated, at(1, now)], Duration::hours(6), now);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].title(), "Item 1");
    }

    #[test]
    fn test_filter_empty_input() {
        let now = Utc::now();
        assert!(filter_recent(Vec::new(), Duration::hours(1), now).is_empty());
    }
}
