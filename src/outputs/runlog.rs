//! Append-only run log in JSON Lines format.
//!
//! One line per attempt:
//!
//! ```text
//! {"timestamp":"2025-05-06T12:00:00Z","outcome":"success","topic":"global summit begins","detail":"post 1789","attempts":1}
//! {"timestamp":"2025-05-06T13:00:00Z","outcome":"rate_limited","topic":"storm","detail":"retry after 900s","attempts":1}
//! ```
//!
//! Lines that fail to parse are skipped on load, so a torn final line from
//! an interrupted run does not poison later statistics.

use crate::error::RunLogError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

/// Result of one attempt, as recorded in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    FittingFailure,
    GenerationFailure,
    RateLimited,
    PublishFailed,
    NoRecentArticles,
    NoTrendingTopic,
    CandidatesExhausted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunLogEntry {
    pub timestamp: DateTime<Utc>,
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default)]
    pub detail: String,
    #[serde(default)]
    pub attempts: usize,
}

impl RunLogEntry {
    pub fn new(timestamp: DateTime<Utc>, outcome: Outcome) -> Self {
        Self {
            timestamp,
            outcome,
            topic: None,
            detail: String::new(),
            attempts: 0,
        }
    }

    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }

    pub fn attempts(mut self, attempts: usize) -> Self {
        self.attempts = attempts;
        self
    }
}

/// Counts over a trailing window of the log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollingStats {
    pub window_hours: i64,
    pub attempts: usize,
    pub successes: usize,
    pub rate_limited: usize,
}

/// Append `entry` as one line, creating the file and its directory if needed.
#[instrument(level = "info", skip_all, fields(path = %path.display(), outcome = ?entry.outcome))]
pub async fn append(path: &Path, entry: &RunLogEntry) -> Result<(), RunLogError> {
    if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(dir).await?;
    }
    let mut line = serde_json::to_string(entry)?;
    line.push('\n');

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    file.flush().await?;
    debug!("Appended run log entry");
    Ok(())
}

/// Read every parseable entry. A missing file is an empty log.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn load(path: &Path) -> Result<Vec<RunLogEntry>, RunLogError> {
    let raw = match fs::read_to_string(path).await {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut skipped = 0usize;
    let entries: Vec<RunLogEntry> = raw
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| match serde_json::from_str(l) {
            Ok(entry) => Some(entry),
            Err(e) => {
                skipped += 1;
                debug!(error = %e, "Skipping malformed run log line");
                None
            }
        })
        .collect();
    if skipped > 0 {
        warn!(skipped, "Run log contained malformed lines");
    }
    info!(entries = entries.len(), "Loaded run log");
    Ok(entries)
}

/// Attempts, successes and rate limits within `window` before `now`.
///
/// Terminal summaries that carry no post attempt of their own (no recent
/// articles, no trending topic, candidates exhausted) are not counted.
pub fn rolling_stats(entries: &[RunLogEntry], now: DateTime<Utc>, window: Duration) -> RollingStats {
    let cutoff = now - window;
    let mut stats = RollingStats {
        window_hours: window.num_hours(),
        ..Default::default()
    };
    for entry in entries.iter().filter(|e| e.timestamp >= cutoff && e.timestamp <= now) {
        match entry.outcome {
            Outcome::NoRecentArticles | Outcome::NoTrendingTopic | Outcome::CandidatesExhausted => {
                continue;
            }
            Outcome::Success => stats.successes += 1,
            Outcome::RateLimited => stats.rate_limited += 1,
            _ => {}
        }
        stats.attempts += 1;
    }
    stats
}

/// Topic of the most recent successful post, if any.
pub fn last_success_topic(entries: &[RunLogEntry]) -> Option<&str> {
    entries
        .iter()
        .filter(|e| e.outcome == Outcome::Success)
        .max_by_key(|e| e.timestamp)
        .and_then(|e| e.topic.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 6, hour, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_append_then_load_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs/run.jsonl");

        append(&path, &RunLogEntry::new(at(1), Outcome::FittingFailure).topic("storm"))
            .await
            .unwrap();
        append(
            &path,
            &RunLogEntry::new(at(1), Outcome::Success)
                .topic("vote")
                .detail("post 42")
                .attempts(2),
        )
        .await
        .unwrap();

        let entries = load(&path).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].outcome, Outcome::FittingFailure);
        assert_eq!(entries[1].topic.as_deref(), Some("vote"));
        assert_eq!(entries[1].attempts, 2);
    }

    #[tokio::test]
    async fn test_outcome_serializes_snake_case() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.jsonl");
        append(&path, &RunLogEntry::new(at(2), Outcome::CandidatesExhausted))
            .await
            .unwrap();
        let raw = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(raw.contains(r#""outcome":"candidates_exhausted""#));
        assert!(raw.ends_with('\n'));
    }

    #[tokio::test]
    async fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(&dir.path().join("nope.jsonl")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_load_skips_torn_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.jsonl");
        append(&path, &RunLogEntry::new(at(3), Outcome::Success).topic("a"))
            .await
            .unwrap();
        let mut raw = tokio::fs::read_to_string(&path).await.unwrap();
        raw.push_str("{\"timestamp\":\"2025-05-06T04");
        tokio::fs::write(&path, raw).await.unwrap();

        let entries = load(&path).await.unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_rolling_stats_window() {
        let entries = vec![
            RunLogEntry::new(at(0) - Duration::hours(2), Outcome::Success),
            RunLogEntry::new(at(1), Outcome::Success),
            RunLogEntry::new(at(2), Outcome::RateLimited),
            RunLogEntry::new(at(3), Outcome::FittingFailure),
            RunLogEntry::new(at(4), Outcome::NoRecentArticles),
            RunLogEntry::new(at(4), Outcome::CandidatesExhausted),
            RunLogEntry::new(at(5), Outcome::Success),
        ];
        let stats = rolling_stats(&entries, at(12), Duration::hours(24));
        assert_eq!(
            stats,
            RollingStats {
                window_hours: 24,
                attempts: 5,
                successes: 3,
                rate_limited: 1,
            }
        );

        let narrow = rolling_stats(&entries, at(12), Duration::hours(10));
        assert_eq!(narrow.attempts, 3);
        assert_eq!(narrow.successes, 1);
        assert_eq!(narrow.rate_limited, 1);
    }

    #[test]
    fn test_last_success_topic_picks_latest() {
        let entries = vec![
            RunLogEntry::new(at(1), Outcome::Success).topic("storm"),
            RunLogEntry::new(at(3), Outcome::Success).topic("vote"),
            RunLogEntry::new(at(4), Outcome::RateLimited).topic("fair"),
        ];
        assert_eq!(last_success_topic(&entries), Some("vote"));
        assert_eq!(last_success_topic(&[]), None);
    }
}
