//! Run summary: the last outcome plus rolling statistics, rewritten as one
//! JSON document after every run.

use super::runlog::{RollingStats, RunLogEntry};
use crate::error::RunLogError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::{error, info, instrument};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub generated_at: DateTime<Utc>,
    pub last: RunLogEntry,
    pub stats: RollingStats,
}

/// Write `summary` to `path`, replacing any previous summary.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn write_summary(summary: &RunSummary, path: &Path) -> Result<(), RunLogError> {
    let json = serde_json::to_string_pretty(summary)?;

    if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = fs::create_dir_all(dir).await {
            error!(dir = %dir.display(), error = %e, "Failed to create summary dir");
            return Err(e.into());
        }
    }

    fs::write(path, json).await?;
    info!(
        outcome = ?summary.last.outcome,
        attempts = summary.stats.attempts,
        successes = summary.stats.successes,
        rate_limited = summary.stats.rate_limited,
        "Wrote run summary"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outputs::runlog::Outcome;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_write_summary_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/summary.json");
        let now = Utc.with_ymd_and_hms(2025, 5, 6, 12, 0, 0).unwrap();

        let mut summary = RunSummary {
            generated_at: now,
            last: RunLogEntry::new(now, Outcome::RateLimited).topic("storm"),
            stats: RollingStats {
                window_hours: 24,
                attempts: 4,
                successes: 2,
                rate_limited: 1,
            },
        };
        write_summary(&summary, &path).await.unwrap();
        summary.last = RunLogEntry::new(now, Outcome::Success).topic("vote");
        write_summary(&summary, &path).await.unwrap();

        let raw = tokio::fs::read_to_string(&path).await.unwrap();
        let back: RunSummary = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, summary);
        assert!(raw.contains("\"rate_limited\": 1"));
    }
}
