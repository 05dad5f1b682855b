//! Application configuration.
//!
//! Loaded from an optional YAML file; every section and field has a default,
//! so an empty file (or none at all) yields a working setup built on the
//! default feed table.
//!
//! ```yaml
//! recency:
//!   window_minutes: 60
//! selector:
//!   min_regions: 2
//!   tie_break: lexical
//!   max_candidates: 3
//! fitter:
//!   strategy: extractive
//!   min_len: 240
//!   max_len: 280
//! publish:
//!   url: https://example.com/hooks/post
//! ```

use crate::compose::ComposerSettings;
use crate::error::ConfigError;
use crate::feeds::{FeedSource, default_feeds};
use crate::fitter::FitterSettings;
use crate::publish::PublishSettings;
use crate::selector::{SelectorPolicy, TieBreakMode};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, instrument};
use url::Url;

/// Longest recency window: one week.
pub const MAX_WINDOW_MINUTES: i64 = 7 * 24 * 60;
/// Longest rolling statistics window: one year.
pub const MAX_STATS_WINDOW_HOURS: i64 = 365 * 24;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub feeds: Vec<FeedSource>,
    /// Consulted only when the primary feeds yield no candidate.
    pub alternate_feeds: Vec<FeedSource>,
    pub fetch: FetchSettings,
    pub recency: RecencySettings,
    pub selector: SelectorSettings,
    pub fitter: FitterSettings,
    pub composer: ComposerSettings,
    pub publish: PublishSettings,
    pub generation: GenerationSettings,
    pub run_log: RunLogSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            feeds: default_feeds(),
            alternate_feeds: Vec::new(),
            fetch: FetchSettings::default(),
            recency: RecencySettings::default(),
            selector: SelectorSettings::default(),
            fitter: FitterSettings::default(),
            composer: ComposerSettings::default(),
            publish: PublishSettings::default(),
            generation: GenerationSettings::default(),
            run_log: RunLogSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    pub timeout_secs: u64,
    /// Feed requests in flight at once.
    pub concurrency: usize,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 20,
            concurrency: 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecencySettings {
    pub window_minutes: i64,
}

impl Default for RecencySettings {
    fn default() -> Self {
        Self { window_minutes: 60 }
    }
}

impl RecencySettings {
    pub fn window(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.window_minutes)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorSettings {
    #[serde(flatten)]
    pub policy: SelectorPolicy,
    pub tie_break: TieBreakMode,
    /// Seed for every random choice in the run (tie-break, headline length).
    pub seed: Option<u64>,
    /// Ranked clusters tried before giving up.
    pub max_candidates: usize,
}

impl Default for SelectorSettings {
    fn default() -> Self {
        Self {
            policy: SelectorPolicy::default(),
            tie_break: TieBreakMode::Lexical,
            seed: None,
            max_candidates: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    /// `awful_aj` chat template name.
    pub template: String,
    /// `awful_aj` config file; defaults to `config.yaml` in its config dir.
    pub aj_config: Option<PathBuf>,
    pub timeout_secs: u64,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            template: "trending_post".to_string(),
            aj_config: None,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunLogSettings {
    pub path: PathBuf,
    pub summary_path: PathBuf,
    pub stats_window_hours: i64,
}

impl Default for RunLogSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("state/runs.jsonl"),
            summary_path: PathBuf::from("state/summary.json"),
            stats_window_hours: 24,
        }
    }
}

impl AppConfig {
    /// Read and validate a YAML config file.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_yaml(&raw)?;
        info!(
            feeds = config.feeds.len(),
            alternate_feeds = config.alternate_feeds.len(),
            strategy = ?config.fitter.strategy,
            "Loaded configuration"
        );
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        // serde_yaml reads an empty document as null, not as an empty map.
        let config: Self = if raw.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(raw)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no run could satisfy.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fitter = &self.fitter;
        if fitter.min_len > fitter.max_len {
            return Err(ConfigError::Invalid(format!(
                "fitter.min_len ({}) exceeds fitter.max_len ({})",
                fitter.min_len, fitter.max_len
            )));
        }
        if fitter.max_attempts == 0 {
            return Err(ConfigError::Invalid("fitter.max_attempts must be at least 1".into()));
        }
        let composer = &self.composer;
        if composer.min_post_len > composer.hard_cap {
            return Err(ConfigError::Invalid(format!(
                "composer.min_post_len ({}) exceeds composer.hard_cap ({})",
                composer.min_post_len, composer.hard_cap
            )));
        }
        if !(1..=MAX_WINDOW_MINUTES).contains(&self.recency.window_minutes) {
            return Err(ConfigError::Invalid(format!(
                "recency.window_minutes ({}) must be between 1 and {MAX_WINDOW_MINUTES}",
                self.recency.window_minutes
            )));
        }
        if !(1..=MAX_STATS_WINDOW_HOURS).contains(&self.run_log.stats_window_hours) {
            return Err(ConfigError::Invalid(format!(
                "run_log.stats_window_hours ({}) must be between 1 and {MAX_STATS_WINDOW_HOURS}",
                self.run_log.stats_window_hours
            )));
        }
        let policy = self.selector.policy;
        if policy.relaxed_min_regions == 0 || policy.relaxed_min_regions > policy.min_regions {
            return Err(ConfigError::Invalid(format!(
                "selector.relaxed_min_regions ({}) must be between 1 and min_regions ({})",
                policy.relaxed_min_regions, policy.min_regions
            )));
        }
        if self.selector.max_candidates == 0 {
            return Err(ConfigError::Invalid("selector.max_candidates must be at least 1".into()));
        }
        if self.feeds.is_empty() {
            return Err(ConfigError::Invalid("at least one feed is required".into()));
        }
        for feed in self.feeds.iter().chain(&self.alternate_feeds) {
            check_url(&feed.url)?;
            if feed.region.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("feed {} has no region", feed.url)));
            }
        }
        if let Some(url) = &self.publish.url {
            check_url(url)?;
        }
        Ok(())
    }
}

fn check_url(raw: &str) -> Result<(), ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::Invalid(format!("bad URL {raw}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::Invalid(format!(
            "unsupported scheme {other} in {raw}"
        ))),
    }
}
