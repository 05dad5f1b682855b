//! Command-line interface definitions.
//!
//! Flags override the matching config file values. Secrets and the last
//! topic can also come from the environment.

use crate::config::AppConfig;
use crate::fitter::FitStrategy;
use clap::Parser;
use std::path::PathBuf;

/// Pick the story trending across world regions and post it.
///
/// # Examples
///
/// ```sh
/// # Dry run with the built-in feed table
/// trending_news_post --dry-run
///
/// # Publish through a webhook, generative fitting
/// PUBLISH_TOKEN=... trending_news_post -c config.yaml \
///     --publish-url https://example.com/hooks/post --strategy generative
///
/// # Print rolling statistics from the run log
/// trending_news_post --stats
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a YAML config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Run log path (JSON Lines)
    #[arg(long)]
    pub run_log: Option<PathBuf>,

    /// Run summary path (JSON)
    #[arg(long)]
    pub summary: Option<PathBuf>,

    /// Compose but do not publish
    #[arg(long)]
    pub dry_run: bool,

    /// Webhook that receives the post
    #[arg(long, env = "PUBLISH_URL")]
    pub publish_url: Option<String>,

    /// Bearer token for the webhook
    #[arg(long, env = "PUBLISH_TOKEN", hide_env_values = true)]
    pub publish_token: Option<String>,

    /// Topic posted by the previous run
    #[arg(long, env = "LAST_TWEET_TOPIC")]
    pub last_topic: Option<String>,

    /// Recency window in hours
    #[arg(long)]
    pub window_hours: Option<i64>,

    /// Text fitting strategy
    #[arg(long, value_enum)]
    pub strategy: Option<FitStrategy>,

    /// Print rolling statistics from the run log and exit
    #[arg(long)]
    pub stats: bool,
}

impl Cli {
    /// Apply flag overrides on top of `config`.
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(path) = &self.run_log {
            config.run_log.path = path.clone();
        }
        if let Some(path) = &self.summary {
            config.run_log.summary_path = path.clone();
        }
        if let Some(url) = &self.publish_url {
            config.publish.url = Some(url.clone());
        }
        if let Some(hours) = self.window_hours {
            // Out-of-range values are left for `AppConfig::validate` to reject.
            config.recency.window_minutes = hours.checked_mul(60).unwrap_or(i64::MAX);
        }
        if let Some(strategy) = self.strategy {
            config.fitter.strategy = strategy;
        }
    }
}
