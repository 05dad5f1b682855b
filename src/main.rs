//! # Trending News Post
//!
//! Reads RSS/Atom feeds from several world regions, finds the story covered
//! across the most regions in the last hour, fits a body into a strict
//! character window and publishes one post.
//!
//! ## Usage
//!
//! ```sh
//! trending_news_post --dry-run
//! trending_news_post -c config.yaml --publish-url https://example.com/hooks/post
//! ```
//!
//! ## Architecture
//!
//! 1. **Fetching**: all feeds concurrently; a failing feed is skipped
//! 2. **Normalizing**: topic keys, timestamps, HTML stripped from summaries
//! 3. **Selecting**: recency filter, clustering by topic key, tiered ranking
//! 4. **Fitting**: extractive sentence spans or LLM generation with retries
//! 5. **Publishing**: headline + body under the hard cap, run log, summary

use chrono::Utc;
use clap::Parser;
use std::error::Error;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod cli;
mod clock;
mod cluster;
mod compose;
mod config;
mod error;
mod feeds;
mod filter;
mod fitter;
mod models;
mod normalize;
mod outputs;
mod pipeline;
mod publish;
mod selector;
mod utils;

use api::AwfulAjGenerator;
use cli::Cli;
use clock::{SystemClock, TokioSleeper};
use config::AppConfig;
use feeds::HttpFeedProvider;
use fitter::FitStrategy;
use outputs::runlog;
use pipeline::{Pipeline, RunOutcome};
use publish::AnyPublisher;
use utils::ensure_parent_dir;

#[tokio::main(flavor = "current_thread")]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("trending_news_post starting up");

    let args = Cli::parse();
    debug!(?args.config, dry_run = args.dry_run, stats = args.stats, "Parsed CLI arguments");

    // ---- Config ----
    let mut config = match &args.config {
        Some(path) => AppConfig::load(path)?,
        None => {
            info!("No config file given; using defaults");
            AppConfig::default()
        }
    };
    args.apply(&mut config);
    config.validate()?;

    if args.stats {
        let entries = runlog::load(&config.run_log.path).await?;
        let window = chrono::Duration::hours(config.run_log.stats_window_hours);
        let stats = runlog::rolling_stats(&entries, Utc::now(), window);
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    // Early check: the run log must be writable before anything is posted
    if let Err(e) = ensure_parent_dir(&config.run_log.path).await {
        error!(
            path = %config.run_log.path.display(),
            error = %e,
            "Run log directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    // ---- Collaborators ----
    let generator = match config.fitter.strategy {
        FitStrategy::Generative => Some(AwfulAjGenerator::load(&config.generation).await?),
        FitStrategy::Extractive => None,
    };
    let publisher = AnyPublisher::from_settings(&config.publish, args.publish_token.clone(), args.dry_run)?;
    if matches!(publisher, AnyPublisher::DryRun(_)) && !args.dry_run {
        warn!("No publish URL configured; running as a dry run");
    }
    let provider = HttpFeedProvider::new(Duration::from_secs(config.fetch.timeout_secs))?;

    let pipeline = Pipeline::new(
        config,
        provider,
        generator,
        publisher,
        SystemClock,
        TokioSleeper,
    )
    .with_last_topic(args.last_topic.clone());

    // ---- Run ----
    let outcome = pipeline.run().await;
    let elapsed_ms = start_time.elapsed().as_millis();
    match &outcome {
        RunOutcome::Published { post_id, topic, text } => {
            info!(%post_id, topic, length = text.chars().count(), elapsed_ms, "Posted trending topic");
        }
        RunOutcome::NoRecentArticles => info!(elapsed_ms, "Nothing published: no recent articles"),
        RunOutcome::NoTrendingTopic => info!(elapsed_ms, "Nothing published: no trending topic"),
        RunOutcome::CandidatesExhausted { tried } => {
            warn!(tried, elapsed_ms, "Nothing published: every candidate was dropped")
        }
        RunOutcome::RateLimited { topic, retry_after_secs } => {
            warn!(topic, ?retry_after_secs, elapsed_ms, "Nothing published: rate limited")
        }
        RunOutcome::PublishFailed { topic, reason } => {
            error!(topic, %reason, elapsed_ms, "Nothing published: publish failed")
        }
    }

    Ok(())
}
