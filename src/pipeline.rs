//! The run loop: one invocation, one post at most.
//!
//! ```text
//! fetch ─▶ normalize ─▶ recency filter ─▶ cluster ─▶ rank candidates
//!                                                        │
//!         ┌──────────────── next candidate ◀─────────────┤
//!         ▼                                              │
//!        fit ──(fitting / generation failure)────────────┘
//!         │
//!      compose ─▶ publish ─▶ run log + summary
//! ```
//!
//! The alternate feeds are fetched only when the primary corpus yields no
//! candidate at all. Every terminal state is a [`RunOutcome`]; nothing in
//! here returns an error to the caller.

use crate::clock::{Clock, Sleeper};
use crate::cluster::{ClusterMap, cluster_articles};
use crate::compose::Composer;
use crate::config::AppConfig;
use crate::error::{FitError, PublishError};
use crate::feeds::{FeedProvider, FeedSource, fetch_all};
use crate::filter::filter_recent;
use crate::fitter::generative::TextGenerator;
use crate::fitter::{FitStrategy, TextFitter};
use crate::normalize::normalize_articles;
use crate::outputs::runlog::{self, Outcome, RunLogEntry};
use crate::outputs::summary::{RunSummary, write_summary};
use crate::publish::Publisher;
use crate::selector::{Candidate, TieBreaker, TrendingSelector};
use chrono::{DateTime, Duration, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::time::Instant;
use tracing::{error, info, instrument, warn};

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Published {
        post_id: String,
        topic: String,
        text: String,
    },
    NoRecentArticles,
    NoTrendingTopic,
    /// Every candidate tried was dropped by fitting or generation.
    CandidatesExhausted {
        tried: usize,
    },
    RateLimited {
        topic: String,
        retry_after_secs: Option<u64>,
    },
    PublishFailed {
        topic: String,
        reason: String,
    },
}

impl RunOutcome {
    pub fn outcome(&self) -> Outcome {
        match self {
            RunOutcome::Published { .. } => Outcome::Success,
            RunOutcome::NoRecentArticles => Outcome::NoRecentArticles,
            RunOutcome::NoTrendingTopic => Outcome::NoTrendingTopic,
            RunOutcome::CandidatesExhausted { .. } => Outcome::CandidatesExhausted,
            RunOutcome::RateLimited { .. } => Outcome::RateLimited,
            RunOutcome::PublishFailed { .. } => Outcome::PublishFailed,
        }
    }

    fn to_entry(&self, timestamp: DateTime<Utc>) -> RunLogEntry {
        let entry = RunLogEntry::new(timestamp, self.outcome());
        match self {
            RunOutcome::Published { post_id, topic, .. } => {
                entry.topic(topic.as_str()).detail(format!("post {post_id}")).attempts(1)
            }
            RunOutcome::NoRecentArticles => entry.detail("no articles inside the recency window"),
            RunOutcome::NoTrendingTopic => entry.detail("no cluster met any selection tier"),
            RunOutcome::CandidatesExhausted { tried } => {
                entry.detail(format!("{tried} candidate(s) dropped"))
            }
            RunOutcome::RateLimited {
                topic,
                retry_after_secs,
            } => entry
                .topic(topic.as_str())
                .detail(match retry_after_secs {
                    Some(s) => format!("retry after {s}s"),
                    None => "rate limited".to_string(),
                })
                .attempts(1),
            RunOutcome::PublishFailed { topic, reason } => {
                entry.topic(topic.as_str()).detail(reason.as_str()).attempts(1)
            }
        }
    }
}

/// Everything one run needs, wired at construction.
pub struct Pipeline<P, G, U, C, S> {
    config: AppConfig,
    provider: P,
    fitter: TextFitter<G, S>,
    composer: Composer,
    publisher: U,
    clock: C,
    last_topic: Option<String>,
}

impl<P, G, U, C, S> Pipeline<P, G, U, C, S>
where
    P: FeedProvider,
    G: TextGenerator,
    U: Publisher,
    C: Clock,
    S: Sleeper,
{
    pub fn new(
        config: AppConfig,
        provider: P,
        generator: Option<G>,
        publisher: U,
        clock: C,
        sleeper: S,
    ) -> Self {
        let fitter = TextFitter::new(config.fitter.clone(), generator, sleeper);
        let composer = Composer::new(config.composer.clone());
        Self {
            config,
            provider,
            fitter,
            composer,
            publisher,
            clock,
            last_topic: None,
        }
    }

    /// Topic of the previous post. Without one, the run log's most recent
    /// success is used.
    pub fn with_last_topic(mut self, topic: Option<String>) -> Self {
        self.last_topic = topic.filter(|t| !t.trim().is_empty());
        self
    }

    #[cfg(test)]
    pub fn publisher(&self) -> &U {
        &self.publisher
    }

    /// Execute one run and record its outcome.
    #[instrument(level = "info", skip_all)]
    pub async fn run(&self) -> RunOutcome {
        let t0 = Instant::now();
        let now = self.clock.now();
        let outcome = self.execute(now).await;
        self.finish(&outcome, now).await;
        info!(
            outcome = ?outcome.outcome(),
            elapsed_ms = t0.elapsed().as_millis(),
            "Run finished"
        );
        outcome
    }

    async fn execute(&self, now: DateTime<Utc>) -> RunOutcome {
        let window = self.config.recency.window();
        let (primary, primary_recent) = self.load_corpus(&self.config.feeds, window, now).await;

        let policy = self.config.selector.policy;
        let has_primary_candidate = primary
            .values()
            .any(|c| c.region_count() >= policy.relaxed_min_regions);

        let mut alternate_recent = 0;
        let alternate = if has_primary_candidate || self.config.alternate_feeds.is_empty() {
            None
        } else {
            info!(
                feeds = self.config.alternate_feeds.len(),
                "Primary corpus has no candidate; fetching alternate feeds"
            );
            let (clusters, recent) = self
                .load_corpus(&self.config.alternate_feeds, window, now)
                .await;
            alternate_recent = recent;
            Some(clusters)
        };

        if primary_recent == 0 && alternate_recent == 0 {
            info!(window_minutes = self.config.recency.window_minutes, "No recent articles");
            return RunOutcome::NoRecentArticles;
        }

        let last_topic = self.resolve_last_topic().await;
        let mut selector = TrendingSelector::new(
            policy,
            TieBreaker::from_mode(self.config.selector.tie_break, self.config.selector.seed),
            last_topic.as_deref(),
        );
        let candidates = selector.candidates(&primary, alternate.as_ref());
        if candidates.is_empty() {
            info!("No trending topic in any tier");
            return RunOutcome::NoTrendingTopic;
        }

        self.try_candidates(&candidates, now).await
    }

    async fn load_corpus(
        &self,
        sources: &[FeedSource],
        window: Duration,
        now: DateTime<Utc>,
    ) -> (ClusterMap, usize) {
        let raw = fetch_all(&self.provider, sources, self.config.fetch.concurrency).await;
        let recent = filter_recent(normalize_articles(raw), window, now);
        let count = recent.len();
        (cluster_articles(recent), count)
    }

    async fn resolve_last_topic(&self) -> Option<String> {
        if let Some(topic) = &self.last_topic {
            return Some(topic.clone());
        }
        match runlog::load(&self.config.run_log.path).await {
            Ok(entries) => {
                let topic = runlog::last_success_topic(&entries).map(str::to_string);
                if let Some(t) = &topic {
                    info!(topic = %t, "Last topic taken from run log");
                }
                topic
            }
            Err(e) => {
                warn!(error = %e, "Could not read run log for last topic");
                None
            }
        }
    }

    async fn try_candidates(&self, candidates: &[Candidate<'_>], now: DateTime<Utc>) -> RunOutcome {
        let settings = self.fitter.settings();
        let max = self.config.selector.max_candidates;
        let mut headline_rng = self.config.composer.randomize_headline.then(|| {
            match self.config.selector.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_os_rng(),
            }
        });

        let mut tried = 0;
        for candidate in candidates.iter().take(max) {
            tried += 1;
            let cluster = candidate.cluster;
            let topic = cluster.topic_key();
            info!(
                topic,
                rank = tried,
                tier = ?candidate.tier,
                decided_by = ?candidate.decided_by,
                regions = cluster.region_count(),
                members = cluster.occurrence_count(),
                "Trying candidate"
            );

            let fitted = match self.fitter.fit(cluster).await {
                Ok(fitted) => fitted,
                Err(e) => {
                    let outcome = match e {
                        FitError::Generation(_) => Outcome::GenerationFailure,
                        _ => Outcome::FittingFailure,
                    };
                    warn!(topic, error = %e, "Dropping candidate");
                    self.record(&RunLogEntry::new(now, outcome).topic(topic).detail(e.to_string()))
                        .await;
                    continue;
                }
            };

            if !fitted.within_bounds && !settings.accept_best_effort {
                let outcome = match settings.strategy {
                    FitStrategy::Extractive => Outcome::FittingFailure,
                    FitStrategy::Generative => Outcome::GenerationFailure,
                };
                let detail = format!(
                    "best effort of {} characters outside [{}, {}]",
                    fitted.length, settings.min_len, settings.max_len
                );
                warn!(topic, %detail, "Dropping candidate");
                self.record(
                    &RunLogEntry::new(now, outcome)
                        .topic(topic)
                        .detail(detail)
                        .attempts(fitted.attempts),
                )
                .await;
                continue;
            }

            let post = match self.composer.compose(cluster, &fitted, headline_rng.as_mut()) {
                Ok(post) => post,
                Err(e) => {
                    warn!(topic, error = %e, "Dropping candidate");
                    self.record(
                        &RunLogEntry::new(now, Outcome::FittingFailure)
                            .topic(topic)
                            .detail(e.to_string()),
                    )
                    .await;
                    continue;
                }
            };

            let media = if self.config.publish.attach_media {
                cluster.image_ref()
            } else {
                None
            };
            return match self.publisher.publish(&post.text, media).await {
                Ok(post_id) => {
                    info!(topic, %post_id, length = post.length, "Published trending post");
                    RunOutcome::Published {
                        post_id,
                        topic: topic.to_string(),
                        text: post.text,
                    }
                }
                Err(PublishError::RateLimited { retry_after_secs }) => {
                    warn!(topic, ?retry_after_secs, "Publish rate limited; aborting run");
                    RunOutcome::RateLimited {
                        topic: topic.to_string(),
                        retry_after_secs,
                    }
                }
                Err(e) => {
                    error!(topic, error = %e, "Publish failed; not retrying this run");
                    RunOutcome::PublishFailed {
                        topic: topic.to_string(),
                        reason: e.to_string(),
                    }
                }
            };
        }

        warn!(tried, "Every candidate was dropped");
        RunOutcome::CandidatesExhausted { tried }
    }

    /// Append to the run log; a failed write is logged, never fatal.
    async fn record(&self, entry: &RunLogEntry) {
        if let Err(e) = runlog::append(&self.config.run_log.path, entry).await {
            error!(error = %e, "Failed to append run log entry");
        }
    }

    async fn finish(&self, outcome: &RunOutcome, now: DateTime<Utc>) {
        let entry = outcome.to_entry(now);
        self.record(&entry).await;

        let settings = &self.config.run_log;
        let entries = match runlog::load(&settings.path).await {
            Ok(entries) => entries,
            Err(e) => {
                error!(error = %e, "Failed to reload run log for summary");
                vec![entry.clone()]
            }
        };
        let stats = runlog::rolling_stats(&entries, now, Duration::hours(settings.stats_window_hours));
        let summary = RunSummary {
            generated_at: now,
            last: entry,
            stats,
        };
        if let Err(e) = write_summary(&summary, &settings.summary_path).await {
            error!(error = %e, "Failed to write run summary");
        }
    }
}
