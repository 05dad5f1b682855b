//! Trending topic selection.
//!
//! Clusters are ranked by, in order:
//!
//! 1. number of distinct regions, descending
//! 2. number of members, descending
//! 3. newest member publication time, descending
//! 4. previous selection: the topic published last time loses a remaining tie
//! 5. topic key, ascending (or a seeded random pick among full ties)
//!
//! Selection falls back through three tiers: clusters meeting the strict
//! region threshold, then clusters meeting the relaxed threshold, then the
//! alternate (lower-priority) corpus at the relaxed threshold.

use crate::cluster::ClusterMap;
use crate::models::TopicCluster;
use crate::normalize::topic_key;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use tracing::{debug, info, instrument};

/// How fully tied clusters are ordered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreakMode {
    /// Ascending topic key. Deterministic.
    #[default]
    Lexical,
    /// Uniform shuffle of each fully tied group.
    Random,
}

/// The final tie-break, with its random source when one is used.
#[derive(Debug)]
pub enum TieBreaker {
    Lexical,
    Random(StdRng),
}

impl TieBreaker {
    /// Build a tie-breaker from configuration. A random tie-breaker without a
    /// seed draws one from the OS.
    pub fn from_mode(mode: TieBreakMode, seed: Option<u64>) -> Self {
        match mode {
            TieBreakMode::Lexical => TieBreaker::Lexical,
            TieBreakMode::Random => TieBreaker::Random(match seed {
                Some(s) => StdRng::seed_from_u64(s),
                None => StdRng::from_os_rng(),
            }),
        }
    }
}

/// The ranking dimension that put a cluster ahead of the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecidedBy {
    /// Nothing ranked below it.
    Unopposed,
    RegionCount,
    OccurrenceCount,
    Freshness,
    History,
    TopicKey,
    Random,
}

/// Which fallback tier produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Strict,
    Relaxed,
    Alternate,
}

/// A ranked cluster together with why and where it was ranked.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub cluster: &'a TopicCluster,
    pub tier: Tier,
    pub decided_by: DecidedBy,
}

/// Outcome of a selection.
#[derive(Debug, Clone, Copy)]
pub enum Selection<'a> {
    Chosen(Candidate<'a>),
    NoCandidate,
}

/// Region thresholds for the strict and relaxed tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorPolicy {
    pub min_regions: usize,
    pub relaxed_min_regions: usize,
}

impl Default for SelectorPolicy {
    fn default() -> Self {
        Self {
            min_regions: 2,
            relaxed_min_regions: 1,
        }
    }
}

#[derive(Debug)]
pub struct TrendingSelector {
    policy: SelectorPolicy,
    tie_breaker: TieBreaker,
    last_topic: Option<String>,
}

impl TrendingSelector {
    /// `last_topic` is the topic published by the previous run, if known. It
    /// is canonicalized with [`topic_key`] so a raw headline works too.
    pub fn new(policy: SelectorPolicy, tie_breaker: TieBreaker, last_topic: Option<&str>) -> Self {
        Self {
            policy,
            tie_breaker,
            last_topic: last_topic
                .map(topic_key)
                .filter(|k| !k.is_empty()),
        }
    }

    fn is_last(&self, cluster: &TopicCluster) -> bool {
        self.last_topic.as_deref() == Some(cluster.topic_key())
    }

    /// Compare on every dimension before the final tie-break.
    fn compare_signals(&self, a: &TopicCluster, b: &TopicCluster) -> Ordering {
        signal_order(&self.last_topic, a, b)
    }

    fn decided_by(&self, a: &TopicCluster, b: &TopicCluster) -> DecidedBy {
        if a.region_count() != b.region_count() {
            DecidedBy::RegionCount
        } else if a.occurrence_count() != b.occurrence_count() {
            DecidedBy::OccurrenceCount
        } else if a.latest_published() != b.latest_published() {
            DecidedBy::Freshness
        } else if self.is_last(a) != self.is_last(b) {
            DecidedBy::History
        } else {
            match self.tie_breaker {
                TieBreaker::Lexical => DecidedBy::TopicKey,
                TieBreaker::Random(_) => DecidedBy::Random,
            }
        }
    }

    /// Rank the clusters that have at least `min_regions` regions.
    ///
    /// Each entry carries the dimension that separated it from the entry
    /// right after it.
    pub fn rank<'a>(
        &mut self,
        clusters: &'a ClusterMap,
        min_regions: usize,
    ) -> Vec<(&'a TopicCluster, DecidedBy)> {
        let mut ranked: Vec<&TopicCluster> = clusters
            .values()
            .filter(|c| c.region_count() >= min_regions)
            .collect();
        ranked.sort_by(|a, b| {
            self.compare_signals(a, b)
                .then_with(|| a.topic_key().cmp(b.topic_key()))
        });

        if let TieBreaker::Random(ref mut rng) = self.tie_breaker {
            let mut start = 0;
            while start < ranked.len() {
                let mut end = start + 1;
                while end < ranked.len()
                    && signal_order(&self.last_topic, ranked[start], ranked[end]) == Ordering::Equal
                {
                    end += 1;
                }
                if end - start > 1 {
                    ranked[start..end].shuffle(rng);
                }
                start = end;
            }
        }

        let decisions: Vec<DecidedBy> = (0..ranked.len())
            .map(|i| match ranked.get(i + 1) {
                Some(next) => self.decided_by(ranked[i], next),
                None => DecidedBy::Unopposed,
            })
            .collect();
        ranked.into_iter().zip(decisions).collect()
    }

    /// Top-ranked cluster among those with at least `min_regions` regions.
    pub fn select<'a>(
        &mut self,
        clusters: &'a ClusterMap,
        min_regions: usize,
    ) -> Option<(&'a TopicCluster, DecidedBy)> {
        self.rank(clusters, min_regions).into_iter().next()
    }

    /// Every usable cluster, best first, across the three fallback tiers.
    ///
    /// Strict-tier clusters come first, then the remaining clusters that only
    /// meet the relaxed threshold. The alternate corpus is consulted only
    /// when the primary corpus yields nothing. Each candidate's deciding
    /// dimension is taken against the candidate right after it in this
    /// combined order.
    #[instrument(level = "info", skip_all, fields(primary = primary.len(), has_alternate = alternate.is_some()))]
    pub fn candidates<'a>(
        &mut self,
        primary: &'a ClusterMap,
        alternate: Option<&'a ClusterMap>,
    ) -> Vec<Candidate<'a>> {
        let policy = self.policy;
        let mut ordered: Vec<(&'a TopicCluster, Tier)> = self
            .rank(primary, policy.min_regions)
            .into_iter()
            .map(|(cluster, _)| (cluster, Tier::Strict))
            .collect();
        debug!(strict = ordered.len(), min_regions = policy.min_regions, "Strict tier ranked");

        let strict_keys: HashSet<String> = ordered
            .iter()
            .map(|(c, _)| c.topic_key().to_string())
            .collect();
        let before = ordered.len();
        ordered.extend(
            self.rank(primary, policy.relaxed_min_regions)
                .into_iter()
                .filter(|(c, _)| !strict_keys.contains(c.topic_key()))
                .map(|(cluster, _)| (cluster, Tier::Relaxed)),
        );
        debug!(
            relaxed = ordered.len() - before,
            relaxed_min_regions = policy.relaxed_min_regions,
            "Relaxed tier ranked"
        );

        if ordered.is_empty() {
            if let Some(alt) = alternate {
                ordered.extend(
                    self.rank(alt, policy.relaxed_min_regions)
                        .into_iter()
                        .map(|(cluster, _)| (cluster, Tier::Alternate)),
                );
                debug!(alternate = ordered.len(), "Alternate tier ranked");
            }
        }

        (0..ordered.len())
            .map(|i| {
                let (cluster, tier) = ordered[i];
                let decided_by = match ordered.get(i + 1) {
                    Some((next, _)) => self.decided_by(cluster, next),
                    None => DecidedBy::Unopposed,
                };
                Candidate {
                    cluster,
                    tier,
                    decided_by,
                }
            })
            .collect()
    }

    /// The single best cluster across the three fallback tiers.
    pub fn select_tiered<'a>(
        &mut self,
        primary: &'a ClusterMap,
        alternate: Option<&'a ClusterMap>,
    ) -> Selection<'a> {
        match self.candidates(primary, alternate).into_iter().next() {
            Some(candidate) => {
                info!(
                    topic = %candidate.cluster.topic_key(),
                    tier = ?candidate.tier,
                    decided_by = ?candidate.decided_by,
                    regions = candidate.cluster.region_count(),
                    members = candidate.cluster.occurrence_count(),
                    "Selected trending topic"
                );
                Selection::Chosen(candidate)
            }
            None => {
                info!("No trending topic candidate in any tier");
                Selection::NoCandidate
            }
        }
    }
}

/// Ordering on every dimension except the final tie-break.
fn signal_order(last: &Option<String>, a: &TopicCluster, b: &TopicCluster) -> Ordering {
    let is_last = |c: &TopicCluster| last.as_deref() == Some(c.topic_key());
    b.region_count()
        .cmp(&a.region_count())
        .then_with(|| b.occurrence_count().cmp(&a.occurrence_count()))
        .then_with(|| b.latest_published().cmp(&a.latest_published()))
        .then_with(|| is_last(a).cmp(&is_last(b)))
}
