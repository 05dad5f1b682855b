//! Text fitting: turn a topic cluster into a body whose length lies in a
//! configured character window.
//!
//! # Strategies
//!
//! | Strategy | Module | Needs a generator |
//! |----------|--------|-------------------|
//! | Extractive | [`extractive`] | no |
//! | Generative | [`generative`] | yes |
//!
//! Both measure length in characters after whitespace normalization.

pub mod extractive;
pub mod generative;

use crate::clock::Sleeper;
use crate::error::{FitError, GenerationError};
use crate::models::{FittedText, TopicCluster};
use generative::{RetryPolicy, TextGenerator};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, instrument};

/// Inclusive character-length window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LengthWindow {
    pub min_len: usize,
    pub max_len: usize,
}

impl LengthWindow {
    pub fn contains(&self, len: usize) -> bool {
        self.min_len <= len && len <= self.max_len
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum FitStrategy {
    #[default]
    Extractive,
    Generative,
}

/// Fitter configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitterSettings {
    pub strategy: FitStrategy,
    pub min_len: usize,
    pub max_len: usize,
    /// Generative attempts per cluster, including the first.
    pub max_attempts: usize,
    /// Fixed wait between generative attempts.
    pub retry_delay_ms: u64,
    /// Publish text that missed the window instead of dropping the cluster.
    pub accept_best_effort: bool,
}

impl Default for FitterSettings {
    fn default() -> Self {
        Self {
            strategy: FitStrategy::Extractive,
            min_len: 240,
            max_len: 280,
            max_attempts: 5,
            retry_delay_ms: 2_000,
            accept_best_effort: false,
        }
    }
}

impl FitterSettings {
    pub fn window(&self) -> LengthWindow {
        LengthWindow {
            min_len: self.min_len,
            max_len: self.max_len,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            delay: Duration::from_millis(self.retry_delay_ms),
        }
    }
}

/// Runs the configured strategy against a cluster.
///
/// `generator` may be `None` when the strategy is extractive.
#[derive(Debug)]
pub struct TextFitter<G, S> {
    settings: FitterSettings,
    generator: Option<G>,
    sleeper: S,
}

impl<G, S> TextFitter<G, S>
where
    G: TextGenerator,
    S: Sleeper,
{
    pub fn new(settings: FitterSettings, generator: Option<G>, sleeper: S) -> Self {
        Self {
            settings,
            generator,
            sleeper,
        }
    }

    pub fn settings(&self) -> &FitterSettings {
        &self.settings
    }

    /// Fit one cluster.
    ///
    /// Text that missed the window is still returned (`within_bounds =
    /// false`); whether to use it is the caller's decision.
    #[instrument(level = "info", skip_all, fields(topic = %cluster.topic_key(), strategy = ?self.settings.strategy))]
    pub async fn fit(&self, cluster: &TopicCluster) -> Result<FittedText, FitError> {
        let window = self.settings.window();
        let fitted = match self.settings.strategy {
            FitStrategy::Extractive => extractive::fit_extractive(&cluster.source_text(), window)?,
            FitStrategy::Generative => {
                let generator = self.generator.as_ref().ok_or_else(|| {
                    GenerationError::Backend("no text generator configured".to_string())
                })?;
                let prompt = generative::build_prompt(cluster, window);
                generative::fit_generative(
                    generator,
                    &self.sleeper,
                    &self.settings.retry_policy(),
                    &prompt,
                    window,
                )
                .await?
            }
        };
        info!(
            length = fitted.length,
            within_bounds = fitted.within_bounds,
            attempts = fitted.attempts,
            "Fitted body text"
        );
        Ok(fitted)
    }
}

#[cfg(test)]
mod tests {
    use super::generative::testing::ScriptedGenerator;
    use super::*;
    use crate::clock::testing::RecordingSleeper;
    use crate::cluster::cluster_articles;
    use crate::models::ArticleRecord;

    fn cluster_with_body(body: &str) -> TopicCluster {
        let map = cluster_articles(vec![ArticleRecord::new(
            "Storm: landfall",
            "asia",
            body,
            None,
            "https://example.com/storm",
            None,
        )]);
        map["storm"].clone()
    }

    #[test]
    fn test_window_contains_is_inclusive() {
        let w = LengthWindow {
            min_len: 240,
            max_len: 280,
        };
        assert!(w.contains(240));
        assert!(w.contains(280));
        assert!(!w.contains(239));
        assert!(!w.contains(281));
    }

    #[tokio::test]
    async fn test_extractive_strategy_uses_cluster_body() {
        let body = format!("{}. {}.", "a".repeat(130), "b".repeat(120));
        let fitter: TextFitter<ScriptedGenerator, RecordingSleeper> =
            TextFitter::new(FitterSettings::default(), None, RecordingSleeper::default());
        let fitted = fitter.fit(&cluster_with_body(&body)).await.unwrap();
        assert!(fitted.within_bounds);
        assert_eq!(fitted.length, 253);
    }

    #[tokio::test]
    async fn test_generative_strategy_without_generator_fails() {
        let settings = FitterSettings {
            strategy: FitStrategy::Generative,
            ..FitterSettings::default()
        };
        let fitter: TextFitter<ScriptedGenerator, RecordingSleeper> =
            TextFitter::new(settings, None, RecordingSleeper::default());
        let err = fitter.fit(&cluster_with_body("Body.")).await.unwrap_err();
        assert!(matches!(err, FitError::Generation(GenerationError::Backend(_))));
    }

    #[tokio::test]
    async fn test_generative_strategy_uses_retry_settings() {
        let settings = FitterSettings {
            strategy: FitStrategy::Generative,
            min_len: 260,
            max_len: 280,
            max_attempts: 5,
            retry_delay_ms: 10,
            accept_best_effort: false,
        };
        let generator = ScriptedGenerator::with_lengths(&[310, 300, 265]);
        let fitter = TextFitter::new(settings, Some(generator), RecordingSleeper::default());
        let fitted = fitter.fit(&cluster_with_body("Body.")).await.unwrap();
        assert_eq!(fitted.attempts, 3);
        assert!(fitted.within_bounds);
    }
}
