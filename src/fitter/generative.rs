//! Generative fitting: ask a text generator for a post in the target window
//! and retry a bounded number of times.

use super::LengthWindow;
use crate::clock::Sleeper;
use crate::error::GenerationError;
use crate::models::{FittedText, TopicCluster};
use crate::utils::{char_len, normalize_whitespace, truncate_chars, truncate_for_log};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Longest slice of cluster source text placed in a prompt.
const PROMPT_SOURCE_CHARS: usize = 2_000;

/// A text generation backend.
///
/// Implementors receive a prompt that already states the target window; the
/// window is passed as well so backends can set token limits from it.
pub trait TextGenerator {
    async fn generate(&self, prompt: &str, window: LengthWindow) -> Result<String, GenerationError>;
}

/// Bounded retry with a fixed delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: usize,
    /// Wait between two attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(2),
        }
    }
}

/// Build the generation prompt for a cluster.
pub fn build_prompt(cluster: &TopicCluster, window: LengthWindow) -> String {
    let regions = cluster.regions().iter().cloned().collect::<Vec<_>>().join(", ");
    let source = cluster.source_text();
    format!(
        "Write one news post about the story below. It must be between {min} and {max} \
         characters long, counting spaces. Plain text only: no hashtags, no emoji, no links, \
         no quotation marks around the post. Reply with the post and nothing else.\n\n\
         Headline: {title}\n\
         Reported from: {regions}\n\
         Coverage: {source}",
        min = window.min_len,
        max = window.max_len,
        title = cluster.representative().title(),
        source = truncate_chars(&source, PROMPT_SOURCE_CHARS),
    )
}

/// Ask `generator` until a response lands in `window` or the policy runs out.
///
/// Each response is whitespace-normalized before it is measured. On
/// exhaustion the last response is returned with `within_bounds = false`.
///
/// # Errors
///
/// [`GenerationError::Exhausted`] when every attempt failed without producing
/// any text.
#[instrument(level = "info", skip_all, fields(min = window.min_len, max = window.max_len, max_attempts = policy.max_attempts))]
pub async fn fit_generative<G, S>(
    generator: &G,
    sleeper: &S,
    policy: &RetryPolicy,
    prompt: &str,
    window: LengthWindow,
) -> Result<FittedText, GenerationError>
where
    G: TextGenerator,
    S: Sleeper,
{
    let total_t0 = Instant::now();
    let max_attempts = policy.max_attempts.max(1);
    let mut last_response: Option<FittedText> = None;
    let mut last_error = String::new();

    for attempt in 1..=max_attempts {
        match generator.generate(prompt, window).await {
            Ok(raw) => {
                let text = normalize_whitespace(&raw);
                let length = char_len(&text);
                if text.is_empty() {
                    warn!(attempt, "Generator returned empty text");
                    last_error = GenerationError::Empty.to_string();
                } else if window.contains(length) {
                    info!(
                        attempt,
                        length,
                        elapsed_ms_total = total_t0.elapsed().as_millis(),
                        "Generated text fits window"
                    );
                    return Ok(FittedText {
                        text,
                        length,
                        within_bounds: true,
                        attempts: attempt,
                    });
                } else {
                    warn!(
                        attempt,
                        length,
                        min = window.min_len,
                        max = window.max_len,
                        preview = %truncate_for_log(&text, 80),
                        "Generated text outside window"
                    );
                    last_response = Some(FittedText {
                        text,
                        length,
                        within_bounds: false,
                        attempts: attempt,
                    });
                }
            }
            Err(e) => {
                warn!(attempt, error = %e, "Generation attempt failed");
                last_error = e.to_string();
            }
        }

        if attempt < max_attempts {
            debug!(attempt, delay = ?policy.delay, "Waiting before next generation attempt");
            sleeper.sleep(policy.delay).await;
        }
    }

    match last_response {
        Some(mut fitted) => {
            fitted.attempts = max_attempts;
            warn!(
                attempts = max_attempts,
                length = fitted.length,
                "Generation retries exhausted; returning last response"
            );
            Ok(fitted)
        }
        None => Err(GenerationError::Exhausted {
            attempts: max_attempts,
            last: last_error,
        }),
    }
}

#[cfg(test)]
pub mod testing {
    //! Scripted generator for tests.

    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    /// Replays scripted responses in order and records every prompt.
    #[derive(Debug, Default)]
    pub struct ScriptedGenerator {
        pub responses: RefCell<VecDeque<Result<String, GenerationError>>>,
        pub prompts: RefCell<Vec<String>>,
    }

    impl ScriptedGenerator {
        pub fn new(responses: Vec<Result<String, GenerationError>>) -> Self {
            Self {
                responses: RefCell::new(responses.into()),
                prompts: RefCell::new(Vec::new()),
            }
        }

        /// Responses of exactly the given lengths.
        pub fn with_lengths(lengths: &[usize]) -> Self {
            Self::new(lengths.iter().map(|l| Ok("x".repeat(*l))).collect())
        }

        pub fn calls(&self) -> usize {
            self.prompts.borrow().len()
        }
    }

    impl TextGenerator for ScriptedGenerator {
        async fn generate(&self, prompt: &str, _window: LengthWindow) -> Result<String, GenerationError> {
            self.prompts.borrow_mut().push(prompt.to_string());
            self.responses
                .borrow_mut()
                .pop_front()
                .unwrap_or(Err(GenerationError::Empty))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedGenerator;
    use super::*;
    use crate::clock::testing::RecordingSleeper;
    use crate::models::ArticleRecord;

    fn window(min_len: usize, max_len: usize) -> LengthWindow {
        LengthWindow { min_len, max_len }
    }

    fn policy(max_attempts: usize) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            delay: Duration::from_secs(3),
        }
    }

    #[tokio::test]
    async fn test_third_attempt_accepted() {
        let generator = ScriptedGenerator::with_lengths(&[310, 300, 265]);
        let sleeper = RecordingSleeper::default();
        let fitted = fit_generative(&generator, &sleeper, &policy(5), "prompt", window(260, 280))
            .await
            .unwrap();

        assert!(fitted.within_bounds);
        assert_eq!(fitted.attempts, 3);
        assert_eq!(fitted.length, 265);
        assert_eq!(generator.calls(), 3);
        assert_eq!(*sleeper.delays.borrow(), vec![Duration::from_secs(3); 2]);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_response_out_of_bounds() {
        let generator = ScriptedGenerator::with_lengths(&[310, 300, 290]);
        let sleeper = RecordingSleeper::default();
        let fitted = fit_generative(&generator, &sleeper, &policy(3), "prompt", window(260, 280))
            .await
            .unwrap();

        assert!(!fitted.within_bounds);
        assert_eq!(fitted.attempts, 3);
        assert_eq!(fitted.length, 290);
        assert_eq!(sleeper.delays.borrow().len(), 2);
    }

    #[tokio::test]
    async fn test_measures_after_whitespace_normalization() {
        let padded = format!("{}\r\n\r\n   {}", "a".repeat(130), "b".repeat(139));
        let generator = ScriptedGenerator::new(vec![Ok(padded)]);
        let sleeper = RecordingSleeper::default();
        let fitted = fit_generative(&generator, &sleeper, &policy(1), "p", window(260, 270))
            .await
            .unwrap();
        assert!(fitted.within_bounds);
        assert_eq!(fitted.length, 270);
        assert!(!fitted.text.contains('\n'));
    }

    #[tokio::test]
    async fn test_errors_then_success() {
        let generator = ScriptedGenerator::new(vec![
            Err(GenerationError::Throttled),
            Err(GenerationError::Timeout(Duration::from_secs(30))),
            Ok("y".repeat(275)),
        ]);
        let sleeper = RecordingSleeper::default();
        let fitted = fit_generative(&generator, &sleeper, &policy(5), "p", window(260, 280))
            .await
            .unwrap();
        assert_eq!(fitted.attempts, 3);
        assert!(fitted.within_bounds);
    }

    #[tokio::test]
    async fn test_all_errors_is_generation_failure() {
        let generator = ScriptedGenerator::new(vec![
            Err(GenerationError::Throttled),
            Err(GenerationError::Backend("down".to_string())),
        ]);
        let sleeper = RecordingSleeper::default();
        let err = fit_generative(&generator, &sleeper, &policy(2), "p", window(260, 280))
            .await
            .unwrap_err();
        match err {
            GenerationError::Exhausted { attempts, last } => {
                assert_eq!(attempts, 2);
                assert!(last.contains("down"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_last_response_kept_when_final_attempt_errors() {
        let generator = ScriptedGenerator::new(vec![
            Ok("z".repeat(300)),
            Err(GenerationError::Throttled),
        ]);
        let sleeper = RecordingSleeper::default();
        let fitted = fit_generative(&generator, &sleeper, &policy(2), "p", window(260, 280))
            .await
            .unwrap();
        assert_eq!(fitted.length, 300);
        assert_eq!(fitted.attempts, 2);
        assert!(!fitted.within_bounds);
    }

    #[test]
    fn test_prompt_states_window_and_headline() {
        let cluster = crate::cluster::cluster_articles(vec![ArticleRecord::new(
            "Global Summit Begins: leaders meet",
            "europe",
            "Leaders gathered in Geneva.",
            None,
            "https://example.com/a",
            None,
        )]);
        let prompt = build_prompt(&cluster["global summit begins"], window(240, 280));
        assert!(prompt.contains("between 240 and 280 characters"));
        assert!(prompt.contains("Headline: Global Summit Begins: leaders meet"));
        assert!(prompt.contains("Reported from: europe"));
        assert!(prompt.contains("Leaders gathered in Geneva."));
    }
}
