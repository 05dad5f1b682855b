//! Post composition: headline, separator, fitted body and optional link,
//! held under the platform's hard cap and padded up to its minimum.

use crate::error::ComposeError;
use crate::models::{FittedText, TopicCluster};
use crate::utils::{char_len, truncate_chars};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Composer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposerSettings {
    /// Words taken from the representative title.
    pub headline_words: usize,
    /// Draw the word count from `[1, min(5, words)]` instead.
    pub randomize_headline: bool,
    pub uppercase_headline: bool,
    /// Placed between headline and body.
    pub separator: String,
    /// Append the representative article's link after the body.
    pub include_link: bool,
    /// Absolute platform maximum, in characters.
    pub hard_cap: usize,
    /// Platform minimum, in characters; shorter posts are padded.
    pub min_post_len: usize,
    pub pad_char: char,
}

impl Default for ComposerSettings {
    fn default() -> Self {
        Self {
            headline_words: 5,
            randomize_headline: false,
            uppercase_headline: true,
            separator: ": ".to_string(),
            include_link: false,
            hard_cap: 280,
            min_post_len: 0,
            pad_char: '.',
        }
    }
}

/// A post ready for publishing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedPost {
    pub text: String,
    pub length: usize,
    /// Characters cut from the headline to meet the hard cap.
    pub headline_trimmed: usize,
    /// Filler characters appended to reach the minimum.
    pub padded: usize,
}

/// Builds headlines and assembles posts.
#[derive(Debug, Clone)]
pub struct Composer {
    settings: ComposerSettings,
}

impl Composer {
    pub fn new(settings: ComposerSettings) -> Self {
        Self { settings }
    }

    /// Number of headline words for a title of `word_count` words.
    fn headline_len<R: Rng>(&self, word_count: usize, rng: Option<&mut R>) -> usize {
        match rng {
            Some(rng) if self.settings.randomize_headline && word_count > 0 => {
                rng.random_range(1..=word_count.min(5))
            }
            _ => self.settings.headline_words.min(word_count),
        }
    }

    /// First words of `title`, optionally upper-cased.
    pub fn headline<R: Rng>(&self, title: &str, rng: Option<&mut R>) -> String {
        let words: Vec<&str> = title.split_whitespace().collect();
        let k = self.headline_len(words.len(), rng);
        let headline = words[..k].join(" ");
        if self.settings.uppercase_headline {
            headline.to_uppercase()
        } else {
            headline
        }
    }

    fn assemble(&self, headline: &str, body: &str, link: Option<&str>) -> String {
        let mut text = String::new();
        if !headline.is_empty() {
            text.push_str(headline);
            text.push_str(&self.settings.separator);
        }
        text.push_str(body);
        if let Some(link) = link {
            text.push(' ');
            text.push_str(link);
        }
        text
    }

    /// Combine headline, body and optional link, then enforce the hard cap
    /// and the minimum length.
    ///
    /// Over the cap, characters come off the end of the headline only: the
    /// excess plus one. If the headline runs out, it is dropped together with
    /// the separator.
    ///
    /// # Errors
    ///
    /// [`ComposeError::BodyExceedsCap`] when the body (and link) alone do not
    /// fit under the cap.
    pub fn compose_parts(
        &self,
        headline: &str,
        body: &str,
        link: Option<&str>,
    ) -> Result<ComposedPost, ComposeError> {
        let cap = self.settings.hard_cap;
        let mut headline = headline.to_string();
        let mut text = self.assemble(&headline, body, link);
        let mut headline_trimmed = 0;

        let len = char_len(&text);
        if len > cap {
            let excess = len - cap;
            let headline_len = char_len(&headline);
            let keep = headline_len.saturating_sub(excess + 1);
            let kept = truncate_chars(&headline, keep).trim_end().to_string();
            headline_trimmed = headline_len - char_len(&kept);
            headline = kept;
            text = self.assemble(&headline, body, link);
            debug!(excess, headline_trimmed, "Trimmed headline to meet hard cap");

            let body_len = char_len(&text);
            if body_len > cap {
                return Err(ComposeError::BodyExceedsCap {
                    body_len,
                    hard_cap: cap,
                });
            }
        }

        let mut padded = 0;
        let len = char_len(&text);
        if len < self.settings.min_post_len {
            padded = self.settings.min_post_len - len;
            text.extend(std::iter::repeat_n(self.settings.pad_char, padded));
            warn!(
                length = len,
                min_post_len = self.settings.min_post_len,
                padded,
                "Post below platform minimum; padded with filler"
            );
        }

        let length = char_len(&text);
        Ok(ComposedPost {
            text,
            length,
            headline_trimmed,
            padded,
        })
    }

    /// Compose the post for a chosen cluster.
    pub fn compose<R: Rng>(
        &self,
        cluster: &TopicCluster,
        body: &FittedText,
        rng: Option<&mut R>,
    ) -> Result<ComposedPost, ComposeError> {
        let representative = cluster.representative();
        let headline = self.headline(representative.title(), rng);
        let link = if self.settings.include_link && !representative.link().is_empty() {
            Some(representative.link())
        } else {
            None
        };
        self.compose_parts(&headline, &body.text, link)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn composer(settings: ComposerSettings) -> Composer {
        Composer::new(settings)
    }

    fn no_rng() -> Option<&'static mut StdRng> {
        None
    }

    #[test]
    fn test_headline_first_five_words_uppercased() {
        let c = composer(ComposerSettings::default());
        assert_eq!(
            c.headline("Global summit begins in Geneva with leaders", no_rng()),
            "GLOBAL SUMMIT BEGINS IN GENEVA"
        );
        assert_eq!(c.headline("Short title", no_rng()), "SHORT TITLE");
    }

    #[test]
    fn test_headline_case_preserved_when_not_uppercased() {
        let c = composer(ComposerSettings {
            uppercase_headline: false,
            headline_words: 2,
            ..Default::default()
        });
        assert_eq!(c.headline("Global summit begins", no_rng()), "Global summit");
    }

    #[test]
    fn test_randomized_headline_is_bounded_and_seeded() {
        let c = composer(ComposerSettings {
            randomize_headline: true,
            uppercase_headline: false,
            ..Default::default()
        });
        let title = "one two three four five six seven";
        let mut a = StdRng::seed_from_u64(7);
        let mut b = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let ha = c.headline(title, Some(&mut a));
            let hb = c.headline(title, Some(&mut b));
            assert_eq!(ha, hb);
            let words = ha.split_whitespace().count();
            assert!((1..=5).contains(&words));
        }
    }

    #[test]
    fn test_compose_order_headline_separator_body_link() {
        let c = composer(ComposerSettings {
            hard_cap: 1000,
            ..Default::default()
        });
        let post = c
            .compose_parts("HEAD", "Body text.", Some("https://x.y/z"))
            .unwrap();
        assert_eq!(post.text, "HEAD: Body text. https://x.y/z");
        assert_eq!(post.headline_trimmed, 0);
        assert_eq!(post.padded, 0);
    }

    #[test]
    fn test_over_cap_trims_headline_only() {
        let c = composer(ComposerSettings {
            hard_cap: 30,
            ..Default::default()
        });
        let body = "b".repeat(20);
        // "HEADLINE WORDS" (14) + ": " (2) + 20 = 36, excess 6, trim 7.
        let post = c.compose_parts("HEADLINE WORDS", &body, None).unwrap();
        assert_eq!(post.text, format!("HEADLIN: {body}"));
        assert!(post.length <= 30);
        assert_eq!(post.headline_trimmed, 7);
        assert!(post.text.ends_with(&body));
    }

    #[test]
    fn test_headline_dropped_when_exhausted() {
        let c = composer(ComposerSettings {
            hard_cap: 21,
            ..Default::default()
        });
        let body = "b".repeat(21);
        let post = c.compose_parts("HEAD", &body, None).unwrap();
        assert_eq!(post.text, body);
        assert_eq!(post.headline_trimmed, 4);
    }

    #[test]
    fn test_body_alone_over_cap_is_error() {
        let c = composer(ComposerSettings {
            hard_cap: 10,
            ..Default::default()
        });
        let err = c.compose_parts("HEAD", &"b".repeat(11), None).unwrap_err();
        assert!(matches!(
            err,
            ComposeError::BodyExceedsCap {
                body_len: 11,
                hard_cap: 10
            }
        ));
    }

    #[test]
    fn test_pads_to_minimum() {
        let c = composer(ComposerSettings {
            min_post_len: 20,
            pad_char: '.',
            ..Default::default()
        });
        let post = c.compose_parts("HI", "short", None).unwrap();
        assert_eq!(post.text, "HI: short...........");
        assert_eq!(post.length, 20);
        assert_eq!(post.padded, 11);
    }

    #[test]
    fn test_output_never_exceeds_cap() {
        let c = composer(ComposerSettings {
            hard_cap: 280,
            include_link: false,
            ..Default::default()
        });
        for headline_len in [0, 1, 5, 30, 60] {
            for body_len in [0, 100, 240, 270, 278, 279, 280] {
                let headline = "H".repeat(headline_len);
                let body = "é".repeat(body_len);
                if let Ok(post) = c.compose_parts(&headline, &body, None) {
                    assert!(post.length <= 280, "{headline_len}/{body_len} -> {}", post.length);
                    assert_eq!(post.length, char_len(&post.text));
                    assert!(post.text.ends_with(&body));
                }
            }
        }
    }
}
