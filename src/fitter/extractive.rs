//! Extractive fitting: pick a contiguous run of source sentences whose length
//! lands inside the target window.

use super::LengthWindow;
use crate::error::FitError;
use crate::models::FittedText;
use crate::utils::{char_len, normalize_whitespace};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

/// Sentence-ending punctuation, optional closing quotes or brackets, then
/// whitespace.
static SENTENCE_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[.!?]+["'”’)\]]*\s+"#).expect("static regex"));

/// Split text into sentences after whitespace normalization.
///
/// Each sentence keeps its terminating punctuation. Text without any
/// sentence break comes back as a single sentence.
pub fn split_sentences(text: &str) -> Vec<String> {
    let text = normalize_whitespace(text);
    let mut sentences = Vec::new();
    let mut start = 0;
    for m in SENTENCE_END.find_iter(&text) {
        let sentence = text[start..m.end()].trim();
        if !sentence.is_empty() {
            sentences.push(sentence.to_string());
        }
        start = m.end();
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }
    sentences
}

/// Fit `source` into `window` by sentence selection.
///
/// For each start sentence the span is grown while it stays within
/// `window.max_len`. The first span (lowest start) that also reaches
/// `window.min_len` wins. Failing that, the longest span seen, counting a
/// lone sentence that overshoots `max_len` on its own, is returned with
/// `within_bounds = false` when it reaches `min_len`.
///
/// # Errors
///
/// [`FitError::EmptySource`] when there is no text, [`FitError::NoUsableText`]
/// when nothing reaches `min_len`.
pub fn fit_extractive(source: &str, window: LengthWindow) -> Result<FittedText, FitError> {
    let sentences = split_sentences(source);
    if sentences.is_empty() {
        return Err(FitError::EmptySource);
    }
    let lengths: Vec<usize> = sentences.iter().map(|s| char_len(s)).collect();
    let n = sentences.len();

    // (start, end, length) of the longest span seen so far
    let mut longest: Option<(usize, usize, usize)> = None;

    for i in 0..n {
        let mut j = i;
        let mut len = 0usize;
        while j < n {
            let extended = if j == i { lengths[j] } else { len + 1 + lengths[j] };
            if extended > window.max_len {
                break;
            }
            len = extended;
            j += 1;
        }

        let (end, span_len) = if j > i { (j, len) } else { (i + 1, lengths[i]) };
        if j > i && window.contains(span_len) {
            let text = sentences[i..end].join(" ");
            debug!(start = i, end, length = span_len, "Extractive span fits window");
            return Ok(FittedText {
                text,
                length: span_len,
                within_bounds: true,
                attempts: i + 1,
            });
        }
        if longest.is_none_or(|(_, _, l)| span_len > l) {
            longest = Some((i, end, span_len));
        }
    }

    match longest {
        Some((i, end, len)) if len >= window.min_len => {
            warn!(
                start = i,
                end,
                length = len,
                min = window.min_len,
                max = window.max_len,
                "No sentence span fits the window; returning best effort"
            );
            Ok(FittedText {
                text: sentences[i..end].join(" "),
                length: len,
                within_bounds: false,
                attempts: n,
            })
        }
        _ => Err(FitError::NoUsableText {
            min_len: window.min_len,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(min_len: usize, max_len: usize) -> LengthWindow {
        LengthWindow { min_len, max_len }
    }

    fn sentence(k: usize, len: usize) -> String {
        let prefix = format!("S{k} ");
        format!("{prefix}{}.", "w".repeat(len - prefix.len() - 1))
    }

    #[test]
    fn test_split_sentences() {
        let s = split_sentences("First one. Second one!  Third?\n\"Quoted.\" Tail without stop");
        assert_eq!(
            s,
            vec!["First one.", "Second one!", "Third?", "\"Quoted.\"", "Tail without stop"]
        );
    }

    #[test]
    fn test_split_keeps_decimal_points_together() {
        let s = split_sentences("Growth hit 2.5 percent. Markets rose.");
        assert_eq!(s, vec!["Growth hit 2.5 percent.", "Markets rose."]);
    }

    #[test]
    fn test_six_sentence_body_fits_240_280() {
        let body: Vec<String> = (0..6).map(|k| sentence(k, 83)).collect();
        let body = body.join(" ");
        assert_eq!(char_len(&body), 503);

        let fitted = fit_extractive(&body, window(240, 280)).unwrap();
        assert!(fitted.within_bounds);
        assert_eq!(fitted.length, 251);
        assert_eq!(char_len(&fitted.text), fitted.length);
        assert!(fitted.text.starts_with("S0 "));
        assert!(body.contains(&fitted.text));
    }

    #[test]
    fn test_first_start_index_wins() {
        // 200 alone is short; 200 + 1 + 100 overshoots; later spans fit.
        let body = [sentence(0, 200), sentence(1, 100), sentence(2, 150)].join(" ");
        let fitted = fit_extractive(&body, window(240, 280)).unwrap();
        assert!(fitted.within_bounds);
        assert_eq!(fitted.length, 251);
        assert!(fitted.text.starts_with("S1 "));
        assert_eq!(fitted.attempts, 2);
    }

    #[test]
    fn test_overlong_sentence_is_best_effort() {
        let body = [sentence(0, 300), sentence(1, 150)].join(" ");
        let fitted = fit_extractive(&body, window(240, 280)).unwrap();
        assert!(!fitted.within_bounds);
        assert_eq!(fitted.length, 300);
    }

    #[test]
    fn test_short_text_fails() {
        let body = [sentence(0, 150), sentence(1, 150)].join(" ");
        assert!(matches!(
            fit_extractive(&body, window(240, 280)),
            Err(FitError::NoUsableText { min_len: 240 })
        ));
    }

    #[test]
    fn test_empty_source_fails() {
        assert!(matches!(
            fit_extractive("  \n ", window(240, 280)),
            Err(FitError::EmptySource)
        ));
    }

    #[test]
    fn test_within_bounds_implies_length_in_window() {
        let lengths = [40, 90, 130, 77, 260, 12, 55, 199, 81, 64];
        let body = lengths
            .iter()
            .enumerate()
            .map(|(k, l)| sentence(k, *l))
            .collect::<Vec<_>>()
            .join("\r\n");
        for (min_len, max_len) in [(240, 280), (260, 280), (270, 280), (100, 140)] {
            if let Ok(f) = fit_extractive(&body, window(min_len, max_len)) {
                if f.within_bounds {
                    let len = char_len(&normalize_whitespace(&f.text));
                    assert!(min_len <= len && len <= max_len, "{len} not in [{min_len},{max_len}]");
                }
            }
        }
    }
}
