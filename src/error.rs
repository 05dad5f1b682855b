//! Typed failures for every external call site and pipeline stage.
//!
//! None of these reach the process boundary: the run loop in
//! [`crate::pipeline`] maps each one to a [`crate::pipeline::RunOutcome`] or a
//! logged skip.

use std::time::Duration;
use thiserror::Error;

/// A single feed address could not be turned into raw articles.
///
/// Swallowed by the run loop: the address is excluded, the run continues.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("feed returned HTTP {status}")]
    Status { status: u16 },

    #[error("XML parse error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("feed timed out after {0:?}")]
    Timeout(Duration),
}

/// The text generation backend did not return usable text.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation backend error: {0}")]
    Backend(String),

    #[error("generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("generation backend throttled the request")]
    Throttled,

    #[error("generation returned empty text")]
    Empty,

    #[error("all {attempts} generation attempts failed; last error: {last}")]
    Exhausted { attempts: usize, last: String },
}

/// No usable text could be fitted for a cluster.
#[derive(Debug, Error)]
pub enum FitError {
    #[error("no sentence span reaches the minimum length of {min_len} characters")]
    NoUsableText { min_len: usize },

    #[error("cluster has no source text")]
    EmptySource,

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

/// The composed post cannot be brought under the hard cap.
#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("body of {body_len} characters exceeds the hard cap of {hard_cap} on its own")]
    BodyExceedsCap { body_len: usize, hard_cap: usize },
}

/// The publish collaborator refused or failed the post.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("publish rate limited (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("publish rejected with HTTP {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("publish transport error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for PublishError {
    fn from(e: reqwest::Error) -> Self {
        PublishError::Transport(e.to_string())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML in config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum RunLogError {
    #[error("run log I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("run log JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_is_distinguishable() {
        let limited = PublishError::RateLimited {
            retry_after_secs: Some(900),
        };
        let rejected = PublishError::Rejected {
            status: 403,
            message: "duplicate".to_string(),
        };
        assert!(limited.to_string().contains("900"));
        assert!(!matches!(rejected, PublishError::RateLimited { .. }));
        assert!(rejected.to_string().contains("403"));
    }

    #[test]
    fn test_fit_error_wraps_generation_error() {
        let err: FitError = GenerationError::Throttled.into();
        assert!(matches!(err, FitError::Generation(GenerationError::Throttled)));
    }
}
