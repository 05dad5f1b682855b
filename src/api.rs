//! Text generation through an OpenAI-compatible LLM via `awful_aj`.
//!
//! [`AwfulAjGenerator`] is the production [`TextGenerator`]. It makes one
//! request per call; retries and the length check belong to the fitter.

use crate::config::GenerationSettings;
use crate::error::GenerationError;
use crate::fitter::LengthWindow;
use crate::fitter::generative::TextGenerator;
use crate::utils::truncate_for_log;
use awful_aj::api::ask;
use awful_aj::{config, config::AwfulJadeConfig, config_dir, template, template::ChatTemplate};
use std::error::Error;
use std::fmt;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

/// Wraps `awful_aj::api::ask` with a per-request timeout.
pub struct AwfulAjGenerator {
    config: AwfulJadeConfig,
    template: ChatTemplate,
    timeout: Duration,
}

impl fmt::Debug for AwfulAjGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwfulAjGenerator")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl AwfulAjGenerator {
    pub fn new(config: AwfulJadeConfig, template: ChatTemplate, timeout: Duration) -> Self {
        Self {
            config,
            template,
            timeout,
        }
    }

    /// Load the model config and chat template named in `settings`.
    ///
    /// Startup only: a missing template or config stops the process.
    #[instrument(level = "info", skip_all, fields(template = %settings.template))]
    pub async fn load(settings: &GenerationSettings) -> Result<Self, Box<dyn Error>> {
        let template = template::load_template(&settings.template).await?;
        info!(template = %settings.template, "Loaded template");

        let conf_file = match &settings.aj_config {
            Some(path) => path.clone(),
            None => config_dir()?.join("config.yaml"),
        };
        let config_path = conf_file
            .to_str()
            .ok_or_else(|| format!("not a valid config filename: {}", conf_file.display()))?;
        let config = config::load_config(config_path)?;
        info!(config_path, "Loaded generation configuration");

        Ok(Self::new(
            config,
            template,
            Duration::from_secs(settings.timeout_secs),
        ))
    }
}

impl TextGenerator for AwfulAjGenerator {
    #[instrument(level = "info", skip_all, fields(min = window.min_len, max = window.max_len))]
    async fn generate(&self, prompt: &str, window: LengthWindow) -> Result<String, GenerationError> {
        let t0 = Instant::now();
        let res = timeout(
            self.timeout,
            ask(&self.config, prompt.to_string(), &self.template, None, None),
        )
        .await;
        let dt = t0.elapsed();

        match res {
            Err(_) => {
                warn!(elapsed_ms = dt.as_millis(), timeout = ?self.timeout, "API call timed out");
                Err(GenerationError::Timeout(self.timeout))
            }
            Ok(Err(e)) => {
                let message = e.to_string();
                warn!(elapsed_ms = dt.as_millis(), error = %truncate_for_log(&message, 300), "API call failed");
                Err(classify_backend_error(&message))
            }
            Ok(Ok(text)) => {
                debug!(
                    elapsed_ms = dt.as_millis(),
                    response = %truncate_for_log(&text, 200),
                    "API call succeeded"
                );
                let text = strip_wrapping_quotes(text.trim());
                if text.is_empty() {
                    Err(GenerationError::Empty)
                } else {
                    Ok(text.to_string())
                }
            }
        }
    }
}

/// Map a backend error message to a throttle or a generic failure.
fn classify_backend_error(message: &str) -> GenerationError {
    let lower = message.to_lowercase();
    if lower.contains("429") || lower.contains("rate limit") || lower.contains("too many requests") {
        GenerationError::Throttled
    } else {
        GenerationError::Backend(truncate_for_log(message, 300))
    }
}

/// Models often wrap the whole reply in quotes despite the prompt.
fn strip_wrapping_quotes(text: &str) -> &str {
    let pairs = [('"', '"'), ('“', '”'), ('\'', '\'')];
    for (open, close) in pairs {
        if let Some(inner) = text
            .strip_prefix(open)
            .and_then(|t| t.strip_suffix(close))
        {
            return inner.trim();
        }
    }
    text
}
