//! Publishing of the composed post.
//!
//! The run loop talks to a [`Publisher`]; which platform sits behind it is a
//! deployment choice.
//!
//! | Publisher | Behaviour |
//! |-----------|-----------|
//! | [`WebhookPublisher`] | HTTP `POST` of `{"text", "media"}` as JSON with an optional bearer token |
//! | [`DryRunPublisher`] | Logs the post and returns a synthetic id |
//!
//! [`AnyPublisher`] picks one of the two at startup.
//!
//! # Failure mapping
//!
//! | Response | Error |
//! |----------|-------|
//! | `429 Too Many Requests` | [`PublishError::RateLimited`] (honours `Retry-After` seconds) |
//! | any other non-2xx | [`PublishError::Rejected`] with status and body |
//! | connect/timeout failure | [`PublishError::Transport`] |

use crate::error::PublishError;
use crate::utils::truncate_for_log;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{error, info, instrument, warn};

/// A platform the final post is handed to.
pub trait Publisher {
    /// Publish `text` with an optional media reference and return the
    /// platform's post id.
    async fn publish(&self, text: &str, media: Option<&str>) -> Result<String, PublishError>;
}

/// Publisher configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishSettings {
    /// Webhook endpoint; without one the run is a dry run.
    pub url: Option<String>,
    /// Per-request timeout.
    pub timeout_secs: u64,
    /// Attach the cluster's first image as media.
    pub attach_media: bool,
}

impl Default for PublishSettings {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: 30,
            attach_media: true,
        }
    }
}

#[derive(Debug, Serialize)]
struct PublishRequest<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    media: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct PublishResponse {
    id: String,
}

/// Posts JSON to an HTTP endpoint.
#[derive(Debug, Clone)]
pub struct WebhookPublisher {
    client: Client,
    url: String,
    token: Option<String>,
}

impl WebhookPublisher {
    /// # Errors
    ///
    /// Fails only if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, token: Option<String>, timeout: Duration) -> Result<Self, PublishError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
            token,
        })
    }
}

impl Publisher for WebhookPublisher {
    #[instrument(level = "info", skip_all, fields(url = %self.url, length = text.chars().count()))]
    async fn publish(&self, text: &str, media: Option<&str>) -> Result<String, PublishError> {
        let t0 = Instant::now();
        let mut request = self.client.post(&self.url).json(&PublishRequest { text, media });
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            error!(error = %e, "Publish request failed");
            PublishError::from(e)
        })?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            warn!(?retry_after_secs, "Publish rate limited");
            return Err(PublishError::RateLimited { retry_after_secs });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %truncate_for_log(&body, 300), "Publish rejected");
            return Err(PublishError::Rejected {
                status: status.as_u16(),
                message: truncate_for_log(&body, 300),
            });
        }

        let parsed: PublishResponse = response
            .json()
            .await
            .map_err(|e| PublishError::Transport(format!("invalid publish response: {e}")))?;
        info!(
            post_id = %parsed.id,
            elapsed_ms = t0.elapsed().as_millis(),
            "Published post"
        );
        Ok(parsed.id)
    }
}

/// Logs the post instead of sending it.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunPublisher;

impl Publisher for DryRunPublisher {
    async fn publish(&self, text: &str, media: Option<&str>) -> Result<String, PublishError> {
        info!(length = text.chars().count(), media = ?media, %text, "Dry run: not publishing");
        Ok("dry-run".to_string())
    }
}

/// The publisher chosen at startup.
#[derive(Debug, Clone)]
pub enum AnyPublisher {
    Webhook(WebhookPublisher),
    DryRun(DryRunPublisher),
}

impl AnyPublisher {
    /// A webhook publisher when a URL is configured and this is not a dry
    /// run, otherwise the dry-run publisher.
    pub fn from_settings(
        settings: &PublishSettings,
        token: Option<String>,
        dry_run: bool,
    ) -> Result<Self, PublishError> {
        match (&settings.url, dry_run) {
            (Some(url), false) => Ok(AnyPublisher::Webhook(WebhookPublisher::new(
                url.clone(),
                token,
                Duration::from_secs(settings.timeout_secs),
            )?)),
            _ => Ok(AnyPublisher::DryRun(DryRunPublisher)),
        }
    }
}

impl Publisher for AnyPublisher {
    async fn publish(&self, text: &str, media: Option<&str>) -> Result<String, PublishError> {
        match self {
            AnyPublisher::Webhook(p) => p.publish(text, media).await,
            AnyPublisher::DryRun(p) => p.publish(text, media).await,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn publisher(server: &MockServer, token: Option<&str>) -> WebhookPublisher {
        WebhookPublisher::new(
            format!("{}/posts", server.uri()),
            token.map(str::to_string),
            Duration::from_secs(5),
        )
        .expect("client construction should not fail")
    }

    #[tokio::test]
    async fn test_webhook_success_returns_post_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/posts"))
            .and(header("authorization", "Bearer secret"))
            .and(body_json(serde_json::json!({
                "text": "HELLO: world",
                "media": "https://img/1.jpg"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": "12345"})))
            .mount(&server)
            .await;

        let id = publisher(&server, Some("secret"))
            .publish("HELLO: world", Some("https://img/1.jpg"))
            .await
            .unwrap();
        assert_eq!(id, "12345");
    }

    #[tokio::test]
    async fn test_webhook_429_is_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "900"))
            .mount(&server)
            .await;

        let err = publisher(&server, None).publish("text", None).await.unwrap_err();
        assert!(matches!(
            err,
            PublishError::RateLimited {
                retry_after_secs: Some(900)
            }
        ));
    }

    #[tokio::test]
    async fn test_webhook_403_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("Status is a duplicate."))
            .mount(&server)
            .await;

        let err = publisher(&server, None).publish("text", None).await.unwrap_err();
        match err {
            PublishError::Rejected { status, message } => {
                assert_eq!(status, 403);
                assert!(message.contains("duplicate"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_webhook_unparseable_success_body_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let err = publisher(&server, None).publish("text", None).await.unwrap_err();
        assert!(matches!(err, PublishError::Transport(_)));
    }

    #[test]
    fn test_any_publisher_selection() {
        let mut settings = PublishSettings::default();
        assert!(matches!(
            AnyPublisher::from_settings(&settings, None, false).unwrap(),
            AnyPublisher::DryRun(_)
        ));
        settings.url = Some("https://example.com/hook".to_string());
        assert!(matches!(
            AnyPublisher::from_settings(&settings, None, false).unwrap(),
            AnyPublisher::Webhook(_)
        ));
        assert!(matches!(
            AnyPublisher::from_settings(&settings, None, true).unwrap(),
            AnyPublisher::DryRun(_)
        ));
    }

    #[tokio::test]
    async fn test_dry_run_returns_synthetic_id() {
        assert_eq!(DryRunPublisher.publish("text", None).await.unwrap(), "dry-run");
    }
}
