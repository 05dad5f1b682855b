//! Feed ingestion.
//!
//! Each configured [`FeedSource`] is fetched through a [`FeedProvider`] and
//! parsed by [`rss::parse_feed`]. Sources are fetched concurrently; a source
//! that fails is logged and excluded without affecting the others.
//!
//! # Default sources
//!
//! | Region | Feeds |
//! |--------|-------|
//! | `europe` | BBC Europe, RTBF, Der Standard, Le Monde, Spiegel International |
//! | `asia` | SCMP, Japan Times, Times of India, Al Jazeera, China Daily |
//! | `africa` | AllAfrica, BBC Africa, EWN, The East African, VOA Africa |
//! | `north_america` | CNN, NYT World, Fox News, NPR, CBC World |
//! | `south_america` | Buenos Aires Times, El País América, Nodal, Folha, Americas Quarterly |

pub mod rss;

use crate::error::FetchError;
use crate::models::RawArticle;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument};

/// One feed address and the region it reports from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSource {
    pub url: String,
    pub region: String,
}

impl FeedSource {
    pub fn new(url: &str, region: &str) -> Self {
        Self {
            url: url.to_string(),
            region: region.to_string(),
        }
    }
}

/// Turns a feed address into raw articles.
pub trait FeedProvider {
    async fn fetch(&self, source: &FeedSource) -> Result<Vec<RawArticle>, FetchError>;
}

/// Fetches feeds over HTTP.
#[derive(Debug, Clone)]
pub struct HttpFeedProvider {
    client: Client,
    timeout: Duration,
}

impl HttpFeedProvider {
    /// # Errors
    ///
    /// Fails only if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, timeout })
    }
}

impl FeedProvider for HttpFeedProvider {
    #[instrument(level = "info", skip_all, fields(url = %source.url, region = %source.region))]
    async fn fetch(&self, source: &FeedSource) -> Result<Vec<RawArticle>, FetchError> {
        let t0 = Instant::now();
        let response = self.client.get(&source.url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(self.timeout)
            } else {
                FetchError::Http(e)
            }
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }
        let body = response.text().await?;
        let items = rss::parse_feed(&body, &source.region)?;
        info!(
            count = items.len(),
            bytes = body.len(),
            elapsed_ms = t0.elapsed().as_millis(),
            "Parsed feed"
        );
        Ok(items)
    }
}

/// Fetch every source concurrently and flatten the results.
///
/// At most `concurrency` requests are in flight; results keep source order.
/// Sources that fail are logged and contribute nothing.
#[instrument(level = "info", skip_all, fields(sources = sources.len(), concurrency))]
pub async fn fetch_all<P: FeedProvider>(
    provider: &P,
    sources: &[FeedSource],
    concurrency: usize,
) -> Vec<RawArticle> {
    let results: Vec<Option<Vec<RawArticle>>> = stream::iter(sources.iter())
        .map(|source| async move {
            match provider.fetch(source).await {
                Ok(items) => {
                    debug!(url = %source.url, count = items.len(), "Fetched feed");
                    Some(items)
                }
                Err(e) => {
                    error!(url = %source.url, region = %source.region, error = %e, "Feed fetch failed; excluding source");
                    None
                }
            }
        })
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let failed = results.iter().filter(|r| r.is_none()).count();
    let articles: Vec<RawArticle> = results.into_iter().flatten().flatten().collect();
    info!(
        sources = sources.len(),
        failed,
        articles = articles.len(),
        "Fetched feeds"
    );
    articles
}

/// The per-region feed table used when no config overrides it.
pub fn default_feeds() -> Vec<FeedSource> {
    let table: [(&str, &[&str]); 5] = [
        (
            "europe",
            &[
                "http://feeds.bbci.co.uk/news/world/europe/rss.xml",
                "https://www.rtbf.be/info/rss/monde.xml",
                "https://www.derstandard.at/rss",
                "https://www.lemonde.fr/rss/une.xml",
                "https://www.spiegel.de/international/index.rss",
            ],
        ),
        (
            "asia",
            &[
                "https://www.scmp.com/rss/91/feed",
                "https://www.japantimes.co.jp/feed/",
                "https://timesofindia.indiatimes.com/rssfeeds/-2128936835.cms",
                "https://www.aljazeera.com/xml/rss/all.xml",
                "https://www.chinadaily.com.cn/rss/china_rss.xml",
            ],
        ),
        (
            "africa",
            &[
                "https://allafrica.com/tools/headlines/rdf/latest/headlines.rdf",
                "https://www.bbc.co.uk/news/world/africa/rss.xml",
                "https://ewn.co.za/RSS",
                "https://www.theeastafrican.co.ke/feeds/2543720-2543720-format-rss-6rjdh0z/index.xml",
                "https://www.voaafrica.com/api/zrripe_vqopi",
            ],
        ),
        (
            "north_america",
            &[
                "http://rss.cnn.com/rss/edition_us.rss",
                "https://rss.nytimes.com/services/xml/rss/nyt/World.xml",
                "https://feeds.foxnews.com/foxnews/latest",
                "https://www.npr.org/rss/rss.php?id=1004",
                "https://www.cbc.ca/cmlink/rss-world",
            ],
        ),
        (
            "south_america",
            &[
                "https://www.batimes.com.ar/rss",
                "https://feeds.elpais.com/mrss-s/pages/ep/site/elpais.com/section/america/portada",
                "https://www.nodal.am/feed/",
                "https://www1.folha.uol.com.br/mercado/rss091.xml",
                "https://www.americasquarterly.org/feed/",
            ],
        ),
    ];
    table
        .iter()
        .flat_map(|(region, urls)| urls.iter().map(move |url| FeedSource::new(url, region)))
        .collect()
}
