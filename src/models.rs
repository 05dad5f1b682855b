//! Data models for feed items, topic clusters and fitted text.
//!
//! - [`RawArticle`]: one item as handed over by a feed provider, untouched
//! - [`ArticleRecord`]: the canonical, immutable record the pipeline works on
//! - [`TopicCluster`]: all records sharing one topic key
//! - [`FittedText`]: a body produced by the text fitter
//!
//! A record's topic key is derived once, at construction, from its title.

use crate::normalize::topic_key;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A raw feed item as produced by a feed provider.
///
/// Every field is kept exactly as found in the feed; the timestamp in
/// particular is an unparsed string because feeds disagree on formats.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawArticle {
    /// The item's headline.
    pub title: String,
    /// Description, summary or content, possibly containing HTML.
    pub body: String,
    /// The publication timestamp as it appeared in the feed.
    pub published: Option<String>,
    /// Link to the full story.
    pub link: String,
    /// Region tag of the feed this item came from.
    pub region: String,
    /// First image attached to the item, if any.
    pub image: Option<String>,
}

/// A canonical news item.
///
/// Constructed through [`ArticleRecord::new`], which derives the topic key.
/// Fields are read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleRecord {
    title: String,
    topic_key: String,
    region: String,
    body_text: String,
    published_at: Option<DateTime<Utc>>,
    link: String,
    image_ref: Option<String>,
}

impl ArticleRecord {
    pub fn new(
        title: impl Into<String>,
        region: impl Into<String>,
        body_text: impl Into<String>,
        published_at: Option<DateTime<Utc>>,
        link: impl Into<String>,
        image_ref: Option<String>,
    ) -> Self {
        let title = title.into();
        Self {
            topic_key: topic_key(&title),
            title,
            region: region.into(),
            body_text: body_text.into(),
            published_at,
            link: link.into(),
            image_ref,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn topic_key(&self) -> &str {
        &self.topic_key
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn body_text(&self) -> &str {
        &self.body_text
    }

    /// `None` when the feed timestamp was missing or could not be parsed.
    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        self.published_at
    }

    pub fn link(&self) -> &str {
        &self.link
    }

    pub fn image_ref(&self) -> Option<&str> {
        self.image_ref.as_deref()
    }
}

/// All records that share a topic key.
///
/// `members` is never empty and keeps first-seen order; `regions` is the
/// union of the members' regions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicCluster {
    topic_key: String,
    members: Vec<ArticleRecord>,
    regions: BTreeSet<String>,
}

impl TopicCluster {
    /// Start a cluster from its first member.
    pub(crate) fn new(first: ArticleRecord) -> Self {
        let mut regions = BTreeSet::new();
        regions.insert(first.region.clone());
        Self {
            topic_key: first.topic_key.clone(),
            members: vec![first],
            regions,
        }
    }

    /// Append a member. Caller guarantees the topic key matches.
    pub(crate) fn push(&mut self, record: ArticleRecord) {
        debug_assert_eq!(record.topic_key, self.topic_key);
        self.regions.insert(record.region.clone());
        self.members.push(record);
    }

    pub fn topic_key(&self) -> &str {
        &self.topic_key
    }

    pub fn members(&self) -> &[ArticleRecord] {
        &self.members
    }

    pub fn regions(&self) -> &BTreeSet<String> {
        &self.regions
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    pub fn occurrence_count(&self) -> usize {
        self.members.len()
    }

    /// The newest publication time among the members.
    pub fn latest_published(&self) -> Option<DateTime<Utc>> {
        self.members.iter().filter_map(|m| m.published_at).max()
    }

    /// The first-seen member; its title feeds the headline.
    pub fn representative(&self) -> &ArticleRecord {
        &self.members[0]
    }

    /// First image attached to any member, in member order.
    pub fn image_ref(&self) -> Option<&str> {
        self.members.iter().find_map(|m| m.image_ref())
    }

    /// Source text for fitting: the members' bodies in member order.
    ///
    /// Members without a body contribute their title instead. Each piece is
    /// terminated with a period when it lacks sentence-ending punctuation so
    /// pieces do not run together into one sentence.
    pub fn source_text(&self) -> String {
        self.members
            .iter()
            .map(|m| {
                let piece = if m.body_text.trim().is_empty() {
                    m.title.trim()
                } else {
                    m.body_text.trim()
                };
                if piece.ends_with(['.', '!', '?']) {
                    piece.to_string()
                } else {
                    format!("{piece}.")
                }
            })
            .filter(|p| p != ".")
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Text produced by the fitter for one cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FittedText {
    /// Whitespace-normalized body text.
    pub text: String,
    /// Length of `text` in characters.
    pub length: usize,
    /// Whether `length` lies inside the requested window.
    pub within_bounds: bool,
    /// Number of fitting or generation tries it took.
    pub attempts: usize,
}
