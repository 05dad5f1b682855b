//! Topic clustering: group records by their topic key.

use crate::models::{ArticleRecord, TopicCluster};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use tracing::{debug, info};

/// Clusters keyed by topic key.
pub type ClusterMap = BTreeMap<String, TopicCluster>;

/// Partition `records` into topic clusters in a single pass.
///
/// Every record lands in exactly one cluster, chosen by its topic key alone.
/// Within a cluster, members keep the order in which they were seen.
pub fn cluster_articles(records: Vec<ArticleRecord>) -> ClusterMap {
    let total = records.len();
    let mut clusters = ClusterMap::new();

    for record in records {
        match clusters.entry(record.topic_key().to_string()) {
            Entry::Occupied(mut slot) => slot.get_mut().push(record),
            Entry::Vacant(slot) => {
                slot.insert(TopicCluster::new(record));
            }
        }
    }

    let multi_region = clusters.values().filter(|c| c.region_count() > 1).count();
    info!(
        records = total,
        clusters = clusters.len(),
        multi_region,
        "Clustered records by topic key"
    );
    if let Some(largest) = clusters.values().max_by_key(|c| c.occurrence_count()) {
        debug!(
            topic = %largest.topic_key(),
            members = largest.occurrence_count(),
            regions = largest.region_count(),
            "Largest cluster"
        );
    }
    clusters
}
