//! Relay election
//!
//! Members beyond direct radio range of the leader still need
//! intra-cluster delivery. For each stranded member, the best-placed
//! in-range helper is chosen by a weighted score; the union of chosen
//! helpers becomes the cluster's relay set.

use crate::clustering::Cluster;
use crate::config::SimConfig;
use crate::proximity::SpatialGrid;
use crate::store::NodeStore;
use crate::trust::{CompositeContext, TrustEngine};
use crate::types::NodeId;
use std::collections::BTreeSet;
use tracing::debug;

/// Elect the relay set for one cluster. Empty when every member already
/// sits within radio range of the leader.
pub fn elect_relays(
    cluster: &Cluster,
    store: &NodeStore,
    trust: &TrustEngine,
    grid: &SpatialGrid,
    config: &SimConfig,
    tick: u64,
) -> BTreeSet<NodeId> {
    let mut relays = BTreeSet::new();
    let Some(leader) = store.get(cluster.leader_id) else {
        return relays;
    };
    let leader_position = leader.position;

    let mut in_range: Vec<NodeId> = Vec::new();
    let mut out_of_range: Vec<NodeId> = Vec::new();
    for &member in &cluster.members {
        if member == cluster.leader_id {
            continue;
        }
        let Some(node) = store.get(member) else { continue };
        if node.position.distance_to(&leader_position) <= config.radio_range_r {
            in_range.push(member);
        } else {
            out_of_range.push(member);
        }
    }
    if out_of_range.is_empty() {
        return relays;
    }

    for &stranded_id in &out_of_range {
        let Some(stranded) = store.get(stranded_id) else {
            continue;
        };
        let mut best: Option<(NodeId, f64)> = None;
        for &helper_id in &in_range {
            let Some(helper) = store.get(helper_id) else {
                continue;
            };
            // A helper must actually reach the stranded member.
            if helper.position.distance_to(&stranded.position) > config.radio_range_r {
                continue;
            }

            let reachable = out_of_range
                .iter()
                .filter_map(|&id| store.get(id))
                .filter(|other| {
                    helper.position.distance_to(&other.position) <= config.radio_range_r
                })
                .count();
            let coverage = reachable as f64 / out_of_range.len() as f64;

            let ctx = CompositeContext {
                distance_to_centroid: Some(helper.position.distance_to(&cluster.centroid)),
                neighbor_count: grid
                    .neighbors_within(&helper.position, config.radio_range_r, Some(helper_id))
                    .len(),
                tick,
            };
            let score = 0.35 * helper.trust_score
                + 0.25 * trust.centrality_score(&ctx)
                + 0.20 * trust.stability_score(helper, &ctx)
                + 0.20 * coverage;

            if best.map_or(true, |(_, b)| score > b) {
                best = Some((helper_id, score));
            }
        }
        if let Some((helper_id, score)) = best {
            debug!(cluster = %cluster.id, relay = %helper_id, stranded = %stranded_id, score, "relay chosen");
            relays.insert(helper_id);
        }
    }
    relays
}
