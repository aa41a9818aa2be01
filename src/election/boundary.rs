//! Boundary-node election
//!
//! Inter-cluster messages travel through one elected boundary node per
//! neighboring cluster. Neighbors are clusters whose centroids lie within
//! the inter-cluster detection range; the boundary pick favors proximity
//! to the neighbor, then trust, own-cluster connectivity, and stability.

use crate::clustering::ClusteringEngine;
use crate::config::SimConfig;
use crate::proximity::SpatialGrid;
use crate::store::NodeStore;
use crate::trust::{CompositeContext, TrustEngine};
use crate::types::{ClusterId, NodeId};
use std::collections::BTreeMap;
use tracing::debug;

/// Run the boundary election across every cluster, replacing each
/// cluster's boundary map.
pub fn elect_boundaries(
    clustering: &mut ClusteringEngine,
    store: &mut NodeStore,
    trust: &TrustEngine,
    grid: &SpatialGrid,
    config: &SimConfig,
    tick: u64,
) {
    // Read pass over an immutable snapshot of centroids, then apply.
    let centroids: Vec<(ClusterId, crate::types::Position)> = clustering
        .iter()
        .map(|c| (c.id, c.centroid))
        .collect();
    if centroids.len() < 2 {
        for &(id, _) in &centroids {
            clustering.set_boundary_map(id, BTreeMap::new(), store);
        }
        return;
    }

    let mut new_maps: Vec<(ClusterId, BTreeMap<ClusterId, NodeId>)> = Vec::new();

    for &(cluster_id, centroid) in &centroids {
        let Some(cluster) = clustering.get(cluster_id) else {
            continue;
        };
        let mut map = BTreeMap::new();

        for &(neighbor_id, neighbor_centroid) in &centroids {
            if neighbor_id == cluster_id {
                continue;
            }
            if centroid.distance_to(&neighbor_centroid) > config.inter_cluster_detection {
                continue;
            }

            let mut best: Option<(NodeId, f64)> = None;
            for &member in &cluster.members {
                let Some(node) = store.get(member) else { continue };

                let distance_to_neighbor = node.position.distance_to(&neighbor_centroid);
                let proximity =
                    (1.0 - distance_to_neighbor / config.inter_cluster_detection).max(0.0);

                let reachable_peers = cluster
                    .members
                    .iter()
                    .filter(|&&other| other != member)
                    .filter_map(|&other| store.get(other))
                    .filter(|peer| {
                        node.position.distance_to(&peer.position) <= config.radio_range_r
                    })
                    .count();
                let connectivity =
                    (reachable_peers as f64 / cluster.size().max(1) as f64).min(1.0);

                let ctx = CompositeContext {
                    distance_to_centroid: Some(node.position.distance_to(&cluster.centroid)),
                    neighbor_count: grid
                        .neighbors_within(&node.position, config.radio_range_r, Some(member))
                        .len(),
                    tick,
                };
                let score = 0.40 * proximity
                    + 0.30 * node.trust_score
                    + 0.20 * connectivity
                    + 0.10 * trust.stability_score(node, &ctx);

                if best.map_or(true, |(_, b)| score > b) {
                    best = Some((member, score));
                }
            }
            if let Some((member, score)) = best {
                debug!(cluster = %cluster_id, neighbor = %neighbor_id, boundary = %member, score, "boundary chosen");
                map.insert(neighbor_id, member);
            }
        }
        new_maps.push((cluster_id, map));
    }

    for (cluster_id, map) in new_maps {
        clustering.set_boundary_map(cluster_id, map, store);
    }
}
