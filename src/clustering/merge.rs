//! Overlap merge
//!
//! Mobile clusters drift into each other; without a merge pass the same
//! platoon ends up split across several sub-clusters. Every
//! `merge_interval` ticks, cluster pairs whose leaders sit within
//! `merge_distance` are checked for member overlap: if the overlap ratio
//! exceeds the configured threshold, or the leaders are closer than the
//! force distance, the smaller cluster is absorbed into the larger.
//! Ties break by cluster age (older survives), then by id.

use super::engine::ClusteringEngine;
use crate::store::NodeStore;
use crate::types::{ClusterId, ClusterRole, NodeId, SimEvent};
use tracing::info;

/// Run one merge pass. Returns the number of clusters absorbed.
pub(super) fn merge_overlapping(
    engine: &mut ClusteringEngine,
    tick: u64,
    store: &mut NodeStore,
    events: &mut Vec<SimEvent>,
) -> usize {
    let config = engine.config().clone();
    let ids = engine.ids();
    let mut absorbed_total = 0;

    // Candidate pairs are computed against a stable prefix snapshot; each
    // merge invalidates the absorbed id, so membership is re-checked on use.
    for i in 0..ids.len() {
        for j in (i + 1)..ids.len() {
            let (id_a, id_b) = (ids[i], ids[j]);
            let Some(a) = engine.get(id_a) else { continue };
            let Some(b) = engine.get(id_b) else { continue };

            let Some(leader_a) = store.get(a.leader_id).map(|n| n.position) else {
                continue;
            };
            let Some(leader_b) = store.get(b.leader_id).map(|n| n.position) else {
                continue;
            };
            let leader_distance = leader_a.distance_to(&leader_b);
            if leader_distance >= config.merge_distance {
                continue;
            }

            // Survivor: larger cluster; ties go to the older, then lower id.
            let (survivor_id, absorbed_id) = pick_survivor(a.size(), a.formation_tick, id_a, b.size(), b.formation_tick, id_b);
            let (survivor, absorbed) = if survivor_id == id_a { (a, b) } else { (b, a) };

            let survivor_leader_position = store
                .get(survivor.leader_id)
                .map(|n| n.position)
                .unwrap_or(survivor.centroid);

            // Overlap: absorbed-cluster members already shared with the
            // survivor or within radio range of the survivor's leader.
            let close_members = absorbed
                .members
                .iter()
                .filter(|&&m| {
                    survivor.members.contains(&m)
                        || store.get(m).map_or(false, |n| {
                            n.position.distance_to(&survivor_leader_position)
                                <= config.radio_range_r
                        })
                })
                .count();
            let overlap_ratio = close_members as f64 / absorbed.size().max(1) as f64;

            if overlap_ratio > config.merge_overlap_ratio
                || leader_distance < config.merge_force_distance
            {
                absorb(engine, survivor_id, absorbed_id, tick, store, events);
                absorbed_total += 1;
            }
        }
    }
    absorbed_total
}

fn pick_survivor(
    size_a: usize,
    formed_a: u64,
    id_a: ClusterId,
    size_b: usize,
    formed_b: u64,
    id_b: ClusterId,
) -> (ClusterId, ClusterId) {
    use std::cmp::Ordering;
    // Bigger wins; older (smaller formation tick) wins ties; lower id last.
    match size_a
        .cmp(&size_b)
        .then(formed_b.cmp(&formed_a))
        .then(id_b.0.cmp(&id_a.0))
    {
        Ordering::Less => (id_b, id_a),
        _ => (id_a, id_b),
    }
}

/// Move every member of `absorbed_id` into `survivor_id`, demote the
/// absorbed leader to member, and drop the absorbed cluster.
fn absorb(
    engine: &mut ClusteringEngine,
    survivor_id: ClusterId,
    absorbed_id: ClusterId,
    tick: u64,
    store: &mut NodeStore,
    events: &mut Vec<SimEvent>,
) {
    let Some(absorbed) = engine.clusters_mut().remove(&absorbed_id) else {
        return;
    };
    let moved: Vec<NodeId> = absorbed.members.iter().copied().collect();
    for &member in &moved {
        store.set_boundary(member, false);
        store.set_relay(member, false);
    }

    let Some(survivor) = engine.clusters_mut().get_mut(&survivor_id) else {
        return;
    };
    for &member in &moved {
        survivor.members.insert(member);
        store.set_cluster(member, Some(survivor_id), tick);
    }
    // The secondary leader and co-leader become plain members. A leader
    // that already detached keeps its Unassigned state.
    if absorbed.members.contains(&absorbed.leader_id) {
        store.set_role(absorbed.leader_id, ClusterRole::Member);
    }
    if let Some(co) = absorbed.co_leader_id {
        if absorbed.members.contains(&co) {
            store.set_role(co, ClusterRole::Member);
        }
    }
    survivor.last_update_tick = tick;

    info!(
        survivor = %survivor_id,
        absorbed = %absorbed_id,
        moved = moved.len(),
        "clusters merged"
    );
    events.push(SimEvent::ClusterMerged {
        survivor: survivor_id,
        absorbed: absorbed_id,
        moved_members: moved.len(),
    });
}
