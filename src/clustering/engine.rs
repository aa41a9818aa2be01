//! Cluster records and the per-tick reconcile procedure
//!
//! Reconcile order: detach incompatible members, attach unassigned nodes
//! to their best cluster, seed new clusters from unassigned pairs,
//! recompute aggregates, enforce the radius invariant, dissolve
//! undersized or stale clusters. Overlap merging runs separately on its
//! own cadence (see `merge.rs`).

use crate::config::SimConfig;
use crate::proximity::SpatialGrid;
use crate::store::{NodeRecord, NodeStore};
use crate::types::{
    circular_mean, heading_difference, ClusterId, ClusterRole, DissolveReason, NodeId, Position,
    SimEvent,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// A vehicle cluster. The leader is a distinguished member of
/// `members`; relay and boundary assignments are subsets of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: ClusterId,
    pub leader_id: NodeId,
    pub co_leader_id: Option<NodeId>,
    pub members: BTreeSet<NodeId>,
    pub centroid: Position,
    pub avg_speed: f64,
    pub avg_heading: f64,
    pub formation_tick: u64,
    pub last_update_tick: u64,
    pub relay_set: BTreeSet<NodeId>,
    pub boundary_map: BTreeMap<ClusterId, NodeId>,
}

impl Cluster {
    /// Number of members (leader included)
    pub fn size(&self) -> usize {
        self.members.len()
    }
}

/// Exclusive owner of cluster records
#[derive(Debug)]
pub struct ClusteringEngine {
    config: SimConfig,
    clusters: BTreeMap<ClusterId, Cluster>,
    next_id: u64,
}

impl ClusteringEngine {
    /// Create an engine bound to a configuration
    pub fn new(config: SimConfig) -> Self {
        Self {
            config,
            clusters: BTreeMap::new(),
            next_id: 0,
        }
    }

    /// Read one cluster
    pub fn get(&self, id: ClusterId) -> Option<&Cluster> {
        self.clusters.get(&id)
    }

    /// Iterate clusters in `ClusterId` order
    pub fn iter(&self) -> impl Iterator<Item = &Cluster> {
        self.clusters.values()
    }

    /// All cluster ids, in order
    pub fn ids(&self) -> Vec<ClusterId> {
        self.clusters.keys().copied().collect()
    }

    /// Number of live clusters
    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    /// Whether no clusters exist
    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Run the per-tick reconcile. Returns the ids of newly seeded
    /// clusters, which need a leader election this tick.
    pub fn reconcile(
        &mut self,
        tick: u64,
        store: &mut NodeStore,
        grid: &SpatialGrid,
        events: &mut Vec<SimEvent>,
    ) -> Vec<ClusterId> {
        self.detach_incompatible(tick, store);
        self.attach_unassigned(tick, store);
        let seeded = self.seed_new_clusters(tick, store, grid, events);
        // Each detach shifts the centroid, which can strand another
        // member; iterate to a fixpoint before anyone reads the clusters.
        loop {
            self.refresh_aggregates(tick, store);
            if self.enforce_radius(tick, store) == 0 {
                break;
            }
        }
        self.dissolve_undersized(tick, store, events);
        seeded
    }

    /// Detach members that no longer exist or fell out of compatibility
    /// with their cluster's current aggregates. Speed and heading get the
    /// configured hysteresis; the membership radius is strict.
    fn detach_incompatible(&mut self, tick: u64, store: &mut NodeStore) {
        let stay = self.config.stay_tolerance_factor;
        for cluster in self.clusters.values_mut() {
            let departed: Vec<NodeId> = cluster
                .members
                .iter()
                .copied()
                .filter(|&id| match store.get(id) {
                    None => true,
                    Some(node) => {
                        node.position.distance_to(&cluster.centroid)
                            > self.config.max_cluster_radius
                            || (node.speed - cluster.avg_speed).abs()
                                > self.config.speed_tol * stay
                            || heading_difference(node.heading, cluster.avg_heading)
                                > self.config.heading_tol * stay
                    }
                })
                .collect();
            for id in departed {
                cluster.members.remove(&id);
                cluster.relay_set.remove(&id);
                cluster.boundary_map.retain(|_, &mut b| b != id);
                if cluster.co_leader_id == Some(id) {
                    cluster.co_leader_id = None;
                }
                store.set_cluster(id, None, tick);
                debug!(node = %id, cluster = %cluster.id, "member detached");
            }
        }
    }

    /// Attach each unassigned node to the compatible cluster with the
    /// best weighted score, if any clears the join threshold.
    fn attach_unassigned(&mut self, tick: u64, store: &mut NodeStore) {
        let unassigned: Vec<NodeId> = store
            .iter()
            .filter(|n| n.cluster_id.is_none())
            .map(|n| n.id)
            .collect();

        for id in unassigned {
            let Some(node) = store.get(id) else { continue };
            let mut best: Option<(ClusterId, f64)> = None;
            for cluster in self.clusters.values() {
                if cluster.size() >= self.config.max_cluster_size {
                    continue;
                }
                if !self.node_cluster_compatible(node, cluster) {
                    continue;
                }
                let score = self.join_score(node, cluster);
                if best.map_or(true, |(_, b)| score > b) {
                    best = Some((cluster.id, score));
                }
            }
            if let Some((cluster_id, score)) = best {
                if score >= self.config.join_score_threshold {
                    let cluster = self.clusters.get_mut(&cluster_id).expect("cluster exists");
                    cluster.members.insert(id);
                    store.set_cluster(id, Some(cluster_id), tick);
                    debug!(node = %id, cluster = %cluster_id, score, "member joined");
                }
            }
        }
    }

    /// Seed new clusters from mutually compatible unassigned nodes within
    /// radio range of each other.
    fn seed_new_clusters(
        &mut self,
        tick: u64,
        store: &mut NodeStore,
        grid: &SpatialGrid,
        events: &mut Vec<SimEvent>,
    ) -> Vec<ClusterId> {
        let mut seeded = Vec::new();
        let unassigned: Vec<NodeId> = store
            .iter()
            .filter(|n| n.cluster_id.is_none())
            .map(|n| n.id)
            .collect();
        let mut taken: BTreeSet<NodeId> = BTreeSet::new();

        for &seed_id in &unassigned {
            if taken.contains(&seed_id) {
                continue;
            }
            let Some(seed) = store.get(seed_id) else { continue };
            let mut group = vec![seed_id];
            for candidate_id in
                grid.neighbors_within(&seed.position, self.config.radio_range_r, Some(seed_id))
            {
                if group.len() >= self.config.max_cluster_size {
                    break;
                }
                if taken.contains(&candidate_id) {
                    continue;
                }
                let Some(candidate) = store.get(candidate_id) else {
                    continue;
                };
                if candidate.cluster_id.is_some() {
                    continue;
                }
                if self.nodes_compatible(seed, candidate) {
                    group.push(candidate_id);
                }
            }
            if group.len() < self.config.min_cluster_size {
                continue;
            }

            let cluster_id = ClusterId(self.next_id);
            self.next_id += 1;
            let cluster = Cluster {
                id: cluster_id,
                // Provisional; the election coordinator replaces it within
                // the same tick.
                leader_id: seed_id,
                co_leader_id: None,
                members: group.iter().copied().collect(),
                centroid: seed.position,
                avg_speed: seed.speed,
                avg_heading: seed.heading,
                formation_tick: tick,
                last_update_tick: tick,
                relay_set: BTreeSet::new(),
                boundary_map: BTreeMap::new(),
            };
            info!(cluster = %cluster_id, size = group.len(), "cluster formed");
            events.push(SimEvent::ClusterFormed {
                cluster: cluster_id,
                size: group.len(),
            });
            for &member in &group {
                store.set_cluster(member, Some(cluster_id), tick);
                taken.insert(member);
            }
            self.clusters.insert(cluster_id, cluster);
            seeded.push(cluster_id);
        }
        seeded
    }

    /// Recompute centroid, average speed, and circular-mean heading
    fn refresh_aggregates(&mut self, tick: u64, store: &NodeStore) {
        for cluster in self.clusters.values_mut() {
            let nodes: Vec<&NodeRecord> = cluster
                .members
                .iter()
                .filter_map(|&id| store.get(id))
                .collect();
            if nodes.is_empty() {
                continue;
            }
            let n = nodes.len() as f64;
            cluster.centroid = Position::new(
                nodes.iter().map(|v| v.position.x).sum::<f64>() / n,
                nodes.iter().map(|v| v.position.y).sum::<f64>() / n,
            );
            cluster.avg_speed = nodes.iter().map(|v| v.speed).sum::<f64>() / n;
            let headings: Vec<f64> = nodes.iter().map(|v| v.heading).collect();
            cluster.avg_heading = circular_mean(&headings);
            cluster.last_update_tick = tick;
        }
    }

    /// Detach any member beyond the strict membership radius of the
    /// freshly computed centroid. Returns the number of detachments.
    fn enforce_radius(&mut self, tick: u64, store: &mut NodeStore) -> usize {
        let mut detached = 0;
        for cluster in self.clusters.values_mut() {
            let out: Vec<NodeId> = cluster
                .members
                .iter()
                .copied()
                .filter(|&id| match store.get(id) {
                    None => true,
                    Some(node) => {
                        node.position.distance_to(&cluster.centroid)
                            > self.config.max_cluster_radius
                    }
                })
                .collect();
            for id in out {
                cluster.members.remove(&id);
                cluster.relay_set.remove(&id);
                cluster.boundary_map.retain(|_, &mut b| b != id);
                if cluster.co_leader_id == Some(id) {
                    cluster.co_leader_id = None;
                }
                store.set_cluster(id, None, tick);
                detached += 1;
            }
        }
        detached
    }

    /// Dissolve clusters below the minimum size or stale beyond the
    /// lifetime tolerance.
    fn dissolve_undersized(
        &mut self,
        tick: u64,
        store: &mut NodeStore,
        events: &mut Vec<SimEvent>,
    ) {
        let doomed: Vec<(ClusterId, DissolveReason)> = self
            .clusters
            .values()
            .filter_map(|c| {
                if c.size() < self.config.min_cluster_size {
                    Some((c.id, DissolveReason::BelowMinSize))
                } else if tick.saturating_sub(c.last_update_tick) > self.config.lifetime_tol_ticks {
                    Some((c.id, DissolveReason::Stale))
                } else {
                    None
                }
            })
            .collect();
        for (id, reason) in doomed {
            self.dissolve(id, reason, tick, store, events);
        }
    }

    /// Dissolve one cluster: members become Unassigned, the record is
    /// dropped, and the event is logged.
    pub fn dissolve(
        &mut self,
        id: ClusterId,
        reason: DissolveReason,
        tick: u64,
        store: &mut NodeStore,
        events: &mut Vec<SimEvent>,
    ) {
        if let Some(cluster) = self.clusters.remove(&id) {
            for member in &cluster.members {
                store.set_cluster(*member, None, tick);
            }
            info!(cluster = %id, ?reason, "cluster dissolved");
            events.push(SimEvent::ClusterDissolved {
                cluster: id,
                reason,
            });
        }
    }

    // ---- typed mutators used by election / failover -----------------

    /// Install a new leader, demoting the previous one to member
    pub fn set_leader(&mut self, id: ClusterId, leader: NodeId, store: &mut NodeStore) {
        if let Some(cluster) = self.clusters.get_mut(&id) {
            let old = cluster.leader_id;
            if old != leader && cluster.members.contains(&old) {
                store.set_role(old, ClusterRole::Member);
            }
            cluster.leader_id = leader;
            cluster.members.insert(leader);
            if cluster.co_leader_id == Some(leader) {
                cluster.co_leader_id = None;
            }
            store.set_role(leader, ClusterRole::Leader);
        }
    }

    /// Install or clear the co-leader
    pub fn set_co_leader(&mut self, id: ClusterId, co_leader: Option<NodeId>, store: &mut NodeStore) {
        if let Some(cluster) = self.clusters.get_mut(&id) {
            if let Some(old) = cluster.co_leader_id {
                if cluster.members.contains(&old) && old != cluster.leader_id {
                    store.set_role(old, ClusterRole::Member);
                }
            }
            cluster.co_leader_id = co_leader;
            if let Some(new) = co_leader {
                store.set_role(new, ClusterRole::CoLeader);
            }
        }
    }

    /// Replace the relay set, moving the duty flags along
    pub fn set_relays(&mut self, id: ClusterId, relays: BTreeSet<NodeId>, store: &mut NodeStore) {
        if let Some(cluster) = self.clusters.get_mut(&id) {
            for old in &cluster.relay_set {
                if !relays.contains(old) {
                    store.set_relay(*old, false);
                }
            }
            for new in &relays {
                store.set_relay(*new, true);
            }
            cluster.relay_set = relays;
        }
    }

    /// Replace the boundary map, moving the duty flags along
    pub fn set_boundary_map(
        &mut self,
        id: ClusterId,
        map: BTreeMap<ClusterId, NodeId>,
        store: &mut NodeStore,
    ) {
        if let Some(cluster) = self.clusters.get_mut(&id) {
            let new_set: BTreeSet<NodeId> = map.values().copied().collect();
            for old in cluster.boundary_map.values() {
                if !new_set.contains(old) {
                    store.set_boundary(*old, false);
                }
            }
            for new in &new_set {
                store.set_boundary(*new, true);
            }
            cluster.boundary_map = map;
        }
    }

    // ---- compatibility predicates -----------------------------------

    /// Whether a node is compatible with a cluster's current aggregates
    pub fn node_cluster_compatible(&self, node: &NodeRecord, cluster: &Cluster) -> bool {
        node.position.distance_to(&cluster.centroid) <= self.config.max_cluster_radius
            && (node.speed - cluster.avg_speed).abs() <= self.config.speed_tol
            && heading_difference(node.heading, cluster.avg_heading) <= self.config.heading_tol
    }

    /// Mutual compatibility between two nodes (seeding predicate)
    pub fn nodes_compatible(&self, a: &NodeRecord, b: &NodeRecord) -> bool {
        a.position.distance_to(&b.position) <= self.config.radio_range_r
            && (a.speed - b.speed).abs() <= self.config.speed_tol
            && heading_difference(a.heading, b.heading) <= self.config.heading_tol
    }

    /// Weighted join score: 0.4 proximity + 0.3 speed match + 0.3 heading match
    pub fn join_score(&self, node: &NodeRecord, cluster: &Cluster) -> f64 {
        let distance = node.position.distance_to(&cluster.centroid);
        let proximity = (1.0 - distance / self.config.max_cluster_radius).max(0.0);
        let speed_diff = (node.speed - cluster.avg_speed).abs();
        let speed_match = (1.0 - speed_diff / self.config.speed_tol).max(0.0);
        let heading_diff = heading_difference(node.heading, cluster.avg_heading);
        let heading_match = (1.0 - heading_diff / self.config.heading_tol).max(0.0);
        0.4 * proximity + 0.3 * speed_match + 0.3 * heading_match
    }

    /// Overlap merge entry point; see `merge.rs`
    pub fn merge_overlapping(
        &mut self,
        tick: u64,
        store: &mut NodeStore,
        events: &mut Vec<SimEvent>,
    ) -> usize {
        super::merge::merge_overlapping(self, tick, store, events)
    }

    pub(super) fn config(&self) -> &SimConfig {
        &self.config
    }

    pub(super) fn clusters_mut(&mut self) -> &mut BTreeMap<ClusterId, Cluster> {
        &mut self.clusters
    }
}
