//! Election Coordinator
//!
//! Trust-weighted majority voting for cluster leadership, co-leader
//! selection, and the relay / boundary helper elections. An election runs
//! atomically within one tick:
//!
//! 1. Filter candidates (trust floor, no malicious/sleeper flags, no ban)
//! 2. Rank candidates by the five-metric composite
//! 3. Each candidate casts a trust-weighted vote for its top candidate
//! 4. Absolute majority (> 0.5) wins; otherwise the highest composite
//! 5. Winner becomes Leader, runner-up CoLeader, relays are refreshed

mod boundary;
mod relay;

pub use boundary::elect_boundaries;
pub use relay::elect_relays;

use crate::clustering::{Cluster, ClusteringEngine};
use crate::config::SimConfig;
use crate::proximity::SpatialGrid;
use crate::store::{NodeRecord, NodeStore};
use crate::trust::{CompositeContext, TrustEngine};
use crate::types::{ClusterId, DissolveReason, NodeId, SimEvent};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Runs leader, co-leader, and relay elections against the owning stores
#[derive(Debug)]
pub struct ElectionCoordinator {
    config: SimConfig,
}

impl ElectionCoordinator {
    /// Create a coordinator bound to a configuration
    pub fn new(config: SimConfig) -> Self {
        Self { config }
    }

    /// Whether a node passes the candidate filter at `tick`
    pub fn is_qualified(&self, node: &NodeRecord, tick: u64) -> bool {
        node.trust_score >= self.config.candidate_trust_floor
            && !node.is_flagged_malicious
            && !node.is_sleeper_flagged
            && !node.is_election_banned(tick)
    }

    /// Composite election score of a member within its cluster
    pub fn composite_of(
        &self,
        node: &NodeRecord,
        cluster: &Cluster,
        trust: &TrustEngine,
        grid: &SpatialGrid,
        tick: u64,
    ) -> f64 {
        let ctx = CompositeContext {
            distance_to_centroid: Some(node.position.distance_to(&cluster.centroid)),
            neighbor_count: grid
                .neighbors_within(&node.position, self.config.radio_range_r, Some(node.id))
                .len(),
            tick,
        };
        trust.composite_score(node, &ctx)
    }

    /// Run a full leader election for one cluster. Returns the winner, or
    /// `None` when the candidate set is empty (the cluster is dissolved
    /// with a `ClusterDegraded` event).
    pub fn run_election(
        &self,
        cluster_id: ClusterId,
        tick: u64,
        clustering: &mut ClusteringEngine,
        store: &mut NodeStore,
        trust: &TrustEngine,
        grid: &SpatialGrid,
        events: &mut Vec<SimEvent>,
    ) -> Option<NodeId> {
        let Some(cluster) = clustering.get(cluster_id) else {
            return None;
        };
        let old_leader = cluster.leader_id;
        let candidates = self.ranked_candidates(cluster, store, trust, grid, tick, None);

        if candidates.is_empty() {
            warn!(cluster = %cluster_id, "election with empty candidate set, dissolving");
            events.push(SimEvent::ClusterDegraded { cluster: cluster_id });
            clustering.dissolve(cluster_id, DissolveReason::Degraded, tick, store, events);
            return None;
        }

        let winner = self.tally(&candidates, store);

        clustering.set_leader(cluster_id, winner, store);
        let old = (winner != old_leader).then_some(old_leader);
        info!(cluster = %cluster_id, leader = %winner, "leader elected");
        events.push(SimEvent::LeaderElected {
            cluster: cluster_id,
            new: winner,
            old,
        });

        self.elect_co_leader(cluster_id, tick, clustering, store, trust, grid);
        self.refresh_relays(cluster_id, tick, clustering, store, trust, grid);
        Some(winner)
    }

    /// Elect a co-leader: top composite among qualified members excluding
    /// the leader. Clears the slot when no member qualifies.
    pub fn elect_co_leader(
        &self,
        cluster_id: ClusterId,
        tick: u64,
        clustering: &mut ClusteringEngine,
        store: &mut NodeStore,
        trust: &TrustEngine,
        grid: &SpatialGrid,
    ) -> Option<NodeId> {
        let Some(cluster) = clustering.get(cluster_id) else {
            return None;
        };
        let leader = cluster.leader_id;
        let candidates = self.ranked_candidates(cluster, store, trust, grid, tick, Some(leader));
        let chosen = candidates.first().map(|&(id, _)| id);
        clustering.set_co_leader(cluster_id, chosen, store);
        if let Some(id) = chosen {
            debug!(cluster = %cluster_id, co_leader = %id, "co-leader selected");
        }
        chosen
    }

    /// Re-run the relay election for one cluster
    pub fn refresh_relays(
        &self,
        cluster_id: ClusterId,
        tick: u64,
        clustering: &mut ClusteringEngine,
        store: &mut NodeStore,
        trust: &TrustEngine,
        grid: &SpatialGrid,
    ) {
        let Some(cluster) = clustering.get(cluster_id) else {
            return;
        };
        let relays = relay::elect_relays(cluster, store, trust, grid, &self.config, tick);
        clustering.set_relays(cluster_id, relays, store);
    }

    /// Qualified members with their composites, best first. Ties order by
    /// `NodeId` (the BTreeSet iteration plus stable sort guarantee it).
    fn ranked_candidates(
        &self,
        cluster: &Cluster,
        store: &NodeStore,
        trust: &TrustEngine,
        grid: &SpatialGrid,
        tick: u64,
        exclude: Option<NodeId>,
    ) -> Vec<(NodeId, f64)> {
        let mut candidates: Vec<(NodeId, f64)> = cluster
            .members
            .iter()
            .filter(|&&id| Some(id) != exclude)
            .filter_map(|&id| store.get(id))
            .filter(|node| self.is_qualified(node, tick))
            .map(|node| (node.id, self.composite_of(node, cluster, trust, grid, tick)))
            .collect();
        candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        candidates
    }

    /// Trust-weighted voting over the ranked candidates. Every candidate
    /// votes for the highest-composite candidate (itself included); vote
    /// weight is the voter's trust normalized across all voters. A
    /// candidate holding more than half the weight wins outright;
    /// otherwise the highest composite wins. All ties break by `NodeId`.
    fn tally(&self, candidates: &[(NodeId, f64)], store: &NodeStore) -> NodeId {
        // The favorite: best composite, lowest id on exact ties.
        let best_score = candidates[0].1;
        let favorite = candidates
            .iter()
            .filter(|(_, s)| *s == best_score)
            .map(|&(id, _)| id)
            .min()
            .expect("non-empty candidates");

        let total_trust: f64 = candidates
            .iter()
            .filter_map(|&(id, _)| store.get(id))
            .map(|n| n.trust_score)
            .sum();

        let mut ballots: BTreeMap<NodeId, f64> = BTreeMap::new();
        for &(voter_id, _) in candidates {
            let Some(voter) = store.get(voter_id) else {
                continue;
            };
            let weight = if total_trust > 0.0 {
                voter.trust_score / total_trust
            } else {
                1.0 / candidates.len() as f64
            };
            // Every voter's view ranks the same composites, so every
            // ballot goes to the shared favorite.
            *ballots.entry(favorite).or_insert(0.0) += weight;
        }

        let (leader, weight) = ballots
            .iter()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(&id, &w)| (id, w))
            .expect("at least one ballot");

        if weight > 0.5 {
            debug!(winner = %leader, weight, "majority winner");
            leader
        } else {
            debug!(winner = %favorite, "fallback to highest composite");
            favorite
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::NodeSpec;

    struct Fixture {
        store: NodeStore,
        grid: SpatialGrid,
        clustering: ClusteringEngine,
        trust: TrustEngine,
        coordinator: ElectionCoordinator,
        cluster_id: ClusterId,
        events: Vec<SimEvent>,
    }

    /// Five-node convoy with equal seeded trust, reconciled into one cluster
    fn convoy_fixture(initial_trust: f64) -> Fixture {
        let config = SimConfig::default();
        let mut store = NodeStore::new();
        for i in 0..5u64 {
            let mut spec = NodeSpec::benign(i, i as f64 * 20.0, 0.0, 25.0, 0.0);
            spec.initial_trust = initial_trust;
            store.insert(spec, &config).unwrap();
        }
        let mut grid = SpatialGrid::new(config.radio_range_r);
        grid.rebuild(&store);
        let mut clustering = ClusteringEngine::new(config.clone());
        let mut events = Vec::new();
        let seeded = clustering.reconcile(1, &mut store, &grid, &mut events);
        assert_eq!(seeded.len(), 1);
        events.clear();
        Fixture {
            store,
            grid,
            clustering,
            trust: TrustEngine::new(config.clone()),
            coordinator: ElectionCoordinator::new(config),
            cluster_id: seeded[0],
            events,
        }
    }

    #[test]
    fn centrality_breaks_equal_trust_ties() {
        let mut f = convoy_fixture(0.9);
        let winner = f
            .coordinator
            .run_election(
                f.cluster_id,
                1,
                &mut f.clustering,
                &mut f.store,
                &f.trust,
                &f.grid,
                &mut f.events,
            )
            .unwrap();
        // Node 2 sits on the centroid: highest centrality wins.
        assert_eq!(winner, NodeId(2));
        let cluster = f.clustering.get(f.cluster_id).unwrap();
        assert_eq!(cluster.leader_id, NodeId(2));
        assert!(cluster.co_leader_id.is_some());
        assert_ne!(cluster.co_leader_id, Some(NodeId(2)));
        assert!(f
            .events
            .iter()
            .any(|e| matches!(e, SimEvent::LeaderElected { new: NodeId(2), .. })));
    }

    #[test]
    fn flagged_and_banned_nodes_are_not_candidates() {
        let mut f = convoy_fixture(0.9);
        f.store.flag_malicious(NodeId(2), 1.0, 0.0);
        f.store.flag_sleeper(NodeId(1), 100);
        let winner = f
            .coordinator
            .run_election(
                f.cluster_id,
                1,
                &mut f.clustering,
                &mut f.store,
                &f.trust,
                &f.grid,
                &mut f.events,
            )
            .unwrap();
        assert_ne!(winner, NodeId(2));
        assert_ne!(winner, NodeId(1));
    }

    #[test]
    fn low_trust_members_cannot_stand() {
        let mut f = convoy_fixture(0.9);
        f.store.set_trust(NodeId(2), 0.3);
        let winner = f
            .coordinator
            .run_election(
                f.cluster_id,
                1,
                &mut f.clustering,
                &mut f.store,
                &f.trust,
                &f.grid,
                &mut f.events,
            )
            .unwrap();
        assert_ne!(winner, NodeId(2));
    }

    #[test]
    fn empty_candidate_set_dissolves_the_cluster() {
        let mut f = convoy_fixture(0.2); // everyone under the trust floor
        let winner = f.coordinator.run_election(
            f.cluster_id,
            1,
            &mut f.clustering,
            &mut f.store,
            &f.trust,
            &f.grid,
            &mut f.events,
        );
        assert!(winner.is_none());
        assert!(f.clustering.get(f.cluster_id).is_none());
        assert!(f
            .events
            .iter()
            .any(|e| matches!(e, SimEvent::ClusterDegraded { .. })));
        assert!(f
            .events
            .iter()
            .any(|e| matches!(
                e,
                SimEvent::ClusterDissolved {
                    reason: DissolveReason::Degraded,
                    ..
                }
            )));
    }

    #[test]
    fn co_leader_differs_from_leader() {
        let mut f = convoy_fixture(0.9);
        f.coordinator
            .run_election(
                f.cluster_id,
                1,
                &mut f.clustering,
                &mut f.store,
                &f.trust,
                &f.grid,
                &mut f.events,
            )
            .unwrap();
        let cluster = f.clustering.get(f.cluster_id).unwrap();
        let co = cluster.co_leader_id.unwrap();
        assert_ne!(co, cluster.leader_id);
        assert!(cluster.members.contains(&co));
    }

    #[test]
    fn majority_winner_carries_the_vote() {
        // Distinct trusts so normalized weights are uneven; the shared
        // favorite still accrues every ballot and clears 50%.
        let mut f = convoy_fixture(0.9);
        f.store.set_trust(NodeId(0), 0.6);
        f.store.set_trust(NodeId(4), 0.7);
        let winner = f
            .coordinator
            .run_election(
                f.cluster_id,
                1,
                &mut f.clustering,
                &mut f.store,
                &f.trust,
                &f.grid,
                &mut f.events,
            )
            .unwrap();
        assert_eq!(winner, NodeId(2));
    }
}
