//! Failure Detector / Succession
//!
//! Every tick, each cluster's leader is checked for disappearance, trust
//! collapse, and drift beyond the membership radius. On failure the
//! co-leader is promoted in O(1) when it passes the candidate filter;
//! otherwise a full election runs. A cluster left without a co-leader
//! gets a replacement on the next healthy tick.

use crate::clustering::ClusteringEngine;
use crate::config::SimConfig;
use crate::election::ElectionCoordinator;
use crate::proximity::SpatialGrid;
use crate::store::NodeStore;
use crate::trust::TrustEngine;
use crate::types::{ClusterId, ClusterRole, LeaderFailureReason, NodeId, SimEvent};
use std::collections::BTreeSet;
use tracing::{info, warn};

/// Detects leader loss and drives succession
#[derive(Debug)]
pub struct FailureDetector {
    config: SimConfig,
}

impl FailureDetector {
    /// Create a detector bound to a configuration
    pub fn new(config: SimConfig) -> Self {
        Self { config }
    }

    /// Run the per-tick leader check across all clusters. Clusters in
    /// `skip` (seeded this tick, election still pending) are left alone.
    pub fn check(
        &self,
        tick: u64,
        clustering: &mut ClusteringEngine,
        store: &mut NodeStore,
        election: &ElectionCoordinator,
        trust: &TrustEngine,
        grid: &SpatialGrid,
        skip: &BTreeSet<ClusterId>,
        events: &mut Vec<SimEvent>,
    ) {
        for cluster_id in clustering.ids() {
            if skip.contains(&cluster_id) {
                continue;
            }
            let Some(cluster) = clustering.get(cluster_id) else {
                continue;
            };
            let leader_id = cluster.leader_id;
            let co_leader_id = cluster.co_leader_id;

            let failure = self.diagnose(leader_id, cluster_id, clustering, store);

            let Some(reason) = failure else {
                // Healthy leader: backfill a missing co-leader so the
                // succession line stays one promotion deep.
                if co_leader_id.is_none() && cluster.size() >= 2 {
                    election.elect_co_leader(cluster_id, tick, clustering, store, trust, grid);
                }
                continue;
            };

            warn!(cluster = %cluster_id, leader = %leader_id, ?reason, "leader failure");
            events.push(SimEvent::LeaderFailed {
                cluster: cluster_id,
                leader: leader_id,
                reason,
            });

            // A trust-collapsed leader stays in the cluster as a demoted
            // member; a vanished or drifted one is already gone.
            if reason == LeaderFailureReason::TrustCollapse {
                store.set_role(leader_id, ClusterRole::Member);
            }

            let successor = co_leader_id.filter(|&co| {
                clustering
                    .get(cluster_id)
                    .map_or(false, |c| c.members.contains(&co))
                    && store
                        .get(co)
                        .map_or(false, |node| election.is_qualified(node, tick))
            });

            match successor {
                Some(co) => {
                    clustering.set_leader(cluster_id, co, store);
                    info!(cluster = %cluster_id, new_leader = %co, "co-leader promoted");
                    events.push(SimEvent::CoLeaderPromoted {
                        cluster: cluster_id,
                        node: co,
                    });
                    // The vacated co-leader slot is refilled on the next
                    // tick's healthy pass; relays follow the new leader now.
                    election.refresh_relays(cluster_id, tick, clustering, store, trust, grid);
                }
                None => {
                    election.run_election(
                        cluster_id, tick, clustering, store, trust, grid, events,
                    );
                }
            }
        }
    }

    /// Classify the leader's state; `None` means healthy
    fn diagnose(
        &self,
        leader_id: NodeId,
        cluster_id: crate::types::ClusterId,
        clustering: &ClusteringEngine,
        store: &NodeStore,
    ) -> Option<LeaderFailureReason> {
        let Some(cluster) = clustering.get(cluster_id) else {
            return None;
        };
        let Some(leader) = store.get(leader_id) else {
            return Some(LeaderFailureReason::Disappeared);
        };
        if leader.is_flagged_malicious || leader.trust_score < self.config.leader_trust_floor {
            return Some(LeaderFailureReason::TrustCollapse);
        }
        if !cluster.members.contains(&leader_id)
            || leader.position.distance_to(&cluster.centroid) > self.config.max_cluster_radius
        {
            return Some(LeaderFailureReason::OutOfRange);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::NodeSpec;
    use crate::types::{ClusterId, MobilityUpdate, Position};

    struct Fixture {
        store: NodeStore,
        grid: SpatialGrid,
        clustering: ClusteringEngine,
        trust: TrustEngine,
        election: ElectionCoordinator,
        detector: FailureDetector,
        cluster_id: ClusterId,
        events: Vec<SimEvent>,
    }

    fn elected_convoy() -> Fixture {
        let config = SimConfig::default();
        let mut store = NodeStore::new();
        for i in 0..5u64 {
            let mut spec = NodeSpec::benign(i, i as f64 * 20.0, 0.0, 25.0, 0.0);
            spec.initial_trust = 0.9;
            store.insert(spec, &config).unwrap();
        }
        let mut grid = SpatialGrid::new(config.radio_range_r);
        grid.rebuild(&store);
        let mut clustering = ClusteringEngine::new(config.clone());
        let trust = TrustEngine::new(config.clone());
        let election = ElectionCoordinator::new(config.clone());
        let mut events = Vec::new();
        let seeded = clustering.reconcile(1, &mut store, &grid, &mut events);
        let cluster_id = seeded[0];
        election
            .run_election(cluster_id, 1, &mut clustering, &mut store, &trust, &grid, &mut events)
            .unwrap();
        events.clear();
        Fixture {
            detector: FailureDetector::new(config),
            store,
            grid,
            clustering,
            trust,
            election,
            cluster_id,
            events,
        }
    }

    #[test]
    fn healthy_leader_passes_unchanged() {
        let mut f = elected_convoy();
        let leader_before = f.clustering.get(f.cluster_id).unwrap().leader_id;
        f.detector.check(
            2,
            &mut f.clustering,
            &mut f.store,
            &f.election,
            &f.trust,
            &f.grid,
            &BTreeSet::new(),
            &mut f.events,
        );
        assert_eq!(f.clustering.get(f.cluster_id).unwrap().leader_id, leader_before);
        assert!(f.events.is_empty());
    }

    #[test]
    fn drifted_leader_triggers_co_leader_promotion() {
        let mut f = elected_convoy();
        let cluster = f.clustering.get(f.cluster_id).unwrap();
        let leader = cluster.leader_id;
        let co_leader = cluster.co_leader_id.unwrap();

        // Leader jumps far away; clustering detaches it on reconcile.
        let update = MobilityUpdate {
            node_id: leader,
            position: Position::new(10_000.0, 10_000.0),
            speed: 25.0,
            heading: 0.0,
            lane_hint: 0,
        };
        f.store.apply_mobility(2, &[update], 10.0, 75.0).unwrap();
        f.grid.rebuild(&f.store);
        f.clustering
            .reconcile(2, &mut f.store, &f.grid, &mut f.events);
        f.events.clear();

        f.detector.check(
            2,
            &mut f.clustering,
            &mut f.store,
            &f.election,
            &f.trust,
            &f.grid,
            &BTreeSet::new(),
            &mut f.events,
        );

        let cluster = f.clustering.get(f.cluster_id).unwrap();
        assert_eq!(cluster.leader_id, co_leader);
        assert_eq!(cluster.size(), 4);
        assert_eq!(f.store.get(leader).unwrap().cluster_id, None);
        assert_eq!(f.store.get(leader).unwrap().role, ClusterRole::Unassigned);
        assert!(f
            .events
            .iter()
            .any(|e| matches!(e, SimEvent::LeaderFailed { reason: LeaderFailureReason::OutOfRange, .. })));
        assert!(f
            .events
            .iter()
            .any(|e| matches!(e, SimEvent::CoLeaderPromoted { .. })));

        // Next healthy tick backfills the co-leader slot.
        f.events.clear();
        f.detector.check(
            3,
            &mut f.clustering,
            &mut f.store,
            &f.election,
            &f.trust,
            &f.grid,
            &BTreeSet::new(),
            &mut f.events,
        );
        let cluster = f.clustering.get(f.cluster_id).unwrap();
        assert!(cluster.co_leader_id.is_some());
        assert_ne!(cluster.co_leader_id, Some(cluster.leader_id));
    }

    #[test]
    fn trust_collapse_demotes_but_keeps_the_member() {
        let mut f = elected_convoy();
        let leader = f.clustering.get(f.cluster_id).unwrap().leader_id;
        f.store.set_trust(leader, 0.2);

        f.detector.check(
            2,
            &mut f.clustering,
            &mut f.store,
            &f.election,
            &f.trust,
            &f.grid,
            &BTreeSet::new(),
            &mut f.events,
        );

        let cluster = f.clustering.get(f.cluster_id).unwrap();
        assert_ne!(cluster.leader_id, leader);
        assert!(cluster.members.contains(&leader));
        assert_eq!(f.store.get(leader).unwrap().role, ClusterRole::Member);
        assert!(f.events.iter().any(|e| matches!(
            e,
            SimEvent::LeaderFailed {
                reason: LeaderFailureReason::TrustCollapse,
                ..
            }
        )));
    }

    #[test]
    fn unqualified_co_leader_forces_full_election() {
        let mut f = elected_convoy();
        let cluster = f.clustering.get(f.cluster_id).unwrap();
        let leader = cluster.leader_id;
        let co_leader = cluster.co_leader_id.unwrap();

        // Leader collapses and the co-leader is banned as a sleeper.
        f.store.set_trust(leader, 0.1);
        f.store.flag_sleeper(co_leader, 1_000);

        f.detector.check(
            2,
            &mut f.clustering,
            &mut f.store,
            &f.election,
            &f.trust,
            &f.grid,
            &BTreeSet::new(),
            &mut f.events,
        );

        let cluster = f.clustering.get(f.cluster_id).unwrap();
        assert_ne!(cluster.leader_id, leader);
        assert_ne!(cluster.leader_id, co_leader);
        assert!(f
            .events
            .iter()
            .any(|e| matches!(e, SimEvent::LeaderElected { .. })));
    }
}
