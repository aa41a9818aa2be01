//! Authority / PoA Monitor
//!
//! High-trust nodes act as authorities and periodically vote to flag
//! suspicious peers. A suspect needs flag votes from at least 30% of the
//! evaluating authorities (minimum one) to be flagged; the penalty is a
//! 30% trust cut and, for leaders, eviction through a forced failure
//! check. Flags are sticky for the rest of the simulation.
//!
//! Suspicion is computed from observable behavior only; the ground-truth
//! `is_malicious` flag is never read here.

use crate::clustering::ClusteringEngine;
use crate::config::SimConfig;
use crate::store::{NodeRecord, NodeStore};
use crate::types::{ClusterRole, NodeId, SimEvent};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Outcome of one PoA round
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoaOutcome {
    /// Nodes flagged this round
    pub flagged: Vec<NodeId>,

    /// Flagged nodes that held a leadership role; their clusters need an
    /// immediate failure check
    pub deposed_leaders: Vec<NodeId>,
}

/// Periodic Proof-of-Authority malicious-node detector
#[derive(Debug)]
pub struct AuthorityMonitor {
    config: SimConfig,

    /// Trust proposals / flag reports accumulated from the messaging
    /// fabric between voting rounds, keyed by suspect
    pending_reports: BTreeMap<NodeId, u32>,
}

impl AuthorityMonitor {
    /// Create a monitor bound to a configuration
    pub fn new(config: SimConfig) -> Self {
        Self {
            config,
            pending_reports: BTreeMap::new(),
        }
    }

    /// Accumulate a trust proposal or flag report delivered over V2V.
    /// Consumed (and cleared) by the next voting round.
    pub fn accumulate_report(&mut self, target: NodeId) {
        *self.pending_reports.entry(target).or_insert(0) += 1;
    }

    /// Whether a node currently counts as an authority
    pub fn is_authority(&self, node: &NodeRecord) -> bool {
        node.trust_score > self.config.authority_trust_threshold && !node.is_flagged_malicious
    }

    /// Observable suspicion score for one node
    pub fn suspicion_of(&self, node: &NodeRecord) -> f64 {
        let mut suspicion = 0.0;
        if node.trust_score < self.config.suspicion_trust_floor {
            suspicion += 0.3;
        }
        // Observable malice evidence: degraded behavior metrics or
        // repeated inconsistency.
        if node.authenticity < self.config.suspicion_behavior_floor
            || node.cooperation < self.config.suspicion_behavior_floor
            || node.behavior_consistency < self.config.suspicion_behavior_floor
            || node.erratic_count > self.config.suspicion_erratic_limit
        {
            suspicion += 0.5;
        }
        if node.speed > self.config.suspicion_speed_limit {
            suspicion += 0.2;
        }
        if node.message_count > self.config.suspicion_message_limit
            && node.trust_score < self.config.candidate_trust_floor
        {
            suspicion += 0.2;
        }
        // Peer reports accumulated since the last round add one notch.
        if self.pending_reports.contains_key(&node.id) {
            suspicion += 0.2;
        }
        suspicion
    }

    /// Run one voting round. Cluster members are judged by their own
    /// cluster's authorities; isolated nodes borrow authorities within
    /// range. Returns the flagged set so the caller can force failure
    /// checks for deposed leaders.
    pub fn run_round(
        &mut self,
        tick: u64,
        clustering: &ClusteringEngine,
        store: &mut NodeStore,
        events: &mut Vec<SimEvent>,
    ) -> PoaOutcome {
        let mut outcome = PoaOutcome::default();

        let all_authorities: Vec<NodeId> = store
            .iter()
            .filter(|node| self.is_authority(node))
            .map(|node| node.id)
            .collect();
        if all_authorities.is_empty() {
            self.pending_reports.clear();
            return outcome;
        }

        // (suspect, evaluating authority count, votes cast)
        let mut verdicts: Vec<(NodeId, usize, usize)> = Vec::new();

        for cluster in clustering.iter() {
            let cluster_authorities: Vec<NodeId> = cluster
                .members
                .iter()
                .copied()
                .filter(|id| all_authorities.contains(id))
                .collect();

            for &member in &cluster.members {
                if cluster_authorities.contains(&member) {
                    continue;
                }
                let Some(node) = store.get(member) else { continue };

                // Clusters without authorities of their own borrow
                // authorities near the suspect.
                let evaluators = if cluster_authorities.is_empty() {
                    self.nearby_authorities(node, &all_authorities, store)
                } else {
                    cluster_authorities.clone()
                };
                if evaluators.is_empty() {
                    continue;
                }
                let suspicion = self.suspicion_of(node);
                if suspicion >= 0.5 {
                    debug!(suspect = %member, suspicion, voters = evaluators.len(), "suspicion vote");
                    verdicts.push((member, evaluators.len(), evaluators.len()));
                }
            }
        }

        // Isolated nodes are evaluated against nearby authorities.
        let isolated: Vec<NodeId> = store
            .iter()
            .filter(|node| node.cluster_id.is_none())
            .map(|node| node.id)
            .collect();
        for id in isolated {
            let Some(node) = store.get(id) else { continue };
            if self.is_authority(node) {
                continue;
            }
            let evaluators = self.nearby_authorities(node, &all_authorities, store);
            if evaluators.is_empty() {
                continue;
            }
            let suspicion = self.suspicion_of(node);
            if suspicion >= 0.5 {
                verdicts.push((id, evaluators.len(), evaluators.len()));
            }
        }

        for (suspect, authority_count, votes) in verdicts {
            let needed =
                ((self.config.poa_flag_fraction * authority_count as f64).ceil() as usize).max(1);
            if votes < needed {
                continue;
            }
            let held_leadership = store
                .get(suspect)
                .map_or(false, |n| matches!(n.role, ClusterRole::Leader | ClusterRole::CoLeader));
            store.flag_malicious(
                suspect,
                self.config.poa_trust_penalty,
                self.config.poa_trust_floor,
            );
            info!(node = %suspect, votes, tick, "node flagged by PoA vote");
            events.push(SimEvent::NodeFlagged {
                node: suspect,
                votes,
            });
            outcome.flagged.push(suspect);
            if held_leadership {
                outcome.deposed_leaders.push(suspect);
            }
        }

        self.pending_reports.clear();
        outcome
    }

    fn nearby_authorities(
        &self,
        suspect: &NodeRecord,
        all_authorities: &[NodeId],
        store: &NodeStore,
    ) -> Vec<NodeId> {
        all_authorities
            .iter()
            .copied()
            .filter(|&id| {
                store.get(id).map_or(false, |authority| {
                    authority.position.distance_to(&suspect.position)
                        < self.config.isolated_authority_range
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proximity::SpatialGrid;
    use crate::store::NodeSpec;

    /// Three 0.95-trust authorities plus one suspect in a single cluster
    fn poa_fixture(suspect: NodeSpec) -> (SimConfig, NodeStore, ClusteringEngine, AuthorityMonitor) {
        let config = SimConfig::default();
        let mut store = NodeStore::new();
        for i in 0..3u64 {
            let mut spec = NodeSpec::benign(i, i as f64 * 20.0, 0.0, 25.0, 0.0);
            spec.initial_trust = 0.95;
            store.insert(spec, &config).unwrap();
        }
        store.insert(suspect, &config).unwrap();
        let mut grid = SpatialGrid::new(config.radio_range_r);
        grid.rebuild(&store);
        let mut clustering = ClusteringEngine::new(config.clone());
        let mut events = Vec::new();
        clustering.reconcile(1, &mut store, &grid, &mut events);
        let monitor = AuthorityMonitor::new(config.clone());
        (config, store, clustering, monitor)
    }

    fn speeding_suspect() -> NodeSpec {
        let mut spec = NodeSpec::benign(9, 60.0, 0.0, 25.0, 0.0);
        spec.initial_trust = 0.30;
        spec
    }

    #[test]
    fn majority_vote_flags_the_suspect() {
        let (_, mut store, clustering, mut monitor) = poa_fixture(speeding_suspect());
        // Suspect behavior: low trust, speeding, chatty
        store.set_speed(NodeId(9), 80.0);
        for _ in 0..150 {
            store.bump_message_count(NodeId(9));
        }
        // Membership survives because suspicion reads observables, not speed
        // compatibility; push speed after clustering.
        let mut events = Vec::new();
        let outcome = monitor.run_round(100, &clustering, &mut store, &mut events);

        assert_eq!(outcome.flagged, vec![NodeId(9)]);
        let suspect = store.get(NodeId(9)).unwrap();
        assert!(suspect.is_flagged_malicious);
        // 0.7 * 0.30 = 0.21
        assert!((suspect.trust_score - 0.21).abs() < 1e-9);
        assert!(events
            .iter()
            .any(|e| matches!(e, SimEvent::NodeFlagged { node: NodeId(9), .. })));
    }

    #[test]
    fn well_behaved_low_trust_node_is_not_flagged() {
        // Low trust alone scores 0.3, below the 0.5 suspicion gate.
        let mut suspect = NodeSpec::benign(9, 60.0, 0.0, 25.0, 0.0);
        suspect.initial_trust = 0.30;
        let (_, mut store, clustering, mut monitor) = poa_fixture(suspect);
        let mut events = Vec::new();
        let outcome = monitor.run_round(100, &clustering, &mut store, &mut events);
        assert!(outcome.flagged.is_empty());
        assert!(!store.get(NodeId(9)).unwrap().is_flagged_malicious);
    }

    #[test]
    fn degraded_behavior_metrics_are_malice_evidence() {
        let mut suspect = NodeSpec::benign(9, 60.0, 0.0, 25.0, 0.0);
        suspect.initial_trust = 0.6;
        suspect.authenticity = 0.1; // observable malice: +0.5
        suspect.cooperation = 0.2;
        let (_, mut store, clustering, mut monitor) = poa_fixture(suspect);
        let mut events = Vec::new();
        let outcome = monitor.run_round(100, &clustering, &mut store, &mut events);
        assert_eq!(outcome.flagged, vec![NodeId(9)]);
    }

    #[test]
    fn flagged_leader_is_reported_for_deposition() {
        let mut suspect = NodeSpec::benign(9, 60.0, 0.0, 25.0, 0.0);
        suspect.initial_trust = 0.6;
        suspect.authenticity = 0.1;
        let (_, mut store, clustering, mut monitor) = poa_fixture(suspect);
        store.set_role(NodeId(9), ClusterRole::Leader);
        let mut events = Vec::new();
        let outcome = monitor.run_round(100, &clustering, &mut store, &mut events);
        assert_eq!(outcome.deposed_leaders, vec![NodeId(9)]);
    }

    #[test]
    fn isolated_suspect_borrows_nearby_authorities() {
        let config = SimConfig::default();
        let mut store = NodeStore::new();
        for i in 0..3u64 {
            let mut spec = NodeSpec::benign(i, i as f64 * 20.0, 0.0, 25.0, 0.0);
            spec.initial_trust = 0.95;
            store.insert(spec, &config).unwrap();
        }
        // Unclustered suspect 200 units out: inside authority range, too
        // different in heading to cluster with anyone.
        let mut spec = NodeSpec::benign(9, 200.0, 0.0, 25.0, std::f64::consts::PI);
        spec.initial_trust = 0.2;
        spec.authenticity = 0.1;
        store.insert(spec, &config).unwrap();
        let mut grid = SpatialGrid::new(config.radio_range_r);
        grid.rebuild(&store);
        let mut clustering = ClusteringEngine::new(config.clone());
        let mut events = Vec::new();
        clustering.reconcile(1, &mut store, &grid, &mut events);
        let mut monitor = AuthorityMonitor::new(config);
        assert_eq!(store.get(NodeId(9)).unwrap().cluster_id, None);
        let mut events = Vec::new();
        let outcome = monitor.run_round(100, &clustering, &mut store, &mut events);
        assert_eq!(outcome.flagged, vec![NodeId(9)]);
    }

    #[test]
    fn accumulated_reports_raise_suspicion() {
        // Trust 0.35 (+0.3) plus a peer report (+0.2) crosses the gate.
        let mut suspect = NodeSpec::benign(9, 60.0, 0.0, 25.0, 0.0);
        suspect.initial_trust = 0.35;
        let (_, mut store, clustering, mut monitor) = poa_fixture(suspect);
        monitor.accumulate_report(NodeId(9));
        let mut events = Vec::new();
        let outcome = monitor.run_round(100, &clustering, &mut store, &mut events);
        assert_eq!(outcome.flagged, vec![NodeId(9)]);
        // Reports are consumed by the round.
        let outcome = monitor.run_round(200, &clustering, &mut store, &mut events);
        assert!(outcome.flagged.is_empty());
    }
}
