//! Simulation metrics
//!
//! One aggregate owned by the simulator and updated only from the main
//! loop's post-component hook. Components never touch these counters
//! directly; the fabric's dispatch stats are folded in once per tick.

use crate::messaging::DispatchStats;
use serde::{Deserialize, Serialize};

/// Lifetime counters of a simulation run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metrics {
    /// Ticks advanced
    pub ticks: u64,

    /// Clusters formed / dissolved / merged
    pub clusters_formed: u64,
    pub clusters_dissolved: u64,
    pub clusters_merged: u64,

    /// Leader elections concluded (full votes, not promotions)
    pub leader_elections: u64,

    /// O(1) co-leader successions
    pub co_leader_promotions: u64,

    /// Leader failures detected
    pub leader_failures: u64,

    /// Nodes flagged by PoA votes
    pub nodes_flagged: u64,

    /// Sleeper agents flagged
    pub sleepers_flagged: u64,

    /// V2V messages processed
    pub messages_processed: u64,

    /// Individual deliveries (message x recipient)
    pub messages_delivered: u64,

    /// Deliveries that crossed a relay hop
    pub relay_hops: u64,

    /// Inter-cluster bridge crossings
    pub inter_cluster_bridges: u64,

    /// Messages dropped (vanished recipient or expiry)
    pub messages_dropped: u64,
}

impl Metrics {
    /// Fold one event into the counters
    pub fn observe(&mut self, event: &crate::types::SimEvent) {
        use crate::types::SimEvent::*;
        match event {
            ClusterFormed { .. } => self.clusters_formed += 1,
            ClusterDissolved { .. } => self.clusters_dissolved += 1,
            ClusterMerged { .. } => self.clusters_merged += 1,
            LeaderElected { .. } => self.leader_elections += 1,
            CoLeaderPromoted { .. } => self.co_leader_promotions += 1,
            LeaderFailed { .. } => self.leader_failures += 1,
            NodeFlagged { .. } => self.nodes_flagged += 1,
            SleeperFlagged { .. } => self.sleepers_flagged += 1,
            ClusterDegraded { .. } => {}
            MessageDelivered { .. } => {}
        }
    }

    /// Overwrite the messaging counters from the fabric's lifetime stats
    pub fn sync_dispatch(&mut self, stats: DispatchStats) {
        self.messages_processed = stats.messages;
        self.messages_delivered = stats.deliveries;
        self.relay_hops = stats.relay_hops;
        self.inter_cluster_bridges = stats.inter_cluster_bridges;
        self.messages_dropped = stats.undeliverable + stats.expired;
    }

    /// Human-readable run summary, one counter per line
    pub fn summary(&self) -> String {
        format!(
            "ticks: {}\n\
             clusters formed/dissolved/merged: {}/{}/{}\n\
             leader elections: {} (promotions: {}, failures: {})\n\
             nodes flagged: {} (sleepers: {})\n\
             messages processed/delivered/dropped: {}/{}/{}\n\
             relay hops: {}, inter-cluster bridges: {}",
            self.ticks,
            self.clusters_formed,
            self.clusters_dissolved,
            self.clusters_merged,
            self.leader_elections,
            self.co_leader_promotions,
            self.leader_failures,
            self.nodes_flagged,
            self.sleepers_flagged,
            self.messages_processed,
            self.messages_delivered,
            self.messages_dropped,
            self.relay_hops,
            self.inter_cluster_bridges,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ClusterId, NodeId, SimEvent};

    #[test]
    fn events_land_in_the_right_counters() {
        let mut metrics = Metrics::default();
        metrics.observe(&SimEvent::ClusterFormed {
            cluster: ClusterId(0),
            size: 4,
        });
        metrics.observe(&SimEvent::LeaderElected {
            cluster: ClusterId(0),
            new: NodeId(1),
            old: None,
        });
        metrics.observe(&SimEvent::CoLeaderPromoted {
            cluster: ClusterId(0),
            node: NodeId(2),
        });
        assert_eq!(metrics.clusters_formed, 1);
        assert_eq!(metrics.leader_elections, 1);
        assert_eq!(metrics.co_leader_promotions, 1);
        assert_eq!(metrics.nodes_flagged, 0);
    }

    #[test]
    fn summary_lists_every_counter_group() {
        let mut metrics = Metrics::default();
        metrics.ticks = 7;
        metrics.nodes_flagged = 2;
        let summary = metrics.summary();
        assert!(summary.contains("ticks: 7"));
        assert!(summary.contains("nodes flagged: 2"));
        assert!(summary.contains("relay hops"));
    }

    #[test]
    fn dispatch_sync_mirrors_fabric_stats() {
        let mut metrics = Metrics::default();
        metrics.sync_dispatch(DispatchStats {
            messages: 10,
            deliveries: 42,
            relay_hops: 5,
            inter_cluster_bridges: 2,
            undeliverable: 1,
            expired: 3,
        });
        assert_eq!(metrics.messages_processed, 10);
        assert_eq!(metrics.messages_delivered, 42);
        assert_eq!(metrics.messages_dropped, 4);
    }
}
