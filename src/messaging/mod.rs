//! V2V Messaging Fabric
//!
//! Time-discrete, synchronous channel model: a message emitted in tick
//! `t` is delivered in tick `t`, before the metrics snapshot. Delivery
//! requires a hop path within radio range in the message's scope:
//!
//! - **DirectRadio**: everyone within radio range of the sender
//! - **IntraCluster**: cluster members over at most two forwarding hops
//!   (sender → relay → member, or sender → leader → relay → member),
//!   delivered exactly once
//! - **InterCluster**: intra-cluster delivery plus a bridge through the
//!   facing boundary-node pair of each neighboring cluster
//!
//! The fabric reads a clustering snapshot and never mutates cluster
//! state; receiver effects touch node speeds and cached peer views only.

use crate::authority::AuthorityMonitor;
use crate::clustering::ClusteringEngine;
use crate::config::SimConfig;
use crate::proximity::SpatialGrid;
use crate::store::{NodeStore, PeerStatus};
use crate::types::{
    ClusterId, MessageKind, MessagePayload, MessageScope, NodeId, SimEvent, V2vMessage,
};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, trace};

/// Counters accumulated across the fabric's lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Messages processed
    pub messages: u64,

    /// Individual deliveries (message × recipient)
    pub deliveries: u64,

    /// Deliveries that crossed a relay hop
    pub relay_hops: u64,

    /// Messages bridged into a neighboring cluster
    pub inter_cluster_bridges: u64,

    /// Messages dropped because a recipient vanished mid-tick
    pub undeliverable: u64,

    /// Messages dropped past their expiry tick
    pub expired: u64,
}

/// Queued, deterministic V2V dispatch
#[derive(Debug)]
pub struct MessagingFabric {
    config: SimConfig,
    queue: Vec<V2vMessage>,
    sequences: BTreeMap<NodeId, u64>,
    stats: DispatchStats,
}

impl MessagingFabric {
    /// Create a fabric bound to a configuration
    pub fn new(config: SimConfig) -> Self {
        Self {
            config,
            queue: Vec::new(),
            sequences: BTreeMap::new(),
            stats: DispatchStats::default(),
        }
    }

    /// Lifetime dispatch counters
    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    /// Queue a message for this tick's dispatch. Sequence numbers are
    /// per-sender and monotonic; together with the sender id they fix the
    /// processing order.
    pub fn enqueue(
        &mut self,
        store: &mut NodeStore,
        sender_id: NodeId,
        kind: MessageKind,
        scope: MessageScope,
        payload: MessagePayload,
        tick: u64,
        expiry_tick: Option<u64>,
    ) {
        let sequence = self.sequences.entry(sender_id).or_insert(0);
        *sequence += 1;
        let message = V2vMessage {
            kind,
            sender_id,
            sequence: *sequence,
            emitted_tick: tick,
            expiry_tick,
            scope,
            payload,
        };
        store.bump_message_count(sender_id);
        trace!(sender = %sender_id, %kind, "message enqueued");
        self.queue.push(message);
    }

    /// Drain and dispatch the queue in (sender, sequence) order.
    pub fn process_tick(
        &mut self,
        tick: u64,
        store: &mut NodeStore,
        clustering: &ClusteringEngine,
        grid: &SpatialGrid,
        authority: &mut AuthorityMonitor,
        events: &mut Vec<SimEvent>,
    ) {
        let mut queue = std::mem::take(&mut self.queue);
        queue.sort_by_key(|m| (m.sender_id, m.sequence));

        for message in queue {
            if matches!(message.expiry_tick, Some(expiry) if tick > expiry) {
                self.stats.expired += 1;
                continue;
            }
            if !store.contains(message.sender_id) {
                self.stats.undeliverable += 1;
                continue;
            }
            self.stats.messages += 1;

            let recipients = self.recipients_of(&message, store, clustering, grid);

            // Trust proposals and flag reports accumulate at the monitor
            // regardless of how far the broadcast carried.
            if matches!(
                message.kind,
                MessageKind::TrustProposal | MessageKind::AuthorityFlag
            ) {
                if let MessagePayload::Trust { target, .. } = message.payload {
                    authority.accumulate_report(target);
                }
            }

            let mut delivered = 0usize;
            for &recipient in &recipients {
                if !store.contains(recipient) {
                    self.stats.undeliverable += 1;
                    continue;
                }
                self.apply_effect(&message, recipient, store);
                store.record_interaction(recipient, message.sender_id);
                delivered += 1;
            }
            self.stats.deliveries += delivered as u64;

            debug!(
                sender = %message.sender_id,
                kind = %message.kind,
                recipients = delivered,
                "message dispatched"
            );
            events.push(SimEvent::MessageDelivered {
                sender: message.sender_id,
                kind: message.kind,
                recipients: delivered,
            });
        }
    }

    /// Resolve the recipient set for a message under its scope
    fn recipients_of(
        &mut self,
        message: &V2vMessage,
        store: &NodeStore,
        clustering: &ClusteringEngine,
        grid: &SpatialGrid,
    ) -> BTreeSet<NodeId> {
        let sender_id = message.sender_id;
        let mut recipients = BTreeSet::new();
        let Some(sender) = store.get(sender_id) else {
            return recipients;
        };

        match message.scope {
            MessageScope::DirectRadio => {
                recipients.extend(grid.neighbors_within(
                    &sender.position,
                    self.config.radio_range_r,
                    Some(sender_id),
                ));
            }
            MessageScope::IntraCluster => {
                if let Some(cluster_id) = sender.cluster_id {
                    self.collect_intra_cluster(
                        sender_id, cluster_id, store, clustering, &mut recipients,
                    );
                } else {
                    // Unclustered senders degrade to direct radio.
                    recipients.extend(grid.neighbors_within(
                        &sender.position,
                        self.config.radio_range_r,
                        Some(sender_id),
                    ));
                }
            }
            MessageScope::InterCluster => {
                if let Some(cluster_id) = sender.cluster_id {
                    self.collect_intra_cluster(
                        sender_id, cluster_id, store, clustering, &mut recipients,
                    );
                    self.collect_bridged(
                        sender_id, cluster_id, store, clustering, &mut recipients,
                    );
                } else {
                    recipients.extend(grid.neighbors_within(
                        &sender.position,
                        self.config.radio_range_r,
                        Some(sender_id),
                    ));
                }
            }
        }
        recipients.remove(&sender_id);
        recipients
    }

    /// Members of `cluster_id` reachable from `origin` within two
    /// forwarding hops. Each reachable member lands in the set once.
    fn collect_intra_cluster(
        &mut self,
        origin: NodeId,
        cluster_id: ClusterId,
        store: &NodeStore,
        clustering: &ClusteringEngine,
        recipients: &mut BTreeSet<NodeId>,
    ) {
        let Some(cluster) = clustering.get(cluster_id) else {
            return;
        };
        let Some(origin_node) = store.get(origin) else {
            return;
        };
        let range = self.config.radio_range_r;

        // Hop 0: members in direct range of the origin.
        for &member in &cluster.members {
            if member == origin {
                continue;
            }
            if let Some(node) = store.get(member) {
                if origin_node.position.distance_to(&node.position) <= range {
                    recipients.insert(member);
                }
            }
        }

        // Forwarders the origin can reach: relays directly, plus relays
        // one leader-hop away.
        let mut forwarders: BTreeSet<NodeId> = BTreeSet::new();
        for &relay in &cluster.relay_set {
            if relay == origin {
                continue;
            }
            if let Some(node) = store.get(relay) {
                if origin_node.position.distance_to(&node.position) <= range {
                    forwarders.insert(relay);
                }
            }
        }
        if let Some(leader) = store.get(cluster.leader_id) {
            if cluster.leader_id != origin
                && origin_node.position.distance_to(&leader.position) <= range
            {
                for &relay in &cluster.relay_set {
                    if relay == origin {
                        continue;
                    }
                    if let Some(node) = store.get(relay) {
                        if leader.position.distance_to(&node.position) <= range {
                            forwarders.insert(relay);
                        }
                    }
                }
            }
        }

        // Final hop: members in range of a reachable forwarder.
        for &relay in &forwarders {
            let Some(relay_node) = store.get(relay) else {
                continue;
            };
            for &member in &cluster.members {
                if member == origin || recipients.contains(&member) {
                    continue;
                }
                if let Some(node) = store.get(member) {
                    if relay_node.position.distance_to(&node.position) <= range {
                        recipients.insert(member);
                        self.stats.relay_hops += 1;
                    }
                }
            }
        }
    }

    /// Bridge into each neighboring cluster whose facing boundary node is
    /// within radio range of ours, then re-broadcast intra-cluster there.
    fn collect_bridged(
        &mut self,
        origin: NodeId,
        cluster_id: ClusterId,
        store: &NodeStore,
        clustering: &ClusteringEngine,
        recipients: &mut BTreeSet<NodeId>,
    ) {
        let Some(cluster) = clustering.get(cluster_id) else {
            return;
        };
        let boundary_map = cluster.boundary_map.clone();

        for (neighbor_id, our_boundary) in boundary_map {
            let Some(neighbor) = clustering.get(neighbor_id) else {
                continue;
            };
            let Some(&their_boundary) = neighbor.boundary_map.get(&cluster_id) else {
                continue;
            };
            let (Some(ours), Some(theirs)) = (store.get(our_boundary), store.get(their_boundary))
            else {
                continue;
            };
            if ours.position.distance_to(&theirs.position) > self.config.radio_range_r {
                continue;
            }
            // The message must first reach our boundary node.
            if !recipients.contains(&our_boundary) && our_boundary != origin {
                continue;
            }
            self.stats.inter_cluster_bridges += 1;
            recipients.insert(their_boundary);
            self.collect_intra_cluster(their_boundary, neighbor_id, store, clustering, recipients);
        }
    }

    /// Receiver-side effect of one delivery
    fn apply_effect(&self, message: &V2vMessage, recipient: NodeId, store: &mut NodeStore) {
        let Some(node) = store.get(recipient) else { return };
        let speed = node.speed;
        match message.kind {
            MessageKind::CollisionWarning => {
                store.set_speed(recipient, (0.7 * speed).max(10.0));
            }
            MessageKind::LaneChangeAlert => {
                if matches!(message.payload, MessagePayload::LaneChange { safe: false }) {
                    store.set_speed(recipient, (0.9 * speed).max(5.0));
                }
            }
            MessageKind::EmergencyAlert => {
                if !node.is_emergency {
                    store.set_speed(recipient, (0.5 * speed).max(5.0));
                }
            }
            MessageKind::BrakeWarning => {
                store.set_speed(recipient, (speed - 10.0).max(0.0));
            }
            MessageKind::TrafficJamAlert => {
                store.set_speed(recipient, (0.6 * speed).max(5.0));
            }
            MessageKind::Heartbeat | MessageKind::LeaderAnnouncement => {
                if let MessagePayload::Status { role, trust } = message.payload {
                    store.update_peer_view(
                        recipient,
                        message.sender_id,
                        PeerStatus {
                            role,
                            trust,
                            observed_tick: message.emitted_tick,
                        },
                    );
                }
            }
            // Accumulated at the monitor during dispatch; no node effect.
            MessageKind::TrustProposal | MessageKind::AuthorityFlag => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::NodeSpec;
    use crate::types::DisplayRole;

    struct Fixture {
        config: SimConfig,
        store: NodeStore,
        grid: SpatialGrid,
        clustering: ClusteringEngine,
        authority: AuthorityMonitor,
        fabric: MessagingFabric,
        events: Vec<SimEvent>,
    }

    fn fixture(specs: Vec<NodeSpec>) -> Fixture {
        let config = SimConfig::default();
        let mut store = NodeStore::new();
        for spec in specs {
            store.insert(spec, &config).unwrap();
        }
        let mut grid = SpatialGrid::new(config.radio_range_r);
        grid.rebuild(&store);
        Fixture {
            store,
            grid,
            clustering: ClusteringEngine::new(config.clone()),
            authority: AuthorityMonitor::new(config.clone()),
            fabric: MessagingFabric::new(config.clone()),
            config,
            events: Vec::new(),
        }
    }

    fn convoy(count: u64, spacing: f64) -> Vec<NodeSpec> {
        (0..count)
            .map(|i| NodeSpec::benign(i, i as f64 * spacing, 0.0, 25.0, 0.0))
            .collect()
    }

    #[test]
    fn direct_radio_reaches_range_only() {
        let mut f = fixture(vec![
            NodeSpec::benign(0, 0.0, 0.0, 25.0, 0.0),
            NodeSpec::benign(1, 100.0, 0.0, 25.0, 0.0),
            NodeSpec::benign(2, 1_000.0, 0.0, 25.0, 0.0),
        ]);
        f.fabric.enqueue(
            &mut f.store,
            NodeId(0),
            MessageKind::BrakeWarning,
            MessageScope::DirectRadio,
            MessagePayload::Brake {
                speed: 15.0,
                deceleration: 12.0,
            },
            1,
            None,
        );
        f.fabric.process_tick(
            1,
            &mut f.store,
            &f.clustering,
            &f.grid,
            &mut f.authority,
            &mut f.events,
        );
        // In-range node braked by 10, distant node untouched
        assert_eq!(f.store.get(NodeId(1)).unwrap().speed, 15.0);
        assert_eq!(f.store.get(NodeId(2)).unwrap().speed, 25.0);
        assert!(f.events.iter().any(|e| matches!(
            e,
            SimEvent::MessageDelivered {
                sender: NodeId(0),
                kind: MessageKind::BrakeWarning,
                recipients: 1,
            }
        )));
    }

    #[test]
    fn intra_cluster_relays_reach_stranded_members_exactly_once() {
        // Chain: leader 0 at origin, members every 200 units; member 2 is
        // out of leader range and needs the relay at 200.
        let mut f = fixture(vec![
            NodeSpec::benign(0, 0.0, 0.0, 25.0, 0.0),
            NodeSpec::benign(1, 200.0, 0.0, 25.0, 0.0),
            NodeSpec::benign(2, 400.0, 0.0, 25.0, 0.0),
        ]);
        let seeded = f
            .clustering
            .reconcile(1, &mut f.store, &f.grid, &mut f.events);
        let cluster_id = seeded[0];
        // The far member attaches on the next reconcile, once the seeded
        // cluster's centroid is in reach.
        f.clustering
            .reconcile(2, &mut f.store, &f.grid, &mut f.events);
        assert_eq!(f.clustering.get(cluster_id).unwrap().size(), 3);
        f.clustering.set_leader(cluster_id, NodeId(0), &mut f.store);
        f.clustering
            .set_relays(cluster_id, [NodeId(1)].into_iter().collect(), &mut f.store);
        f.events.clear();

        f.fabric.enqueue(
            &mut f.store,
            NodeId(0),
            MessageKind::CollisionWarning,
            MessageScope::IntraCluster,
            MessagePayload::Empty,
            1,
            None,
        );
        f.fabric.process_tick(
            1,
            &mut f.store,
            &f.clustering,
            &f.grid,
            &mut f.authority,
            &mut f.events,
        );

        // Both members received it exactly once: 25 -> 17.5
        assert!((f.store.get(NodeId(1)).unwrap().speed - 17.5).abs() < 1e-9);
        assert!((f.store.get(NodeId(2)).unwrap().speed - 17.5).abs() < 1e-9);
        assert!(f.events.iter().any(|e| matches!(
            e,
            SimEvent::MessageDelivered { recipients: 2, .. }
        )));
        assert!(f.fabric.stats().relay_hops >= 1);
    }

    #[test]
    fn inter_cluster_bridges_through_facing_boundaries() {
        // Two clusters 400 apart; boundary nodes at the facing edges are
        // within radio range of each other.
        let mut specs = convoy(3, 20.0);
        for i in 3..6u64 {
            let mut spec = NodeSpec::benign(i, 400.0 + (i - 3) as f64 * 20.0, 0.0, 25.0, 0.0);
            spec.heading = std::f64::consts::PI;
            specs.push(spec);
        }
        let mut f = fixture(specs);
        let seeded = f
            .clustering
            .reconcile(1, &mut f.store, &f.grid, &mut f.events);
        assert_eq!(seeded.len(), 2);
        let (c1, c2) = (seeded[0], seeded[1]);
        f.clustering.set_leader(c1, NodeId(0), &mut f.store);
        f.clustering.set_leader(c2, NodeId(4), &mut f.store);
        // Facing boundaries: node 2 at (40,0) and node 3 at (400,0) are
        // 360 apart -- out of range. Move them closer first.
        let updates = vec![
            crate::types::MobilityUpdate {
                node_id: NodeId(2),
                position: crate::types::Position::new(150.0, 0.0),
                speed: 25.0,
                heading: 0.0,
                lane_hint: 0,
            },
            crate::types::MobilityUpdate {
                node_id: NodeId(3),
                position: crate::types::Position::new(320.0, 0.0),
                speed: 25.0,
                heading: std::f64::consts::PI,
                lane_hint: 0,
            },
        ];
        f.store.apply_mobility(2, &updates, 10.0, 75.0).unwrap();
        f.grid.rebuild(&f.store);
        f.clustering
            .set_boundary_map(c1, [(c2, NodeId(2))].into_iter().collect(), &mut f.store);
        f.clustering
            .set_boundary_map(c2, [(c1, NodeId(3))].into_iter().collect(), &mut f.store);
        f.events.clear();

        f.fabric.enqueue(
            &mut f.store,
            NodeId(0),
            MessageKind::EmergencyAlert,
            MessageScope::InterCluster,
            MessagePayload::Empty,
            2,
            None,
        );
        f.fabric.process_tick(
            2,
            &mut f.store,
            &f.clustering,
            &f.grid,
            &mut f.authority,
            &mut f.events,
        );

        // Members of both clusters slowed to half (floor 5)
        for id in [1, 2, 3, 4, 5] {
            assert!(
                (f.store.get(NodeId(id)).unwrap().speed - 12.5).abs() < 1e-9,
                "node {id} should have halved speed"
            );
        }
        assert_eq!(f.fabric.stats().inter_cluster_bridges, 1);
    }

    #[test]
    fn effects_follow_the_kind_table() {
        let mut f = fixture(vec![
            NodeSpec::benign(0, 0.0, 0.0, 25.0, 0.0),
            NodeSpec::benign(1, 100.0, 0.0, 30.0, 0.0),
        ]);
        let cases: Vec<(MessageKind, MessagePayload, f64)> = vec![
            (MessageKind::CollisionWarning, MessagePayload::Empty, 21.0),
            (
                MessageKind::LaneChangeAlert,
                MessagePayload::LaneChange { safe: false },
                27.0,
            ),
            (MessageKind::EmergencyAlert, MessagePayload::Empty, 15.0),
            (
                MessageKind::BrakeWarning,
                MessagePayload::Brake {
                    speed: 10.0,
                    deceleration: 12.0,
                },
                20.0,
            ),
            (MessageKind::TrafficJamAlert, MessagePayload::Empty, 18.0),
        ];
        for (kind, payload, expected) in cases {
            f.store.set_speed(NodeId(1), 30.0);
            f.fabric.enqueue(
                &mut f.store,
                NodeId(0),
                kind,
                MessageScope::DirectRadio,
                payload,
                1,
                None,
            );
            f.fabric.process_tick(
                1,
                &mut f.store,
                &f.clustering,
                &f.grid,
                &mut f.authority,
                &mut f.events,
            );
            assert!(
                (f.store.get(NodeId(1)).unwrap().speed - expected).abs() < 1e-9,
                "{kind} should set speed {expected}"
            );
        }
        // Safe lane change has no effect
        f.store.set_speed(NodeId(1), 30.0);
        f.fabric.enqueue(
            &mut f.store,
            NodeId(0),
            MessageKind::LaneChangeAlert,
            MessageScope::DirectRadio,
            MessagePayload::LaneChange { safe: true },
            1,
            None,
        );
        f.fabric.process_tick(
            1,
            &mut f.store,
            &f.clustering,
            &f.grid,
            &mut f.authority,
            &mut f.events,
        );
        assert_eq!(f.store.get(NodeId(1)).unwrap().speed, 30.0);
    }

    #[test]
    fn emergency_vehicles_ignore_emergency_alerts() {
        let mut responder = NodeSpec::benign(1, 100.0, 0.0, 40.0, 0.0);
        responder.is_emergency = true;
        let mut f = fixture(vec![NodeSpec::benign(0, 0.0, 0.0, 25.0, 0.0), responder]);
        f.fabric.enqueue(
            &mut f.store,
            NodeId(0),
            MessageKind::EmergencyAlert,
            MessageScope::DirectRadio,
            MessagePayload::Empty,
            1,
            None,
        );
        f.fabric.process_tick(
            1,
            &mut f.store,
            &f.clustering,
            &f.grid,
            &mut f.authority,
            &mut f.events,
        );
        assert_eq!(f.store.get(NodeId(1)).unwrap().speed, 40.0);
    }

    #[test]
    fn heartbeat_updates_peer_view_and_interactions() {
        let mut f = fixture(convoy(2, 100.0));
        f.fabric.enqueue(
            &mut f.store,
            NodeId(0),
            MessageKind::Heartbeat,
            MessageScope::DirectRadio,
            MessagePayload::Status {
                role: DisplayRole::Leader,
                trust: 0.83,
            },
            4,
            None,
        );
        f.fabric.process_tick(
            4,
            &mut f.store,
            &f.clustering,
            &f.grid,
            &mut f.authority,
            &mut f.events,
        );
        let receiver = f.store.get(NodeId(1)).unwrap();
        let view = receiver.peer_view.get(&NodeId(0)).unwrap();
        assert_eq!(view.role, DisplayRole::Leader);
        assert!((view.trust - 0.83).abs() < 1e-12);
        assert_eq!(view.observed_tick, 4);
        assert!(receiver.interactions.get(&NodeId(0)).copied().unwrap_or(0.0) > 0.0);
    }

    #[test]
    fn expired_messages_are_dropped() {
        let mut f = fixture(convoy(2, 100.0));
        f.fabric.enqueue(
            &mut f.store,
            NodeId(0),
            MessageKind::CollisionWarning,
            MessageScope::DirectRadio,
            MessagePayload::Empty,
            1,
            Some(3),
        );
        f.fabric.process_tick(
            5,
            &mut f.store,
            &f.clustering,
            &f.grid,
            &mut f.authority,
            &mut f.events,
        );
        assert_eq!(f.store.get(NodeId(1)).unwrap().speed, 25.0);
        assert_eq!(f.fabric.stats().expired, 1);
        assert!(f.events.is_empty());
    }

    #[test]
    fn processing_order_is_sender_then_sequence() {
        let mut f = fixture(convoy(3, 100.0));
        // Enqueue out of id order; both slow node 1.
        f.fabric.enqueue(
            &mut f.store,
            NodeId(2),
            MessageKind::BrakeWarning,
            MessageScope::DirectRadio,
            MessagePayload::Empty,
            1,
            None,
        );
        f.fabric.enqueue(
            &mut f.store,
            NodeId(0),
            MessageKind::CollisionWarning,
            MessageScope::DirectRadio,
            MessagePayload::Empty,
            1,
            None,
        );
        f.fabric.process_tick(
            1,
            &mut f.store,
            &f.clustering,
            &f.grid,
            &mut f.authority,
            &mut f.events,
        );
        // Node 0's collision warning applies first (0.7*25 = 17.5), then
        // node 2's brake warning (17.5 - 10 = 7.5): effects compose.
        assert!((f.store.get(NodeId(1)).unwrap().speed - 7.5).abs() < 1e-9);
        let delivered: Vec<NodeId> = f
            .events
            .iter()
            .filter_map(|e| match e {
                SimEvent::MessageDelivered { sender, .. } => Some(*sender),
                _ => None,
            })
            .collect();
        assert_eq!(delivered, vec![NodeId(0), NodeId(2)]);
    }

    #[test]
    fn trust_proposals_accumulate_at_the_monitor() {
        let mut f = fixture(convoy(2, 100.0));
        f.fabric.enqueue(
            &mut f.store,
            NodeId(0),
            MessageKind::AuthorityFlag,
            MessageScope::DirectRadio,
            MessagePayload::Trust {
                target: NodeId(1),
                suspicion: 0.7,
            },
            1,
            None,
        );
        f.fabric.process_tick(
            1,
            &mut f.store,
            &f.clustering,
            &f.grid,
            &mut f.authority,
            &mut f.events,
        );
        // The pending report raises node 1's suspicion by 0.2
        let node = f.store.get(NodeId(1)).unwrap();
        let baseline = {
            let monitor = AuthorityMonitor::new(f.config.clone());
            monitor.suspicion_of(node)
        };
        assert!((f.authority.suspicion_of(node) - baseline - 0.2).abs() < 1e-12);
    }
}
