//! Simulator
//!
//! Single-threaded, tick-driven orchestration of the full pipeline:
//!
//! mobility → proximity rebuild → clustering reconcile → overlap merge
//! (cadenced) → failure detection → pending elections → relay refresh →
//! boundary elections (cadenced) → trust recompute + sleeper scan → PoA
//! round (cadenced) → V2V triggers and dispatch → invariant checks →
//! metrics and snapshot.
//!
//! Given the same seed, configuration, and mobility trace, every derived
//! value is bit-identical across runs: all iteration is in id order and
//! the only randomness is the seeded fleet generator.

use crate::authority::AuthorityMonitor;
use crate::clustering::ClusteringEngine;
use crate::config::SimConfig;
use crate::election::{elect_boundaries, ElectionCoordinator};
use crate::error::Result;
use crate::failover::FailureDetector;
use crate::messaging::MessagingFabric;
use crate::metrics::Metrics;
use crate::proximity::SpatialGrid;
use crate::scheduler::{TaskId, TickScheduler};
use crate::store::{NodeSpec, NodeStore};
use crate::trust::{detect_spike, CompositeContext, TrustEngine};
use crate::types::{
    ClusterId, ClusterRole, ClusterView, MessageKind, MessagePayload, MessageScope,
    MobilityUpdate, NodeId, NodeView, Position, SimEvent, TickSnapshot,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// The simulation core. Owns every component and drives the tick loop.
pub struct Simulator {
    config: SimConfig,
    store: NodeStore,
    grid: SpatialGrid,
    clustering: ClusteringEngine,
    trust: TrustEngine,
    election: ElectionCoordinator,
    failover: FailureDetector,
    authority: AuthorityMonitor,
    fabric: MessagingFabric,
    scheduler: TickScheduler,
    metrics: Metrics,
    rng: StdRng,
    tick: u64,

    merge_task: TaskId,
    poa_task: TaskId,
    boundary_task: TaskId,
    relay_task: TaskId,
    heartbeat_task: TaskId,
    emergency_task: TaskId,
    collision_task: TaskId,
    reelection_task: Option<TaskId>,
}

impl Simulator {
    /// Build a simulator from a validated configuration
    pub fn new(config: SimConfig) -> Result<Self> {
        config.validate()?;
        let mut scheduler = TickScheduler::new();
        let merge_task = scheduler.register("overlap-merge", config.merge_interval, 0);
        let poa_task = scheduler.register("poa-round", config.poa_interval, 0);
        let boundary_task = scheduler.register("boundary-election", config.boundary_interval, 0);
        let relay_task = scheduler.register("relay-refresh", config.relay_refresh_interval, 0);
        let heartbeat_task = scheduler.register("heartbeat", config.heartbeat_interval, 0);
        let emergency_task = scheduler.register("emergency-broadcast", config.emergency_interval, 0);
        let collision_task =
            scheduler.register("collision-check", config.collision_check_interval, 0);
        let reelection_task = (config.reelection_interval > 0)
            .then(|| scheduler.register("periodic-reelection", config.reelection_interval, 0));

        Ok(Self {
            grid: SpatialGrid::new(config.radio_range_r),
            store: NodeStore::new(),
            clustering: ClusteringEngine::new(config.clone()),
            trust: TrustEngine::new(config.clone()),
            election: ElectionCoordinator::new(config.clone()),
            failover: FailureDetector::new(config.clone()),
            authority: AuthorityMonitor::new(config.clone()),
            fabric: MessagingFabric::new(config.clone()),
            scheduler,
            metrics: Metrics::default(),
            rng: StdRng::seed_from_u64(config.seed),
            tick: 0,
            merge_task,
            poa_task,
            boundary_task,
            relay_task,
            heartbeat_task,
            emergency_task,
            collision_task,
            reelection_task,
            config,
        })
    }

    /// Register one node. Nodes are created at simulation start; the
    /// engine tolerates later disappearance but not re-insertion of an
    /// existing id.
    pub fn add_node(&mut self, spec: NodeSpec) -> Result<()> {
        self.store.insert(spec, &self.config)
    }

    /// Spawn `count` nodes with seeded-random positions, kinematics, and
    /// resource metrics inside a square of side `area`. About one in
    /// `1/malicious_ratio` nodes is marked ground-truth malicious.
    pub fn spawn_fleet(&mut self, count: usize, area: f64, malicious_ratio: f64) -> Result<Vec<NodeId>> {
        let mut ids = Vec::with_capacity(count);
        let base = self.store.len() as u64;
        for offset in 0..count as u64 {
            let id = NodeId(base + offset);
            let spec = NodeSpec {
                id,
                position: Position::new(
                    self.rng.gen_range(0.0..area),
                    self.rng.gen_range(0.0..area),
                ),
                speed: self.rng.gen_range(10.0..35.0),
                heading: self.rng.gen_range(0.0..std::f64::consts::TAU),
                lane_hint: self.rng.gen_range(0..4),
                bandwidth_mbps: self
                    .rng
                    .gen_range(self.config.bandwidth_min..self.config.bandwidth_max),
                processing_ghz: self
                    .rng
                    .gen_range(self.config.processing_min..self.config.processing_max),
                authenticity: self.rng.gen_range(0.6..1.0),
                cooperation: self.rng.gen_range(0.6..1.0),
                behavior_consistency: self.rng.gen_range(0.6..1.0),
                initial_trust: 0.5,
                is_malicious: self.rng.gen_bool(malicious_ratio.clamp(0.0, 1.0)),
                is_emergency: false,
            };
            self.store.insert(spec, &self.config)?;
            ids.push(id);
        }
        info!(count, "fleet spawned");
        Ok(ids)
    }

    /// Current tick
    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    /// Configuration in effect
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Lifetime metrics
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Read access to node records
    pub fn store(&self) -> &NodeStore {
        &self.store
    }

    /// Read access to cluster records
    pub fn clustering(&self) -> &ClusteringEngine {
        &self.clustering
    }

    /// Queue an application-level message for this tick's dispatch phase.
    /// Called before `advance_tick` for the tick in which it should land.
    pub fn send_message(
        &mut self,
        sender: NodeId,
        kind: MessageKind,
        scope: MessageScope,
        payload: MessagePayload,
        expiry_tick: Option<u64>,
    ) {
        self.fabric.enqueue(
            &mut self.store,
            sender,
            kind,
            scope,
            payload,
            self.tick + 1,
            expiry_tick,
        );
    }

    /// Advance the simulation by one tick.
    ///
    /// `tick_id` must be strictly greater than the previous tick.
    /// Mobility updates are validated at the boundary; invalid input
    /// (NaN coordinates, negative speed, unknown ids) and internal
    /// invariant regressions both panic: state is valid or the
    /// simulator halts, there is no partial tick.
    pub fn advance_tick(&mut self, tick_id: u64, mobility: &[MobilityUpdate]) -> TickSnapshot {
        assert!(
            tick_id > self.tick,
            "tick_id {tick_id} must be greater than current tick {}",
            self.tick
        );
        self.tick = tick_id;
        let tick = tick_id;
        let mut events: Vec<SimEvent> = Vec::new();

        // 1. Mobility ingestion (external collaborator input).
        if let Err(error) = self.store.apply_mobility(
            tick,
            mobility,
            self.config.hard_brake_threshold,
            self.config.suspicion_speed_limit,
        ) {
            panic!("mobility input rejected: {error}");
        }

        // 2. Proximity refresh.
        self.grid.rebuild(&self.store);

        // 3. Clustering reconcile; new clusters need elections this tick.
        let seeded: BTreeSet<ClusterId> = self
            .clustering
            .reconcile(tick, &mut self.store, &self.grid, &mut events)
            .into_iter()
            .collect();
        self.assert_radius_invariant();

        // 4. Overlap merge on its cadence.
        if self.scheduler.is_due(self.merge_task, tick) {
            self.clustering
                .merge_overlapping(tick, &mut self.store, &mut events);
        }

        // 5. Failure detection and succession (seeded clusters excluded:
        //    their first election is still pending).
        self.failover.check(
            tick,
            &mut self.clustering,
            &mut self.store,
            &self.election,
            &self.trust,
            &self.grid,
            &seeded,
            &mut events,
        );

        // 6. Pending elections for freshly seeded clusters.
        for cluster_id in &seeded {
            self.election.run_election(
                *cluster_id,
                tick,
                &mut self.clustering,
                &mut self.store,
                &self.trust,
                &self.grid,
                &mut events,
            );
        }

        // 6b. Forced periodic re-election, when enabled.
        if let Some(task) = self.reelection_task {
            if self.scheduler.is_due(task, tick) {
                for cluster_id in self.clustering.ids() {
                    if seeded.contains(&cluster_id) {
                        continue;
                    }
                    self.election.run_election(
                        cluster_id,
                        tick,
                        &mut self.clustering,
                        &mut self.store,
                        &self.trust,
                        &self.grid,
                        &mut events,
                    );
                }
            }
        }

        // 7. Relay refresh keeps invariant coverage as members drift.
        if self.scheduler.is_due(self.relay_task, tick) {
            for cluster_id in self.clustering.ids() {
                self.election.refresh_relays(
                    cluster_id,
                    tick,
                    &mut self.clustering,
                    &mut self.store,
                    &self.trust,
                    &self.grid,
                );
            }
        }

        // 8. Boundary elections on their own cadence.
        if self.scheduler.is_due(self.boundary_task, tick) {
            elect_boundaries(
                &mut self.clustering,
                &mut self.store,
                &self.trust,
                &self.grid,
                &self.config,
                tick,
            );
        }

        // 9. Trust phase: social decay, social recompute, composite
        //    sampling, trust recompute, sleeper scan.
        self.run_trust_phase(tick, &mut events);

        // 10. PoA round on its cadence; deposed leaders trigger an
        //     immediate failure re-check.
        if self.scheduler.is_due(self.poa_task, tick) {
            let outcome =
                self.authority
                    .run_round(tick, &self.clustering, &mut self.store, &mut events);
            if !outcome.deposed_leaders.is_empty() {
                self.failover.check(
                    tick,
                    &mut self.clustering,
                    &mut self.store,
                    &self.election,
                    &self.trust,
                    &self.grid,
                    &BTreeSet::new(),
                    &mut events,
                );
            }
        }

        // 11. V2V triggers, then the dispatch of everything queued.
        self.run_triggers(tick);
        self.fabric.process_tick(
            tick,
            &mut self.store,
            &self.clustering,
            &self.grid,
            &mut self.authority,
            &mut events,
        );

        // 12. Structural invariants; a violation is a bug, not an error.
        self.assert_state_invariants();

        // 13. Metrics from the post-component hook only.
        self.metrics.ticks += 1;
        for event in &events {
            self.metrics.observe(event);
        }
        self.metrics.sync_dispatch(self.fabric.stats());

        debug!(
            tick,
            clusters = self.clustering.len(),
            events = events.len(),
            "tick complete"
        );
        self.snapshot(tick, events)
    }

    /// Social decay, trust recompute, and the sleeper scan for all nodes
    fn run_trust_phase(&mut self, tick: u64, events: &mut Vec<SimEvent>) {
        self.store.decay_interactions(self.config.social_decay);

        let ids = self.store.ids();
        for &id in &ids {
            let Some(node) = self.store.get(id) else { continue };
            let neighbors =
                self.grid
                    .neighbors_within(&node.position, self.config.radio_range_r, Some(id));
            self.trust.recompute_social(&mut self.store, id, &neighbors);
        }

        for &id in &ids {
            let Some(node) = self.store.get(id) else { continue };
            let ctx = CompositeContext {
                distance_to_centroid: node.cluster_id.and_then(|cluster_id| {
                    self.clustering
                        .get(cluster_id)
                        .map(|c| node.position.distance_to(&c.centroid))
                }),
                neighbor_count: self
                    .grid
                    .neighbors_within(&node.position, self.config.radio_range_r, Some(id))
                    .len(),
                tick,
            };
            let composite = self.trust.composite_score(node, &ctx);
            self.store.push_history_sample(id, tick, composite);
            self.trust.recompute_trust(&mut self.store, id);
        }

        for &id in &ids {
            let Some(node) = self.store.get(id) else { continue };
            if node.is_sleeper_flagged {
                continue;
            }
            // High-trust authorities are exempt: their standing is earned,
            // not spiked.
            if node.trust_score > self.config.authority_trust_threshold
                && !node.is_flagged_malicious
            {
                continue;
            }
            if let Some(spike) = detect_spike(
                &node.historical_samples,
                self.config.sleeper_window_ticks,
                self.config.sleeper_spike_threshold,
            ) {
                self.store.flag_sleeper(id, tick + self.config.ban_duration);
                info!(node = %id, spike, "sleeper spike detected");
                events.push(SimEvent::SleeperFlagged { node: id, spike });
            }
        }
    }

    /// Emit the cadenced simulator-side broadcasts: status beacons,
    /// emergency alerts, collision risks, hard-brake and jam warnings.
    fn run_triggers(&mut self, tick: u64) {
        // Status beacons: leaders announce, everyone else heartbeats.
        if self.scheduler.is_due(self.heartbeat_task, tick) {
            for id in self.store.ids() {
                let Some(node) = self.store.get(id) else { continue };
                let payload = MessagePayload::Status {
                    role: node.display_role(),
                    trust: node.trust_score,
                };
                let (kind, scope) = if node.role == ClusterRole::Leader {
                    (MessageKind::LeaderAnnouncement, MessageScope::IntraCluster)
                } else {
                    (MessageKind::Heartbeat, MessageScope::DirectRadio)
                };
                self.fabric
                    .enqueue(&mut self.store, id, kind, scope, payload, tick, None);
            }
        }

        // Emergency vehicles broadcast on their cadence, cluster-wide and
        // across boundaries when clustered.
        if self.scheduler.is_due(self.emergency_task, tick) {
            for id in self.store.ids() {
                let Some(node) = self.store.get(id) else { continue };
                if !node.is_emergency {
                    continue;
                }
                let scope = if node.cluster_id.is_some() {
                    MessageScope::InterCluster
                } else {
                    MessageScope::DirectRadio
                };
                self.fabric.enqueue(
                    &mut self.store,
                    id,
                    MessageKind::EmergencyAlert,
                    scope,
                    MessagePayload::Empty,
                    tick,
                    None,
                );
            }
        }

        // Collision risk: a faster follower closing on a node within the
        // collision distance warns its surroundings.
        if self.scheduler.is_due(self.collision_task, tick) {
            for id in self.store.ids() {
                let Some(node) = self.store.get(id) else { continue };
                let ahead = self
                    .grid
                    .neighbors_within(&node.position, self.config.collision_distance, Some(id));
                let closing = ahead.iter().any(|&other_id| {
                    self.store.get(other_id).map_or(false, |other| {
                        let dx = other.position.x - node.position.x;
                        let dy = other.position.y - node.position.y;
                        let forward = dx * node.heading.cos() + dy * node.heading.sin();
                        forward > 0.0 && node.speed > other.speed
                    })
                });
                if closing {
                    self.fabric.enqueue(
                        &mut self.store,
                        id,
                        MessageKind::CollisionWarning,
                        MessageScope::DirectRadio,
                        MessagePayload::Empty,
                        tick,
                        None,
                    );
                }
            }
        }

        // Hard braking detected from the mobility delta this tick.
        for id in self.store.ids() {
            let Some(node) = self.store.get(id) else { continue };
            let speed = node.speed;
            let drop = node.prev_speed - speed;
            if drop > self.config.hard_brake_threshold {
                self.fabric.enqueue(
                    &mut self.store,
                    id,
                    MessageKind::BrakeWarning,
                    MessageScope::DirectRadio,
                    MessagePayload::Brake {
                        speed,
                        deceleration: drop,
                    },
                    tick,
                    None,
                );
            }
        }

        // Traffic jams: enough slow vehicles packed together produce one
        // alert from the lowest-id member of each jam neighborhood.
        let slow: Vec<(NodeId, Position)> = self
            .store
            .iter()
            .filter(|n| n.speed < self.config.slow_speed_threshold)
            .map(|n| (n.id, n.position))
            .collect();
        let mut covered: BTreeSet<NodeId> = BTreeSet::new();
        for &(id, position) in &slow {
            if covered.contains(&id) {
                continue;
            }
            let packed: Vec<NodeId> = slow
                .iter()
                .filter(|(_, p)| position.distance_to(p) < self.config.jam_radius)
                .map(|&(other, _)| other)
                .collect();
            if packed.len() >= self.config.jam_min_vehicles {
                let scope = if self.store.get(id).and_then(|n| n.cluster_id).is_some() {
                    MessageScope::IntraCluster
                } else {
                    MessageScope::DirectRadio
                };
                self.fabric.enqueue(
                    &mut self.store,
                    id,
                    MessageKind::TrafficJamAlert,
                    scope,
                    MessagePayload::TrafficJam {
                        x: position.x,
                        y: position.y,
                        vehicle_count: packed.len(),
                    },
                    tick,
                    None,
                );
                covered.extend(packed);
            }
        }
    }

    /// Membership radius invariant, checked right after reconcile
    fn assert_radius_invariant(&self) {
        for cluster in self.clustering.iter() {
            for &member in &cluster.members {
                let Some(node) = self.store.get(member) else {
                    panic!("cluster {} holds unknown member {member}", cluster.id);
                };
                let distance = node.position.distance_to(&cluster.centroid);
                assert!(
                    distance <= self.config.max_cluster_radius + 1e-9,
                    "member {member} of {} is {distance:.1} from centroid",
                    cluster.id
                );
            }
        }
    }

    /// Structural invariants checked at the end of every tick
    fn assert_state_invariants(&self) {
        // Bidirectional node/cluster consistency.
        for node in self.store.iter() {
            if let Some(cluster_id) = node.cluster_id {
                let cluster = self
                    .clustering
                    .get(cluster_id)
                    .unwrap_or_else(|| panic!("{} links dead cluster {cluster_id}", node.id));
                assert!(
                    cluster.members.contains(&node.id),
                    "{} not in member set of {cluster_id}",
                    node.id
                );
            }
            assert!(
                (0.0..=1.0).contains(&node.trust_score),
                "{} trust {} out of range",
                node.id,
                node.trust_score
            );
            assert!(
                node.historical_samples.len() <= crate::store::HISTORY_CAPACITY,
                "{} history ring overflow",
                node.id
            );
        }
        for cluster in self.clustering.iter() {
            for &member in &cluster.members {
                let node = self
                    .store
                    .get(member)
                    .unwrap_or_else(|| panic!("{} holds unknown member {member}", cluster.id));
                assert_eq!(
                    node.cluster_id,
                    Some(cluster.id),
                    "{member} member of {} but linked elsewhere",
                    cluster.id
                );
            }
            // Exactly one leader with the Leader role, at most one co-leader.
            let leaders: Vec<NodeId> = cluster
                .members
                .iter()
                .copied()
                .filter(|&m| {
                    self.store
                        .get(m)
                        .map_or(false, |n| n.role == ClusterRole::Leader)
                })
                .collect();
            assert_eq!(
                leaders,
                vec![cluster.leader_id],
                "{} leader set mismatch",
                cluster.id
            );
            if let Some(co) = cluster.co_leader_id {
                assert_ne!(co, cluster.leader_id, "{} co-leader is leader", cluster.id);
                assert!(
                    cluster.members.contains(&co),
                    "{} co-leader not a member",
                    cluster.id
                );
            }
        }
    }

    /// Build the per-tick snapshot record
    fn snapshot(&self, tick: u64, events: Vec<SimEvent>) -> TickSnapshot {
        let nodes: Vec<NodeView> = self
            .store
            .iter()
            .map(|node| NodeView {
                id: node.id,
                position: node.position,
                speed: node.speed,
                heading: node.heading,
                cluster_id: node.cluster_id,
                role: node.display_role(),
                trust_score: node.trust_score,
                is_flagged_malicious: node.is_flagged_malicious,
            })
            .collect();
        let clusters: Vec<ClusterView> = self
            .clustering
            .iter()
            .map(|cluster| {
                let radius = cluster
                    .members
                    .iter()
                    .filter_map(|&m| self.store.get(m))
                    .map(|n| n.position.distance_to(&cluster.centroid))
                    .fold(0.0, f64::max);
                ClusterView {
                    id: cluster.id,
                    leader_id: cluster.leader_id,
                    co_leader_id: cluster.co_leader_id,
                    members: cluster.members.iter().copied().collect(),
                    relays: cluster.relay_set.iter().copied().collect(),
                    boundaries: cluster
                        .boundary_map
                        .iter()
                        .map(|(&c, &n)| (c, n))
                        .collect(),
                    centroid: cluster.centroid,
                    radius,
                }
            })
            .collect();
        TickSnapshot {
            tick,
            nodes,
            clusters,
            events,
        }
    }
}
