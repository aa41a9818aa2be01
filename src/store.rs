//! Node State Store
//!
//! Exclusive owner of every per-vehicle record. Other components hold
//! `NodeId` handles and read-only views; every mutation goes through the
//! typed mutator API here, which clamps scores and keeps counters
//! consistent. Input invariants (finite coordinates, non-negative speed,
//! unique ids) are enforced at this boundary and never reach internals.

use crate::config::SimConfig;
use crate::error::{Error, Result};
use crate::types::{
    clamp01, ClusterId, ClusterRole, DisplayRole, MobilityUpdate, NodeId, Position,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use tracing::debug;

/// Capacity of the historical trust ring
pub const HISTORY_CAPACITY: usize = 10;

/// Cached view of a peer, refreshed by Heartbeat / LeaderAnnouncement
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeerStatus {
    pub role: DisplayRole,
    pub trust: f64,
    pub observed_tick: u64,
}

/// Initial description of a node, consumed once at simulation start
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: NodeId,
    pub position: Position,
    pub speed: f64,
    pub heading: f64,
    pub lane_hint: u32,

    /// Static resource metrics
    pub bandwidth_mbps: f64,
    pub processing_ghz: f64,

    /// Behavior priors in [0, 1]
    pub authenticity: f64,
    pub cooperation: f64,
    pub behavior_consistency: f64,

    /// Starting trust score
    pub initial_trust: f64,

    /// Ground truth for evaluation; never read by detectors
    pub is_malicious: bool,

    /// Emergency-class vehicle (broadcasts alerts, exempt from slow-downs)
    pub is_emergency: bool,
}

impl NodeSpec {
    /// A benign node with mid-range resources, for tests and quick setups
    pub fn benign(id: u64, x: f64, y: f64, speed: f64, heading: f64) -> Self {
        Self {
            id: NodeId(id),
            position: Position::new(x, y),
            speed,
            heading,
            lane_hint: 0,
            bandwidth_mbps: 100.0,
            processing_ghz: 2.5,
            authenticity: 0.9,
            cooperation: 0.9,
            behavior_consistency: 0.9,
            initial_trust: 0.5,
            is_malicious: false,
            is_emergency: false,
        }
    }
}

/// Mutable per-vehicle record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: NodeId,

    // Kinematics
    pub position: Position,
    pub speed: f64,
    pub prev_speed: f64,
    pub heading: f64,
    pub lane_hint: u32,

    // Static resources
    pub bandwidth_mbps: f64,
    pub processing_ghz: f64,

    // Trust state
    pub historical_samples: VecDeque<(u64, f64)>,
    pub social_trust: f64,
    pub trust_score: f64,
    pub authenticity: f64,
    pub cooperation: f64,
    pub behavior_consistency: f64,

    // Flags
    pub is_malicious: bool,
    pub is_emergency: bool,
    pub is_flagged_malicious: bool,
    pub is_sleeper_flagged: bool,
    pub election_banned_until: Option<u64>,

    // Cluster linkage
    pub cluster_id: Option<ClusterId>,
    pub role: ClusterRole,
    pub is_relay: bool,
    pub is_boundary: bool,
    pub cluster_joined_tick: u64,

    // Counters
    pub message_count: u64,
    pub erratic_count: u64,
    pub tick_of_last_update: u64,

    /// Decayed interaction weights with peers, feeding social trust
    pub interactions: BTreeMap<NodeId, f64>,

    /// Cached peer roles/trust from status beacons
    pub peer_view: BTreeMap<NodeId, PeerStatus>,
}

impl NodeRecord {
    fn from_spec(spec: NodeSpec) -> Self {
        Self {
            id: spec.id,
            position: spec.position,
            speed: spec.speed,
            prev_speed: spec.speed,
            heading: spec.heading,
            lane_hint: spec.lane_hint,
            bandwidth_mbps: spec.bandwidth_mbps,
            processing_ghz: spec.processing_ghz,
            historical_samples: VecDeque::with_capacity(HISTORY_CAPACITY),
            social_trust: clamp01(spec.initial_trust),
            trust_score: clamp01(spec.initial_trust),
            authenticity: clamp01(spec.authenticity),
            cooperation: clamp01(spec.cooperation),
            behavior_consistency: clamp01(spec.behavior_consistency),
            is_malicious: spec.is_malicious,
            is_emergency: spec.is_emergency,
            is_flagged_malicious: false,
            is_sleeper_flagged: false,
            election_banned_until: None,
            cluster_id: None,
            role: ClusterRole::Unassigned,
            is_relay: false,
            is_boundary: false,
            cluster_joined_tick: 0,
            message_count: 0,
            erratic_count: 0,
            tick_of_last_update: 0,
            interactions: BTreeMap::new(),
            peer_view: BTreeMap::new(),
        }
    }

    /// Whether the node is banned from elections at the given tick
    pub fn is_election_banned(&self, tick: u64) -> bool {
        matches!(self.election_banned_until, Some(until) if tick < until)
    }

    /// Role shown in snapshot rows, with display precedence applied
    pub fn display_role(&self) -> DisplayRole {
        DisplayRole::resolve(self.role, self.is_relay, self.is_boundary)
    }
}

/// Exclusive owner of all node records. Iteration is always in `NodeId`
/// order, which makes every derived computation reproducible.
#[derive(Debug, Default)]
pub struct NodeStore {
    nodes: BTreeMap<NodeId, NodeRecord>,
}

impl NodeStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the store holds no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Register a node at simulation start. Fails fast on duplicate ids,
    /// non-finite kinematics, or resource metrics outside configured bounds.
    pub fn insert(&mut self, spec: NodeSpec, config: &SimConfig) -> Result<()> {
        validate_kinematics(spec.id, spec.position, spec.speed, spec.heading)?;
        if self.nodes.contains_key(&spec.id) {
            return Err(Error::invalid_input(
                format!("duplicate node id {}", spec.id),
                Some(spec.id.0),
            ));
        }
        if spec.bandwidth_mbps < config.bandwidth_min || spec.bandwidth_mbps > config.bandwidth_max
        {
            return Err(Error::invalid_input(
                format!(
                    "bandwidth {} outside [{}, {}]",
                    spec.bandwidth_mbps, config.bandwidth_min, config.bandwidth_max
                ),
                Some(spec.id.0),
            ));
        }
        if spec.processing_ghz < config.processing_min || spec.processing_ghz > config.processing_max
        {
            return Err(Error::invalid_input(
                format!(
                    "processing {} outside [{}, {}]",
                    spec.processing_ghz, config.processing_min, config.processing_max
                ),
                Some(spec.id.0),
            ));
        }
        debug!(node = %spec.id, "registering node");
        self.nodes.insert(spec.id, NodeRecord::from_spec(spec));
        Ok(())
    }

    /// Apply one tick of mobility input. Every update is validated before
    /// any is applied, so a bad batch leaves the store untouched.
    pub fn apply_mobility(
        &mut self,
        tick: u64,
        updates: &[MobilityUpdate],
        hard_brake_threshold: f64,
        anomaly_speed: f64,
    ) -> Result<()> {
        for update in updates {
            validate_kinematics(update.node_id, update.position, update.speed, update.heading)?;
            if !self.nodes.contains_key(&update.node_id) {
                return Err(Error::invalid_input(
                    format!("mobility update for unknown {}", update.node_id),
                    Some(update.node_id.0),
                ));
            }
        }
        for update in updates {
            let node = self.nodes.get_mut(&update.node_id).expect("validated above");
            node.prev_speed = node.speed;
            node.position = update.position;
            node.speed = update.speed;
            node.heading = update.heading;
            node.lane_hint = update.lane_hint;
            node.tick_of_last_update = tick;
            let delta = (node.prev_speed - node.speed).abs();
            if delta > hard_brake_threshold || node.speed > anomaly_speed {
                node.erratic_count += 1;
            }
        }
        Ok(())
    }

    /// Read one record
    pub fn get(&self, id: NodeId) -> Option<&NodeRecord> {
        self.nodes.get(&id)
    }

    /// Whether a node exists
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Iterate records in `NodeId` order
    pub fn iter(&self) -> impl Iterator<Item = &NodeRecord> {
        self.nodes.values()
    }

    /// All ids, in order
    pub fn ids(&self) -> Vec<NodeId> {
        self.nodes.keys().copied().collect()
    }

    // ---- typed mutators -------------------------------------------------

    /// Assign or clear cluster linkage. Joining also stamps the join tick
    /// and resets duty flags; leaving resets role and flags.
    pub fn set_cluster(&mut self, id: NodeId, cluster: Option<ClusterId>, tick: u64) {
        if let Some(node) = self.nodes.get_mut(&id) {
            match cluster {
                Some(cluster_id) => {
                    if node.cluster_id != Some(cluster_id) {
                        node.cluster_joined_tick = tick;
                    }
                    node.cluster_id = Some(cluster_id);
                    if node.role == ClusterRole::Unassigned {
                        node.role = ClusterRole::Member;
                    }
                }
                None => {
                    node.cluster_id = None;
                    node.role = ClusterRole::Unassigned;
                    node.is_relay = false;
                    node.is_boundary = false;
                }
            }
        }
    }

    /// Set the cluster role of a node
    pub fn set_role(&mut self, id: NodeId, role: ClusterRole) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.role = role;
        }
    }

    /// Set or clear the relay duty flag
    pub fn set_relay(&mut self, id: NodeId, relay: bool) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.is_relay = relay;
        }
    }

    /// Set or clear the boundary duty flag
    pub fn set_boundary(&mut self, id: NodeId, boundary: bool) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.is_boundary = boundary;
        }
    }

    /// Write a trust score, clamped to [0, 1]
    pub fn set_trust(&mut self, id: NodeId, trust: f64) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.trust_score = clamp01(trust);
        }
    }

    /// Write a social trust value, clamped to [0, 1]
    pub fn set_social_trust(&mut self, id: NodeId, social: f64) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.social_trust = clamp01(social);
        }
    }

    /// Push a composite sample into the 10-entry historical ring
    pub fn push_history_sample(&mut self, id: NodeId, tick: u64, sample: f64) {
        if let Some(node) = self.nodes.get_mut(&id) {
            if node.historical_samples.len() == HISTORY_CAPACITY {
                node.historical_samples.pop_front();
            }
            node.historical_samples.push_back((tick, clamp01(sample)));
        }
    }

    /// Mark a node as flagged malicious and apply the PoA trust penalty
    pub fn flag_malicious(&mut self, id: NodeId, penalty: f64, floor: f64) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.is_flagged_malicious = true;
            node.trust_score = clamp01((node.trust_score * penalty).max(floor));
        }
    }

    /// Mark a sleeper agent: halve trust, flag, and ban from elections
    pub fn flag_sleeper(&mut self, id: NodeId, banned_until: u64) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.is_sleeper_flagged = true;
            node.trust_score = clamp01(0.5 * node.trust_score);
            node.election_banned_until = Some(banned_until);
        }
    }

    /// Adjust a node's speed through a message effect; clamps at zero
    pub fn set_speed(&mut self, id: NodeId, speed: f64) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.speed = speed.max(0.0);
        }
    }

    /// Count one emitted message
    pub fn bump_message_count(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.message_count += 1;
        }
    }

    /// Record one interaction between receiver and sender (social weighting)
    pub fn record_interaction(&mut self, receiver: NodeId, sender: NodeId) {
        if let Some(node) = self.nodes.get_mut(&receiver) {
            *node.interactions.entry(sender).or_insert(0.0) += 1.0;
        }
    }

    /// Decay all interaction weights once per tick, dropping dust entries
    pub fn decay_interactions(&mut self, decay: f64) {
        let factor = 1.0 / (1.0 + decay);
        for node in self.nodes.values_mut() {
            node.interactions.values_mut().for_each(|w| *w *= factor);
            node.interactions.retain(|_, w| *w > 1e-3);
        }
    }

    /// Refresh the receiver's cached view of a peer
    pub fn update_peer_view(&mut self, receiver: NodeId, peer: NodeId, status: PeerStatus) {
        if let Some(node) = self.nodes.get_mut(&receiver) {
            node.peer_view.insert(peer, status);
        }
    }
}

fn validate_kinematics(id: NodeId, position: Position, speed: f64, heading: f64) -> Result<()> {
    if !position.x.is_finite() || !position.y.is_finite() {
        return Err(Error::invalid_input(
            format!("non-finite coordinates for {id}"),
            Some(id.0),
        ));
    }
    if !speed.is_finite() || speed < 0.0 {
        return Err(Error::invalid_input(
            format!("invalid speed {speed} for {id}"),
            Some(id.0),
        ));
    }
    if !heading.is_finite() {
        return Err(Error::invalid_input(
            format!("non-finite heading for {id}"),
            Some(id.0),
        ));
    }
    Ok(())
}
