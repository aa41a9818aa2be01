//! Common types and data structures for Platoon Coordinator
//!
//! Identifier newtypes, kinematic primitives, role taxonomy, the V2V
//! message model, the simulation event log, and the per-tick snapshot
//! views exposed to consumers.
//!
//! Cross-component references are always by id; records are resolved
//! through the owning store at the point of use. No back-pointers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Node identifier, stable for the lifetime of a simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

impl From<u64> for NodeId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Cluster identifier, allocated densely by the clustering engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClusterId(pub u64);

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cluster-{}", self.0)
    }
}

impl From<u64> for ClusterId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// 2D position in simulation length-units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    /// Create a position from coordinates
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another position
    pub fn distance_to(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Absolute angular difference between two headings, handling wraparound.
/// Result is in [0, pi].
pub fn heading_difference(a: f64, b: f64) -> f64 {
    let two_pi = 2.0 * std::f64::consts::PI;
    let diff = (a - b).abs() % two_pi;
    diff.min(two_pi - diff)
}

/// Circular mean of a set of headings (radians)
pub fn circular_mean(headings: &[f64]) -> f64 {
    if headings.is_empty() {
        return 0.0;
    }
    let sin_sum: f64 = headings.iter().map(|h| h.sin()).sum();
    let cos_sum: f64 = headings.iter().map(|h| h.cos()).sum();
    sin_sum.atan2(cos_sum)
}

/// Clamp a score into the [0, 1] range. All trust/score writes pass
/// through this before landing in the store.
pub fn clamp01(v: f64) -> f64 {
    v.clamp(0.0, 1.0)
}

/// Cluster role of a node. Relay and boundary duties are orthogonal
/// flags on the node record, not roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ClusterRole {
    /// Not a member of any cluster
    #[default]
    Unassigned,

    /// Ordinary cluster member
    Member,

    /// Elected co-leader, first in the succession line
    CoLeader,

    /// Elected cluster leader
    Leader,
}

/// Role shown in snapshot rows. Collapses the role variant and the
/// relay/boundary flags with precedence
/// Leader > CoLeader > Boundary > Relay > Member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisplayRole {
    Unassigned,
    Member,
    Relay,
    Boundary,
    CoLeader,
    Leader,
}

impl DisplayRole {
    /// Resolve display precedence from a role plus duty flags
    pub fn resolve(role: ClusterRole, is_relay: bool, is_boundary: bool) -> Self {
        match role {
            ClusterRole::Leader => DisplayRole::Leader,
            ClusterRole::CoLeader => DisplayRole::CoLeader,
            ClusterRole::Member => {
                if is_boundary {
                    DisplayRole::Boundary
                } else if is_relay {
                    DisplayRole::Relay
                } else {
                    DisplayRole::Member
                }
            }
            ClusterRole::Unassigned => DisplayRole::Unassigned,
        }
    }
}

/// V2V message kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    /// Imminent collision risk detected by the sender
    CollisionWarning,

    /// Sender is changing lanes
    LaneChangeAlert,

    /// Emergency-class vehicle announcing itself
    EmergencyAlert,

    /// Hard braking ahead
    BrakeWarning,

    /// Congestion detected around the sender
    TrafficJamAlert,

    /// Trust evaluation proposal, accumulated by the authority monitor
    TrustProposal,

    /// Authority flag vote, accumulated by the authority monitor
    AuthorityFlag,

    /// Leader announcing its role to the cluster
    LeaderAnnouncement,

    /// Periodic liveness beacon
    Heartbeat,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageKind::CollisionWarning => "collision_warning",
            MessageKind::LaneChangeAlert => "lane_change_alert",
            MessageKind::EmergencyAlert => "emergency_alert",
            MessageKind::BrakeWarning => "brake_warning",
            MessageKind::TrafficJamAlert => "traffic_jam_alert",
            MessageKind::TrustProposal => "trust_proposal",
            MessageKind::AuthorityFlag => "authority_flag",
            MessageKind::LeaderAnnouncement => "leader_announcement",
            MessageKind::Heartbeat => "heartbeat",
        };
        write!(f, "{name}")
    }
}

/// Delivery scope of a V2V message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageScope {
    /// Everyone within direct radio range of the sender
    DirectRadio,

    /// Every member of the sender's cluster reachable via leader + relays
    IntraCluster,

    /// Bridged to neighboring clusters through boundary nodes
    InterCluster,
}

/// Kind-specific message payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum MessagePayload {
    /// No payload beyond the kind itself
    #[default]
    Empty,

    /// Lane change announcement; `safe = false` asks followers to yield
    LaneChange { safe: bool },

    /// Hard-brake data
    Brake { speed: f64, deceleration: f64 },

    /// Congestion report
    TrafficJam {
        x: f64,
        y: f64,
        vehicle_count: usize,
    },

    /// Role/trust beacon content for Heartbeat and LeaderAnnouncement
    Status { role: DisplayRole, trust: f64 },

    /// Trust proposal targeting a peer
    Trust { target: NodeId, suspicion: f64 },
}

/// A V2V message queued on the fabric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct V2vMessage {
    /// Message kind
    pub kind: MessageKind,

    /// Originating node
    pub sender_id: NodeId,

    /// Per-sender sequence number, part of the deterministic processing order
    pub sequence: u64,

    /// Tick the message was emitted on
    pub emitted_tick: u64,

    /// Tick after which the message is dropped unprocessed
    pub expiry_tick: Option<u64>,

    /// Delivery scope
    pub scope: MessageScope,

    /// Kind-specific payload
    pub payload: MessagePayload,
}

/// Why a leader was declared failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeaderFailureReason {
    /// Leader no longer exists in the node store
    Disappeared,

    /// Trust collapse: score below floor, or flagged malicious
    TrustCollapse,

    /// Drifted beyond the cluster membership radius
    OutOfRange,
}

/// Why a cluster was dissolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DissolveReason {
    /// Size dropped below the minimum
    BelowMinSize,

    /// No viable election candidates remained
    Degraded,

    /// Stale beyond the lifetime tolerance
    Stale,

    /// Absorbed by another cluster during overlap merge
    Merged,
}

/// Typed events surfaced on the per-tick output log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SimEvent {
    /// A new cluster formed around compatible nodes
    ClusterFormed { cluster: ClusterId, size: usize },

    /// A cluster was dissolved; members became Unassigned
    ClusterDissolved {
        cluster: ClusterId,
        reason: DissolveReason,
    },

    /// A smaller cluster was absorbed into a larger one
    ClusterMerged {
        survivor: ClusterId,
        absorbed: ClusterId,
        moved_members: usize,
    },

    /// A leader election concluded
    LeaderElected {
        cluster: ClusterId,
        new: NodeId,
        old: Option<NodeId>,
    },

    /// Co-leader took over leadership in O(1) succession
    CoLeaderPromoted { cluster: ClusterId, node: NodeId },

    /// Leader failure detected
    LeaderFailed {
        cluster: ClusterId,
        leader: NodeId,
        reason: LeaderFailureReason,
    },

    /// Election found no viable candidate; cluster marked for dissolution
    ClusterDegraded { cluster: ClusterId },

    /// PoA authorities flagged a node as malicious
    NodeFlagged { node: NodeId, votes: usize },

    /// Sleeper spike detected; node penalized and election-banned
    SleeperFlagged { node: NodeId, spike: f64 },

    /// A message finished dispatch
    MessageDelivered {
        sender: NodeId,
        kind: MessageKind,
        recipients: usize,
    },
}

/// Per-node row of a tick snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeView {
    pub id: NodeId,
    pub position: Position,
    pub speed: f64,
    pub heading: f64,
    pub cluster_id: Option<ClusterId>,
    pub role: DisplayRole,
    pub trust_score: f64,
    pub is_flagged_malicious: bool,
}

/// Per-cluster row of a tick snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterView {
    pub id: ClusterId,
    pub leader_id: NodeId,
    pub co_leader_id: Option<NodeId>,
    pub members: Vec<NodeId>,
    pub relays: Vec<NodeId>,
    pub boundaries: Vec<(ClusterId, NodeId)>,
    pub centroid: Position,
    pub radius: f64,
}

/// Full per-tick snapshot record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickSnapshot {
    pub tick: u64,
    pub nodes: Vec<NodeView>,
    pub clusters: Vec<ClusterView>,
    pub events: Vec<SimEvent>,
}

impl TickSnapshot {
    /// Serialize the snapshot as a JSON line, for consumers that pipe
    /// ticks into external tooling.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Per-tick kinematics input for one node
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MobilityUpdate {
    pub node_id: NodeId,
    pub position: Position,
    pub speed: f64,
    pub heading: f64,
    pub lane_hint: u32,
}
