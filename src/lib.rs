//! # Platoon Coordinator: Trust-Aware VANET Cluster Lifecycle
//!
//! Platoon Coordinator simulates a vehicular ad-hoc network in which a
//! fleet of mobile nodes self-organizes into clusters, elects leaders
//! under Byzantine conditions, and exchanges safety messages over a
//! multi-hop radio model. The crate is the cluster lifecycle and trust
//! engine; road geometry, rendering, and map ingestion are external
//! collaborators that feed kinematics in and consume snapshots out.
//!
//! ## Features
//!
//! - **Mobility-Based Clustering**: proximity, speed, and heading
//!   compatibility with overlap merging and lifecycle management
//! - **Trust-Weighted Consensus**: five-metric composite ranking with
//!   majority voting for leader and co-leader election
//! - **Byzantine Resilience**: Proof-of-Authority flagging of malicious
//!   peers and historical-analysis detection of sleeper agents
//! - **Multi-Hop V2V Fabric**: relay forwarding inside clusters and
//!   boundary-node bridging between them
//! - **Deterministic Replay**: identical seed, config, and mobility
//!   trace reproduce identical snapshots tick by tick
//!
//! ## Architecture
//!
//! ```text
//! Platoon Coordinator (tick pipeline)
//! ├── Node State Store      (exclusive owner of vehicle records)
//! ├── Proximity Index       (uniform spatial hash, rebuilt per tick)
//! ├── Clustering Engine     (reconcile / seed / merge / dissolve)
//! ├── Failure Detector      (leader loss, co-leader succession)
//! ├── Election Coordinator  (trust-weighted votes, relays, boundaries)
//! ├── Trust Engine          (historical + social trust, sleeper scan)
//! ├── Authority Monitor     (PoA suspicion voting)
//! └── V2V Messaging Fabric  (scoped dispatch, receiver effects)
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use platoon_coordinator::{MobilityUpdate, NodeSpec, SimConfig, Simulator};
//!
//! let mut sim = Simulator::new(SimConfig::default()).unwrap();
//! for i in 0..5 {
//!     sim.add_node(NodeSpec::benign(i, i as f64 * 20.0, 0.0, 25.0, 0.0))
//!         .unwrap();
//! }
//!
//! // Drive one tick with unchanged kinematics.
//! let updates: Vec<MobilityUpdate> = sim
//!     .store()
//!     .iter()
//!     .map(|n| MobilityUpdate {
//!         node_id: n.id,
//!         position: n.position,
//!         speed: n.speed,
//!         heading: n.heading,
//!         lane_hint: n.lane_hint,
//!     })
//!     .collect();
//! let snapshot = sim.advance_tick(1, &updates);
//! assert_eq!(snapshot.clusters.len(), 1);
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all)]

pub mod authority;
pub mod clustering;
pub mod config;
pub mod election;
pub mod error;
pub mod failover;
pub mod messaging;
pub mod metrics;
pub mod proximity;
pub mod scheduler;
pub mod simulator;
pub mod store;
pub mod telemetry;
pub mod trust;
pub mod types;

pub use config::SimConfig;
pub use error::{Error, Result};
pub use metrics::Metrics;
pub use simulator::Simulator;
pub use store::{NodeRecord, NodeSpec, NodeStore};
pub use types::{
    ClusterId, ClusterRole, ClusterView, DisplayRole, MessageKind, MessagePayload, MessageScope,
    MobilityUpdate, NodeId, NodeView, Position, SimEvent, TickSnapshot,
};
