//! Simulation configuration
//!
//! All tunables live in one immutable [`SimConfig`], fixed at simulator
//! construction. Defaults follow the reference VANET deployment: 250-unit
//! DSRC radio range, 450-unit cluster membership radius, clusters of 2-10
//! vehicles.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Immutable simulation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Direct radio range R (length-units)
    pub radio_range_r: f64,

    /// Maximum member distance to cluster centroid
    pub max_cluster_radius: f64,

    /// Dissolve threshold: clusters below this size are dissolved
    pub min_cluster_size: usize,

    /// Join cap: clusters at this size refuse further joins
    pub max_cluster_size: usize,

    /// Clustering compatibility: maximum speed difference
    pub speed_tol: f64,

    /// Clustering compatibility: maximum heading difference (radians)
    pub heading_tol: f64,

    /// Minimum weighted join score to enter an existing cluster
    pub join_score_threshold: f64,

    /// Hysteresis multiplier applied to speed/heading tolerances when
    /// deciding whether a member may stay in its current cluster
    pub stay_tolerance_factor: f64,

    /// Ticks a cluster may go without an update before dissolving
    pub lifetime_tol_ticks: u64,

    /// Ticks between overlap-merge passes
    pub merge_interval: u64,

    /// Leader-to-leader distance that makes two clusters merge candidates
    pub merge_distance: f64,

    /// Leader-to-leader distance that forces a merge regardless of overlap
    pub merge_force_distance: f64,

    /// Overlap ratio (shared+close members / smaller size) that triggers a merge
    pub merge_overlap_ratio: f64,

    /// Ticks between authority (PoA) voting rounds
    pub poa_interval: u64,

    /// Fraction of authorities whose flag votes confirm a malicious node
    pub poa_flag_fraction: f64,

    /// Trust score above which a node is an authority
    pub authority_trust_threshold: f64,

    /// Range within which out-of-cluster suspects borrow nearby authorities
    pub isolated_authority_range: f64,

    /// Multiplicative trust penalty applied on a confirmed flag
    pub poa_trust_penalty: f64,

    /// Trust floor after the PoA penalty
    pub poa_trust_floor: f64,

    /// Suspicion contribution thresholds
    pub suspicion_trust_floor: f64,
    pub suspicion_speed_limit: f64,
    pub suspicion_message_limit: u64,
    pub suspicion_behavior_floor: f64,
    pub suspicion_erratic_limit: u64,

    /// Ticks between boundary-node elections
    pub boundary_interval: u64,

    /// Centroid distance within which clusters are considered neighbors
    pub inter_cluster_detection: f64,

    /// Sleeper detection: minimum trust delta treated as a spike
    pub sleeper_spike_threshold: f64,

    /// Sleeper detection: window in ticks for the spike
    pub sleeper_window_ticks: u64,

    /// Election ban duration after a sleeper flag (ticks)
    pub ban_duration: u64,

    /// Ticks between forced periodic re-elections; 0 disables them
    /// (leadership then changes only on failure)
    pub reelection_interval: u64,

    /// Candidate filter: minimum trust to stand for election
    pub candidate_trust_floor: f64,

    /// Leader failure: trust below this is a trust collapse
    pub leader_trust_floor: f64,

    /// Historical/social trust mixing runs with this per-tick decay on
    /// neighbor interaction weights
    pub social_decay: f64,

    /// Normalization horizon for cluster tenure in composite stability
    pub tenure_norm_ticks: u64,

    /// Neighbor count that saturates the connection-quality metric
    pub connectivity_norm: f64,

    /// Resource metric bounds
    pub bandwidth_min: f64,
    pub bandwidth_max: f64,
    pub processing_min: f64,
    pub processing_max: f64,

    /// Ticks between relay re-elections (leadership changes re-elect
    /// immediately regardless)
    pub relay_refresh_interval: u64,

    /// Ticks between status beacons (Heartbeat / LeaderAnnouncement)
    pub heartbeat_interval: u64,

    /// V2V trigger cadences (ticks)
    pub emergency_interval: u64,
    pub collision_check_interval: u64,

    /// Distance within which a collision risk is signalled
    pub collision_distance: f64,

    /// Speed drop in one tick that counts as hard braking
    pub hard_brake_threshold: f64,

    /// Speed below which a vehicle counts toward a traffic jam
    pub slow_speed_threshold: f64,

    /// Radius of the jam neighborhood
    pub jam_radius: f64,

    /// Minimum slow vehicles that constitute a jam
    pub jam_min_vehicles: usize,

    /// RNG seed for stochastic fallbacks
    pub seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            radio_range_r: 250.0,
            max_cluster_radius: 450.0,
            min_cluster_size: 2,
            max_cluster_size: 10,
            speed_tol: 5.0,
            heading_tol: std::f64::consts::PI / 6.0,
            join_score_threshold: 0.5,
            stay_tolerance_factor: 1.5,
            lifetime_tol_ticks: 300,
            merge_interval: 50,
            merge_distance: 450.0,
            merge_force_distance: 350.0,
            merge_overlap_ratio: 0.30,
            poa_interval: 100,
            poa_flag_fraction: 0.30,
            authority_trust_threshold: 0.8,
            isolated_authority_range: 300.0,
            poa_trust_penalty: 0.7,
            poa_trust_floor: 0.05,
            suspicion_trust_floor: 0.4,
            suspicion_speed_limit: 75.0,
            suspicion_message_limit: 100,
            suspicion_behavior_floor: 0.3,
            suspicion_erratic_limit: 10,
            boundary_interval: 300,
            inter_cluster_detection: 600.0,
            sleeper_spike_threshold: 0.30,
            sleeper_window_ticks: 10,
            ban_duration: 300,
            reelection_interval: 0,
            candidate_trust_floor: 0.5,
            leader_trust_floor: 0.4,
            social_decay: 0.1,
            tenure_norm_ticks: 300,
            connectivity_norm: 10.0,
            bandwidth_min: 50.0,
            bandwidth_max: 150.0,
            processing_min: 1.0,
            processing_max: 4.0,
            relay_refresh_interval: 1,
            heartbeat_interval: 10,
            emergency_interval: 20,  // every 2s at 0.1s ticks
            collision_check_interval: 5, // every 0.5s at 0.1s ticks
            collision_distance: 30.0,
            hard_brake_threshold: 10.0,
            slow_speed_threshold: 15.0,
            jam_radius: 100.0,
            jam_min_vehicles: 5,
            seed: 42,
        }
    }
}

impl SimConfig {
    /// Parse a configuration from TOML text. Missing keys fall back to
    /// defaults; the result is validated before being returned.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: SimConfig = toml::from_str(text).map_err(|e| Error::Config {
            message: format!("failed to parse TOML: {e}"),
            field: None,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would break structural invariants
    pub fn validate(&self) -> Result<()> {
        if !(self.radio_range_r > 0.0) {
            return Err(Error::config("radio_range_r must be positive", "radio_range_r"));
        }
        if !(self.max_cluster_radius > 0.0) {
            return Err(Error::config(
                "max_cluster_radius must be positive",
                "max_cluster_radius",
            ));
        }
        if self.min_cluster_size < 2 {
            return Err(Error::config("min_cluster_size must be at least 2", "min_cluster_size"));
        }
        if self.max_cluster_size < self.min_cluster_size {
            return Err(Error::config(
                "max_cluster_size must be >= min_cluster_size",
                "max_cluster_size",
            ));
        }
        if !(self.poa_flag_fraction > 0.0 && self.poa_flag_fraction <= 1.0) {
            return Err(Error::config(
                "poa_flag_fraction must be in (0, 1]",
                "poa_flag_fraction",
            ));
        }
        if self.merge_interval == 0 || self.poa_interval == 0 || self.boundary_interval == 0 {
            return Err(Error::config(
                "periodic intervals must be non-zero",
                "merge_interval",
            ));
        }
        if !(self.bandwidth_max > self.bandwidth_min) {
            return Err(Error::config(
                "bandwidth bounds must satisfy max > min",
                "bandwidth_max",
            ));
        }
        if !(self.processing_max > self.processing_min) {
            return Err(Error::config(
                "processing bounds must satisfy max > min",
                "processing_max",
            ));
        }
        Ok(())
    }
}
