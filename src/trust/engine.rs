//! Trust computation core
//!
//! Transparent trust model: `trust = 0.5 * historical + 0.5 * social`.
//! Historical trust is the mean of the last 10 composite samples; social
//! trust is an interaction-weighted mean of neighbor-reported scores that
//! ignores flagged evaluators. The composite ranking adds resource,
//! stability, behavior, and centrality terms on top of trust.

use crate::config::SimConfig;
use crate::store::{NodeRecord, NodeStore};
use crate::types::{clamp01, NodeId};
use tracing::trace;

/// Per-node inputs the composite needs from the clustering layer
#[derive(Debug, Clone, Copy, Default)]
pub struct CompositeContext {
    /// Distance to the node's cluster centroid; `None` when unassigned
    pub distance_to_centroid: Option<f64>,

    /// Neighbors within radio range (connection quality input)
    pub neighbor_count: usize,

    /// Current simulation tick
    pub tick: u64,
}

/// Stateless trust computation over store records
#[derive(Debug, Clone)]
pub struct TrustEngine {
    config: SimConfig,
}

impl TrustEngine {
    /// Create an engine bound to a configuration
    pub fn new(config: SimConfig) -> Self {
        Self { config }
    }

    /// Normalized resource score: mean of normalized bandwidth and
    /// processing power
    pub fn resource_score(&self, node: &NodeRecord) -> f64 {
        let bandwidth = normalize(
            node.bandwidth_mbps,
            self.config.bandwidth_min,
            self.config.bandwidth_max,
        );
        let processing = normalize(
            node.processing_ghz,
            self.config.processing_min,
            self.config.processing_max,
        );
        (bandwidth + processing) / 2.0
    }

    /// Mean of the historical ring, 0.5 when no samples exist yet
    pub fn historical_trust(&self, node: &NodeRecord) -> f64 {
        if node.historical_samples.is_empty() {
            return 0.5;
        }
        let values: Vec<f64> = node.historical_samples.iter().map(|&(_, v)| v).collect();
        statistical::mean(&values)
    }

    /// Recompute `trust_score` for one node from its ring and social trust
    pub fn recompute_trust(&self, store: &mut NodeStore, id: NodeId) {
        let Some(node) = store.get(id) else { return };
        let historical = self.historical_trust(node);
        let trust = 0.5 * historical + 0.5 * node.social_trust;
        trace!(node = %id, historical, social = node.social_trust, trust, "trust recomputed");
        store.set_trust(id, trust);
    }

    /// Recompute social trust for `id` from its neighbors' reported scores.
    /// Weights are the receiver's decayed interaction counts (plus a base
    /// weight of 1 so fresh neighbors still count); flagged-malicious
    /// evaluators are ignored. With no usable neighbors the value is kept.
    pub fn recompute_social(&self, store: &mut NodeStore, id: NodeId, neighbors: &[NodeId]) {
        let Some(node) = store.get(id) else { return };
        let mut weighted_sum = 0.0;
        let mut weight_total = 0.0;
        for &neighbor_id in neighbors {
            let Some(neighbor) = store.get(neighbor_id) else {
                continue;
            };
            if neighbor.is_flagged_malicious {
                continue;
            }
            let weight = 1.0 + node.interactions.get(&neighbor_id).copied().unwrap_or(0.0);
            weighted_sum += weight * neighbor.trust_score;
            weight_total += weight;
        }
        if weight_total > 0.0 {
            store.set_social_trust(id, weighted_sum / weight_total);
        }
    }

    /// Five-metric composite:
    /// `0.40*trust + 0.20*resource + 0.15*stability + 0.15*behavior + 0.10*centrality`
    pub fn composite_score(&self, node: &NodeRecord, ctx: &CompositeContext) -> f64 {
        let trust = node.trust_score;
        let resource = self.resource_score(node);
        let stability = self.stability_score(node, ctx);
        let behavior = (node.authenticity + node.cooperation) / 2.0;
        let centrality = self.centrality_score(ctx);

        let composite = 0.40 * trust
            + 0.20 * resource
            + 0.15 * stability
            + 0.15 * behavior
            + 0.10 * centrality;
        clamp01(composite)
    }

    /// Stability: mean of normalized cluster tenure and connection quality
    pub fn stability_score(&self, node: &NodeRecord, ctx: &CompositeContext) -> f64 {
        let tenure = if node.cluster_id.is_some() {
            let ticks_in = ctx.tick.saturating_sub(node.cluster_joined_tick) as f64;
            clamp01(ticks_in / self.config.tenure_norm_ticks as f64)
        } else {
            0.0
        };
        let connection = clamp01(ctx.neighbor_count as f64 / self.config.connectivity_norm);
        (tenure + connection) / 2.0
    }

    /// Centrality: 1 - distance_to_centroid / max_cluster_radius, clamped
    pub fn centrality_score(&self, ctx: &CompositeContext) -> f64 {
        match ctx.distance_to_centroid {
            Some(distance) => clamp01(1.0 - distance / self.config.max_cluster_radius),
            None => 0.0,
        }
    }
}

fn normalize(value: f64, min: f64, max: f64) -> f64 {
    clamp01((value - min) / (max - min))
}
