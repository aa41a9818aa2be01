//! Clustering Engine
//!
//! Forms, grows, merges, and dissolves clusters under mobility, direction,
//! and proximity compatibility. The engine is the exclusive owner of
//! [`Cluster`] records; every other component works with `ClusterId`
//! handles and the typed mutator API.

mod engine;
mod merge;

pub use engine::{Cluster, ClusteringEngine};
