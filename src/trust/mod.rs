//! Trust Engine
//!
//! Historical + social trust maintenance, resource scoring, the
//! five-metric composite used for every election ranking, and the
//! sleeper-agent spike detector.

mod engine;
mod sleeper;

pub use engine::{CompositeContext, TrustEngine};
pub use sleeper::detect_spike;
