//! Tick scheduler
//!
//! Periodic work (overlap merges, PoA rounds, boundary elections,
//! broadcast cadences) registers here as `(interval, phase)` tasks
//! instead of scattering modular arithmetic through the components. A
//! task fires when `tick % interval == phase`; the simulator polls each
//! registered task in a fixed order, which fixes the cross-component
//! ordering.

use tracing::debug;

/// Handle to a registered periodic task
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TaskId(usize);

#[derive(Debug, Clone)]
struct PeriodicTask {
    interval: u64,
    phase: u64,
}

/// Deterministic registry of periodic tasks
#[derive(Debug, Default)]
pub struct TickScheduler {
    tasks: Vec<PeriodicTask>,
}

impl TickScheduler {
    /// Create an empty scheduler
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task firing whenever `tick % interval == phase`.
    /// `interval` must be non-zero (validated by the config layer).
    pub fn register(&mut self, name: &'static str, interval: u64, phase: u64) -> TaskId {
        let id = TaskId(self.tasks.len());
        debug!(task = name, interval, phase, "periodic task registered");
        self.tasks.push(PeriodicTask {
            interval: interval.max(1),
            phase,
        });
        id
    }

    /// Whether one specific task fires at `tick`
    pub fn is_due(&self, id: TaskId, tick: u64) -> bool {
        self.tasks
            .get(id.0)
            .map_or(false, |t| tick % t.interval == t.phase % t.interval)
    }
}
