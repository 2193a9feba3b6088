//! Observer hooks for progress reporting and data collection.

use hydro_core::Tick;
use hydro_disturbance::DisturbanceRecord;

use crate::{HarnessState, Snapshot};

/// What happened during one tick.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TickReport {
    pub tick:      Tick,
    /// End-of-tick virtual time (s).
    pub time:      f64,
    /// Messages published on the bus during the tick.
    pub published: u64,
    /// Components whose inflow a disturbance overrode.
    pub disturbed: Vec<String>,
}

/// Callbacks invoked by [`Harness::run`](crate::Harness::run) at key points
/// in the tick loop.
///
/// All methods have default no-op implementations so implementors only need
/// to override what they care about.
pub trait SimObserver {
    /// Called at the very start of each tick, before any processing.
    fn on_tick_start(&mut self, _tick: Tick) {}

    /// Disturbance effects recorded during the tick, in application order.
    fn on_disturbances(&mut self, _tick: Tick, _records: &[DisturbanceRecord]) {}

    /// Called at snapshot intervals (every `config.output_interval_ticks` ticks).
    fn on_snapshot(&mut self, _snapshot: &Snapshot) {}

    /// Called at the end of each tick.
    fn on_tick_end(&mut self, _report: &TickReport) {}

    /// Called once when the run leaves `Running`.
    fn on_sim_end(&mut self, _final_tick: Tick, _state: HarnessState) {}
}

/// A [`SimObserver`] that does nothing.
pub struct NoopObserver;

impl SimObserver for NoopObserver {}
