//! The `Agent` trait and the read-only view it runs against.

use hydro_bus::{MessageBus, Subscriber};
use hydro_core::{AgentIdx, Fields, SimConfig, Tick};
use hydro_disturbance::{DisturbanceManager, SensorNoise};
use hydro_topology::Topology;

use crate::AgentResult;

/// Read-only simulation state handed to [`Agent::run`].
///
/// Built once per tick by the harness.  Component states are those at the
/// start of the tick: the physical phase has not run yet.
pub struct AgentContext<'a> {
    pub tick:         Tick,
    /// Elapsed virtual seconds at the start of the tick.
    pub time:         f64,
    pub dt:           f64,
    pub topology:     &'a Topology,
    pub disturbances: &'a DisturbanceManager,
}

impl<'a> AgentContext<'a> {
    #[inline]
    pub fn new(
        tick:         Tick,
        time:         f64,
        dt:           f64,
        topology:     &'a Topology,
        disturbances: &'a DisturbanceManager,
    ) -> Self {
        Self { tick, time, dt, topology, disturbances }
    }

    /// State of component `id`.
    pub fn state(&self, id: &str) -> Option<&'a Fields> {
        self.topology.state_of(id)
    }

    /// Sensor noise active on observations of `id` this tick.
    pub fn sensor_noise(&self, id: &str) -> Option<SensorNoise> {
        self.disturbances.sensor_noise(id)
    }
}

/// An autonomous decision unit.
///
/// Agents receive messages through their [`Subscriber`] half and act on the
/// tick through [`run`](Self::run).  Both halves get `&mut self`, so private
/// state needs no interior mutability.
pub trait Agent: Subscriber {
    fn id(&self) -> &str;

    /// Topics the harness subscribes this agent to at registration.
    fn subscriptions(&self) -> Vec<String> {
        Vec::new()
    }

    /// Topics this agent publishes on (informational).
    fn publications(&self) -> Vec<String> {
        Vec::new()
    }

    /// Called once at registration with the agent's index and the run config.
    fn init(&mut self, _idx: AgentIdx, _config: &SimConfig) {}

    /// Act for the current tick.  May publish; deliveries complete before
    /// the call returns.
    fn run(&mut self, ctx: &AgentContext<'_>, bus: &MessageBus) -> AgentResult<()>;
}
