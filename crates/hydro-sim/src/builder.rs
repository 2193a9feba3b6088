//! Fluent builder for constructing a ready-to-run [`Harness`].

use hydro_agent::Agent;
use hydro_core::SimConfig;
use hydro_disturbance::DisturbanceConfig;
use hydro_topology::Component;

use crate::{ControllerBinding, Harness, SimResult};

/// Fluent builder for [`Harness`].
///
/// Each call forwards to the matching `Harness::add_*` method.  The first
/// error is kept and returned by [`build`](SimBuilder::build); later calls
/// are skipped.
///
/// | Method            | Forwards to                   |
/// |-------------------|-------------------------------|
/// | `.component(c)`   | `Harness::add_component`      |
/// | `.connect(a, b)`  | `Harness::add_connection`     |
/// | `.route(t, c)`    | `Harness::route_topic`        |
/// | `.agent(a)`       | `Harness::add_agent`          |
/// | `.disturbance(d)` | `Harness::add_disturbance`    |
/// | `.controller(b)`  | `Harness::bind_controller`    |
///
/// # Example
///
/// ```rust,ignore
/// let mut harness = SimBuilder::new(config)
///     .component(Reservoir::new("res", 1.0e6, 15.0))
///     .component(Gate::new("gate", 4.0, 0.6, 3.0))
///     .connect("res", "gate")
///     .agent(PerceptionAgent::new("sense", "res", "state.res"))
///     .build()?;
/// ```
pub struct SimBuilder {
    harness: SimResult<Harness>,
}

impl SimBuilder {
    pub fn new(config: SimConfig) -> Self {
        Self { harness: Harness::new(config) }
    }

    fn then(mut self, f: impl FnOnce(&mut Harness) -> SimResult<()>) -> Self {
        if let Ok(h) = &mut self.harness {
            if let Err(e) = f(h) {
                self.harness = Err(e);
            }
        }
        self
    }

    pub fn component<C: Component + 'static>(self, component: C) -> Self {
        self.then(|h| h.add_component(component).map(drop))
    }

    pub fn connect(self, upstream: &str, downstream: &str) -> Self {
        self.then(|h| h.add_connection(upstream, downstream))
    }

    pub fn route(self, topic: &str, component: &str) -> Self {
        self.then(|h| h.route_topic(topic, component))
    }

    pub fn agent<A: Agent + 'static>(self, agent: A) -> Self {
        self.then(|h| h.add_agent(agent).map(drop))
    }

    pub fn disturbance(self, config: DisturbanceConfig) -> Self {
        self.then(|h| h.add_disturbance(config))
    }

    pub fn controller(self, binding: ControllerBinding) -> Self {
        self.then(|h| h.bind_controller(binding))
    }

    /// Freeze the topology and return a `Ready` harness.
    pub fn build(self) -> SimResult<Harness> {
        let mut harness = self.harness?;
        harness.build()?;
        Ok(harness)
    }
}
