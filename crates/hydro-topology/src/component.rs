//! The `Component` trait: the contract every physical entity implements.

use hydro_core::{Fields, Payload};

use crate::ComponentResult;

/// Conventional state field holding a component's discharge (m³/s).
///
/// The harness sums this field over a component's upstream neighbours to
/// compute its automatic inflow.
pub const OUTFLOW: &str = "outflow";

/// Conventional input/state field for inflow (m³/s).
pub const INFLOW: &str = "inflow";

/// Where the inflow handed to [`Component::step`] came from.
///
/// Variants are ordered by precedence: a later variant always replaces an
/// earlier one in [`PendingInput::offer_inflow`](crate::PendingInput::offer_inflow).
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum InflowSource {
    /// Sum of upstream outflows computed earlier in the same tick.
    #[default]
    Upstream,
    /// An `inflow` value delivered over the bus during the agent phase.
    Message,
    /// An active inflow-override disturbance.
    Disturbance,
}

/// Merged inputs for one component for one tick.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StepInputs {
    /// Net inflow to apply this tick (m³/s), after precedence resolution.
    pub inflow: f64,
    /// Which source won.
    pub inflow_source: InflowSource,
    /// The automatically computed upstream sum, even when overridden.
    pub upstream_inflow: f64,
    /// Actuator commands (e.g. `opening`, `outflow`, `speed`).
    pub controls: Fields,
}

impl StepInputs {
    /// Inputs carrying only an inflow (convenient for tests).
    pub fn with_inflow(inflow: f64) -> Self {
        Self { inflow, upstream_inflow: inflow, ..Self::default() }
    }

    pub fn control(mut self, name: impl Into<String>, value: f64) -> Self {
        self.controls.set(name, value);
        self
    }
}

/// A physical entity in the flow graph (reservoir, gate, canal, pump, ...).
///
/// The numerical physics behind `step` is entirely the implementor's
/// business; the harness only relies on the state map and the
/// [`OUTFLOW`] convention.
pub trait Component {
    /// Unique id within one topology.
    fn id(&self) -> &str;

    /// Current mutable state (water level, volume, opening, ...).
    fn state(&self) -> &Fields;

    /// Replace the state wholesale (checkpoint restore, scenario setup).
    fn set_state(&mut self, state: Fields);

    /// Immutable physical parameters.
    fn parameters(&self) -> &Fields;

    /// Advance by `dt` seconds and return the new state.
    ///
    /// The harness stores the returned fields with [`set_state`](Self::set_state).
    fn step(&mut self, dt: f64, inputs: &StepInputs) -> ComponentResult<Fields>;

    /// Discharge passed to downstream neighbours.
    fn outflow(&self) -> f64 {
        self.state().get_or(OUTFLOW, 0.0)
    }

    /// Bus topics this component listens on (inflow, action, disturbance).
    ///
    /// Messages on these topics are buffered during the agent phase, passed to
    /// [`handle_message`](Self::handle_message), and merged into the next
    /// `step`'s inputs.
    fn input_topics(&self) -> Vec<String> {
        Vec::new()
    }

    /// Observe a buffered message before it is merged into the step inputs.
    fn handle_message(&mut self, _topic: &str, _payload: &Payload) {}
}
