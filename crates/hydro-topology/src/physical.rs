//! Reference hydraulic components.
//!
//! These are deliberately minimal mass-balance models: enough to drive the
//! scheduler, the control loops, and the disturbance framework end to end.
//! Detailed hydraulics belong in application crates implementing
//! [`Component`] themselves.

use hydro_core::{Fields, Payload};

use crate::component::{INFLOW, OUTFLOW};
use crate::{Component, ComponentError, ComponentResult, StepInputs};

/// Gravitational acceleration (m/s²).
pub const GRAVITY: f64 = 9.81;

/// Water density (kg/m³).
pub const WATER_DENSITY: f64 = 1_000.0;

/// Conventional action topic for `field` of component `id`: `action.<id>.<field>`.
pub fn action_topic(id: &str, field: &str) -> String {
    format!("action.{id}.{field}")
}

fn control(inputs: &StepInputs, name: &str) -> ComponentResult<Option<f64>> {
    match inputs.controls.get(name) {
        Some(v) if !v.is_finite() => Err(ComponentError::InvalidInput { field: name.to_owned(), value: v }),
        other => Ok(other),
    }
}

fn check_inflow(inputs: &StepInputs) -> ComponentResult<f64> {
    if inputs.inflow.is_finite() {
        Ok(inputs.inflow)
    } else {
        Err(ComponentError::InvalidInput { field: INFLOW.to_owned(), value: inputs.inflow })
    }
}

// ── Reservoir ─────────────────────────────────────────────────────────────────

/// Prismatic storage: `d(volume)/dt = inflow - outflow`, `level = volume / area`.
///
/// Outflow is chosen, in order, from the `outflow` control (release demand),
/// the bottom outlet (`outlet_opening` control or state, orifice equation) when
/// one is configured, or the fixed `release` parameter.  Releases never draw
/// the volume below zero.
pub struct Reservoir {
    id:     String,
    state:  Fields,
    params: Fields,
}

impl Reservoir {
    pub const LEVEL: &'static str = "water_level";
    pub const VOLUME: &'static str = "volume";
    pub const OUTLET_OPENING: &'static str = "outlet_opening";

    /// Reservoir with a constant surface `area_m2` starting at `initial_level` metres.
    pub fn new(id: impl Into<String>, area_m2: f64, initial_level: f64) -> Self {
        let state = Fields::new()
            .with(Self::LEVEL, initial_level)
            .with(Self::VOLUME, initial_level * area_m2)
            .with(INFLOW, 0.0)
            .with(OUTFLOW, 0.0);
        Self {
            id: id.into(),
            state,
            params: Fields::new().with("surface_area", area_m2).with("release", 0.0),
        }
    }

    /// Add a bottom outlet: `q = cd * area * opening * sqrt(2 g level)`.
    pub fn with_outlet(mut self, discharge_coefficient: f64, outlet_area_m2: f64) -> Self {
        self.params.set("outlet_cd", discharge_coefficient);
        self.params.set("outlet_area", outlet_area_m2);
        self.state.set(Self::OUTLET_OPENING, 0.0);
        self
    }

    /// Fixed release used when no control supplies one.
    pub fn with_release(mut self, release: f64) -> Self {
        self.params.set("release", release);
        self
    }

    pub fn level(&self) -> f64 {
        self.state.get_or(Self::LEVEL, 0.0)
    }

    fn area(&self) -> f64 {
        self.params.get_or("surface_area", 1.0)
    }

    fn requested_release(&mut self, inputs: &StepInputs) -> ComponentResult<f64> {
        if let Some(q) = control(inputs, OUTFLOW)? {
            return Ok(q.max(0.0));
        }
        if let (Some(cd), Some(area)) = (self.params.get("outlet_cd"), self.params.get("outlet_area")) {
            let opening = match control(inputs, Self::OUTLET_OPENING)? {
                Some(o) => o.clamp(0.0, 1.0),
                None => self.state.get_or(Self::OUTLET_OPENING, 0.0),
            };
            self.state.set(Self::OUTLET_OPENING, opening);
            let head = self.level().max(0.0);
            return Ok(cd * area * opening * (2.0 * GRAVITY * head).sqrt());
        }
        Ok(self.params.get_or("release", 0.0).max(0.0))
    }
}

impl Component for Reservoir {
    fn id(&self) -> &str {
        &self.id
    }

    fn state(&self) -> &Fields {
        &self.state
    }

    fn set_state(&mut self, state: Fields) {
        self.state = state;
    }

    fn parameters(&self) -> &Fields {
        &self.params
    }

    fn input_topics(&self) -> Vec<String> {
        [OUTFLOW, Self::OUTLET_OPENING, INFLOW].iter().map(|f| action_topic(&self.id, f)).collect()
    }

    fn step(&mut self, dt: f64, inputs: &StepInputs) -> ComponentResult<Fields> {
        let inflow = check_inflow(inputs)?;
        let requested = self.requested_release(inputs)?;
        let volume = self.state.get_or(Self::VOLUME, 0.0);

        let available = (volume / dt + inflow).max(0.0);
        let outflow = requested.min(available);
        let volume = (volume + (inflow - outflow) * dt).max(0.0);

        self.state.set(Self::VOLUME, volume);
        self.state.set(Self::LEVEL, volume / self.area());
        self.state.set(INFLOW, inflow);
        self.state.set(OUTFLOW, outflow);
        self.state.ensure_finite()?;
        Ok(self.state.clone())
    }
}

// ── Gate ──────────────────────────────────────────────────────────────────────

/// Flow-limiting sluice gate without storage.
///
/// The opening moves toward the `opening` control at no more than
/// `max_rate` (m/s).  Capacity follows the free-orifice equation
/// `q = cd * width * opening * sqrt(2 g head)`, with `head` taken from the
/// `head` control when present and the design head otherwise.  Inflow above
/// capacity is diverted and reported as `spill`.
pub struct Gate {
    id:     String,
    state:  Fields,
    params: Fields,
}

impl Gate {
    pub const OPENING: &'static str = "opening";

    pub fn new(id: impl Into<String>, width_m: f64, discharge_coefficient: f64, max_opening_m: f64) -> Self {
        Self {
            id:     id.into(),
            state:  Fields::new()
                .with(Self::OPENING, 0.0)
                .with(INFLOW, 0.0)
                .with(OUTFLOW, 0.0)
                .with("spill", 0.0),
            params: Fields::new()
                .with("width", width_m)
                .with("discharge_coefficient", discharge_coefficient)
                .with("max_opening", max_opening_m)
                .with("design_head", 1.0)
                .with("max_rate", f64::INFINITY),
        }
    }

    pub fn with_design_head(mut self, head_m: f64) -> Self {
        self.params.set("design_head", head_m);
        self
    }

    /// Limit opening changes to `rate` metres per second.
    pub fn with_max_rate(mut self, rate: f64) -> Self {
        self.params.set("max_rate", rate);
        self
    }

    pub fn with_opening(mut self, opening: f64) -> Self {
        self.state.set(Self::OPENING, opening);
        self
    }

    pub fn opening(&self) -> f64 {
        self.state.get_or(Self::OPENING, 0.0)
    }
}

impl Component for Gate {
    fn id(&self) -> &str {
        &self.id
    }

    fn state(&self) -> &Fields {
        &self.state
    }

    fn set_state(&mut self, state: Fields) {
        self.state = state;
    }

    fn parameters(&self) -> &Fields {
        &self.params
    }

    fn input_topics(&self) -> Vec<String> {
        vec![action_topic(&self.id, Self::OPENING), action_topic(&self.id, INFLOW)]
    }

    fn step(&mut self, dt: f64, inputs: &StepInputs) -> ComponentResult<Fields> {
        let inflow = check_inflow(inputs)?.max(0.0);
        let max_opening = self.params.get_or("max_opening", 1.0);
        let current = self.opening();
        let target = control(inputs, Self::OPENING)?.unwrap_or(current).clamp(0.0, max_opening);

        let max_step = self.params.get_or("max_rate", f64::INFINITY) * dt;
        let opening = current + (target - current).clamp(-max_step, max_step);

        let head = control(inputs, "head")?.unwrap_or(self.params.get_or("design_head", 1.0)).max(0.0);
        let capacity = self.params.get_or("discharge_coefficient", 0.6)
            * self.params.get_or("width", 1.0)
            * opening
            * (2.0 * GRAVITY * head).sqrt();
        let outflow = inflow.min(capacity);

        self.state.set(Self::OPENING, opening);
        self.state.set(INFLOW, inflow);
        self.state.set(OUTFLOW, outflow);
        self.state.set("spill", inflow - outflow);
        self.state.ensure_finite()?;
        Ok(self.state.clone())
    }
}

// ── Canal ─────────────────────────────────────────────────────────────────────

/// Canal reach modelled as a linear reservoir: `outflow = storage / k`.
///
/// Uses the exact solution over one step, so it is stable for any `dt`:
///
/// ```text
/// S' = S e^(-dt/k) + I k (1 - e^(-dt/k))
/// Q  = (S + I dt - S') / dt        (mass-conserving mean outflow)
/// ```
pub struct Canal {
    id:     String,
    state:  Fields,
    params: Fields,
}

impl Canal {
    pub const STORAGE: &'static str = "storage";
    pub const LEVEL: &'static str = "water_level";

    /// `travel_time_secs` is the storage constant `k`.
    pub fn new(id: impl Into<String>, length_m: f64, width_m: f64, travel_time_secs: f64) -> Self {
        Self {
            id:     id.into(),
            state:  Fields::new()
                .with(Self::STORAGE, 0.0)
                .with(Self::LEVEL, 0.0)
                .with(INFLOW, 0.0)
                .with(OUTFLOW, 0.0),
            params: Fields::new()
                .with("length", length_m)
                .with("width", width_m)
                .with("travel_time", travel_time_secs),
        }
    }

    pub fn with_storage(mut self, storage_m3: f64) -> Self {
        self.state.set(Self::STORAGE, storage_m3);
        self.state.set(Self::LEVEL, storage_m3 / self.surface());
        self
    }

    fn surface(&self) -> f64 {
        self.params.get_or("length", 1.0) * self.params.get_or("width", 1.0)
    }
}

impl Component for Canal {
    fn id(&self) -> &str {
        &self.id
    }

    fn state(&self) -> &Fields {
        &self.state
    }

    fn set_state(&mut self, state: Fields) {
        self.state = state;
    }

    fn parameters(&self) -> &Fields {
        &self.params
    }

    fn input_topics(&self) -> Vec<String> {
        vec![action_topic(&self.id, INFLOW)]
    }

    fn step(&mut self, dt: f64, inputs: &StepInputs) -> ComponentResult<Fields> {
        let inflow = check_inflow(inputs)?.max(0.0);
        let k = self.params.get_or("travel_time", 1.0);
        if k <= 0.0 {
            return Err(ComponentError::Physics(format!("canal `{}` travel_time must be positive", self.id)));
        }
        let storage = self.state.get_or(Self::STORAGE, 0.0);
        let decay = (-dt / k).exp();
        let next = storage * decay + inflow * k * (1.0 - decay);
        let outflow = (storage + inflow * dt - next) / dt;

        self.state.set(Self::STORAGE, next);
        self.state.set(Self::LEVEL, next / self.surface());
        self.state.set(INFLOW, inflow);
        self.state.set(OUTFLOW, outflow);
        self.state.ensure_finite()?;
        Ok(self.state.clone())
    }
}

// ── Pump ──────────────────────────────────────────────────────────────────────

/// Pump station lifting up to `max_flow * speed` against a fixed head.
///
/// `speed` (0–1) comes from the control of the same name and persists between
/// ticks.  A `status` message of 0 trips the pump until a non-zero status
/// arrives.
pub struct Pump {
    id:     String,
    state:  Fields,
    params: Fields,
}

impl Pump {
    pub const SPEED: &'static str = "speed";
    pub const STATUS: &'static str = "status";

    pub fn new(id: impl Into<String>, max_flow: f64, head_m: f64, efficiency: f64) -> Self {
        Self {
            id:     id.into(),
            state:  Fields::new()
                .with(Self::SPEED, 1.0)
                .with(Self::STATUS, 1.0)
                .with(INFLOW, 0.0)
                .with(OUTFLOW, 0.0)
                .with("power_kw", 0.0),
            params: Fields::new()
                .with("max_flow", max_flow)
                .with("head", head_m)
                .with("efficiency", efficiency),
        }
    }
}

impl Component for Pump {
    fn id(&self) -> &str {
        &self.id
    }

    fn state(&self) -> &Fields {
        &self.state
    }

    fn set_state(&mut self, state: Fields) {
        self.state = state;
    }

    fn parameters(&self) -> &Fields {
        &self.params
    }

    fn input_topics(&self) -> Vec<String> {
        vec![format!("command.{}.status", self.id), action_topic(&self.id, Self::SPEED), action_topic(&self.id, INFLOW)]
    }

    fn handle_message(&mut self, topic: &str, payload: &Payload) {
        if topic.ends_with(".status") {
            if let Some(status) = payload.scalar_value().or_else(|| payload.get(Self::STATUS)) {
                self.state.set(Self::STATUS, if status > 0.0 { 1.0 } else { 0.0 });
            }
        }
    }

    fn step(&mut self, _dt: f64, inputs: &StepInputs) -> ComponentResult<Fields> {
        let inflow = check_inflow(inputs)?.max(0.0);
        let speed = match control(inputs, Self::SPEED)? {
            Some(s) => s.clamp(0.0, 1.0),
            None => self.state.get_or(Self::SPEED, 1.0),
        };
        let running = self.state.get_or(Self::STATUS, 1.0) > 0.0;
        let capacity = if running { self.params.get_or("max_flow", 0.0) * speed } else { 0.0 };
        let outflow = inflow.min(capacity);

        let efficiency = self.params.get_or("efficiency", 1.0).max(f64::EPSILON);
        let power_kw = WATER_DENSITY * GRAVITY * outflow * self.params.get_or("head", 0.0) / efficiency / 1_000.0;

        self.state.set(Self::SPEED, speed);
        self.state.set(INFLOW, inflow);
        self.state.set(OUTFLOW, outflow);
        self.state.set("power_kw", power_kw);
        self.state.ensure_finite()?;
        Ok(self.state.clone())
    }
}
