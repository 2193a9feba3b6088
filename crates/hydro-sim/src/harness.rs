//! The `Harness`: lifecycle state machine and the per-tick phases.
//!
//! ```text
//! Building ──build()──▶ Ready ──run()/step()──▶ Running ──▶ Completed
//!                                                  │ ├────▶ Stopped   (StopHandle)
//!                                                  │ └────▶ Failed    (component/agent error)
//! ```
//!
//! # One tick
//!
//! ```text
//! ⓪ bus clock ← tick;  disturbances.begin_tick   (lifecycle, sensor/actuator log)
//! ① agents: run() in registration order          (publishes cascade synchronously)
//! ② disturbances.update                          (inflow overrides → input buffers)
//! ③ bound controllers                            (sensor field → actuator control)
//! ④ components in topological order:
//!      upstream Σ outflow, inbox messages, actuator faults,
//!      inflow precedence disturbance > message > upstream, step(dt)
//! ⑤ clock.advance; snapshot
//! ```

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use hydro_agent::{Agent, AgentContext};
use hydro_bus::{Message, MessageBus, SharedSubscriber};
use hydro_core::fields::SCALAR_FIELD;
use hydro_core::{AgentIdx, ComponentIdx, Fields, SimClock, SimConfig, Tick};
use hydro_disturbance::{DisturbanceConfig, DisturbanceManager, DisturbanceStatus};
use hydro_topology::{Component, INFLOW, InflowSource, InputBuffers, StepInputs, Topology};
use tracing::{debug, info, warn};

use crate::inbox::ComponentInbox;
use crate::{ControllerBinding, NoopObserver, SimError, SimObserver, SimResult, TickReport};

// ── State & snapshots ─────────────────────────────────────────────────────────

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum HarnessState {
    Building,
    Ready,
    Running,
    Completed,
    Stopped,
    Failed,
}

impl HarnessState {
    pub fn is_terminal(self) -> bool {
        matches!(self, HarnessState::Completed | HarnessState::Stopped | HarnessState::Failed)
    }
}

impl fmt::Display for HarnessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HarnessState::Building => "building",
            HarnessState::Ready => "ready",
            HarnessState::Running => "running",
            HarnessState::Completed => "completed",
            HarnessState::Stopped => "stopped",
            HarnessState::Failed => "failed",
        })
    }
}

/// Every component's state at the end of one tick.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Snapshot {
    pub tick:       Tick,
    /// End-of-tick elapsed virtual time (s).
    pub time:       f64,
    pub components: BTreeMap<String, Fields>,
}

impl Snapshot {
    pub fn value(&self, component: &str, field: &str) -> Option<f64> {
        self.components.get(component).and_then(|f| f.get(field))
    }
}

/// Cross-thread stop flag, checked between ticks only.
#[derive(Clone, Debug, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

struct AgentSlot {
    id:    String,
    agent: Rc<RefCell<dyn Agent>>,
}

// ── Harness ───────────────────────────────────────────────────────────────────

/// Owns one simulation instance: topology, bus, agents, disturbances, clock.
///
/// Create directly and configure step by step, or through
/// [`SimBuilder`](crate::SimBuilder).
pub struct Harness {
    config:       SimConfig,
    clock:        SimClock,
    state:        HarnessState,
    topology:     Topology,
    bus:          MessageBus,
    agents:       Vec<AgentSlot>,
    disturbances: DisturbanceManager,
    bindings:     Vec<ControllerBinding>,
    /// Extra `(topic, component)` deliveries on top of `input_topics`.
    routes:       Vec<(String, String)>,
    inbox:        Rc<RefCell<ComponentInbox>>,
    buffers:      InputBuffers,
    /// Commands held back by actuator-delay faults, per component.
    delayed:      Vec<VecDeque<Fields>>,
    history:      Vec<Snapshot>,
    stop:         StopHandle,
}

impl Harness {
    /// A harness in the `Building` state.
    pub fn new(config: SimConfig) -> SimResult<Self> {
        config.validate()?;
        Ok(Self {
            clock:        config.make_clock(),
            bus:          MessageBus::from_config(&config),
            config,
            state:        HarnessState::Building,
            topology:     Topology::new(),
            agents:       Vec::new(),
            disturbances: DisturbanceManager::new(),
            bindings:     Vec::new(),
            routes:       Vec::new(),
            inbox:        Rc::new(RefCell::new(ComponentInbox::default())),
            buffers:      InputBuffers::default(),
            delayed:      Vec::new(),
            history:      Vec::new(),
            stop:         StopHandle::default(),
        })
    }

    // ── Building ──────────────────────────────────────────────────────────

    pub fn add_component<C: Component + 'static>(&mut self, component: C) -> SimResult<ComponentIdx> {
        self.require_building("add_component")?;
        Ok(self.topology.add(component)?)
    }

    pub fn add_boxed_component(&mut self, component: Box<dyn Component>) -> SimResult<ComponentIdx> {
        self.require_building("add_component")?;
        Ok(self.topology.add_component(component)?)
    }

    pub fn add_connection(&mut self, upstream: &str, downstream: &str) -> SimResult<()> {
        self.require_building("add_connection")?;
        Ok(self.topology.add_connection(upstream, downstream)?)
    }

    /// Register an agent.  Its subscriptions are made immediately, so
    /// delivery order among agents follows registration order.
    pub fn add_agent<A: Agent + 'static>(&mut self, mut agent: A) -> SimResult<AgentIdx> {
        self.require_building("add_agent")?;
        let id = agent.id().to_owned();
        if self.agents.iter().any(|a| a.id == id) {
            return Err(SimError::DuplicateAgent(id));
        }
        let idx = AgentIdx(self.agents.len() as u32);
        agent.init(idx, &self.config);
        let topics = agent.subscriptions();

        let shared = Rc::new(RefCell::new(agent));
        for topic in topics {
            let sub: SharedSubscriber = shared.clone();
            self.bus.subscribe(topic, sub);
        }
        debug!(agent = %id, idx = idx.0, "agent registered");
        self.agents.push(AgentSlot { id, agent: shared });
        Ok(idx)
    }

    /// Register a disturbance.  Allowed until the run ends; after `build`
    /// the target must exist.
    pub fn add_disturbance(&mut self, config: DisturbanceConfig) -> SimResult<()> {
        if self.state.is_terminal() {
            return Err(SimError::InvalidState { operation: "add_disturbance", state: self.state });
        }
        if self.state != HarnessState::Building && self.topology.index_of(&config.target).is_none() {
            return Err(hydro_disturbance::DisturbanceError::UnknownTarget {
                id:     config.id,
                target: config.target,
            }
            .into());
        }
        Ok(self.disturbances.register(config)?)
    }

    /// Remove a disturbance that has not been applied yet or is no longer needed.
    pub fn remove_disturbance(&mut self, id: &str) -> SimResult<DisturbanceConfig> {
        Ok(self.disturbances.remove(id)?)
    }

    /// Wire a controller directly between two components.
    pub fn bind_controller(&mut self, binding: ControllerBinding) -> SimResult<()> {
        self.require_building("bind_controller")?;
        self.bindings.push(binding);
        Ok(())
    }

    /// Deliver messages on `topic` to `component` in addition to the
    /// topics it declares itself.
    pub fn route_topic(&mut self, topic: impl Into<String>, component: impl Into<String>) -> SimResult<()> {
        self.require_building("route_topic")?;
        self.routes.push((topic.into(), component.into()));
        Ok(())
    }

    /// Freeze the topology and resolve every reference to a component.
    pub fn build(&mut self) -> SimResult<()> {
        self.require_building("build")?;
        // Name lookups first: a failure here leaves the topology mutable.
        self.disturbances.validate_targets(&self.topology)?;
        for b in &mut self.bindings {
            b.sensor_idx = self.topology.require(&b.sensor)?;
            b.actuator_idx = self.topology.require(&b.actuator)?;
        }
        let mut routed = Vec::with_capacity(self.routes.len());
        for (topic, component) in &self.routes {
            routed.push((topic.clone(), self.topology.require(component)?));
        }
        self.topology.build()?;

        let n = self.topology.len();
        let mut inbox = ComponentInbox::new(n);
        let mut new_topics = Vec::new();
        for (idx, component) in self.topology.iter() {
            for topic in component.input_topics() {
                if inbox.route(&topic, idx) {
                    new_topics.push(topic);
                }
            }
        }
        for (topic, idx) in routed {
            if inbox.route(&topic, idx) {
                new_topics.push(topic);
            }
        }
        self.inbox = Rc::new(RefCell::new(inbox));
        for topic in new_topics {
            let sub: SharedSubscriber = self.inbox.clone();
            self.bus.subscribe(topic, sub);
        }

        self.buffers = InputBuffers::new(n);
        self.delayed = vec![VecDeque::new(); n];
        self.state = HarnessState::Ready;
        info!(
            components = n,
            agents = self.agents.len(),
            disturbances = self.disturbances.len(),
            ticks = self.config.total_ticks(),
            "harness ready"
        );
        Ok(())
    }

    // ── Running ───────────────────────────────────────────────────────────

    /// Run to completion (or until stopped) without callbacks.
    pub fn run(&mut self) -> SimResult<HarnessState> {
        self.run_with(&mut NoopObserver)
    }

    /// Run until `tick * dt >= duration`, an error, or a stop request.
    pub fn run_with<O: SimObserver>(&mut self, observer: &mut O) -> SimResult<HarnessState> {
        self.begin_running("run")?;
        let end = self.config.end_tick();
        while self.clock.current_tick < end {
            if self.stop.is_stopped() {
                return Ok(self.finish(HarnessState::Stopped, observer));
            }
            self.tick_once(observer)?;
        }
        Ok(self.finish(HarnessState::Completed, observer))
    }

    /// Run exactly `n` ticks from the current position (ignores the duration).
    pub fn run_ticks<O: SimObserver>(&mut self, n: u64, observer: &mut O) -> SimResult<HarnessState> {
        self.begin_running("run_ticks")?;
        for _ in 0..n {
            if self.stop.is_stopped() {
                return Ok(self.finish(HarnessState::Stopped, observer));
            }
            self.tick_once(observer)?;
        }
        Ok(self.state)
    }

    /// Advance one tick.  Completes the run once the duration is reached.
    pub fn step(&mut self) -> SimResult<HarnessState> {
        self.begin_running("step")?;
        let mut observer = NoopObserver;
        if self.stop.is_stopped() {
            return Ok(self.finish(HarnessState::Stopped, &mut observer));
        }
        self.tick_once(&mut observer)?;
        if self.clock.current_tick >= self.config.end_tick() {
            return Ok(self.finish(HarnessState::Completed, &mut observer));
        }
        Ok(self.state)
    }

    fn begin_running(&mut self, operation: &'static str) -> SimResult<()> {
        match self.state {
            HarnessState::Ready => {
                info!(dt = self.config.dt_secs, duration = self.config.duration_secs, "run started");
                self.state = HarnessState::Running;
                Ok(())
            }
            HarnessState::Running => Ok(()),
            state => Err(SimError::InvalidState { operation, state }),
        }
    }

    fn finish<O: SimObserver>(&mut self, state: HarnessState, observer: &mut O) -> HarnessState {
        self.state = state;
        info!(%state, final_tick = self.clock.current_tick.0, snapshots = self.history.len(), "run ended");
        observer.on_sim_end(self.clock.current_tick, state);
        state
    }

    fn tick_once<O: SimObserver>(&mut self, observer: &mut O) -> SimResult<()> {
        let now = self.clock.current_tick;
        observer.on_tick_start(now);
        let history_mark = self.disturbances.history().len();
        let published_mark = self.bus.stats().published;

        if let Err(e) = self.process_tick(now) {
            warn!(tick = now.0, error = %e, "tick aborted");
            self.finish(HarnessState::Failed, observer);
            return Err(e);
        }

        let records = &self.disturbances.history()[history_mark..];
        if !records.is_empty() {
            observer.on_disturbances(now, records);
        }

        self.clock.advance();
        let time = self.clock.elapsed_secs();
        let interval = self.config.output_interval_ticks;
        if interval > 0 && now.0.is_multiple_of(interval) {
            let snapshot = Snapshot { tick: now, time, components: self.topology.snapshot() };
            observer.on_snapshot(&snapshot);
            self.history.push(snapshot);
        }

        let report = TickReport {
            tick: now,
            time,
            published: self.bus.stats().published - published_mark,
            disturbed: self.buffers.disturbed().map(|i| self.topology.id_of(i).to_owned()).collect(),
        };
        observer.on_tick_end(&report);
        Ok(())
    }

    fn process_tick(&mut self, now: Tick) -> SimResult<()> {
        let dt = self.config.dt_secs;
        let time = self.clock.time_at(now);

        // ── Phase 0: clocks and disturbance lifecycle ─────────────────────
        self.bus.set_clock(now, dt);
        self.disturbances.begin_tick(now, time);
        self.buffers.clear();

        // ── Phase 1: agents ───────────────────────────────────────────────
        {
            let ctx = AgentContext::new(now, time, dt, &self.topology, &self.disturbances);
            for slot in &self.agents {
                let result = slot.agent.borrow_mut().run(&ctx, &self.bus);
                result.map_err(|source| SimError::Agent { agent: slot.id.clone(), tick: now, source })?;
            }
        }

        // ── Phase 2: disturbances ─────────────────────────────────────────
        let applied = self.disturbances.update(now, dt, &self.topology, &mut self.buffers);
        for r in &applied {
            debug!(tick = now.0, id = %r.config_id, component = %r.component, value = r.applied_value, "inflow override");
        }

        // ── Phase 3: directly bound controllers ───────────────────────────
        for b in &mut self.bindings {
            let measured = self.topology.component(b.sensor_idx).state().get(&b.field).ok_or_else(|| {
                SimError::Component {
                    component: b.sensor.clone(),
                    tick:      now,
                    source:    hydro_core::CoreError::MissingField(b.field.clone()).into(),
                }
            })?;
            let action = b.controller.compute(measured, dt).map_err(|source| SimError::Controller {
                binding: b.name.clone(),
                tick: now,
                source,
            })?;
            self.buffers.get_mut(b.actuator_idx).controls.set(b.control.clone(), action);
        }

        // ── Phase 4: physics in topological order ─────────────────────────
        let order = self.topology.order()?.to_vec();
        for idx in order {
            self.step_component(idx, now, dt)?;
        }
        Ok(())
    }

    fn step_component(&mut self, idx: ComponentIdx, now: Tick, dt: f64) -> SimResult<()> {
        let upstream: f64 = self.topology.upstream_of(idx).iter().map(|&u| self.topology.component(u).outflow()).sum();

        // Bus messages buffered during the agent phase.
        let messages = self.inbox.borrow_mut().drain(idx);
        let mut commands = Fields::new();
        {
            let component = self.topology.component_mut(idx);
            let pending = self.buffers.get_mut(idx);
            for (topic, payload) in &messages {
                component.handle_message(topic, payload);
                for (name, value) in payload.values.iter() {
                    let key = if name == SCALAR_FIELD { Message::leaf_of(topic) } else { name };
                    if key == INFLOW {
                        pending.offer_inflow(value, InflowSource::Message);
                    } else {
                        commands.set(key, value);
                    }
                }
            }
        }

        // Controls from bindings and messages pass through actuator faults.
        let mut controls = std::mem::take(&mut self.buffers.get_mut(idx).controls);
        controls.merge(&commands);
        let controls = self.apply_actuator_fault(idx, controls, dt);

        let pending = self.buffers.get(idx);
        let (inflow, inflow_source) = pending.resolve_inflow(upstream);
        let inputs = StepInputs { inflow, inflow_source, upstream_inflow: upstream, controls };

        let result = self.topology.component_mut(idx).step(dt, &inputs);
        let next = result.map_err(|source| SimError::Component {
            component: self.topology.id_of(idx).to_owned(),
            tick: now,
            source,
        })?;
        self.topology.component_mut(idx).set_state(next);
        Ok(())
    }

    fn apply_actuator_fault(&mut self, idx: ComponentIdx, controls: Fields, dt: f64) -> Fields {
        let id = self.topology.id_of(idx);
        let queue = &mut self.delayed[idx.index()];
        let Some(fault) = self.disturbances.actuator_failure(id) else {
            // Fault over: anything still held back is superseded.
            queue.clear();
            return controls;
        };
        let scaled: Fields = controls.into_iter().map(|(k, v)| (k, v * fault.efficiency)).collect();
        let delay = fault.delay_ticks(dt);
        if delay == 0 {
            return scaled;
        }
        queue.push_back(scaled);
        if queue.len() > delay { queue.pop_front().unwrap_or_default() } else { Fields::new() }
    }

    // ── Queries ───────────────────────────────────────────────────────────

    pub fn state(&self) -> HarnessState {
        self.state
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn clock(&self) -> &SimClock {
        &self.clock
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    pub fn disturbances(&self) -> &DisturbanceManager {
        &self.disturbances
    }

    /// `(id, status)` for every registered disturbance.
    pub fn disturbance_status(&self) -> Vec<(&str, DisturbanceStatus)> {
        self.disturbances.statuses()
    }

    /// Snapshots recorded so far, oldest first.
    pub fn history(&self) -> &[Snapshot] {
        &self.history
    }

    pub fn take_history(&mut self) -> Vec<Snapshot> {
        std::mem::take(&mut self.history)
    }

    pub fn component_state(&self, id: &str) -> Option<&Fields> {
        self.topology.state_of(id)
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    /// Shared handle to a registered agent, for inspection after a run.
    pub fn agent(&self, id: &str) -> Option<Rc<RefCell<dyn Agent>>> {
        self.agents.iter().find(|a| a.id == id).map(|a| Rc::clone(&a.agent))
    }

    pub fn bindings(&self) -> &[ControllerBinding] {
        &self.bindings
    }

    /// A handle that stops the run before the next tick when triggered.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    fn require_building(&self, operation: &'static str) -> SimResult<()> {
        if self.state != HarnessState::Building {
            return Err(SimError::InvalidState { operation, state: self.state });
        }
        Ok(())
    }
}
