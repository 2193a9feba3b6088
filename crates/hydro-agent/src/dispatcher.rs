//! Supervisory dispatcher.
//!
//! The dispatcher never actuates anything.  It publishes setpoints on the
//! command topics of local control agents, which keep running on their own
//! if the dispatcher goes quiet.

use std::fmt;

use hydro_bus::{BusError, BusResult, Message, MessageBus, Subscriber};
use hydro_control::{MpcProblem, RollingHorizonOptimizer};
use hydro_core::{Payload, Tick};
use hydro_topology::INFLOW;
use tracing::{debug, info, warn};

use crate::{Agent, AgentContext, AgentError, AgentResult};

/// Operating mode.
///
/// Mode messages carry a numeric `mode` field (or a scalar):
/// `0` rule, `1` emergency, `2` mpc.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DispatchMode {
    #[default]
    Rule,
    Emergency,
    Mpc,
}

impl DispatchMode {
    pub fn from_code(code: f64) -> Option<Self> {
        match code.round() as i64 {
            0 => Some(DispatchMode::Rule),
            1 => Some(DispatchMode::Emergency),
            2 => Some(DispatchMode::Mpc),
            _ => None,
        }
    }

    pub fn code(self) -> f64 {
        match self {
            DispatchMode::Rule => 0.0,
            DispatchMode::Emergency => 1.0,
            DispatchMode::Mpc => 2.0,
        }
    }
}

impl fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DispatchMode::Rule => "rule",
            DispatchMode::Emergency => "emergency",
            DispatchMode::Mpc => "mpc",
        })
    }
}

/// Threshold rule: below `low_threshold` → `low_setpoint`, above
/// `high_threshold` → `high_setpoint`, otherwise `normal_setpoint`.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RuleConfig {
    pub low_threshold:   f64,
    pub high_threshold:  f64,
    pub low_setpoint:    f64,
    pub normal_setpoint: f64,
    pub high_setpoint:   f64,
}

impl RuleConfig {
    pub fn setpoint_for(&self, level: f64) -> f64 {
        if level < self.low_threshold {
            self.low_setpoint
        } else if level > self.high_threshold {
            self.high_setpoint
        } else {
            self.normal_setpoint
        }
    }
}

/// What an MPC solve publishes as the new setpoint.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum MpcOutput {
    /// The first optimised release (for release/flow controllers).
    #[default]
    Release,
    /// The level predicted one step ahead (for level controllers).
    PredictedLevel,
}

struct MpcSetup {
    optimizer:    RollingHorizonOptimizer,
    target_level: f64,
    output:       MpcOutput,
}

/// Upper layer of the control hierarchy.
pub struct CentralDispatcherAgent {
    id:                String,
    state_topics:      Vec<String>,
    level_field:       String,
    command_topics:    Vec<String>,
    mode:              DispatchMode,
    mode_topic:        Option<String>,
    forecast_topic:    Option<String>,
    rule:              RuleConfig,
    emergency_setpoint: f64,
    emergency_trigger: Option<f64>,
    mpc:               Option<MpcSetup>,
    level:             Option<f64>,
    inflow:            Option<f64>,
    forecast:          Vec<f64>,
    last_published:    Option<f64>,
    degraded:          u64,
}

impl CentralDispatcherAgent {
    pub fn new(id: impl Into<String>, rule: RuleConfig) -> Self {
        Self {
            id: id.into(),
            state_topics: Vec::new(),
            level_field: "water_level".into(),
            command_topics: Vec::new(),
            mode: DispatchMode::Rule,
            mode_topic: None,
            forecast_topic: None,
            emergency_setpoint: rule.low_setpoint,
            rule,
            emergency_trigger: None,
            mpc: None,
            level: None,
            inflow: None,
            forecast: Vec::new(),
            last_published: None,
            degraded: 0,
        }
    }

    pub fn with_state_topic(mut self, topic: impl Into<String>) -> Self {
        self.state_topics.push(topic.into());
        self
    }

    /// Field of the state payload holding the controlled level.
    pub fn with_level_field(mut self, field: impl Into<String>) -> Self {
        self.level_field = field.into();
        self
    }

    pub fn with_command_topic(mut self, topic: impl Into<String>) -> Self {
        self.command_topics.push(topic.into());
        self
    }

    pub fn with_mode(mut self, mode: DispatchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_mode_topic(mut self, topic: impl Into<String>) -> Self {
        self.mode_topic = Some(topic.into());
        self
    }

    /// Forecast payloads: series `inflow`, or scalar fields in key order.
    pub fn with_forecast_topic(mut self, topic: impl Into<String>) -> Self {
        self.forecast_topic = Some(topic.into());
        self
    }

    /// Setpoint imposed on every managed loop in emergency mode.
    pub fn with_emergency_setpoint(mut self, setpoint: f64) -> Self {
        self.emergency_setpoint = setpoint;
        self
    }

    /// Switch to emergency mode once the observed level reaches `level`.
    pub fn with_emergency_trigger(mut self, level: f64) -> Self {
        self.emergency_trigger = Some(level);
        self
    }

    pub fn with_mpc(mut self, optimizer: RollingHorizonOptimizer, target_level: f64, output: MpcOutput) -> Self {
        self.mpc = Some(MpcSetup { optimizer, target_level, output });
        self
    }

    pub fn mode(&self) -> DispatchMode {
        self.mode
    }

    pub fn last_published(&self) -> Option<f64> {
        self.last_published
    }

    /// MPC solves that fell back to the last good setpoint.
    pub fn degraded_solves(&self) -> u64 {
        self.degraded
    }

    fn set_mode(&mut self, mode: DispatchMode, tick: Tick) {
        if mode != self.mode {
            info!(agent = %self.id, from = %self.mode, to = %mode, tick = tick.0, "dispatch mode changed");
            self.mode = mode;
            self.last_published = None;
        }
    }

    fn broadcast(&mut self, setpoint: f64, bus: &MessageBus) -> AgentResult<()> {
        for topic in &self.command_topics {
            bus.publish(topic, Payload::new().with("setpoint", setpoint))?;
        }
        self.last_published = Some(setpoint);
        Ok(())
    }

    /// Publish only when the setpoint changes.
    fn broadcast_on_change(&mut self, setpoint: f64, bus: &MessageBus) -> AgentResult<()> {
        if self.last_published == Some(setpoint) {
            return Ok(());
        }
        self.broadcast(setpoint, bus)
    }

    fn run_mpc(&mut self, ctx: &AgentContext<'_>, level: f64, bus: &MessageBus) -> AgentResult<()> {
        let forecast = if !self.forecast.is_empty() {
            self.forecast.clone()
        } else {
            // Persistence forecast from the latest observed inflow.
            vec![self.inflow.unwrap_or(0.0)]
        };
        let setup = self
            .mpc
            .as_mut()
            .ok_or_else(|| AgentError::Config(format!("dispatcher `{}` in mpc mode without an optimizer", self.id)))?;
        if !setup.optimizer.is_due(ctx.tick) {
            return Ok(());
        }
        let problem = MpcProblem { level, inflow_forecast: &forecast, target_level: setup.target_level };
        let outcome = setup.optimizer.solve(&problem)?;
        if let Some(warning) = &outcome.degraded {
            self.degraded += 1;
            debug!(
                agent = %self.id,
                tick = ctx.tick.0,
                iterations = warning.iterations,
                residual = warning.residual,
                "mpc fell back; keeping last good setpoint"
            );
        }
        let setpoint = match (setup.output, &outcome.degraded) {
            // The optimizer already substituted the last good release.
            (MpcOutput::Release, _) => outcome.release,
            (MpcOutput::PredictedLevel, None) => outcome.predicted_levels.first().copied().unwrap_or(level),
            // A fallback plan's predicted level is not a known-good target;
            // the last published setpoint stays in force.
            (MpcOutput::PredictedLevel, Some(_)) => return Ok(()),
        };
        self.broadcast(setpoint, bus)
    }
}

impl Subscriber for CentralDispatcherAgent {
    fn subscriber_id(&self) -> &str {
        &self.id
    }

    fn on_message(&mut self, msg: &Message, bus: &MessageBus) -> BusResult<()> {
        if self.state_topics.iter().any(|t| *t == msg.topic) {
            if let Some(level) = msg.payload.get(&self.level_field) {
                self.level = Some(level);
            }
            if let Some(inflow) = msg.payload.get(INFLOW) {
                self.inflow = Some(inflow);
            }
        } else if self.forecast_topic.as_deref() == Some(msg.topic.as_str()) {
            self.forecast = match msg.payload.series(INFLOW) {
                Some(series) => series.to_vec(),
                None => msg.payload.values.iter().map(|(_, v)| v).collect(),
            };
        } else if self.mode_topic.as_deref() == Some(msg.topic.as_str()) {
            let code = msg
                .payload
                .get("mode")
                .or_else(|| msg.payload.scalar_value())
                .ok_or_else(|| BusError::rejected("mode message carries no mode"))?;
            let mode = DispatchMode::from_code(code)
                .ok_or_else(|| BusError::rejected(format!("unknown dispatch mode code {code}")))?;
            self.set_mode(mode, bus.tick());
        }
        Ok(())
    }
}

impl Agent for CentralDispatcherAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn subscriptions(&self) -> Vec<String> {
        let mut topics = self.state_topics.clone();
        topics.extend(self.forecast_topic.iter().cloned());
        topics.extend(self.mode_topic.iter().cloned());
        topics
    }

    fn publications(&self) -> Vec<String> {
        self.command_topics.clone()
    }

    fn run(&mut self, ctx: &AgentContext<'_>, bus: &MessageBus) -> AgentResult<()> {
        let Some(level) = self.level else {
            return Ok(());
        };
        if let Some(trigger) = self.emergency_trigger {
            if level >= trigger && self.mode != DispatchMode::Emergency {
                warn!(agent = %self.id, level, trigger, tick = ctx.tick.0, "emergency threshold reached");
                self.set_mode(DispatchMode::Emergency, ctx.tick);
            }
        }
        match self.mode {
            DispatchMode::Rule => self.broadcast_on_change(self.rule.setpoint_for(level), bus),
            DispatchMode::Emergency => self.broadcast_on_change(self.emergency_setpoint, bus),
            DispatchMode::Mpc => self.run_mpc(ctx, level, bus),
        }
    }
}
