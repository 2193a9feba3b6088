//! Local feedback loop agent.

use std::fmt;

use hydro_bus::{BusError, BusResult, Message, MessageBus, Subscriber};
use hydro_control::Controller;
use hydro_core::{Fields, Payload};
use tracing::debug;

use crate::{Agent, AgentContext, AgentResult};

/// Where a [`LocalControlAgent`] is within one observation cycle.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum ControlPhase {
    #[default]
    Idle,
    Observing,
    Computing,
    Publishing,
}

impl fmt::Display for ControlPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ControlPhase::Idle => "idle",
            ControlPhase::Observing => "observing",
            ControlPhase::Computing => "computing",
            ControlPhase::Publishing => "publishing",
        })
    }
}

/// Wraps a [`Controller`]: observation in, action out.
///
/// The cycle `Idle → Observing → Computing → Publishing → Idle` runs inside
/// the delivery of each observation, so the action reaches its subscribers
/// before the observer's publish returns.  A command message (field
/// `setpoint`, or a scalar) replaces the setpoint and nothing else.
pub struct LocalControlAgent {
    id:                String,
    observation_topic: String,
    observed_field:    String,
    action_topic:      String,
    command_topic:     Option<String>,
    feedback_topic:    Option<String>,
    controller:        Box<dyn Controller>,
    phase:             ControlPhase,
    last_action:       Option<f64>,
    last_feedback:     Option<Fields>,
    cycles:            u64,
}

impl LocalControlAgent {
    pub fn new<C: Controller + 'static>(
        id:                impl Into<String>,
        observation_topic: impl Into<String>,
        observed_field:    impl Into<String>,
        action_topic:      impl Into<String>,
        controller:        C,
    ) -> Self {
        Self {
            id:                id.into(),
            observation_topic: observation_topic.into(),
            observed_field:    observed_field.into(),
            action_topic:      action_topic.into(),
            command_topic:     None,
            feedback_topic:    None,
            controller:        Box::new(controller),
            phase:             ControlPhase::Idle,
            last_action:       None,
            last_feedback:     None,
            cycles:            0,
        }
    }

    /// Accept setpoint overrides on `topic`.
    pub fn with_command_topic(mut self, topic: impl Into<String>) -> Self {
        self.command_topic = Some(topic.into());
        self
    }

    /// Record actuator state published on `topic`.
    pub fn with_feedback_topic(mut self, topic: impl Into<String>) -> Self {
        self.feedback_topic = Some(topic.into());
        self
    }

    pub fn phase(&self) -> ControlPhase {
        self.phase
    }

    pub fn setpoint(&self) -> f64 {
        self.controller.setpoint()
    }

    pub fn last_action(&self) -> Option<f64> {
        self.last_action
    }

    pub fn last_feedback(&self) -> Option<&Fields> {
        self.last_feedback.as_ref()
    }

    /// Completed observe → publish cycles.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    fn handle_observation(&mut self, msg: &Message, bus: &MessageBus) -> BusResult<()> {
        self.phase = ControlPhase::Observing;
        let Some(measured) = msg.payload.get(&self.observed_field) else {
            self.phase = ControlPhase::Idle;
            return Err(BusError::rejected(format!(
                "observation lacks field `{}`",
                self.observed_field
            )));
        };

        self.phase = ControlPhase::Computing;
        let action = match self.controller.compute(measured, bus.dt()) {
            Ok(a) => a,
            Err(e) => {
                self.phase = ControlPhase::Idle;
                return Err(BusError::rejected(e.to_string()));
            }
        };

        self.phase = ControlPhase::Publishing;
        let published = bus.publish(&self.action_topic, Payload::scalar(action));
        self.phase = ControlPhase::Idle;
        published?;

        debug!(agent = %self.id, measured, action, setpoint = self.controller.setpoint(), "control cycle");
        self.last_action = Some(action);
        self.cycles += 1;
        Ok(())
    }
}

impl Subscriber for LocalControlAgent {
    fn subscriber_id(&self) -> &str {
        &self.id
    }

    fn on_message(&mut self, msg: &Message, bus: &MessageBus) -> BusResult<()> {
        if msg.topic == self.observation_topic {
            return self.handle_observation(msg, bus);
        }
        if self.command_topic.as_deref() == Some(msg.topic.as_str()) {
            let setpoint = msg
                .payload
                .get("setpoint")
                .or_else(|| msg.payload.scalar_value())
                .ok_or_else(|| BusError::rejected("command carries no setpoint"))?;
            self.controller.set_setpoint(setpoint);
            debug!(agent = %self.id, setpoint, "setpoint replaced");
            return Ok(());
        }
        if self.feedback_topic.as_deref() == Some(msg.topic.as_str()) {
            self.last_feedback = Some(msg.payload.values.clone());
        }
        Ok(())
    }
}

impl Agent for LocalControlAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn subscriptions(&self) -> Vec<String> {
        let mut topics = vec![self.observation_topic.clone()];
        topics.extend(self.command_topic.iter().cloned());
        topics.extend(self.feedback_topic.iter().cloned());
        topics
    }

    fn publications(&self) -> Vec<String> {
        vec![self.action_topic.clone()]
    }

    /// Message-driven: nothing to do on the tick itself.
    fn run(&mut self, _ctx: &AgentContext<'_>, _bus: &MessageBus) -> AgentResult<()> {
        Ok(())
    }
}
