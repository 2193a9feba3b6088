//! Sensor agent: copies component state onto a topic.

use std::collections::BTreeMap;

use hydro_bus::{BusResult, Message, MessageBus, Subscriber};
use hydro_core::{AgentIdx, AgentRng, Fields, Payload, SimConfig};
use rand_distr::{Distribution, Normal};

use crate::{Agent, AgentContext, AgentError, AgentResult};

/// Publishes selected fields of one component every `interval` ticks.
///
/// Each published field gets additive Gaussian noise from two independent
/// sources: the agent's own per-field model and any sensor-noise disturbance
/// active on the component.  True component state is never touched.
pub struct PerceptionAgent {
    id:        String,
    component: String,
    topic:     String,
    fields:    Vec<String>,
    noise:     BTreeMap<String, (f64, f64)>,
    interval:  u64,
    rng:       AgentRng,
    published: u64,
}

impl PerceptionAgent {
    /// Observe `component` and publish on `topic` (all fields by default).
    pub fn new(id: impl Into<String>, component: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            id:        id.into(),
            component: component.into(),
            topic:     topic.into(),
            fields:    Vec::new(),
            noise:     BTreeMap::new(),
            interval:  1,
            rng:       AgentRng::new(0, AgentIdx(0)),
            published: 0,
        }
    }

    /// Restrict the payload to `fields`.
    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Additive noise `N(mean, std_dev)` on `field`.
    pub fn with_noise(mut self, field: impl Into<String>, mean: f64, std_dev: f64) -> Self {
        self.noise.insert(field.into(), (mean, std_dev));
        self
    }

    /// Publish every `ticks` ticks instead of every tick.
    pub fn every(mut self, ticks: u64) -> Self {
        self.interval = ticks.max(1);
        self
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn published(&self) -> u64 {
        self.published
    }

    fn sample(rng: &mut AgentRng, mean: f64, std_dev: f64) -> AgentResult<f64> {
        if std_dev == 0.0 {
            return Ok(mean);
        }
        let normal = Normal::new(mean, std_dev)
            .map_err(|e| AgentError::Config(format!("noise N({mean}, {std_dev}): {e}")))?;
        Ok(normal.sample(rng.inner()))
    }

    fn observe(&mut self, state: &Fields, ctx: &AgentContext<'_>) -> AgentResult<Fields> {
        let mut observed = if self.fields.is_empty() {
            state.clone()
        } else {
            let mut out = Fields::new();
            for name in &self.fields {
                let v = state.get(name).ok_or_else(|| AgentError::MissingField {
                    source_id: self.component.clone(),
                    field:     name.clone(),
                })?;
                out.set(name.clone(), v);
            }
            out
        };

        let disturbance = ctx.sensor_noise(&self.component);
        let names: Vec<String> = observed.names().map(str::to_owned).collect();
        for name in names {
            let mut delta = 0.0;
            if let Some(&(mean, std_dev)) = self.noise.get(&name) {
                delta += Self::sample(&mut self.rng, mean, std_dev)?;
            }
            if let Some(n) = disturbance {
                delta += Self::sample(&mut self.rng, n.mean, n.std_dev)?;
            }
            if delta != 0.0 {
                let v = observed.get_or(&name, 0.0);
                observed.set(name, v + delta);
            }
        }
        Ok(observed)
    }
}

impl Subscriber for PerceptionAgent {
    fn subscriber_id(&self) -> &str {
        &self.id
    }

    fn on_message(&mut self, _msg: &Message, _bus: &MessageBus) -> BusResult<()> {
        Ok(())
    }
}

impl Agent for PerceptionAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn publications(&self) -> Vec<String> {
        vec![self.topic.clone()]
    }

    fn init(&mut self, idx: AgentIdx, config: &SimConfig) {
        self.rng = AgentRng::new(config.seed, idx);
    }

    fn run(&mut self, ctx: &AgentContext<'_>, bus: &MessageBus) -> AgentResult<()> {
        if !ctx.tick.is_every(self.interval) {
            return Ok(());
        }
        let state = ctx.state(&self.component).ok_or_else(|| AgentError::UnknownComponent(self.component.clone()))?;
        let observed = self.observe(state, ctx)?;
        bus.publish(&self.topic, Payload::from_fields(observed))?;
        self.published += 1;
        Ok(())
    }
}
