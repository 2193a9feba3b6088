//! Agents that inject external signals: disturbance payloads and inflow
//! time series.

use std::path::Path;

use hydro_bus::{BusResult, Message, MessageBus, Subscriber};
use hydro_core::Payload;
use hydro_core::time::TIME_EPSILON;
use hydro_topology::INFLOW;
use serde::Deserialize;
use tracing::debug;

use crate::{Agent, AgentContext, AgentError, AgentResult};

// ── DisturbanceSourceAgent ────────────────────────────────────────────────────

/// Publishes a fixed payload on every tick of `[start, end)`.
///
/// A message-aware component (or an agent) consumes it.  Publishing an
/// `inflow` field to a component's inflow topic overrides its upstream
/// inflow with message precedence.
pub struct DisturbanceSourceAgent {
    id:      String,
    topic:   String,
    payload: Payload,
    start:   f64,
    end:     f64,
    sent:    u64,
}

impl DisturbanceSourceAgent {
    /// Fails unless `start` and `end` are finite with `start < end`.
    pub fn new(
        id: impl Into<String>,
        topic: impl Into<String>,
        payload: Payload,
        start: f64,
        end: f64,
    ) -> AgentResult<Self> {
        let id = id.into();
        if !start.is_finite() || !end.is_finite() || end <= start {
            return Err(AgentError::Config(format!(
                "disturbance source `{id}` has an empty or invalid window [{start}, {end})"
            )));
        }
        Ok(Self { id, topic: topic.into(), payload, start, end, sent: 0 })
    }

    pub fn is_active_at(&self, time: f64) -> bool {
        let t = time + TIME_EPSILON;
        t >= self.start && t < self.end
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }
}

impl Subscriber for DisturbanceSourceAgent {
    fn subscriber_id(&self) -> &str {
        &self.id
    }

    fn on_message(&mut self, _msg: &Message, _bus: &MessageBus) -> BusResult<()> {
        Ok(())
    }
}

impl Agent for DisturbanceSourceAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn publications(&self) -> Vec<String> {
        vec![self.topic.clone()]
    }

    fn run(&mut self, ctx: &AgentContext<'_>, bus: &MessageBus) -> AgentResult<()> {
        if self.is_active_at(ctx.time) {
            bus.publish(&self.topic, self.payload.clone())?;
            self.sent += 1;
        }
        Ok(())
    }
}

// ── InflowSeriesAgent ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SeriesRow {
    time:   f64,
    inflow: f64,
}

/// Publishes `{ inflow: q(t) }` each tick, linearly interpolated from a
/// `(time, inflow)` series.  Before the first point and after the last the
/// end values hold.
pub struct InflowSeriesAgent {
    id:     String,
    topic:  String,
    points: Vec<(f64, f64)>,
}

impl InflowSeriesAgent {
    /// `points` need not be sorted; times must be finite and distinct.
    pub fn new(id: impl Into<String>, topic: impl Into<String>, mut points: Vec<(f64, f64)>) -> AgentResult<Self> {
        let id = id.into();
        if points.is_empty() {
            return Err(AgentError::Series(format!("`{id}` has no points")));
        }
        if points.iter().any(|(t, q)| !t.is_finite() || !q.is_finite()) {
            return Err(AgentError::Series(format!("`{id}` contains non-finite values")));
        }
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        if points.windows(2).any(|w| w[0].0 == w[1].0) {
            return Err(AgentError::Series(format!("`{id}` repeats a time stamp")));
        }
        Ok(Self { id, topic: topic.into(), points })
    }

    /// Load a CSV with a `time,inflow` header.
    pub fn from_csv(id: impl Into<String>, topic: impl Into<String>, path: impl AsRef<Path>) -> AgentResult<Self> {
        let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(path.as_ref())?;
        let mut points = Vec::new();
        for row in reader.deserialize() {
            let row: SeriesRow = row?;
            points.push((row.time, row.inflow));
        }
        let agent = Self::new(id, topic, points)?;
        debug!(agent = %agent.id, points = agent.points.len(), path = %path.as_ref().display(), "inflow series loaded");
        Ok(agent)
    }

    /// Interpolated inflow at `time`.
    pub fn value_at(&self, time: f64) -> f64 {
        let i = self.points.partition_point(|&(t, _)| t <= time);
        if i == 0 {
            return self.points[0].1;
        }
        if i == self.points.len() {
            return self.points[i - 1].1;
        }
        let (t0, q0) = self.points[i - 1];
        let (t1, q1) = self.points[i];
        q0 + (q1 - q0) * (time - t0) / (t1 - t0)
    }
}

impl Subscriber for InflowSeriesAgent {
    fn subscriber_id(&self) -> &str {
        &self.id
    }

    fn on_message(&mut self, _msg: &Message, _bus: &MessageBus) -> BusResult<()> {
        Ok(())
    }
}

impl Agent for InflowSeriesAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn publications(&self) -> Vec<String> {
        vec![self.topic.clone()]
    }

    fn run(&mut self, ctx: &AgentContext<'_>, bus: &MessageBus) -> AgentResult<()> {
        bus.publish(&self.topic, Payload::new().with(INFLOW, self.value_at(ctx.time)))?;
        Ok(())
    }
}
