//! `DisturbanceManager`: lifecycle, conflict checks, and per-tick effects.

use hydro_core::Tick;
use hydro_topology::{InflowSource, InputBuffers, Topology};
use tracing::{debug, info, warn};

use crate::{DisturbanceConfig, DisturbanceError, DisturbanceKind, DisturbanceResult, EffectCategory};

/// Lifecycle of one registered config.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DisturbanceStatus {
    #[default]
    Pending,
    Active,
    Expired,
}

/// One audit-log row.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DisturbanceRecord {
    pub config_id:     String,
    pub tick:          Tick,
    pub component:     String,
    pub effect:        EffectCategory,
    /// Inflow written, noise std-dev, or actuator efficiency.
    pub applied_value: f64,
}

/// Active noise on a component's observations.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SensorNoise {
    pub mean:    f64,
    pub std_dev: f64,
}

/// Active actuator degradation on a component.
#[derive(Clone, Debug, PartialEq)]
pub struct ActuatorFault {
    pub config_id:  String,
    pub efficiency: f64,
    pub delay_secs: f64,
}

impl ActuatorFault {
    /// Delay rounded to whole ticks.
    pub fn delay_ticks(&self, dt_secs: f64) -> usize {
        (self.delay_secs / dt_secs).round() as usize
    }
}

#[derive(Clone, Debug)]
struct Entry {
    config: DisturbanceConfig,
    status: DisturbanceStatus,
}

/// Owns the disturbance schedule of one simulation instance.
#[derive(Clone, Debug, Default)]
pub struct DisturbanceManager {
    entries: Vec<Entry>,
    history: Vec<DisturbanceRecord>,
}

impl DisturbanceManager {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Registration ──────────────────────────────────────────────────────

    /// Validate and add `config`.
    ///
    /// Fails with [`DisturbanceError::Conflict`] when it overlaps an already
    /// registered config on the same target and effect category (any
    /// category if either is exclusive).
    pub fn register(&mut self, config: DisturbanceConfig) -> DisturbanceResult<()> {
        config.validate()?;
        if self.entries.iter().any(|e| e.config.id == config.id) {
            return Err(DisturbanceError::Duplicate { id: config.id });
        }
        if let Some(existing) = self.entries.iter().find(|e| e.config.conflicts_with(&config)) {
            return Err(DisturbanceError::Conflict {
                new:      config.id.clone(),
                existing: existing.config.id.clone(),
                target:   config.target.clone(),
                category: config.category().as_str(),
            });
        }
        debug!(id = %config.id, target = %config.target, category = %config.category(), "disturbance registered");
        self.entries.push(Entry { config, status: DisturbanceStatus::Pending });
        Ok(())
    }

    /// Remove a config; returns it.
    pub fn remove(&mut self, id: &str) -> DisturbanceResult<DisturbanceConfig> {
        let pos = self
            .entries
            .iter()
            .position(|e| e.config.id == id)
            .ok_or_else(|| DisturbanceError::Unknown(id.to_owned()))?;
        Ok(self.entries.remove(pos).config)
    }

    /// Fail if any config targets a component missing from `topology`.
    pub fn validate_targets(&self, topology: &Topology) -> DisturbanceResult<()> {
        match self.entries.iter().find(|e| topology.index_of(&e.config.target).is_none()) {
            Some(e) => Err(DisturbanceError::UnknownTarget {
                id:     e.config.id.clone(),
                target: e.config.target.clone(),
            }),
            None => Ok(()),
        }
    }

    // ── Per-tick ──────────────────────────────────────────────────────────

    /// Advance every config's lifecycle to `time` and log the sensor and
    /// actuator effects in force this tick.
    pub fn begin_tick(&mut self, tick: Tick, time: f64) {
        for entry in &mut self.entries {
            let cfg = &entry.config;
            let next = if time + hydro_core::time::TIME_EPSILON >= cfg.end_time {
                DisturbanceStatus::Expired
            } else if cfg.is_active_at(time) {
                DisturbanceStatus::Active
            } else {
                DisturbanceStatus::Pending
            };
            if next != entry.status {
                info!(id = %cfg.id, target = %cfg.target, ?next, tick = tick.0, "disturbance status changed");
                entry.status = next;
            }
            if next != DisturbanceStatus::Active {
                continue;
            }
            let applied = match cfg.kind {
                DisturbanceKind::SensorNoise { std_dev, .. } => std_dev,
                DisturbanceKind::ActuatorFailure { efficiency, .. } => efficiency,
                DisturbanceKind::InflowChange { .. } => continue,
            };
            self.history.push(DisturbanceRecord {
                config_id:     cfg.id.clone(),
                tick,
                component:     cfg.target.clone(),
                effect:        cfg.category(),
                applied_value: applied,
            });
        }
    }

    /// Write inflow overrides for every config active at `tick * dt` into
    /// `buffers` and return the records produced.
    pub fn update(
        &mut self,
        tick: Tick,
        dt_secs: f64,
        topology: &Topology,
        buffers: &mut InputBuffers,
    ) -> Vec<DisturbanceRecord> {
        let time = tick.0 as f64 * dt_secs;
        let mut records = Vec::new();
        for entry in &self.entries {
            let cfg = &entry.config;
            if !cfg.is_active_at(time) {
                continue;
            }
            let Some(value) = cfg.inflow_at(time) else { continue };
            let Some(idx) = topology.index_of(&cfg.target) else {
                warn!(id = %cfg.id, target = %cfg.target, "disturbance target missing; skipped");
                continue;
            };
            buffers.get_mut(idx).offer_inflow(value, InflowSource::Disturbance);
            records.push(DisturbanceRecord {
                config_id:     cfg.id.clone(),
                tick,
                component:     cfg.target.clone(),
                effect:        EffectCategory::Inflow,
                applied_value: value,
            });
        }
        self.history.extend(records.iter().cloned());
        records
    }

    // ── Queries ───────────────────────────────────────────────────────────

    /// Noise currently applied to observations of `component`.
    pub fn sensor_noise(&self, component: &str) -> Option<SensorNoise> {
        self.active_for(component).find_map(|c| match c.kind {
            DisturbanceKind::SensorNoise { mean, std_dev } => Some(SensorNoise { mean, std_dev }),
            _ => None,
        })
    }

    /// Actuator degradation currently affecting `component`.
    pub fn actuator_failure(&self, component: &str) -> Option<ActuatorFault> {
        self.active_for(component).find_map(|c| match c.kind {
            DisturbanceKind::ActuatorFailure { efficiency, delay_secs } => {
                Some(ActuatorFault { config_id: c.id.clone(), efficiency, delay_secs })
            }
            _ => None,
        })
    }

    fn active_for<'a>(&'a self, component: &'a str) -> impl Iterator<Item = &'a DisturbanceConfig> + 'a {
        self.entries
            .iter()
            .filter(move |e| e.status == DisturbanceStatus::Active && e.config.target == component)
            .map(|e| &e.config)
    }

    pub fn status(&self, id: &str) -> Option<DisturbanceStatus> {
        self.entries.iter().find(|e| e.config.id == id).map(|e| e.status)
    }

    /// `(id, status)` for every config, in registration order.
    pub fn statuses(&self) -> Vec<(&str, DisturbanceStatus)> {
        self.entries.iter().map(|e| (e.config.id.as_str(), e.status)).collect()
    }

    pub fn active_ids(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.status == DisturbanceStatus::Active)
            .map(|e| e.config.id.as_str())
            .collect()
    }

    pub fn configs(&self) -> impl Iterator<Item = &DisturbanceConfig> + '_ {
        self.entries.iter().map(|e| &e.config)
    }

    pub fn get(&self, id: &str) -> Option<&DisturbanceConfig> {
        self.configs().find(|c| c.id == id)
    }

    /// Every effect applied so far, in order.
    pub fn history(&self) -> &[DisturbanceRecord] {
        &self.history
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
