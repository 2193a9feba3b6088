//! Disturbance configuration schema.

use std::fmt;

use crate::{DisturbanceError, DisturbanceResult};

/// Linear ramp toward an inflow target.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Ramp {
    /// Inflow at the start of the window (m³/s).
    pub from:         f64,
    /// Absolute rate of change (m³/s per second).
    pub rate_per_sec: f64,
}

/// The typed effect of a disturbance.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type", rename_all = "snake_case"))]
pub enum DisturbanceKind {
    /// Replace the target's inflow with `target_inflow`, optionally ramping
    /// toward it.
    InflowChange {
        target_inflow: f64,
        #[cfg_attr(feature = "serde", serde(default))]
        ramp:          Option<Ramp>,
    },
    /// Additive Gaussian noise on observations of the target.
    SensorNoise { mean: f64, std_dev: f64 },
    /// Commands reach the target scaled by `efficiency` and `delay_secs` late.
    ActuatorFailure {
        efficiency: f64,
        #[cfg_attr(feature = "serde", serde(default))]
        delay_secs: f64,
    },
}

impl DisturbanceKind {
    pub fn category(&self) -> EffectCategory {
        match self {
            DisturbanceKind::InflowChange { .. } => EffectCategory::Inflow,
            DisturbanceKind::SensorNoise { .. } => EffectCategory::Sensor,
            DisturbanceKind::ActuatorFailure { .. } => EffectCategory::Actuator,
        }
    }
}

/// Coarse effect family; two configs conflict only within one family unless
/// either is `exclusive`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum EffectCategory {
    Inflow,
    Sensor,
    Actuator,
}

impl EffectCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            EffectCategory::Inflow => "inflow",
            EffectCategory::Sensor => "sensor",
            EffectCategory::Actuator => "actuator",
        }
    }
}

impl fmt::Display for EffectCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One scheduled disturbance.  Active while `start_time <= t < end_time`.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DisturbanceConfig {
    pub id:         String,
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub kind:       DisturbanceKind,
    /// Component id.
    pub target:     String,
    pub start_time: f64,
    pub end_time:   f64,
    /// Conflict with any overlapping disturbance on the same target,
    /// whatever its category.
    #[cfg_attr(feature = "serde", serde(default))]
    pub exclusive:  bool,
}

impl DisturbanceConfig {
    pub fn new(id: impl Into<String>, target: impl Into<String>, kind: DisturbanceKind, start: f64, end: f64) -> Self {
        Self {
            id: id.into(),
            kind,
            target: target.into(),
            start_time: start,
            end_time: end,
            exclusive: false,
        }
    }

    pub fn inflow(id: impl Into<String>, target: impl Into<String>, inflow: f64, start: f64, end: f64) -> Self {
        Self::new(id, target, DisturbanceKind::InflowChange { target_inflow: inflow, ramp: None }, start, end)
    }

    pub fn sensor_noise(id: impl Into<String>, target: impl Into<String>, std_dev: f64, start: f64, end: f64) -> Self {
        Self::new(id, target, DisturbanceKind::SensorNoise { mean: 0.0, std_dev }, start, end)
    }

    pub fn actuator_failure(
        id: impl Into<String>,
        target: impl Into<String>,
        efficiency: f64,
        delay_secs: f64,
        start: f64,
        end: f64,
    ) -> Self {
        Self::new(id, target, DisturbanceKind::ActuatorFailure { efficiency, delay_secs }, start, end)
    }

    pub fn exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }

    pub fn category(&self) -> EffectCategory {
        self.kind.category()
    }

    /// Check window and effect parameters.
    pub fn validate(&self) -> DisturbanceResult<()> {
        let invalid = |msg: String| Err(DisturbanceError::Invalid(self.id.clone(), msg));
        if self.id.is_empty() {
            return Err(DisturbanceError::Invalid(String::new(), "id must not be empty".into()));
        }
        if !(self.start_time.is_finite() && self.end_time.is_finite()) {
            return invalid("window bounds must be finite".into());
        }
        if self.end_time <= self.start_time {
            return invalid(format!("end_time {} must exceed start_time {}", self.end_time, self.start_time));
        }
        match &self.kind {
            DisturbanceKind::InflowChange { target_inflow, ramp } => {
                if !target_inflow.is_finite() {
                    return invalid(format!("target_inflow must be finite, got {target_inflow}"));
                }
                let ramp_ok = ramp.is_none_or(|r| r.from.is_finite() && r.rate_per_sec.is_finite() && r.rate_per_sec > 0.0);
                if !ramp_ok {
                    return invalid("ramp needs a finite start and a positive rate".into());
                }
            }
            DisturbanceKind::SensorNoise { mean, std_dev } => {
                if !(mean.is_finite() && std_dev.is_finite() && *std_dev >= 0.0) {
                    return invalid(format!("noise N({mean}, {std_dev}) is not a distribution"));
                }
            }
            DisturbanceKind::ActuatorFailure { efficiency, delay_secs } => {
                if !(0.0..=1.0).contains(efficiency) {
                    return invalid(format!("efficiency must be within [0, 1], got {efficiency}"));
                }
                if !(delay_secs.is_finite() && *delay_secs >= 0.0) {
                    return invalid(format!("delay_secs must be >= 0, got {delay_secs}"));
                }
            }
        }
        Ok(())
    }

    /// `[start, end)` membership, tolerant of float drift in `tick * dt`.
    pub fn is_active_at(&self, time: f64) -> bool {
        let t = time + hydro_core::time::TIME_EPSILON;
        t >= self.start_time && t < self.end_time
    }

    /// Windows intersect.
    pub fn overlaps(&self, other: &DisturbanceConfig) -> bool {
        self.start_time < other.end_time && other.start_time < self.end_time
    }

    /// Whether `self` and `other` may not both be registered.
    pub fn conflicts_with(&self, other: &DisturbanceConfig) -> bool {
        self.target == other.target
            && (self.exclusive || other.exclusive || self.category() == other.category())
            && self.overlaps(other)
    }

    /// Override inflow at `time`, if this is an inflow change.
    pub fn inflow_at(&self, time: f64) -> Option<f64> {
        let DisturbanceKind::InflowChange { target_inflow, ramp } = &self.kind else {
            return None;
        };
        Some(match ramp {
            None => *target_inflow,
            Some(r) => {
                let elapsed = (time - self.start_time).max(0.0);
                let step = r.rate_per_sec * elapsed;
                if *target_inflow >= r.from {
                    (r.from + step).min(*target_inflow)
                } else {
                    (r.from - step).max(*target_inflow)
                }
            }
        })
    }
}
