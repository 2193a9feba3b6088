//! Positional PID with conditional-integration anti-windup.

use crate::error::{check_dt, check_finite};
use crate::{ControlError, ControlResult, Controller, ControllerKind};

/// Gains, target and output clamp.
///
/// Use negative gains for reverse-acting loops (opening a gate lowers the
/// upstream level); the controller does not infer the sign.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PidConfig {
    pub kp:         f64,
    pub ki:         f64,
    pub kd:         f64,
    pub setpoint:   f64,
    pub output_min: f64,
    pub output_max: f64,
}

impl Default for PidConfig {
    fn default() -> Self {
        Self {
            kp:         1.0,
            ki:         0.0,
            kd:         0.0,
            setpoint:   0.0,
            output_min: f64::NEG_INFINITY,
            output_max: f64::INFINITY,
        }
    }
}

impl PidConfig {
    pub fn new(kp: f64, ki: f64, kd: f64, setpoint: f64) -> Self {
        Self { kp, ki, kd, setpoint, ..Self::default() }
    }

    pub fn with_limits(mut self, min: f64, max: f64) -> Self {
        self.output_min = min;
        self.output_max = max;
        self
    }

    pub fn validate(&self) -> ControlResult<()> {
        for (what, v) in [("kp", self.kp), ("ki", self.ki), ("kd", self.kd), ("setpoint", self.setpoint)] {
            if !v.is_finite() {
                return Err(ControlError::Config(format!("{what} must be finite, got {v}")));
            }
        }
        if self.output_min.is_nan() || self.output_max.is_nan() || self.output_min > self.output_max {
            return Err(ControlError::Config(format!(
                "output limits [{}, {}] are not an interval",
                self.output_min, self.output_max
            )));
        }
        Ok(())
    }
}

/// `u = clamp(kp·e + ki·∫e + kd·de/dt, min, max)` with `e = setpoint − measured`.
///
/// The integral only accumulates when the unclamped output is inside the
/// limits, or when the new error would pull a saturated output back toward
/// them.  The derivative term is zero on the first sample after construction
/// or [`reset`](Controller::reset).
#[derive(Clone, Debug)]
pub struct PidController {
    config:     PidConfig,
    integral:   f64,
    prev_error: Option<f64>,
}

impl PidController {
    pub fn new(config: PidConfig) -> ControlResult<Self> {
        config.validate()?;
        Ok(Self { config, integral: 0.0, prev_error: None })
    }

    pub fn config(&self) -> &PidConfig {
        &self.config
    }

    /// Accumulated `∫e dt`.
    pub fn integral(&self) -> f64 {
        self.integral
    }

    pub fn last_error(&self) -> Option<f64> {
        self.prev_error
    }

    fn clamp(&self, u: f64) -> f64 {
        u.clamp(self.config.output_min, self.config.output_max)
    }
}

impl Controller for PidController {
    fn compute(&mut self, measured: f64, dt: f64) -> ControlResult<f64> {
        check_dt(dt)?;
        let measured = check_finite("measurement", measured)?;
        let PidConfig { kp, ki, kd, setpoint, output_min, output_max } = self.config;

        let error = setpoint - measured;
        let derivative = self.prev_error.map_or(0.0, |prev| (error - prev) / dt);
        self.prev_error = Some(error);

        let unclamped = kp * error + ki * self.integral + kd * derivative;
        let integrate = (output_min..=output_max).contains(&unclamped)
            || (unclamped > output_max && ki * error < 0.0)
            || (unclamped < output_min && ki * error > 0.0);
        if integrate {
            self.integral += error * dt;
        }

        Ok(self.clamp(kp * error + ki * self.integral + kd * derivative))
    }

    fn setpoint(&self) -> f64 {
        self.config.setpoint
    }

    fn set_setpoint(&mut self, setpoint: f64) {
        self.config.setpoint = setpoint;
    }

    fn reset(&mut self) {
        self.integral = 0.0;
        self.prev_error = None;
    }

    fn kind(&self) -> ControllerKind {
        ControllerKind::Pid
    }
}
