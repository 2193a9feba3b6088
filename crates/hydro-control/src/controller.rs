use std::fmt;

use crate::ControlResult;

/// Which family a controller belongs to (logged by agents).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ControllerKind {
    Pid,
    OnOff,
    Custom,
}

impl fmt::Display for ControllerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ControllerKind::Pid => "pid",
            ControllerKind::OnOff => "on_off",
            ControllerKind::Custom => "custom",
        })
    }
}

/// A single-input single-output feedback law.
///
/// `compute` is called at most once per tick.  Implementations keep their own
/// history (integrator, previous error, switch state); `set_setpoint` must not
/// disturb it.
pub trait Controller {
    /// Control action for the current `measured` value over a step of `dt` seconds.
    fn compute(&mut self, measured: f64, dt: f64) -> ControlResult<f64>;

    fn setpoint(&self) -> f64;

    /// Change the target only.
    fn set_setpoint(&mut self, setpoint: f64);

    /// Forget all history.
    fn reset(&mut self);

    fn kind(&self) -> ControllerKind {
        ControllerKind::Custom
    }
}

impl<C: Controller + ?Sized> Controller for Box<C> {
    fn compute(&mut self, measured: f64, dt: f64) -> ControlResult<f64> {
        (**self).compute(measured, dt)
    }

    fn setpoint(&self) -> f64 {
        (**self).setpoint()
    }

    fn set_setpoint(&mut self, setpoint: f64) {
        (**self).set_setpoint(setpoint)
    }

    fn reset(&mut self) {
        (**self).reset()
    }

    fn kind(&self) -> ControllerKind {
        (**self).kind()
    }
}
