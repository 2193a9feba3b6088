use crate::error::{check_dt, check_finite};
use crate::{ControlError, ControlResult, Controller, ControllerKind};

/// Two-position controller with a hysteresis band.
///
/// In the default direct mode the output switches to `on_output` once the
/// measurement drops below `setpoint − band` and back to `off_output` above
/// `setpoint + band` (a fill pump).  [`reversed`](Self::reversed) swaps the
/// roles (a drain pump).  Inside the band the previous output holds.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OnOffController {
    setpoint:   f64,
    band:       f64,
    on_output:  f64,
    off_output: f64,
    reverse:    bool,
    on:         bool,
}

impl OnOffController {
    pub fn new(setpoint: f64, band: f64, on_output: f64, off_output: f64) -> ControlResult<Self> {
        if !(band.is_finite() && band >= 0.0) {
            return Err(ControlError::Config(format!("hysteresis band must be >= 0, got {band}")));
        }
        Ok(Self { setpoint, band, on_output, off_output, reverse: false, on: false })
    }

    /// Switch on above the band instead of below it.
    pub fn reversed(mut self) -> Self {
        self.reverse = true;
        self
    }

    pub fn is_on(&self) -> bool {
        self.on
    }
}

impl Controller for OnOffController {
    fn compute(&mut self, measured: f64, dt: f64) -> ControlResult<f64> {
        check_dt(dt)?;
        let measured = check_finite("measurement", measured)?;
        let (low, high) = (self.setpoint - self.band, self.setpoint + self.band);
        if measured < low {
            self.on = !self.reverse;
        } else if measured > high {
            self.on = self.reverse;
        }
        Ok(if self.on { self.on_output } else { self.off_output })
    }

    fn setpoint(&self) -> f64 {
        self.setpoint
    }

    fn set_setpoint(&mut self, setpoint: f64) {
        self.setpoint = setpoint;
    }

    fn reset(&mut self) {
        self.on = false;
    }

    fn kind(&self) -> ControllerKind {
        ControllerKind::OnOff
    }
}
