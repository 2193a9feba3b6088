use hydro_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ControlError {
    #[error("time step must be positive and finite, got {0}")]
    InvalidTimeStep(f64),

    #[error("non-finite {what}: {value}")]
    NonFinite { what: &'static str, value: f64 },

    #[error("invalid controller configuration: {0}")]
    Config(String),

    #[error("forecast has {got} entries, horizon needs {need}")]
    ForecastTooShort { need: usize, got: usize },

    #[error(transparent)]
    Core(#[from] CoreError),
}

pub type ControlResult<T> = Result<T, ControlError>;

pub(crate) fn check_dt(dt: f64) -> ControlResult<()> {
    if dt.is_finite() && dt > 0.0 { Ok(()) } else { Err(ControlError::InvalidTimeStep(dt)) }
}

pub(crate) fn check_finite(what: &'static str, value: f64) -> ControlResult<f64> {
    if value.is_finite() { Ok(value) } else { Err(ControlError::NonFinite { what, value }) }
}
