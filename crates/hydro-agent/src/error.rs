use hydro_bus::BusError;
use hydro_control::ControlError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("agent configuration error: {0}")]
    Config(String),

    #[error("component `{0}` not found")]
    UnknownComponent(String),

    #[error("field `{field}` missing from `{source_id}`")]
    MissingField { source_id: String, field: String },

    #[error("inflow series: {0}")]
    Series(String),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error(transparent)]
    Control(#[from] ControlError),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

pub type AgentResult<T> = Result<T, AgentError>;
