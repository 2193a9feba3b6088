use hydro_agent::AgentError;
use hydro_bus::BusError;
use hydro_control::ControlError;
use hydro_core::{CoreError, Tick};
use hydro_disturbance::DisturbanceError;
use hydro_topology::{ComponentError, TopologyError};
use thiserror::Error;

use crate::HarnessState;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("simulation configuration error: {0}")]
    Config(String),

    #[error("`{operation}` is not allowed while the harness is {state}")]
    InvalidState { operation: &'static str, state: HarnessState },

    #[error("agent `{0}` already registered")]
    DuplicateAgent(String),

    #[error("component `{component}` failed at tick {tick}: {source}")]
    Component {
        component: String,
        tick:      Tick,
        #[source]
        source:    ComponentError,
    },

    #[error("agent `{agent}` failed at tick {tick}: {source}")]
    Agent {
        agent:  String,
        tick:   Tick,
        #[source]
        source: AgentError,
    },

    #[error("controller `{binding}` failed at tick {tick}: {source}")]
    Controller {
        binding: String,
        tick:    Tick,
        #[source]
        source:  ControlError,
    },

    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error(transparent)]
    Disturbance(#[from] DisturbanceError),

    #[error(transparent)]
    Bus(#[from] BusError),
}

impl From<CoreError> for SimError {
    fn from(e: CoreError) -> Self {
        SimError::Config(e.to_string())
    }
}

pub type SimResult<T> = Result<T, SimError>;
