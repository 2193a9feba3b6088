//! Topology and component error types.

use hydro_core::CoreError;
use thiserror::Error;

/// Errors produced while assembling or querying a [`Topology`](crate::Topology).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TopologyError {
    #[error("flow graph contains a cycle through {remaining:?}")]
    Cyclic { remaining: Vec<String> },

    #[error("topology is frozen after build(); {operation} is not allowed")]
    Frozen { operation: &'static str },

    #[error("topology has not been built yet")]
    NotBuilt,

    #[error("component `{0}` not found")]
    UnknownComponent(String),

    #[error("component `{0}` already exists")]
    DuplicateComponent(String),

    #[error("connection {upstream} -> {downstream} already exists")]
    DuplicateConnection { upstream: String, downstream: String },
}

pub type TopologyResult<T> = Result<T, TopologyError>;

/// Errors raised by a component's `step`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ComponentError {
    #[error("invalid input `{field}` = {value}")]
    InvalidInput { field: String, value: f64 },

    #[error("{0}")]
    Physics(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

pub type ComponentResult<T> = Result<T, ComponentError>;
