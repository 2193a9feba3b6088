//! `hydro-agent`: the decision layer.
//!
//! Agents are bus subscribers with one extra hook, [`Agent::run`], called
//! once per tick in registration order.  Everything else happens through
//! synchronous message delivery: a perception agent's publish reaches the
//! local controller, whose action reaches the component inbox, all inside
//! the perception agent's `run`.
//!
//! | Module            | Contents                                             |
//! |-------------------|------------------------------------------------------|
//! | [`agent`]         | `Agent` trait, `AgentContext`                        |
//! | [`perception`]    | `PerceptionAgent` (state → topic, Gaussian noise)    |
//! | [`local_control`] | `LocalControlAgent`, `ControlPhase`                  |
//! | [`dispatcher`]    | `CentralDispatcherAgent` (rule / emergency / MPC)    |
//! | [`source`]        | `DisturbanceSourceAgent`, `InflowSeriesAgent`        |
//! | [`error`]         | `AgentError`, `AgentResult`                          |

pub mod agent;
pub mod dispatcher;
pub mod error;
pub mod local_control;
pub mod perception;
pub mod source;

#[cfg(test)]
mod tests;

pub use agent::{Agent, AgentContext};
pub use dispatcher::{CentralDispatcherAgent, DispatchMode, MpcOutput, RuleConfig};
pub use error::{AgentError, AgentResult};
pub use local_control::{ControlPhase, LocalControlAgent};
pub use perception::PerceptionAgent;
pub use source::{DisturbanceSourceAgent, InflowSeriesAgent};
