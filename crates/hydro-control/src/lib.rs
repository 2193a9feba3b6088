//! `hydro-control`: feedback and supervisory controllers.
//!
//! Controllers are plain state machines: they see a measurement and a step
//! size, and return an action.  They never touch the bus; agents wrap them.
//!
//! | Module         | Contents                                                  |
//! |----------------|-----------------------------------------------------------|
//! | [`controller`] | `Controller` trait, `ControllerKind`                      |
//! | [`pid`]        | `PidController` with conditional-integration anti-windup  |
//! | [`rule`]       | `OnOffController` (hysteresis band)                       |
//! | [`mpc`]        | `RollingHorizonOptimizer` (projected-gradient MPC)        |
//! | [`error`]      | `ControlError`, `ControlResult`                           |

pub mod controller;
pub mod error;
pub mod mpc;
pub mod pid;
pub mod rule;

#[cfg(test)]
mod tests;

pub use controller::{Controller, ControllerKind};
pub use error::{ControlError, ControlResult};
pub use mpc::{DegradedOptimization, MpcConfig, MpcOutcome, MpcProblem, RollingHorizonOptimizer};
pub use pid::{PidConfig, PidController};
pub use rule::OnOffController;
