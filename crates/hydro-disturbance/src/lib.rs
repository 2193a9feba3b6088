//! `hydro-disturbance`: scheduled perturbations of a running simulation.
//!
//! A [`DisturbanceConfig`] names a target component, a `[start, end)` window
//! in virtual seconds and one effect:
//!
//! | Kind              | Where it acts                                     |
//! |-------------------|---------------------------------------------------|
//! | `InflowChange`    | overrides the component's inflow (input buffer)   |
//! | `SensorNoise`     | perception agents observing the component         |
//! | `ActuatorFailure` | commands delivered to the component               |
//!
//! The [`DisturbanceManager`] validates configs at registration, tracks their
//! lifecycle (`Pending → Active → Expired`), applies inflow overrides each
//! tick and keeps an audit log of every effect.

pub mod config;
pub mod error;
pub mod manager;


pub use config::{DisturbanceConfig, DisturbanceKind, EffectCategory, Ramp};
pub use error::{DisturbanceError, DisturbanceResult};
pub use manager::{ActuatorFault, DisturbanceManager, DisturbanceRecord, DisturbanceStatus, SensorNoise};
