//! `hydro-core`: foundational types for the `hydro` water-network simulator.
//!
//! This crate is a dependency of every other `hydro-*` crate.  It has no
//! `hydro-*` dependencies and minimal external ones (only `rand` and
//! `thiserror`, plus optional `serde`).
//!
//! # What lives here
//!
//! | Module      | Contents                                                  |
//! |-------------|-----------------------------------------------------------|
//! | [`ids`]     | `ComponentIdx`, `AgentIdx`, `SubscriptionId`              |
//! | [`time`]    | `Tick`, `SimClock`, `SimConfig`                           |
//! | [`fields`]  | `Fields` (named numeric state), `Payload` (message body)  |
//! | [`rng`]     | `AgentRng` (per-agent), `SimRng` (global)                 |
//! | [`error`]   | `CoreError`, `CoreResult`                                 |
//!
//! # Feature flags
//!
//! | Flag    | Effect                                                     |
//! |---------|------------------------------------------------------------|
//! | `serde` | Adds `Serialize`/`Deserialize` to all public types.        |

pub mod error;
pub mod fields;
pub mod ids;
pub mod rng;
pub mod time;


// ── Re-exports ────────────────────────────────────────────────────────────────

pub use error::{CoreError, CoreResult};
pub use fields::{Fields, Payload};
pub use ids::{AgentIdx, ComponentIdx, SubscriptionId};
pub use rng::{AgentRng, SimRng};
pub use time::{SimClock, SimConfig, Tick};
