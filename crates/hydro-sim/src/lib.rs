//! `hydro-sim`: the simulation harness.
//!
//! # One tick
//!
//! ```text
//! for tick in 0..config.total_ticks():
//!   ⓪ Clocks     : bus tick stamp; disturbances go pending → active → expired.
//!   ① Agents     : Agent::run in registration order; every publish is
//!                  delivered synchronously before run returns.
//!   ② Disturbance: active inflow overrides are written to input buffers.
//!   ③ Bindings   : directly wired controllers read a sensor, write a control.
//!   ④ Physics    : components step in topological order with inflow
//!                  precedence disturbance > message > upstream sum.
//!   ⑤ Snapshot   : every `output_interval_ticks`, all component states.
//! ```
//!
//! # Cargo features
//!
//! | Feature    | Effect                                                      |
//! |------------|-------------------------------------------------------------|
//! | `parallel` | [`run_batch`] runs independent instances on Rayon's pool.   |
//! | `serde`    | `Serialize`/`Deserialize` on snapshots and reports.         |
//! | `fx-hash`  | FxHash for topic tables.                                    |
//!
//! # Quick-start
//!
//! ```rust,ignore
//! use hydro_core::SimConfig;
//! use hydro_disturbance::DisturbanceConfig;
//! use hydro_sim::SimBuilder;
//! use hydro_topology::Reservoir;
//!
//! let config = SimConfig { dt_secs: 1.0, duration_secs: 20.0, ..SimConfig::default() };
//! let mut harness = SimBuilder::new(config)
//!     .component(Reservoir::new("res", 1.0e6, 15.0))
//!     .disturbance(DisturbanceConfig::inflow("storm", "res", 5_000.0, 10.0, 15.0))
//!     .build()?;
//! harness.run()?;
//! ```

pub mod batch;
pub mod binding;
pub mod builder;
pub mod error;
pub mod harness;
mod inbox;
pub mod observer;


pub use batch::{BatchOutcome, batch_seeds, run_batch};
pub use binding::ControllerBinding;
pub use builder::SimBuilder;
pub use error::{SimError, SimResult};
pub use harness::{Harness, HarnessState, Snapshot, StopHandle};
pub use observer::{NoopObserver, SimObserver, TickReport};
