//! `hydro-topology`: physical components and the directed flow graph.
//!
//! # Crate layout
//!
//! | Module        | Contents                                                    |
//! |---------------|-------------------------------------------------------------|
//! | [`component`] | `Component` trait, `StepInputs`, `InflowSource`             |
//! | [`graph`]     | `Topology` (arena + Kahn ordering)                          |
//! | [`buffers`]   | `InputBuffers`: per-tick pending inputs with precedence    |
//! | [`physical`]  | `Reservoir`, `Gate`, `Canal`, `Pump` reference models       |
//! | [`error`]     | `TopologyError`, `ComponentError`                           |
//!
//! # Design notes
//!
//! Components live in a flat `Vec<Box<dyn Component>>`; edges are index
//! pairs.  There are no pointers between components, so a cyclic
//! configuration is just data that `build()` rejects.  The execution order is
//! computed once and cached; any later mutation is refused.

pub mod buffers;
pub mod component;
pub mod error;
pub mod graph;
pub mod physical;


pub use buffers::{InputBuffers, PendingInput};
pub use component::{Component, INFLOW, InflowSource, OUTFLOW, StepInputs};
pub use error::{ComponentError, ComponentResult, TopologyError, TopologyResult};
pub use graph::Topology;
pub use physical::{Canal, Gate, Pump, Reservoir, action_topic};
