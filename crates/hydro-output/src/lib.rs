//! `hydro-output`: writers for simulation histories.
//!
//! | Feature   | Backend | Files created                                                      |
//! |-----------|---------|--------------------------------------------------------------------|
//! | *(none)*  | CSV     | `component_states.csv`, `disturbance_log.csv`, `tick_summaries.csv` |
//! | `sqlite`  | SQLite  | `output.db`                                                        |
//!
//! Both backends implement [`OutputWriter`] and are driven by
//! [`SimOutputObserver`], which implements `hydro_sim::SimObserver`.
//!
//! ```rust,ignore
//! use hydro_output::{CsvWriter, SimOutputObserver};
//!
//! let mut obs = SimOutputObserver::new(CsvWriter::new(Path::new("./output"))?);
//! harness.run_with(&mut obs)?;
//! if let Some(e) = obs.take_error() {
//!     eprintln!("output error: {e}");
//! }
//! ```

pub mod csv;
pub mod error;
pub mod observer;
pub mod row;
pub mod writer;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(test)]
mod tests;

pub use csv::CsvWriter;
pub use error::{OutputError, OutputResult};
pub use observer::SimOutputObserver;
pub use row::{ComponentStateRow, DisturbanceLogRow, TickSummaryRow};
pub use writer::OutputWriter;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteWriter;
