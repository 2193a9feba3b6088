//! The `OutputWriter` trait implemented by all backend writers.

use crate::{ComponentStateRow, DisturbanceLogRow, OutputResult, TickSummaryRow};

/// Implemented by the CSV and SQLite writers.
///
/// Errors are returned to [`SimOutputObserver`](crate::SimOutputObserver),
/// which keeps the first one for [`take_error`](crate::SimOutputObserver::take_error).
pub trait OutputWriter {
    fn write_states(&mut self, rows: &[ComponentStateRow]) -> OutputResult<()>;

    fn write_disturbances(&mut self, rows: &[DisturbanceLogRow]) -> OutputResult<()>;

    fn write_tick_summary(&mut self, row: &TickSummaryRow) -> OutputResult<()>;

    /// Flush and close all underlying handles.
    ///
    /// Idempotent: safe to call more than once.
    fn finish(&mut self) -> OutputResult<()>;
}
