//! `SimOutputObserver<W>`: bridges `SimObserver` to an `OutputWriter`.

use hydro_core::Tick;
use hydro_disturbance::DisturbanceRecord;
use hydro_sim::{HarnessState, SimObserver, Snapshot, TickReport};
use tracing::warn;

use crate::row::{ComponentStateRow, DisturbanceLogRow, TickSummaryRow};
use crate::writer::OutputWriter;
use crate::{OutputError, OutputResult};

/// A [`SimObserver`] that streams snapshots, disturbance records and tick
/// summaries to any [`OutputWriter`].
///
/// Observer hooks cannot fail, so the first write error is stored and the
/// rest are dropped.  Check [`take_error`](Self::take_error) after the run.
pub struct SimOutputObserver<W: OutputWriter> {
    writer:     W,
    last_error: Option<OutputError>,
}

impl<W: OutputWriter> SimOutputObserver<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, last_error: None }
    }

    /// Take the stored write error (if any) after the run returns.
    pub fn take_error(&mut self) -> Option<OutputError> {
        self.last_error.take()
    }

    pub fn into_writer(self) -> W {
        self.writer
    }

    fn store_err(&mut self, result: OutputResult<()>) {
        if let Err(e) = result {
            if self.last_error.is_none() {
                warn!(error = %e, "output write failed; further errors suppressed");
                self.last_error = Some(e);
            }
        }
    }
}

impl<W: OutputWriter> SimObserver for SimOutputObserver<W> {
    fn on_disturbances(&mut self, _tick: Tick, records: &[DisturbanceRecord]) {
        let rows: Vec<DisturbanceLogRow> = records
            .iter()
            .map(|r| DisturbanceLogRow {
                tick:          r.tick.0,
                config_id:     r.config_id.clone(),
                component:     r.component.clone(),
                effect:        r.effect.as_str(),
                applied_value: r.applied_value,
            })
            .collect();
        let result = self.writer.write_disturbances(&rows);
        self.store_err(result);
    }

    fn on_snapshot(&mut self, snapshot: &Snapshot) {
        let rows: Vec<ComponentStateRow> = snapshot
            .components
            .iter()
            .flat_map(|(component, fields)| {
                fields.iter().map(move |(field, value)| ComponentStateRow {
                    tick: snapshot.tick.0,
                    time: snapshot.time,
                    component: component.clone(),
                    field: field.to_owned(),
                    value,
                })
            })
            .collect();
        if !rows.is_empty() {
            let result = self.writer.write_states(&rows);
            self.store_err(result);
        }
    }

    fn on_tick_end(&mut self, report: &TickReport) {
        let row = TickSummaryRow {
            tick:      report.tick.0,
            time:      report.time,
            published: report.published,
            disturbed: report.disturbed.len() as u64,
        };
        let result = self.writer.write_tick_summary(&row);
        self.store_err(result);
    }

    fn on_sim_end(&mut self, _final_tick: Tick, _state: HarnessState) {
        let result = self.writer.finish();
        self.store_err(result);
    }
}
