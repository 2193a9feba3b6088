//! CSV output backend.
//!
//! Creates three files in the output directory:
//! - `component_states.csv`
//! - `disturbance_log.csv`
//! - `tick_summaries.csv`

use std::fs::{self, File};
use std::path::Path;

use csv::Writer;

use crate::writer::OutputWriter;
use crate::{ComponentStateRow, DisturbanceLogRow, OutputResult, TickSummaryRow};

pub struct CsvWriter {
    states:       Writer<File>,
    disturbances: Writer<File>,
    summaries:    Writer<File>,
    finished:     bool,
}

impl CsvWriter {
    /// Create `dir` if needed, open the three files and write their headers.
    pub fn new(dir: &Path) -> OutputResult<Self> {
        fs::create_dir_all(dir)?;

        let mut states = Writer::from_path(dir.join("component_states.csv"))?;
        states.write_record(["tick", "time", "component", "field", "value"])?;

        let mut disturbances = Writer::from_path(dir.join("disturbance_log.csv"))?;
        disturbances.write_record(["tick", "config_id", "component", "effect", "applied_value"])?;

        let mut summaries = Writer::from_path(dir.join("tick_summaries.csv"))?;
        summaries.write_record(["tick", "time", "published", "disturbed"])?;

        Ok(Self { states, disturbances, summaries, finished: false })
    }
}

impl OutputWriter for CsvWriter {
    fn write_states(&mut self, rows: &[ComponentStateRow]) -> OutputResult<()> {
        for row in rows {
            self.states.write_record(&[
                row.tick.to_string(),
                row.time.to_string(),
                row.component.clone(),
                row.field.clone(),
                row.value.to_string(),
            ])?;
        }
        Ok(())
    }

    fn write_disturbances(&mut self, rows: &[DisturbanceLogRow]) -> OutputResult<()> {
        for row in rows {
            self.disturbances.write_record(&[
                row.tick.to_string(),
                row.config_id.clone(),
                row.component.clone(),
                row.effect.to_owned(),
                row.applied_value.to_string(),
            ])?;
        }
        Ok(())
    }

    fn write_tick_summary(&mut self, row: &TickSummaryRow) -> OutputResult<()> {
        self.summaries.write_record(&[
            row.tick.to_string(),
            row.time.to_string(),
            row.published.to_string(),
            row.disturbed.to_string(),
        ])?;
        Ok(())
    }

    fn finish(&mut self) -> OutputResult<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.states.flush()?;
        self.disturbances.flush()?;
        self.summaries.flush()?;
        Ok(())
    }
}
