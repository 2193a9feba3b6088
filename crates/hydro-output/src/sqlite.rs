//! SQLite output backend (feature `sqlite`).
//!
//! Creates `output.db` in the output directory with three tables:
//! `component_states`, `disturbance_log` and `tick_summaries`.

use std::fs;
use std::path::Path;

use rusqlite::Connection;

use crate::writer::OutputWriter;
use crate::{ComponentStateRow, DisturbanceLogRow, OutputResult, TickSummaryRow};

pub struct SqliteWriter {
    conn:     Connection,
    finished: bool,
}

impl SqliteWriter {
    /// Open (or create) `output.db` in `dir` and initialise the schema.
    pub fn new(dir: &Path) -> OutputResult<Self> {
        fs::create_dir_all(dir)?;
        let conn = Connection::open(dir.join("output.db"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous  = NORMAL;
             CREATE TABLE IF NOT EXISTS component_states (
                 tick      INTEGER NOT NULL,
                 time      REAL    NOT NULL,
                 component TEXT    NOT NULL,
                 field     TEXT    NOT NULL,
                 value     REAL    NOT NULL
             );
             CREATE TABLE IF NOT EXISTS disturbance_log (
                 tick          INTEGER NOT NULL,
                 config_id     TEXT    NOT NULL,
                 component     TEXT    NOT NULL,
                 effect        TEXT    NOT NULL,
                 applied_value REAL    NOT NULL
             );
             CREATE TABLE IF NOT EXISTS tick_summaries (
                 tick      INTEGER PRIMARY KEY,
                 time      REAL    NOT NULL,
                 published INTEGER NOT NULL,
                 disturbed INTEGER NOT NULL
             );",
        )?;

        Ok(Self { conn, finished: false })
    }
}

impl OutputWriter for SqliteWriter {
    fn write_states(&mut self, rows: &[ComponentStateRow]) -> OutputResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO component_states (tick, time, component, field, value) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for row in rows {
                stmt.execute(rusqlite::params![row.tick as i64, row.time, row.component, row.field, row.value])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn write_disturbances(&mut self, rows: &[DisturbanceLogRow]) -> OutputResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO disturbance_log (tick, config_id, component, effect, applied_value) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for row in rows {
                stmt.execute(rusqlite::params![
                    row.tick as i64,
                    row.config_id,
                    row.component,
                    row.effect,
                    row.applied_value,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn write_tick_summary(&mut self, row: &TickSummaryRow) -> OutputResult<()> {
        self.conn.execute(
            "INSERT INTO tick_summaries (tick, time, published, disturbed) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![row.tick as i64, row.time, row.published as i64, row.disturbed as i64],
        )?;
        Ok(())
    }

    fn finish(&mut self) -> OutputResult<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        Ok(())
    }
}
