//! Integration tests for hydro-output.

#[cfg(test)]
mod csv_tests {
    use tempfile::TempDir;

    use crate::csv::CsvWriter;
    use crate::row::{ComponentStateRow, DisturbanceLogRow, TickSummaryRow};
    use crate::writer::OutputWriter;

    fn tmp() -> TempDir {
        tempfile::tempdir().expect("create temp dir")
    }

    fn state_row(component: &str, tick: u64, value: f64) -> ComponentStateRow {
        ComponentStateRow {
            tick,
            time: (tick + 1) as f64,
            component: component.into(),
            field: "water_level".into(),
            value,
        }
    }

    fn headers(path: std::path::PathBuf) -> Vec<String> {
        let mut rdr = csv::Reader::from_path(path).unwrap();
        rdr.headers().unwrap().iter().map(str::to_owned).collect()
    }

    #[test]
    fn files_created_with_headers() {
        let dir = tmp();
        let mut w = CsvWriter::new(&dir.path().join("nested")).unwrap();
        w.finish().unwrap();

        let out = dir.path().join("nested");
        assert_eq!(headers(out.join("component_states.csv")), ["tick", "time", "component", "field", "value"]);
        assert_eq!(
            headers(out.join("disturbance_log.csv")),
            ["tick", "config_id", "component", "effect", "applied_value"]
        );
        assert_eq!(headers(out.join("tick_summaries.csv")), ["tick", "time", "published", "disturbed"]);
    }

    #[test]
    fn state_rows_written_in_order() {
        let dir = tmp();
        let mut w = CsvWriter::new(dir.path()).unwrap();
        w.write_states(&[state_row("a", 5, 1.5), state_row("b", 5, 2.25)]).unwrap();
        w.finish().unwrap();

        let mut rdr = csv::Reader::from_path(dir.path().join("component_states.csv")).unwrap();
        let rows: Vec<_> = rdr.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][0], "5");
        assert_eq!(&rows[0][1], "6");
        assert_eq!(&rows[0][2], "a");
        assert_eq!(&rows[1][4], "2.25");
    }

    #[test]
    fn disturbance_and_summary_rows() {
        let dir = tmp();
        let mut w = CsvWriter::new(dir.path()).unwrap();
        w.write_disturbances(&[DisturbanceLogRow {
            tick:          3,
            config_id:     "storm".into(),
            component:     "res".into(),
            effect:        "inflow",
            applied_value: 5_000.0,
        }])
        .unwrap();
        w.write_tick_summary(&TickSummaryRow { tick: 3, time: 4.0, published: 7, disturbed: 1 }).unwrap();
        w.finish().unwrap();

        let mut rdr = csv::Reader::from_path(dir.path().join("disturbance_log.csv")).unwrap();
        let rows: Vec<_> = rdr.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(&rows[0][1], "storm");
        assert_eq!(&rows[0][3], "inflow");
        assert_eq!(&rows[0][4], "5000");

        let mut rdr = csv::Reader::from_path(dir.path().join("tick_summaries.csv")).unwrap();
        let rows: Vec<_> = rdr.records().map(|r| r.unwrap()).collect();
        assert_eq!(&rows[0][2], "7");
        assert_eq!(&rows[0][3], "1");
    }

    #[test]
    fn finish_idempotent() {
        let dir = tmp();
        let mut w = CsvWriter::new(dir.path()).unwrap();
        w.write_states(&[]).unwrap();
        w.finish().unwrap();
        w.finish().unwrap();
    }
}

// ── Observer ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod observer_tests {
    use hydro_core::SimConfig;
    use hydro_disturbance::DisturbanceConfig;
    use hydro_sim::SimBuilder;
    use hydro_topology::Reservoir;

    use crate::{CsvWriter, OutputError, OutputResult, OutputWriter, SimOutputObserver};
    use crate::row::{ComponentStateRow, DisturbanceLogRow, TickSummaryRow};

    fn harness() -> hydro_sim::Harness {
        let config = SimConfig { dt_secs: 1.0, duration_secs: 6.0, output_interval_ticks: 2, ..SimConfig::default() };
        SimBuilder::new(config)
            .component(Reservoir::new("res", 1.0e6, 15.0))
            .disturbance(DisturbanceConfig::inflow("storm", "res", 5_000.0, 2.0, 4.0))
            .build()
            .unwrap()
    }

    fn count(path: std::path::PathBuf) -> usize {
        csv::Reader::from_path(path).unwrap().records().count()
    }

    #[test]
    fn full_run_to_csv() {
        let dir = tempfile::tempdir().unwrap();
        let mut obs = SimOutputObserver::new(CsvWriter::new(dir.path()).unwrap());
        harness().run_with(&mut obs).unwrap();
        assert!(obs.take_error().is_none());

        // Snapshots at ticks 0, 2, 4; a reservoir has four state fields.
        assert_eq!(count(dir.path().join("component_states.csv")), 12);
        assert_eq!(count(dir.path().join("disturbance_log.csv")), 2);
        assert_eq!(count(dir.path().join("tick_summaries.csv")), 6);
    }

    /// Fails every call after the first `ok` writes.
    struct Flaky {
        ok:    usize,
        calls: usize,
    }

    impl Flaky {
        fn call(&mut self) -> OutputResult<()> {
            self.calls += 1;
            if self.calls > self.ok {
                return Err(OutputError::Io(std::io::Error::other(format!("disk full at call {}", self.calls))));
            }
            Ok(())
        }
    }

    impl OutputWriter for Flaky {
        fn write_states(&mut self, _rows: &[ComponentStateRow]) -> OutputResult<()> {
            self.call()
        }

        fn write_disturbances(&mut self, _rows: &[DisturbanceLogRow]) -> OutputResult<()> {
            self.call()
        }

        fn write_tick_summary(&mut self, _row: &TickSummaryRow) -> OutputResult<()> {
            self.call()
        }

        fn finish(&mut self) -> OutputResult<()> {
            Ok(())
        }
    }

    #[test]
    fn first_error_kept_and_run_continues() {
        let mut obs = SimOutputObserver::new(Flaky { ok: 2, calls: 0 });
        harness().run_with(&mut obs).unwrap();

        let err = obs.take_error().expect("write error stored");
        assert!(err.to_string().contains("call 3"), "{err}");
        assert!(obs.take_error().is_none());
        assert!(obs.into_writer().calls > 3);
    }
}

// ── SQLite tests ──────────────────────────────────────────────────────────────

#[cfg(all(test, feature = "sqlite"))]
mod sqlite_tests {
    use tempfile::TempDir;

    use crate::row::{ComponentStateRow, DisturbanceLogRow, TickSummaryRow};
    use crate::sqlite::SqliteWriter;
    use crate::writer::OutputWriter;

    fn tmp() -> TempDir {
        tempfile::tempdir().expect("create temp dir")
    }

    #[test]
    fn db_created() {
        let dir = tmp();
        let _w = SqliteWriter::new(dir.path()).unwrap();
        assert!(dir.path().join("output.db").exists());
    }

    #[test]
    fn state_rows_counted() {
        let dir = tmp();
        let mut w = SqliteWriter::new(dir.path()).unwrap();
        let rows: Vec<ComponentStateRow> = ["water_level", "volume", "outflow"]
            .iter()
            .map(|f| ComponentStateRow { tick: 1, time: 2.0, component: "res".into(), field: (*f).into(), value: 1.0 })
            .collect();
        w.write_states(&rows).unwrap();
        w.finish().unwrap();

        let conn = rusqlite::Connection::open(dir.path().join("output.db")).unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM component_states", [], |r| r.get(0)).unwrap();
        assert_eq!(count, 3);
    }

    #[test]
    fn disturbance_and_summary_rows() {
        let dir = tmp();
        let mut w = SqliteWriter::new(dir.path()).unwrap();
        w.write_disturbances(&[DisturbanceLogRow {
            tick:          4,
            config_id:     "stuck".into(),
            component:     "gate".into(),
            effect:        "actuator",
            applied_value: 0.5,
        }])
        .unwrap();
        w.write_tick_summary(&TickSummaryRow { tick: 4, time: 5.0, published: 3, disturbed: 0 }).unwrap();
        w.finish().unwrap();

        let conn = rusqlite::Connection::open(dir.path().join("output.db")).unwrap();
        let (effect, value): (String, f64) = conn
            .query_row("SELECT effect, applied_value FROM disturbance_log WHERE tick = 4", [], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .unwrap();
        assert_eq!(effect, "actuator");
        assert_eq!(value, 0.5);

        let published: i64 =
            conn.query_row("SELECT published FROM tick_summaries WHERE tick = 4", [], |r| r.get(0)).unwrap();
        assert_eq!(published, 3);
    }
}
