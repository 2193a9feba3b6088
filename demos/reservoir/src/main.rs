//! reservoir: one reservoir riding out a storm under PID outlet control.
//!
//! A perception agent reports the (noisy) water level, a local PID agent
//! drives the bottom outlet, and the outlet feeds a canal reach.  The storm
//! and a sensor fault are loaded from an embedded JSON schedule.
//!
//! `RUST_LOG=debug cargo run -p reservoir` shows every control cycle.

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use hydro_agent::{LocalControlAgent, PerceptionAgent};
use hydro_control::{PidConfig, PidController};
use hydro_core::SimConfig;
use hydro_disturbance::DisturbanceConfig;
use hydro_output::{CsvWriter, SimOutputObserver};
use hydro_sim::SimBuilder;
use hydro_topology::{Canal, Reservoir, action_topic};

// ── Constants ─────────────────────────────────────────────────────────────────

const SEED:           u64 = 42;
const DT_SECS:        f64 = 60.0;
const DURATION_SECS:  f64 = 8.0 * 3_600.0;
const TARGET_LEVEL_M: f64 = 15.0;

const SCHEDULE_JSON: &str = r#"[
  { "id": "storm", "type": "inflow_change", "target": "res",
    "target_inflow": 400.0, "ramp": { "from": 0.0, "rate_per_sec": 0.5 },
    "start_time": 3600.0, "end_time": 10800.0 },
  { "id": "gauge-drift", "type": "sensor_noise", "target": "res",
    "mean": 0.02, "std_dev": 0.01, "start_time": 14400.0, "end_time": 18000.0 }
]"#;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let schedule: Vec<DisturbanceConfig> =
        serde_json::from_str(SCHEDULE_JSON).context("parsing the disturbance schedule")?;

    let config = SimConfig {
        dt_secs:               DT_SECS,
        duration_secs:         DURATION_SECS,
        seed:                  SEED,
        output_interval_ticks: 10,
        ..SimConfig::default()
    };

    // Reverse-acting: a level above target opens the outlet.
    let pid = PidController::new(PidConfig::new(-2.0, -0.002, 0.0, TARGET_LEVEL_M).with_limits(0.0, 1.0))?;

    let mut builder = SimBuilder::new(config)
        .component(Reservoir::new("res", 1.0e6, TARGET_LEVEL_M).with_outlet(0.6, 20.0))
        .component(Canal::new("canal", 5_000.0, 30.0, 1_800.0))
        .connect("res", "canal")
        .agent(
            PerceptionAgent::new("gauge", "res", "state.res")
                .with_fields([Reservoir::LEVEL, "inflow"])
                .with_noise(Reservoir::LEVEL, 0.0, 0.005),
        )
        .agent(LocalControlAgent::new(
            "outlet-pid",
            "state.res",
            Reservoir::LEVEL,
            action_topic("res", Reservoir::OUTLET_OPENING),
            pid,
        ));
    for d in schedule {
        builder = builder.disturbance(d);
    }
    let mut harness = builder.build()?;

    let out_dir = Path::new("output/reservoir");
    let mut obs = SimOutputObserver::new(CsvWriter::new(out_dir)?);

    let t0 = Instant::now();
    let state = harness.run_with(&mut obs)?;
    info!(%state, elapsed_ms = t0.elapsed().as_millis() as u64, "run finished");
    if let Some(e) = obs.take_error() {
        eprintln!("output error: {e}");
    }

    println!("{:>8} {:>10} {:>10} {:>10}", "hour", "level m", "inflow", "outflow");
    println!("{}", "-".repeat(42));
    for snap in harness.history().iter().filter(|s| s.tick.0 % 60 == 0) {
        println!(
            "{:>8.1} {:>10.3} {:>10.1} {:>10.1}",
            snap.time / 3_600.0,
            snap.value("res", Reservoir::LEVEL).unwrap_or(f64::NAN),
            snap.value("res", "inflow").unwrap_or(f64::NAN),
            snap.value("res", "outflow").unwrap_or(f64::NAN),
        );
    }

    for (id, status) in harness.disturbance_status() {
        println!("disturbance {id:<12} {status:?}");
    }

    if let Some(last) = harness.history().last() {
        println!("\nfinal snapshot:\n{}", serde_json::to_string_pretty(last)?);
    }
    println!("CSV written to {}", out_dir.display());
    Ok(())
}
