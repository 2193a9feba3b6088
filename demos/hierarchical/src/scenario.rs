//! The canal system shared by the single run and the seed sweep.
//!
//! ```text
//!  hydrograph ─▶ lake ─▶ head-gate ─▶ canal ─▶ pump ─▶ tank
//!                 ▲          ▲                   ▲
//!            lake-pid    gate-pid            tank-pump (bound on/off)
//!                 ▲
//!              central  (rule → emergency / mpc)
//! ```

use std::path::Path;
use std::time::Duration;

use hydro_agent::{
    CentralDispatcherAgent, DisturbanceSourceAgent, InflowSeriesAgent, LocalControlAgent, MpcOutput,
    PerceptionAgent, RuleConfig,
};
use hydro_control::{MpcConfig, OnOffController, PidConfig, PidController, RollingHorizonOptimizer};
use hydro_core::{Payload, SimConfig};
use hydro_disturbance::DisturbanceConfig;
use hydro_sim::{ControllerBinding, Harness, SimBuilder, SimError, SimResult};
use hydro_topology::{Canal, Gate, INFLOW, Pump, Reservoir, action_topic};

pub const HOUR: f64 = 3_600.0;
pub const LAKE_AREA_M2: f64 = 4.0e6;

/// Hourly inflow hydrograph (m³/s) with a flood peak around hour 4.
pub const HYDROGRAPH_CSV: &str = "\
time,inflow
0,40
3600,60
10800,260
14400,420
18000,300
25200,120
36000,50
";

fn config_err(e: impl std::fmt::Display) -> SimError {
    SimError::Config(e.to_string())
}

fn pid(config: PidConfig) -> SimResult<PidController> {
    PidController::new(config).map_err(config_err)
}

pub fn build(config: SimConfig, hydrograph: &Path) -> SimResult<Harness> {
    let dt = config.dt_secs;
    let series = InflowSeriesAgent::from_csv("hydrograph", action_topic("lake", INFLOW), hydrograph)
        .map_err(config_err)?;

    let rule = RuleConfig {
        low_threshold:   19.0,
        high_threshold:  21.0,
        low_setpoint:    20.0,
        normal_setpoint: 20.0,
        high_setpoint:   19.5,
    };
    let mpc = RollingHorizonOptimizer::new(MpcConfig {
        horizon: 8,
        step_secs: 1_800.0,
        optimization_interval: (1_800.0 / dt).round().max(1.0) as u64,
        smoothness_weight: 1e-3,
        max_release: 400.0,
        safety_min: 18.0,
        safety_max: 22.5,
        surface_area: LAKE_AREA_M2,
        timeout: Some(Duration::from_millis(50)),
        ..MpcConfig::default()
    })
    .map_err(config_err)?;

    let pump_switch = OnOffController::new(3.0, 0.25, 1.0, 0.0).map_err(config_err)?;

    SimBuilder::new(config)
        // ── Physical network ──────────────────────────────────────────────
        .component(Reservoir::new("lake", LAKE_AREA_M2, 20.0).with_outlet(0.6, 12.0))
        .component(Gate::new("head-gate", 8.0, 0.6, 2.5).with_design_head(4.0).with_max_rate(0.005).with_opening(1.0))
        .component(Canal::new("canal", 12_000.0, 25.0, 2.0 * HOUR))
        .component(Pump::new("pump", 120.0, 18.0, 0.78))
        .component(Reservoir::new("tank", 5.0e4, 3.0).with_release(60.0))
        .connect("lake", "head-gate")
        .connect("head-gate", "canal")
        .connect("canal", "pump")
        .connect("pump", "tank")
        // ── Agents, in execution order ────────────────────────────────────
        .agent(series)
        .agent(
            PerceptionAgent::new("lake-gauge", "lake", "state.lake")
                .with_fields([Reservoir::LEVEL, INFLOW])
                .with_noise(Reservoir::LEVEL, 0.0, 0.01),
        )
        .agent(
            LocalControlAgent::new(
                "lake-pid",
                "state.lake",
                Reservoir::LEVEL,
                action_topic("lake", Reservoir::OUTLET_OPENING),
                pid(PidConfig::new(-0.8, -2e-4, 0.0, 20.0).with_limits(0.0, 1.0))?,
            )
            .with_command_topic("command.lake-pid.setpoint"),
        )
        .agent(PerceptionAgent::new("canal-gauge", "canal", "state.canal").with_fields([Canal::LEVEL]).every(5))
        .agent(LocalControlAgent::new(
            "gate-pid",
            "state.canal",
            Canal::LEVEL,
            action_topic("head-gate", Gate::OPENING),
            pid(PidConfig::new(4.0, 1e-3, 0.0, 0.6).with_limits(0.2, 2.5))?,
        ))
        .agent(
            CentralDispatcherAgent::new("central", rule)
                .with_state_topic("state.lake")
                .with_command_topic("command.lake-pid.setpoint")
                .with_mode_topic("command.central.mode")
                .with_emergency_trigger(22.0)
                .with_emergency_setpoint(19.0)
                .with_mpc(mpc, 20.0, MpcOutput::PredictedLevel),
        )
        // The operator hands the lake to the optimiser at hour 6.
        .agent(DisturbanceSourceAgent::new(
            "operator",
            "command.central.mode",
            Payload::new().with("mode", 2.0),
            6.0 * HOUR,
            6.0 * HOUR + dt,
        )
        .map_err(config_err)?)
        // Power cut: the pump trips for half an hour, then is reset.
        .agent(DisturbanceSourceAgent::new("grid-fault", "command.pump.status", Payload::scalar(0.0), 7.0 * HOUR, 7.0 * HOUR + dt)
            .map_err(config_err)?)
        .agent(DisturbanceSourceAgent::new("grid-reset", "command.pump.status", Payload::scalar(1.0), 7.5 * HOUR, 7.5 * HOUR + dt)
            .map_err(config_err)?)
        // ── Directly bound loop ───────────────────────────────────────────
        .controller(ControllerBinding::new("tank-pump", pump_switch, "tank", Reservoir::LEVEL, "pump", Pump::SPEED))
        // ── Faults ────────────────────────────────────────────────────────
        .disturbance(DisturbanceConfig::actuator_failure("gate-seizing", "head-gate", 0.6, 300.0, 3.0 * HOUR, 5.0 * HOUR))
        .disturbance(DisturbanceConfig::sensor_noise("lake-gauge-fault", "lake", 0.05, 4.0 * HOUR, 4.5 * HOUR))
        .build()
}
