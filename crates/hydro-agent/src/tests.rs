//! Unit tests for hydro-agent.

#[cfg(test)]
mod support {
    use std::cell::RefCell;
    use std::rc::Rc;

    use hydro_bus::{Message, MessageBus, SharedSubscriber};
    use hydro_core::{AgentIdx, SimConfig, Tick};
    use hydro_disturbance::DisturbanceManager;
    use hydro_topology::{Reservoir, Topology};

    use crate::{Agent, AgentContext};

    pub fn topology() -> Topology {
        let mut topo = Topology::new();
        topo.add(Reservoir::new("res", 1.0e6, 15.0)).unwrap();
        topo.build().unwrap();
        topo
    }

    /// Subscribe `agent` to its topics and return the shared handle.
    pub fn register<A: Agent + 'static>(bus: &MessageBus, idx: u32, mut agent: A) -> Rc<RefCell<A>> {
        agent.init(AgentIdx(idx), &SimConfig { seed: 7, ..SimConfig::default() });
        let topics = agent.subscriptions();
        let rc = Rc::new(RefCell::new(agent));
        for t in topics {
            let sub: SharedSubscriber = rc.clone();
            bus.subscribe(t, sub);
        }
        rc
    }

    /// Collect every payload published on `topic`.
    pub fn capture(bus: &MessageBus, topic: &str) -> Rc<RefCell<Vec<Message>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        bus.subscribe_fn(topic, format!("capture:{topic}"), move |m: &Message, _: &MessageBus| {
            sink.borrow_mut().push(m.clone());
            Ok(())
        });
        seen
    }

    pub fn ctx<'a>(tick: u64, topo: &'a Topology, dist: &'a DisturbanceManager) -> AgentContext<'a> {
        AgentContext::new(Tick(tick), tick as f64, 1.0, topo, dist)
    }
}

#[cfg(test)]
mod perception {
    use hydro_bus::MessageBus;
    use hydro_core::Tick;
    use hydro_disturbance::{DisturbanceConfig, DisturbanceManager};

    use super::support::{capture, ctx, register, topology};
    use crate::{Agent, AgentError, PerceptionAgent};

    #[test]
    fn publishes_selected_fields_verbatim() {
        let (topo, dist, bus) = (topology(), DisturbanceManager::new(), MessageBus::new());
        let seen = capture(&bus, "state.res");
        let agent = register(&bus, 0, PerceptionAgent::new("p", "res", "state.res").with_fields(["water_level"]));
        agent.borrow_mut().run(&ctx(0, &topo, &dist), &bus).unwrap();

        let msgs = seen.borrow();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].payload.get("water_level"), Some(15.0));
        assert_eq!(msgs[0].payload.values.len(), 1);
    }

    #[test]
    fn noise_is_seeded_and_leaves_state_alone() {
        let run = || {
            let (topo, dist, bus) = (topology(), DisturbanceManager::new(), MessageBus::new());
            let seen = capture(&bus, "s");
            let agent = register(
                &bus,
                3,
                PerceptionAgent::new("p", "res", "s").with_fields(["water_level"]).with_noise("water_level", 0.0, 0.1),
            );
            for t in 0..5 {
                agent.borrow_mut().run(&ctx(t, &topo, &dist), &bus).unwrap();
            }
            assert_eq!(topo.state_of("res").unwrap().get("water_level"), Some(15.0));
            let levels: Vec<f64> = seen.borrow().iter().map(|m| m.payload.get("water_level").unwrap()).collect();
            levels
        };
        let a = run();
        let b = run();
        assert_eq!(a, b);
        assert!(a.iter().any(|v| *v != 15.0));
    }

    #[test]
    fn sensor_noise_disturbance_applies_only_in_window() {
        let (topo, bus) = (topology(), MessageBus::new());
        let mut dist = DisturbanceManager::new();
        dist.register(DisturbanceConfig::sensor_noise("n", "res", 0.5, 2.0, 3.0)).unwrap();
        let seen = capture(&bus, "s");
        let agent = register(&bus, 0, PerceptionAgent::new("p", "res", "s").with_fields(["water_level"]));
        for t in 0..4 {
            dist.begin_tick(Tick(t), t as f64);
            agent.borrow_mut().run(&ctx(t, &topo, &dist), &bus).unwrap();
        }
        let levels: Vec<f64> = seen.borrow().iter().map(|m| m.payload.get("water_level").unwrap()).collect();
        assert_eq!(levels[0], 15.0);
        assert_eq!(levels[1], 15.0);
        assert_ne!(levels[2], 15.0);
        assert_eq!(levels[3], 15.0);
    }

    #[test]
    fn missing_component_or_field_is_an_error() {
        let (topo, dist, bus) = (topology(), DisturbanceManager::new(), MessageBus::new());
        let ghost = register(&bus, 0, PerceptionAgent::new("p", "ghost", "s"));
        let err = ghost.borrow_mut().run(&ctx(0, &topo, &dist), &bus).unwrap_err();
        assert!(matches!(err, AgentError::UnknownComponent(ref c) if c == "ghost"));

        let odd = register(&bus, 1, PerceptionAgent::new("q", "res", "s").with_fields(["salinity"]));
        let err = odd.borrow_mut().run(&ctx(0, &topo, &dist), &bus).unwrap_err();
        assert!(matches!(err, AgentError::MissingField { .. }));
    }

    #[test]
    fn interval_skips_ticks() {
        let (topo, dist, bus) = (topology(), DisturbanceManager::new(), MessageBus::new());
        let agent = register(&bus, 0, PerceptionAgent::new("p", "res", "s").every(3));
        for t in 0..7 {
            agent.borrow_mut().run(&ctx(t, &topo, &dist), &bus).unwrap();
        }
        assert_eq!(agent.borrow().published(), 3);
    }
}

#[cfg(test)]
mod local_control {
    use approx::assert_relative_eq;
    use hydro_bus::{BusError, MessageBus};
    use hydro_control::{PidConfig, PidController};
    use hydro_core::Payload;
    use hydro_disturbance::DisturbanceManager;

    use super::support::{capture, ctx, register, topology};
    use crate::{Agent, ControlPhase, LocalControlAgent, PerceptionAgent};

    fn controller() -> LocalControlAgent {
        let pid = PidController::new(PidConfig::new(-2.0, 0.0, 0.0, 14.0).with_limits(0.0, 10.0)).unwrap();
        LocalControlAgent::new("ctl", "state.res", "water_level", "action.res.outflow", pid)
            .with_command_topic("command.ctl")
            .with_feedback_topic("feedback.res")
    }

    #[test]
    fn observation_triggers_action_synchronously() {
        let (topo, dist, bus) = (topology(), DisturbanceManager::new(), MessageBus::new());
        let actions = capture(&bus, "action.res.outflow");
        let ctl = register(&bus, 0, controller());
        let sensor = register(&bus, 1, PerceptionAgent::new("p", "res", "state.res").with_fields(["water_level"]));

        sensor.borrow_mut().run(&ctx(0, &topo, &dist), &bus).unwrap();

        // e = 14 - 15 = -1, u = -2 * -1 = 2
        assert_eq!(actions.borrow().len(), 1);
        assert_relative_eq!(actions.borrow()[0].payload.scalar_value().unwrap(), 2.0);
        let ctl = ctl.borrow();
        assert_eq!(ctl.phase(), ControlPhase::Idle);
        assert_eq!(ctl.cycles(), 1);
        assert_eq!(ctl.last_action(), Some(2.0));
    }

    #[test]
    fn command_replaces_setpoint_only() {
        let bus = MessageBus::new();
        let ctl = register(&bus, 0, controller());
        bus.publish("command.ctl", Payload::new().with("setpoint", 12.0)).unwrap();
        assert_eq!(ctl.borrow().setpoint(), 12.0);
        bus.publish("command.ctl", Payload::scalar(13.0)).unwrap();
        assert_eq!(ctl.borrow().setpoint(), 13.0);
        assert_eq!(ctl.borrow().cycles(), 0);
    }

    #[test]
    fn feedback_is_recorded() {
        let bus = MessageBus::new();
        let ctl = register(&bus, 0, controller());
        bus.publish("feedback.res", Payload::new().with("outflow", 3.0)).unwrap();
        assert_eq!(ctl.borrow().last_feedback().unwrap().get("outflow"), Some(3.0));
    }

    #[test]
    fn observation_without_field_is_rejected() {
        let bus = MessageBus::new();
        let ctl = register(&bus, 0, controller());
        let err = bus.publish("state.res", Payload::new().with("volume", 1.0)).unwrap_err();
        assert!(matches!(err, BusError::Handler { ref subscriber, .. } if subscriber == "ctl"));
        assert_eq!(ctl.borrow().phase(), ControlPhase::Idle);
    }

    #[test]
    fn subscriptions_cover_all_inputs() {
        assert_eq!(controller().subscriptions(), ["state.res", "command.ctl", "feedback.res"]);
    }
}

#[cfg(test)]
mod dispatcher {
    use approx::assert_relative_eq;
    use hydro_bus::MessageBus;
    use hydro_control::{MpcConfig, RollingHorizonOptimizer};
    use hydro_core::Payload;
    use hydro_disturbance::DisturbanceManager;

    use super::support::{capture, ctx, register, topology};
    use crate::{Agent, CentralDispatcherAgent, DispatchMode, MpcOutput, RuleConfig};

    fn rule() -> RuleConfig {
        RuleConfig {
            low_threshold:   10.0,
            high_threshold:  18.0,
            low_setpoint:    12.0,
            normal_setpoint: 15.0,
            high_setpoint:   16.0,
        }
    }

    fn level(bus: &MessageBus, value: f64) {
        bus.publish("state.res", Payload::new().with("water_level", value).with("inflow", 100.0)).unwrap();
    }

    #[test]
    fn rule_mode_publishes_on_change_only() {
        let (topo, dist, bus) = (topology(), DisturbanceManager::new(), MessageBus::new());
        let cmds = capture(&bus, "command.ctl");
        let disp = register(
            &bus,
            0,
            CentralDispatcherAgent::new("disp", rule()).with_state_topic("state.res").with_command_topic("command.ctl"),
        );

        // Nothing observed yet: nothing published.
        disp.borrow_mut().run(&ctx(0, &topo, &dist), &bus).unwrap();
        assert!(cmds.borrow().is_empty());

        for (t, l) in [(1, 15.0), (2, 15.5), (3, 19.0), (4, 9.0)] {
            level(&bus, l);
            disp.borrow_mut().run(&ctx(t, &topo, &dist), &bus).unwrap();
        }
        let sent: Vec<f64> = cmds.borrow().iter().map(|m| m.payload.get("setpoint").unwrap()).collect();
        assert_eq!(sent, [15.0, 16.0, 12.0]);
    }

    #[test]
    fn emergency_trigger_overrides_rule() {
        let (topo, dist, bus) = (topology(), DisturbanceManager::new(), MessageBus::new());
        let cmds = capture(&bus, "command.ctl");
        let disp = register(
            &bus,
            0,
            CentralDispatcherAgent::new("disp", rule())
                .with_state_topic("state.res")
                .with_command_topic("command.ctl")
                .with_emergency_trigger(20.0)
                .with_emergency_setpoint(8.0),
        );
        level(&bus, 21.0);
        disp.borrow_mut().run(&ctx(0, &topo, &dist), &bus).unwrap();
        assert_eq!(disp.borrow().mode(), DispatchMode::Emergency);
        assert_eq!(cmds.borrow().last().unwrap().payload.get("setpoint"), Some(8.0));
    }

    #[test]
    fn mode_topic_switches_mode() {
        let bus = MessageBus::new();
        let disp = register(&bus, 0, CentralDispatcherAgent::new("disp", rule()).with_mode_topic("mode.disp"));
        bus.publish("mode.disp", Payload::new().with("mode", 1.0)).unwrap();
        assert_eq!(disp.borrow().mode(), DispatchMode::Emergency);
        bus.publish("mode.disp", Payload::scalar(0.0)).unwrap();
        assert_eq!(disp.borrow().mode(), DispatchMode::Rule);
        assert!(bus.publish("mode.disp", Payload::scalar(9.0)).is_err());
    }

    #[test]
    fn mpc_mode_publishes_first_release() {
        let (topo, dist, bus) = (topology(), DisturbanceManager::new(), MessageBus::new());
        let cmds = capture(&bus, "command.release");
        let cfg = MpcConfig {
            horizon: 4,
            step_secs: 60.0,
            surface_area: 1.0e4,
            smoothness_weight: 0.0,
            max_release: 1_000.0,
            optimization_interval: 2,
            ..MpcConfig::default()
        };
        let disp = register(
            &bus,
            0,
            CentralDispatcherAgent::new("disp", rule())
                .with_mode(DispatchMode::Mpc)
                .with_state_topic("state.res")
                .with_command_topic("command.release")
                .with_mpc(RollingHorizonOptimizer::new(cfg).unwrap(), 15.0, MpcOutput::Release),
        );
        for t in 0..4 {
            level(&bus, 15.0);
            disp.borrow_mut().run(&ctx(t, &topo, &dist), &bus).unwrap();
        }
        let sent: Vec<f64> = cmds.borrow().iter().map(|m| m.payload.get("setpoint").unwrap()).collect();
        // Due on ticks 0 and 2; the persistence forecast is the observed inflow.
        assert_eq!(sent.len(), 2);
        assert_relative_eq!(sent[0], 100.0, epsilon = 1e-4);
        assert_eq!(disp.borrow().degraded_solves(), 0);
    }

    #[test]
    fn degraded_predicted_level_keeps_last_setpoint() {
        let (topo, dist, bus) = (topology(), DisturbanceManager::new(), MessageBus::new());
        let cmds = capture(&bus, "command.ctl");
        let cfg = MpcConfig {
            horizon: 4,
            step_secs: 60.0,
            surface_area: 1.0e4,
            max_release: 1_000.0,
            max_iterations: 1,
            tolerance: 1e-12,
            ..MpcConfig::default()
        };
        let disp = register(
            &bus,
            0,
            CentralDispatcherAgent::new("disp", rule())
                .with_state_topic("state.res")
                .with_command_topic("command.ctl")
                .with_mode_topic("mode.disp")
                .with_mpc(RollingHorizonOptimizer::new(cfg).unwrap(), 15.0, MpcOutput::PredictedLevel),
        );

        level(&bus, 15.0);
        disp.borrow_mut().run(&ctx(0, &topo, &dist), &bus).unwrap();
        bus.publish("mode.disp", Payload::scalar(DispatchMode::Mpc.code())).unwrap();
        for (t, l) in [(1, 15.0), (2, 16.0), (3, 17.0)] {
            level(&bus, l);
            disp.borrow_mut().run(&ctx(t, &topo, &dist), &bus).unwrap();
        }

        let sent: Vec<f64> = cmds.borrow().iter().map(|m| m.payload.get("setpoint").unwrap()).collect();
        assert_eq!(sent, [15.0]);
        assert_eq!(disp.borrow().degraded_solves(), 3);
        assert_eq!(disp.borrow().mode(), DispatchMode::Mpc);
    }

    #[test]
    fn mode_codes_round_trip() {
        for m in [DispatchMode::Rule, DispatchMode::Emergency, DispatchMode::Mpc] {
            assert_eq!(DispatchMode::from_code(m.code()), Some(m));
        }
        assert_eq!(DispatchMode::from_code(3.0), None);
    }
}

#[cfg(test)]
mod sources {
    use std::io::Write;

    use approx::assert_relative_eq;
    use hydro_bus::MessageBus;
    use hydro_core::Payload;
    use hydro_disturbance::DisturbanceManager;

    use super::support::{capture, ctx, register, topology};
    use crate::{Agent, AgentError, DisturbanceSourceAgent, InflowSeriesAgent};

    #[test]
    fn disturbance_source_is_time_gated() {
        let (topo, dist, bus) = (topology(), DisturbanceManager::new(), MessageBus::new());
        let seen = capture(&bus, "inflow.res");
        let src = register(
            &bus,
            0,
            DisturbanceSourceAgent::new("storm", "inflow.res", Payload::new().with("inflow", 9.0), 2.0, 4.0).unwrap(),
        );
        for t in 0..6 {
            src.borrow_mut().run(&ctx(t, &topo, &dist), &bus).unwrap();
        }
        let ticks: Vec<u64> = seen.borrow().iter().map(|m| m.published_tick.0).collect();
        assert_eq!(src.borrow().sent(), 2);
        // The bus clock is not advanced in this test.
        assert_eq!(ticks, [0, 0]);
    }

    #[test]
    fn disturbance_source_rejects_bad_windows() {
        for (start, end) in [(4.0, 2.0), (3.0, 3.0), (f64::NAN, 1.0), (0.0, f64::INFINITY)] {
            let err = DisturbanceSourceAgent::new("storm", "inflow.res", Payload::scalar(1.0), start, end);
            assert!(matches!(err, Err(AgentError::Config(_))), "window [{start}, {end})");
        }
    }

    #[test]
    fn series_interpolates_and_holds_ends() {
        let s = InflowSeriesAgent::new("q", "inflow.res", vec![(10.0, 200.0), (0.0, 100.0)]).unwrap();
        assert_relative_eq!(s.value_at(-5.0), 100.0);
        assert_relative_eq!(s.value_at(0.0), 100.0);
        assert_relative_eq!(s.value_at(2.5), 125.0);
        assert_relative_eq!(s.value_at(10.0), 200.0);
        assert_relative_eq!(s.value_at(99.0), 200.0);
    }

    #[test]
    fn series_validation() {
        assert!(matches!(InflowSeriesAgent::new("q", "t", vec![]), Err(AgentError::Series(_))));
        assert!(InflowSeriesAgent::new("q", "t", vec![(1.0, 1.0), (1.0, 2.0)]).is_err());
        assert!(InflowSeriesAgent::new("q", "t", vec![(f64::NAN, 1.0)]).is_err());
    }

    #[test]
    fn series_from_csv_publishes_inflow() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "time, inflow").unwrap();
        writeln!(file, "0, 10").unwrap();
        writeln!(file, "4, 30").unwrap();
        file.flush().unwrap();

        let (topo, dist, bus) = (topology(), DisturbanceManager::new(), MessageBus::new());
        let seen = capture(&bus, "inflow.res");
        let agent = register(&bus, 0, InflowSeriesAgent::from_csv("q", "inflow.res", file.path()).unwrap());
        agent.borrow_mut().run(&ctx(1, &topo, &dist), &bus).unwrap();
        assert_relative_eq!(seen.borrow()[0].payload.get("inflow").unwrap(), 15.0);
    }
}
