//! Unit tests for hydro-control.

#[cfg(test)]
mod pid {
    use approx::assert_relative_eq;

    use crate::{ControlError, Controller, PidConfig, PidController};

    #[test]
    fn first_sample_has_no_derivative_kick() {
        let mut pid = PidController::new(PidConfig::new(0.0, 0.0, 5.0, 10.0)).unwrap();
        assert_eq!(pid.compute(0.0, 1.0).unwrap(), 0.0);
        // error goes 10 -> 8: d = -2/s
        assert_relative_eq!(pid.compute(2.0, 1.0).unwrap(), -10.0);
    }

    #[test]
    fn proportional_and_integral_terms() {
        let mut pid = PidController::new(PidConfig::new(2.0, 0.5, 0.0, 1.0)).unwrap();
        let u = pid.compute(0.0, 2.0).unwrap();
        // e = 1, integral = 2
        assert_relative_eq!(u, 2.0 * 1.0 + 0.5 * 2.0);
        assert_relative_eq!(pid.integral(), 2.0);
    }

    #[test]
    fn output_is_clamped() {
        let mut pid = PidController::new(PidConfig::new(10.0, 0.0, 0.0, 5.0).with_limits(0.0, 1.0)).unwrap();
        assert_eq!(pid.compute(0.0, 1.0).unwrap(), 1.0);
        assert_eq!(pid.compute(10.0, 1.0).unwrap(), 0.0);
    }

    #[test]
    fn integral_freezes_while_saturated() {
        let mut pid = PidController::new(PidConfig::new(0.1, 1.0, 0.0, 10.0).with_limits(-1.0, 1.0)).unwrap();
        // First sample: unclamped 1.0 is in range, so e = 10 integrates.
        pid.compute(0.0, 1.0).unwrap();
        assert_relative_eq!(pid.integral(), 10.0);
        for _ in 0..100 {
            assert_eq!(pid.compute(0.0, 1.0).unwrap(), 1.0);
        }
        assert_relative_eq!(pid.integral(), 10.0);

        // Still saturated high, but a negative error unwinds the integral.
        pid.compute(11.0, 1.0).unwrap();
        assert_relative_eq!(pid.integral(), 9.0);
    }

    #[test]
    fn setpoint_change_keeps_history() {
        let mut pid = PidController::new(PidConfig::new(1.0, 1.0, 0.0, 5.0)).unwrap();
        pid.compute(4.0, 1.0).unwrap();
        let before = (pid.integral(), pid.last_error());
        pid.set_setpoint(8.0);
        assert_eq!((pid.integral(), pid.last_error()), before);
        assert_eq!(pid.setpoint(), 8.0);
        pid.reset();
        assert_eq!(pid.integral(), 0.0);
        assert_eq!(pid.last_error(), None);
    }

    #[test]
    fn rejects_bad_inputs() {
        let mut pid = PidController::new(PidConfig::default()).unwrap();
        assert_eq!(pid.compute(1.0, 0.0), Err(ControlError::InvalidTimeStep(0.0)));
        assert!(matches!(pid.compute(f64::NAN, 1.0), Err(ControlError::NonFinite { .. })));
        assert!(PidController::new(PidConfig::default().with_limits(1.0, 0.0)).is_err());
        assert!(PidController::new(PidConfig::new(f64::NAN, 0.0, 0.0, 0.0)).is_err());
    }

    /// Tank filled by `u` and drained through an outlet proportional to its
    /// level: level' = (u - level / r) / area.  The first samples saturate the
    /// output and overshoot; after that the error only shrinks.
    #[test]
    fn converges_on_a_linear_plant() {
        const TRANSIENT: usize = 10;
        const SETTLED: usize = 40;
        const BAND: f64 = 1e-3;

        let mut pid = PidController::new(PidConfig::new(4.0, 0.8, 0.0, 3.0).with_limits(0.0, 10.0)).unwrap();
        let (area, r, dt) = (10.0, 1.0, 1.0);
        let mut level = 0.0;
        let mut errors = Vec::with_capacity(400);
        for _ in 0..400 {
            let u = pid.compute(level, dt).unwrap();
            level += (u - level / r) * dt / area;
            errors.push((3.0 - level).abs());
        }

        assert!(errors[..TRANSIENT].iter().any(|&e| e > BAND), "no transient at all");
        for k in TRANSIENT + 1..errors.len() {
            assert!(errors[k] <= errors[k - 1] + 1e-9, "error grew at step {k}: {} -> {}", errors[k - 1], errors[k]);
        }
        for (k, e) in errors.iter().enumerate().skip(SETTLED) {
            assert!(*e < BAND, "step {k} outside the band: {e}");
        }
        assert_relative_eq!(level, 3.0, epsilon = 1e-6);
    }

    /// Gate on the outlet: more opening drains the tank, so gains are negative.
    #[test]
    fn reverse_acting_loop_with_negative_gains() {
        let mut pid = PidController::new(PidConfig::new(-2.0, -0.2, 0.0, 5.0).with_limits(0.0, 10.0)).unwrap();
        let (area, inflow, dt) = (20.0, 4.0, 1.0);
        let mut level = 8.0;
        for _ in 0..3_000 {
            let release = pid.compute(level, dt).unwrap();
            level += (inflow - release) * dt / area;
        }
        assert_relative_eq!(level, 5.0, epsilon = 1e-3);
    }
}

#[cfg(test)]
mod rule {
    use crate::{Controller, ControllerKind, OnOffController};

    #[test]
    fn hysteresis_holds_inside_band() {
        let mut c = OnOffController::new(10.0, 1.0, 5.0, 0.0).unwrap();
        assert_eq!(c.compute(8.5, 1.0).unwrap(), 5.0);
        assert_eq!(c.compute(10.5, 1.0).unwrap(), 5.0);
        assert_eq!(c.compute(11.5, 1.0).unwrap(), 0.0);
        assert_eq!(c.compute(9.5, 1.0).unwrap(), 0.0);
        assert_eq!(c.kind(), ControllerKind::OnOff);
    }

    #[test]
    fn reversed_switches_on_high() {
        let mut c = OnOffController::new(10.0, 0.5, 1.0, 0.0).unwrap().reversed();
        assert_eq!(c.compute(11.0, 1.0).unwrap(), 1.0);
        assert!(c.is_on());
        assert_eq!(c.compute(9.0, 1.0).unwrap(), 0.0);
    }

    #[test]
    fn negative_band_rejected() {
        assert!(OnOffController::new(0.0, -1.0, 1.0, 0.0).is_err());
    }
}

#[cfg(test)]
mod mpc {
    use approx::assert_relative_eq;
    use hydro_core::Tick;

    use crate::{ControlError, MpcConfig, MpcProblem, RollingHorizonOptimizer};

    fn config() -> MpcConfig {
        MpcConfig {
            horizon: 6,
            step_secs: 60.0,
            surface_area: 1.0e4,
            smoothness_weight: 0.0,
            max_release: 500.0,
            max_iterations: 20,
            ..MpcConfig::default()
        }
    }

    #[test]
    fn matches_inflow_to_hold_level() {
        let mut opt = RollingHorizonOptimizer::new(config()).unwrap();
        let forecast = [100.0; 6];
        let out = opt.solve(&MpcProblem { level: 10.0, inflow_forecast: &forecast, target_level: 10.0 }).unwrap();
        assert!(out.converged(), "{out:?}");
        assert_relative_eq!(out.release, 100.0, epsilon = 1e-4);
        for x in &out.predicted_levels {
            assert_relative_eq!(*x, 10.0, epsilon = 1e-6);
        }
        assert_relative_eq!(opt.last_good(), out.release);
    }

    #[test]
    fn release_respects_bounds() {
        let mut opt = RollingHorizonOptimizer::new(MpcConfig { max_release: 200.0, ..config() }).unwrap();
        let forecast = [1_000.0];
        let out = opt.solve(&MpcProblem { level: 10.0, inflow_forecast: &forecast, target_level: 10.0 }).unwrap();
        assert!(out.converged());
        assert_relative_eq!(out.release, 200.0);
        assert!(out.plan.iter().all(|u| (0.0..=200.0).contains(u)));
        assert_eq!(out.plan.len(), 6);
    }

    #[test]
    fn safety_penalty_pulls_level_down() {
        let base = MpcConfig { tracking_weight: 1e-6, smoothness_weight: 1e-6, ..config() };
        let safe = MpcConfig { safety_max: 10.0, safety_weight: 1e4, ..base.clone() };
        let forecast = [150.0; 6];
        let problem = MpcProblem { level: 10.0, inflow_forecast: &forecast, target_level: 12.0 };
        let free = RollingHorizonOptimizer::new(base).unwrap().solve(&problem).unwrap();
        let capped = RollingHorizonOptimizer::new(safe).unwrap().solve(&problem).unwrap();
        let peak = |v: &[f64]| v.iter().copied().fold(f64::MIN, f64::max);
        assert!(peak(&capped.predicted_levels) < peak(&free.predicted_levels));
    }

    #[test]
    fn non_convergence_falls_back_to_last_good() {
        let cfg = MpcConfig { max_iterations: 1, tolerance: 1e-12, ..config() };
        let mut opt = RollingHorizonOptimizer::new(cfg).unwrap().with_initial_release(42.0);
        let forecast = [300.0; 6];
        let out = opt.solve(&MpcProblem { level: 5.0, inflow_forecast: &forecast, target_level: 10.0 }).unwrap();
        let warning = out.degraded.clone().expect("should degrade");
        assert_eq!(warning.fallback, 42.0);
        assert_eq!(warning.iterations, 1);
        assert!(!warning.timed_out);
        assert_eq!(out.release, 42.0);
        assert_eq!(opt.last_good(), 42.0);
    }

    #[test]
    fn fallback_is_logged_at_warn() {
        use std::io;
        use std::sync::{Arc, Mutex};

        struct Sink(Arc<Mutex<Vec<u8>>>);

        impl io::Write for Sink {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let logs = Arc::new(Mutex::new(Vec::new()));
        let writer = {
            let logs = Arc::clone(&logs);
            move || Sink(Arc::clone(&logs))
        };
        let subscriber = tracing_subscriber::fmt()
            .with_writer(writer)
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();

        let (steady, wet) = ([100.0; 6], [300.0; 6]);
        tracing::subscriber::with_default(subscriber, || {
            let mut converging = RollingHorizonOptimizer::new(config()).unwrap();
            let problem = MpcProblem { level: 10.0, inflow_forecast: &steady, target_level: 10.0 };
            assert!(converging.solve(&problem).unwrap().converged());
            let cfg = MpcConfig { max_iterations: 1, tolerance: 1e-12, ..config() };
            let mut stalled = RollingHorizonOptimizer::new(cfg).unwrap().with_initial_release(42.0);
            let problem = MpcProblem { level: 5.0, inflow_forecast: &wet, target_level: 10.0 };
            assert!(stalled.solve(&problem).unwrap().degraded.is_some());
        });

        let text = String::from_utf8(logs.lock().unwrap().clone()).unwrap();
        assert_eq!(text.matches("degraded optimization").count(), 1, "{text}");
        assert!(text.contains("WARN"));
        assert!(text.contains("fallback=42"));
    }

    #[test]
    fn empty_forecast_is_an_error() {
        let mut opt = RollingHorizonOptimizer::new(config()).unwrap();
        let err = opt.solve(&MpcProblem { level: 1.0, inflow_forecast: &[], target_level: 1.0 }).unwrap_err();
        assert_eq!(err, ControlError::ForecastTooShort { need: 6, got: 0 });
    }

    #[test]
    fn interval_gating() {
        let opt = RollingHorizonOptimizer::new(MpcConfig { optimization_interval: 5, ..config() }).unwrap();
        assert!(opt.is_due(Tick(0)));
        assert!(!opt.is_due(Tick(3)));
        assert!(opt.is_due(Tick(10)));
    }

    #[test]
    fn invalid_config_rejected() {
        assert!(RollingHorizonOptimizer::new(MpcConfig { horizon: 0, ..config() }).is_err());
        assert!(RollingHorizonOptimizer::new(MpcConfig { min_release: 5.0, max_release: 1.0, ..config() }).is_err());
    }
}

#[cfg(test)]
mod properties {
    use proptest::prelude::*;

    use crate::{Controller, OnOffController, PidConfig, PidController};

    proptest! {
        /// Whatever the measurement sequence, the output stays inside the clamp.
        #[test]
        fn pid_output_within_limits(
            kp in -10.0f64..10.0,
            ki in -1.0f64..1.0,
            kd in -1.0f64..1.0,
            samples in prop::collection::vec(-100.0f64..100.0, 1..50),
        ) {
            let mut pid = PidController::new(PidConfig::new(kp, ki, kd, 5.0).with_limits(-2.0, 3.0)).unwrap();
            for m in samples {
                let out = pid.compute(m, 1.0).unwrap();
                prop_assert!((-2.0..=3.0).contains(&out), "output {out}");
            }
        }

        /// Inside the dead band the switch keeps its previous output.
        #[test]
        fn on_off_holds_inside_band(start_low in any::<bool>(), m in 9.5f64..10.5) {
            let mut c = OnOffController::new(10.0, 0.5, 1.0, 0.0).unwrap();
            let before = c.compute(if start_low { 0.0 } else { 20.0 }, 1.0).unwrap();
            prop_assert_eq!(c.compute(m, 1.0).unwrap(), before);
        }
    }
}
