//! Rolling-horizon release optimisation for one storage node.
//!
//! # Model
//!
//! ```text
//! x[k+1] = x[k] + c · (d[k] − u[k]),      c = step_secs / surface_area
//! ```
//!
//! `x` is the water level, `d` the forecast inflow and `u` the release.  The
//! cost over the horizon `H` is
//!
//! ```text
//! J(u) = Σ  w_t (x[k+1] − target)²
//!      + Σ  w_s (u[k] − u[k−1])²                 u[−1] = last applied release
//!      + Σ  w_p (max(0, x[k+1] − safety_max)² + max(0, safety_min − x[k+1])²)
//! ```
//!
//! minimised over `u[k] ∈ [min_release, max_release]`.
//!
//! # Solver
//!
//! Projected Newton with Armijo backtracking.  `J` is piecewise quadratic, so
//! the Hessian is rebuilt each iteration from the set of violated safety
//! terms; variables sitting on a bound with the gradient pointing outward are
//! frozen for that iteration.  Without active safety terms the free problem
//! is solved in one step.
//!
//! Iteration stops once no release moves by more than `tolerance`.  If that
//! does not happen within `max_iterations` (or before the optional wall-clock
//! `timeout`), the optimiser keeps the last good release and reports a
//! [`DegradedOptimization`].

use std::time::{Duration, Instant};

use hydro_core::Tick;
use tracing::warn;

use crate::error::check_finite;
use crate::{ControlError, ControlResult};

const ARMIJO: f64 = 1e-4;
const MAX_BACKTRACKS: usize = 40;

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MpcConfig {
    /// Prediction horizon in model steps.
    pub horizon:               usize,
    /// Length of one model step (s).
    pub step_secs:             f64,
    /// Re-optimise every N simulation ticks.
    pub optimization_interval: u64,
    pub max_iterations:        usize,
    /// Convergence threshold on the largest release change (m³/s).
    pub tolerance:             f64,
    pub tracking_weight:       f64,
    pub smoothness_weight:     f64,
    pub safety_weight:         f64,
    pub min_release:           f64,
    pub max_release:           f64,
    pub safety_min:            f64,
    pub safety_max:            f64,
    /// Plan-view area of the controlled storage (m²).
    pub surface_area:          f64,
    /// Wall-clock budget for one solve.
    pub timeout:               Option<Duration>,
}

impl Default for MpcConfig {
    fn default() -> Self {
        Self {
            horizon:               12,
            step_secs:             3_600.0,
            optimization_interval: 1,
            max_iterations:        50,
            tolerance:             1e-6,
            tracking_weight:       1.0,
            smoothness_weight:     1e-4,
            safety_weight:         1e3,
            min_release:           0.0,
            max_release:           f64::MAX,
            safety_min:            f64::NEG_INFINITY,
            safety_max:            f64::INFINITY,
            surface_area:          1.0e6,
            timeout:               None,
        }
    }
}

impl MpcConfig {
    pub fn validate(&self) -> ControlResult<()> {
        let bad = |msg: String| Err(ControlError::Config(msg));
        if self.horizon == 0 {
            return bad("horizon must be at least 1".into());
        }
        if self.optimization_interval == 0 {
            return bad("optimization_interval must be at least 1".into());
        }
        if self.max_iterations == 0 {
            return bad("max_iterations must be at least 1".into());
        }
        if !(self.step_secs > 0.0 && self.step_secs.is_finite()) {
            return bad(format!("step_secs must be positive, got {}", self.step_secs));
        }
        if !(self.surface_area > 0.0 && self.surface_area.is_finite()) {
            return bad(format!("surface_area must be positive, got {}", self.surface_area));
        }
        if !(self.tolerance > 0.0) {
            return bad(format!("tolerance must be positive, got {}", self.tolerance));
        }
        if !(self.min_release <= self.max_release) {
            return bad(format!("release bounds [{}, {}] are empty", self.min_release, self.max_release));
        }
        for (what, w) in [
            ("tracking_weight", self.tracking_weight),
            ("smoothness_weight", self.smoothness_weight),
            ("safety_weight", self.safety_weight),
        ] {
            if !(w >= 0.0 && w.is_finite()) {
                return bad(format!("{what} must be finite and >= 0, got {w}"));
            }
        }
        Ok(())
    }

    #[inline]
    fn gain(&self) -> f64 {
        self.step_secs / self.surface_area
    }
}

/// Inputs for one solve.
#[derive(Clone, Copy, Debug)]
pub struct MpcProblem<'a> {
    /// Current water level (m).
    pub level:           f64,
    /// Forecast inflow per model step.  Shorter than the horizon → the last
    /// value is held; empty is an error.
    pub inflow_forecast: &'a [f64],
    pub target_level:    f64,
}

/// Non-convergence report.  The applied release is `fallback`.
#[derive(Clone, Debug, PartialEq)]
pub struct DegradedOptimization {
    pub iterations: usize,
    /// Largest release change of the final iteration.
    pub residual:   f64,
    pub fallback:   f64,
    pub timed_out:  bool,
}

/// Result of one solve.
#[derive(Clone, Debug, PartialEq)]
pub struct MpcOutcome {
    /// First release of the plan: the only one applied.
    pub release:          f64,
    pub plan:             Vec<f64>,
    /// Levels predicted under `plan`, one per step.
    pub predicted_levels: Vec<f64>,
    pub cost:             f64,
    pub iterations:       usize,
    pub degraded:         Option<DegradedOptimization>,
}

impl MpcOutcome {
    pub fn converged(&self) -> bool {
        self.degraded.is_none()
    }
}

/// Stateful optimiser: remembers the last good release and warm-starts from
/// the previous plan shifted by one step.
#[derive(Clone, Debug)]
pub struct RollingHorizonOptimizer {
    config:    MpcConfig,
    last_good: f64,
    warm:      Vec<f64>,
    solves:    u64,
}

impl RollingHorizonOptimizer {
    pub fn new(config: MpcConfig) -> ControlResult<Self> {
        config.validate()?;
        let initial = config.min_release.max(0.0).min(config.max_release);
        Ok(Self { config, last_good: initial, warm: Vec::new(), solves: 0 })
    }

    /// Release assumed to be in effect before the first solve.
    pub fn with_initial_release(mut self, release: f64) -> Self {
        self.last_good = release.clamp(self.config.min_release, self.config.max_release);
        self
    }

    pub fn config(&self) -> &MpcConfig {
        &self.config
    }

    pub fn last_good(&self) -> f64 {
        self.last_good
    }

    /// Number of completed solves (converged or not).
    pub fn solves(&self) -> u64 {
        self.solves
    }

    /// Whether a re-optimisation is due at `tick`.
    pub fn is_due(&self, tick: Tick) -> bool {
        tick.is_every(self.config.optimization_interval)
    }

    pub fn reset(&mut self) {
        self.warm.clear();
        self.solves = 0;
    }

    /// Optimise the release plan for `problem` and apply its first step.
    pub fn solve(&mut self, problem: &MpcProblem<'_>) -> ControlResult<MpcOutcome> {
        let level = check_finite("level", problem.level)?;
        let target = check_finite("target level", problem.target_level)?;
        let forecast = self.padded_forecast(problem.inflow_forecast)?;
        let h = self.config.horizon;
        let (lo, hi) = (self.config.min_release, self.config.max_release);

        let started = Instant::now();
        let mut u: Vec<f64> = if self.warm.len() == h {
            self.warm.clone()
        } else {
            vec![self.last_good; h]
        };
        let cost_fn = Cost { cfg: &self.config, level, target, forecast: &forecast, prev: self.last_good };

        let mut iterations = 0;
        let mut residual = f64::INFINITY;
        let mut timed_out = false;
        while iterations < self.config.max_iterations {
            if self.config.timeout.is_some_and(|t| started.elapsed() > t) {
                timed_out = true;
                break;
            }
            iterations += 1;
            let next = cost_fn.newton_step(&u, lo, hi);
            residual = u.iter().zip(&next).map(|(a, b)| (a - b).abs()).fold(0.0, f64::max);
            u = next;
            if residual < self.config.tolerance {
                break;
            }
        }
        self.solves += 1;

        if residual < self.config.tolerance {
            let release = u[0];
            self.last_good = release;
            let mut warm = u[1..].to_vec();
            warm.push(u[h - 1]);
            self.warm = warm;
            return Ok(MpcOutcome {
                release,
                predicted_levels: cost_fn.levels(&u),
                cost: cost_fn.value(&u),
                plan: u,
                iterations,
                degraded: None,
            });
        }

        let fallback = self.last_good;
        warn!(iterations, residual, fallback, timed_out, "degraded optimization; holding last good release");
        let plan = vec![fallback; h];
        self.warm.clear();
        Ok(MpcOutcome {
            release: fallback,
            predicted_levels: cost_fn.levels(&plan),
            cost: cost_fn.value(&plan),
            plan,
            iterations,
            degraded: Some(DegradedOptimization { iterations, residual, fallback, timed_out }),
        })
    }

    fn padded_forecast(&self, forecast: &[f64]) -> ControlResult<Vec<f64>> {
        let h = self.config.horizon;
        let Some(&last) = forecast.last() else {
            return Err(ControlError::ForecastTooShort { need: h, got: 0 });
        };
        let mut out: Vec<f64> = forecast.iter().copied().take(h).collect();
        out.resize(h, last);
        for &d in &out {
            check_finite("inflow forecast", d)?;
        }
        Ok(out)
    }
}

// ── Cost model ────────────────────────────────────────────────────────────────

struct Cost<'a> {
    cfg:      &'a MpcConfig,
    level:    f64,
    target:   f64,
    forecast: &'a [f64],
    prev:     f64,
}

impl Cost<'_> {
    fn levels(&self, u: &[f64]) -> Vec<f64> {
        let c = self.cfg.gain();
        let mut x = self.level;
        u.iter()
            .zip(self.forecast)
            .map(|(uk, dk)| {
                x += c * (dk - uk);
                x
            })
            .collect()
    }

    fn value(&self, u: &[f64]) -> f64 {
        let cfg = self.cfg;
        let mut j = 0.0;
        let mut prev = self.prev;
        for (uk, xk) in u.iter().zip(self.levels(u)) {
            let over = (xk - cfg.safety_max).max(0.0);
            let under = (cfg.safety_min - xk).max(0.0);
            j += cfg.tracking_weight * (xk - self.target).powi(2)
                + cfg.smoothness_weight * (uk - prev).powi(2)
                + cfg.safety_weight * (over * over + under * under);
            prev = *uk;
        }
        j
    }

    /// Gradient and Hessian (row-major `h × h`) at `u`.
    fn derivatives(&self, u: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let cfg = self.cfg;
        let h = u.len();
        let c = cfg.gain();
        let x = self.levels(u);

        // dJ/dx[i+1] and d²J/dx[i+1]² for each predicted level.
        let mut gx = vec![0.0; h];
        let mut hx = vec![0.0; h];
        for i in 0..h {
            gx[i] = 2.0 * cfg.tracking_weight * (x[i] - self.target);
            hx[i] = 2.0 * cfg.tracking_weight;
            if x[i] > cfg.safety_max {
                gx[i] += 2.0 * cfg.safety_weight * (x[i] - cfg.safety_max);
                hx[i] += 2.0 * cfg.safety_weight;
            } else if x[i] < cfg.safety_min {
                gx[i] -= 2.0 * cfg.safety_weight * (cfg.safety_min - x[i]);
                hx[i] += 2.0 * cfg.safety_weight;
            }
        }

        // x[i+1] depends on u[j] for every j <= i with slope -c.
        let mut tail_g = vec![0.0; h + 1];
        let mut tail_h = vec![0.0; h + 1];
        for i in (0..h).rev() {
            tail_g[i] = tail_g[i + 1] + gx[i];
            tail_h[i] = tail_h[i + 1] + hx[i];
        }

        let mut grad = vec![0.0; h];
        let mut hess = vec![0.0; h * h];
        for j in 0..h {
            grad[j] = -c * tail_g[j];
            for l in 0..h {
                hess[j * h + l] = c * c * tail_h[j.max(l)];
            }
        }

        // Smoothness couples each release with its neighbours only.
        let ws = cfg.smoothness_weight;
        for j in 0..h {
            let prev = if j == 0 { self.prev } else { u[j - 1] };
            grad[j] += 2.0 * ws * (u[j] - prev);
            hess[j * h + j] += 2.0 * ws;
            if j + 1 < h {
                grad[j] -= 2.0 * ws * (u[j + 1] - u[j]);
                hess[j * h + j] += 2.0 * ws;
                hess[j * h + j + 1] -= 2.0 * ws;
                hess[(j + 1) * h + j] -= 2.0 * ws;
            }
        }
        (grad, hess)
    }

    /// One projected-Newton iteration from `u`.
    fn newton_step(&self, u: &[f64], lo: f64, hi: f64) -> Vec<f64> {
        let h = u.len();
        let (grad, hess) = self.derivatives(u);
        let eps = 1e-12 * (1.0 + hi.abs().min(lo.abs()));

        let free: Vec<usize> = (0..h)
            .filter(|&j| !((u[j] <= lo + eps && grad[j] > 0.0) || (u[j] >= hi - eps && grad[j] < 0.0)))
            .collect();
        if free.is_empty() {
            return u.to_vec();
        }

        let n = free.len();
        let mut a = vec![0.0; n * n];
        let mut b = vec![0.0; n];
        let mut diag_max: f64 = 0.0;
        for (r, &j) in free.iter().enumerate() {
            b[r] = -grad[j];
            for (s, &l) in free.iter().enumerate() {
                a[r * n + s] = hess[j * h + l];
            }
            diag_max = diag_max.max(a[r * n + r]);
        }
        let ridge = 1e-10 * diag_max + f64::MIN_POSITIVE;
        for r in 0..n {
            a[r * n + r] += ridge;
        }
        if !cholesky_solve(&mut a, n, &mut b) {
            // Indefinite or singular: plain projected gradient.
            b = free.iter().map(|&j| -grad[j]).collect();
        }

        let mut dir = vec![0.0; h];
        for (r, &j) in free.iter().enumerate() {
            dir[j] = b[r];
        }

        let j0 = self.value(u);
        let mut alpha = 1.0;
        for _ in 0..MAX_BACKTRACKS {
            let trial: Vec<f64> = u.iter().zip(&dir).map(|(uk, dk)| (uk + alpha * dk).clamp(lo, hi)).collect();
            let decrease: f64 = grad.iter().zip(u.iter().zip(&trial)).map(|(g, (a, b))| g * (b - a)).sum();
            if self.value(&trial) <= j0 + ARMIJO * decrease {
                return trial;
            }
            alpha *= 0.5;
        }
        u.to_vec()
    }
}

/// Solve `A x = b` in place for symmetric positive-definite `A` (`n × n`,
/// row-major).  Returns `false` if `A` is not positive definite.
fn cholesky_solve(a: &mut [f64], n: usize, b: &mut [f64]) -> bool {
    for j in 0..n {
        let mut d = a[j * n + j];
        for k in 0..j {
            d -= a[j * n + k] * a[j * n + k];
        }
        if !(d > 0.0) || !d.is_finite() {
            return false;
        }
        let d = d.sqrt();
        a[j * n + j] = d;
        for i in (j + 1)..n {
            let mut s = a[i * n + j];
            for k in 0..j {
                s -= a[i * n + k] * a[j * n + k];
            }
            a[i * n + j] = s / d;
        }
    }
    for i in 0..n {
        let mut s = b[i];
        for k in 0..i {
            s -= a[i * n + k] * b[k];
        }
        b[i] = s / a[i * n + i];
    }
    for i in (0..n).rev() {
        let mut s = b[i];
        for k in (i + 1)..n {
            s -= a[k * n + i] * b[k];
        }
        b[i] = s / a[i * n + i];
    }
    true
}
