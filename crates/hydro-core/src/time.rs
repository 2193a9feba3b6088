//! Virtual simulation time.
//!
//! # Design
//!
//! Time is a monotonically increasing `Tick` counter.  Elapsed virtual time is
//! always derived, never accumulated:
//!
//!   elapsed_secs = tick * dt_secs
//!
//! There is no wall-clock mapping; the simulator is purely virtual-time.

use std::fmt;

use crate::{CoreError, CoreResult};

/// Slack used when comparing derived times against configured boundaries.
pub const TIME_EPSILON: f64 = 1e-9;

// ── Tick ─────────────────────────────────────────────────────────────────────

/// An absolute simulation tick counter.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Tick(pub u64);

impl Tick {
    pub const ZERO: Tick = Tick(0);

    /// Return the tick `n` steps after `self`.
    #[inline]
    pub fn offset(self, n: u64) -> Tick {
        Tick(self.0 + n)
    }

    /// Ticks elapsed from `earlier` to `self`.
    ///
    /// # Panics
    /// Panics in debug mode if `earlier > self`.
    #[inline]
    pub fn since(self, earlier: Tick) -> u64 {
        self.0 - earlier.0
    }

    /// `true` if this tick is a multiple of `interval` (an interval of 0 never matches).
    #[inline]
    pub fn is_every(self, interval: u64) -> bool {
        interval > 0 && self.0.is_multiple_of(interval)
    }
}

impl std::ops::Add<u64> for Tick {
    type Output = Tick;
    #[inline]
    fn add(self, rhs: u64) -> Tick {
        Tick(self.0 + rhs)
    }
}

impl std::ops::Sub for Tick {
    type Output = u64;
    #[inline]
    fn sub(self, rhs: Tick) -> u64 {
        self.0 - rhs.0
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

// ── SimClock ──────────────────────────────────────────────────────────────────

/// Tick counter plus the fixed step size.  Owned exclusively by the harness.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SimClock {
    /// Virtual seconds per tick.
    pub dt_secs: f64,
    /// The current tick: advanced by `SimClock::advance()` each iteration.
    pub current_tick: Tick,
}

impl SimClock {
    pub fn new(dt_secs: f64) -> Self {
        Self { dt_secs, current_tick: Tick::ZERO }
    }

    /// Advance the clock by one tick.
    #[inline]
    pub fn advance(&mut self) {
        self.current_tick = Tick(self.current_tick.0 + 1);
    }

    /// Elapsed virtual seconds at the start of the current tick.
    #[inline]
    pub fn elapsed_secs(&self) -> f64 {
        self.time_at(self.current_tick)
    }

    /// Elapsed virtual seconds at the start of `tick`.
    #[inline]
    pub fn time_at(&self, tick: Tick) -> f64 {
        tick.0 as f64 * self.dt_secs
    }

    /// How many ticks span `secs` seconds (rounds up, never early).
    pub fn ticks_for_secs(&self, secs: f64) -> u64 {
        if secs <= 0.0 {
            return 0;
        }
        let raw = secs / self.dt_secs;
        let rounded = raw.round();
        if (raw - rounded).abs() < TIME_EPSILON { rounded as u64 } else { raw.ceil() as u64 }
    }
}

impl fmt::Display for SimClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (t={:.3}s)", self.current_tick, self.elapsed_secs())
    }
}

// ── SimConfig ─────────────────────────────────────────────────────────────────

/// Top-level simulation configuration.
///
/// Loading this from YAML/JSON is the application's job; with the `serde`
/// feature the struct deserialises directly.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SimConfig {
    /// Virtual seconds per tick.  Must be positive.
    pub dt_secs: f64,

    /// The run completes once `tick * dt_secs >= duration_secs`.
    pub duration_secs: f64,

    /// Master RNG seed.  The same seed always produces identical histories.
    pub seed: u64,

    /// Record a state snapshot every N ticks.  1 = every tick; 0 = never.
    pub output_interval_ticks: u64,

    /// Keep every published message in the bus' in-memory log.
    pub retain_message_log: bool,

    /// Maximum nesting of synchronous publish cascades inside one publish.
    pub max_cascade_depth: usize,

    /// Worker thread count for batch runs.  `None` uses all logical cores.
    pub num_threads: Option<usize>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            dt_secs:               1.0,
            duration_secs:         100.0,
            seed:                  0,
            output_interval_ticks: 1,
            retain_message_log:    false,
            max_cascade_depth:     32,
            num_threads:           None,
        }
    }
}

impl SimConfig {
    /// Reject step sizes and durations that cannot drive a run.
    pub fn validate(&self) -> CoreResult<()> {
        if !(self.dt_secs.is_finite() && self.dt_secs > 0.0) {
            return Err(CoreError::Config(format!(
                "dt_secs must be positive and finite, got {}",
                self.dt_secs
            )));
        }
        if !(self.duration_secs.is_finite() && self.duration_secs >= 0.0) {
            return Err(CoreError::Config(format!(
                "duration_secs must be non-negative and finite, got {}",
                self.duration_secs
            )));
        }
        if self.max_cascade_depth == 0 {
            return Err(CoreError::Config("max_cascade_depth must be at least 1".into()));
        }
        Ok(())
    }

    /// Number of ticks needed so that `tick * dt >= duration`.
    pub fn total_ticks(&self) -> u64 {
        self.make_clock().ticks_for_secs(self.duration_secs)
    }

    /// The tick at which the run ends (exclusive upper bound).
    #[inline]
    pub fn end_tick(&self) -> Tick {
        Tick(self.total_ticks())
    }

    /// Construct a `SimClock` pre-configured for this run.
    pub fn make_clock(&self) -> SimClock {
        SimClock::new(self.dt_secs)
    }
}
