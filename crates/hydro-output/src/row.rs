//! Flat rows written by every backend.
//!
//! Component state is stored long-form (one row per field) because each
//! component kind carries a different field set.

/// One state field of one component at the end of a tick.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentStateRow {
    pub tick:      u64,
    /// End-of-tick virtual time (s).
    pub time:      f64,
    pub component: String,
    pub field:     String,
    pub value:     f64,
}

/// One disturbance effect applied during a tick.
#[derive(Debug, Clone, PartialEq)]
pub struct DisturbanceLogRow {
    pub tick:          u64,
    pub config_id:     String,
    pub component:     String,
    /// `inflow`, `sensor` or `actuator`.
    pub effect:        &'static str,
    pub applied_value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickSummaryRow {
    pub tick:      u64,
    pub time:      f64,
    /// Messages published on the bus during the tick.
    pub published: u64,
    /// Components with a disturbance inflow override.
    pub disturbed: u64,
}
