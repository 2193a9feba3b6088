//! Per-tick pending inputs for every component.
//!
//! The buffer for a component is written by up to three parties in one tick:
//! the harness (upstream sum, bus messages) and the disturbance manager
//! (inflow overrides).  Precedence is resolved here, by source, so no writer
//! can silently overwrite a higher-priority one regardless of call order.

use hydro_core::{ComponentIdx, Fields};

use crate::InflowSource;

/// Pending input for one component.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PendingInput {
    inflow: Option<(f64, InflowSource)>,
    /// Actuator commands to pass to `step`.
    pub controls: Fields,
    /// Set when a disturbance touched this component this tick.
    pub disturbed: bool,
}

impl PendingInput {
    /// Offer an inflow value from `source`.
    ///
    /// Accepted when no value is pending or `source` ranks at least as high as
    /// the pending one.  Returns `true` when accepted.
    pub fn offer_inflow(&mut self, value: f64, source: InflowSource) -> bool {
        match self.inflow {
            Some((_, current)) if current > source => false,
            _ => {
                self.inflow = Some((value, source));
                if source == InflowSource::Disturbance {
                    self.disturbed = true;
                }
                true
            }
        }
    }

    /// The pending override, if any.
    pub fn inflow_override(&self) -> Option<(f64, InflowSource)> {
        self.inflow
    }

    /// Final inflow given the automatically computed upstream sum.
    pub fn resolve_inflow(&self, upstream: f64) -> (f64, InflowSource) {
        self.inflow.unwrap_or((upstream, InflowSource::Upstream))
    }
}

/// Arena of [`PendingInput`]s, indexed by [`ComponentIdx`].
#[derive(Clone, Debug, Default)]
pub struct InputBuffers {
    pending: Vec<PendingInput>,
}

impl InputBuffers {
    pub fn new(component_count: usize) -> Self {
        Self { pending: vec![PendingInput::default(); component_count] }
    }

    #[inline]
    pub fn get(&self, idx: ComponentIdx) -> &PendingInput {
        &self.pending[idx.index()]
    }

    #[inline]
    pub fn get_mut(&mut self, idx: ComponentIdx) -> &mut PendingInput {
        &mut self.pending[idx.index()]
    }

    /// Indices of components a disturbance touched this tick.
    pub fn disturbed(&self) -> impl Iterator<Item = ComponentIdx> + '_ {
        self.pending
            .iter()
            .enumerate()
            .filter(|(_, p)| p.disturbed)
            .map(|(i, _)| ComponentIdx(i as u32))
    }

    /// Reset every buffer at the start of a tick.
    pub fn clear(&mut self) {
        for p in &mut self.pending {
            *p = PendingInput::default();
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
