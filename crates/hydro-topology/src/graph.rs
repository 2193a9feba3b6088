//! The flow graph and its cached execution order.
//!
//! # Data layout
//!
//! ```text
//! components: [Box<dyn Component>; N]        indexed by ComponentIdx
//! edges:      [(upstream, downstream); E]    in insertion order
//! upstream:   [Vec<ComponentIdx>; N]         in-neighbours, insertion order
//! downstream: [Vec<ComponentIdx>; N]         out-neighbours, insertion order
//! ```
//!
//! `build()` runs Kahn's algorithm with a min-heap of ready indices, so when
//! several components are ready at once the earliest-added one goes first.
//! The resulting order is a pure function of the insertion sequence.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap};

use hydro_core::{ComponentIdx, Fields};
use tracing::debug;

use crate::{Component, TopologyError, TopologyResult};

/// Components plus directed flow connections.
///
/// Mutable until [`build`](Self::build); frozen afterwards.
#[derive(Default)]
pub struct Topology {
    components: Vec<Box<dyn Component>>,
    ids:        HashMap<String, ComponentIdx>,
    edges:      Vec<(ComponentIdx, ComponentIdx)>,
    upstream:   Vec<Vec<ComponentIdx>>,
    downstream: Vec<Vec<ComponentIdx>>,
    /// `Some` once built; doubles as the frozen flag.
    order:      Option<Vec<ComponentIdx>>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Construction ──────────────────────────────────────────────────────

    /// Add a component and return its arena index.
    pub fn add_component(&mut self, component: Box<dyn Component>) -> TopologyResult<ComponentIdx> {
        self.ensure_mutable("add_component")?;
        let id = component.id().to_owned();
        if self.ids.contains_key(&id) {
            return Err(TopologyError::DuplicateComponent(id));
        }
        let idx = ComponentIdx(self.components.len() as u32);
        self.components.push(component);
        self.ids.insert(id, idx);
        self.upstream.push(Vec::new());
        self.downstream.push(Vec::new());
        Ok(idx)
    }

    /// Convenience wrapper boxing a concrete component.
    pub fn add<C: Component + 'static>(&mut self, component: C) -> TopologyResult<ComponentIdx> {
        self.add_component(Box::new(component))
    }

    /// Add a directed flow relation `upstream -> downstream`.
    pub fn add_connection(&mut self, upstream: &str, downstream: &str) -> TopologyResult<()> {
        self.ensure_mutable("add_connection")?;
        let up = self.require(upstream)?;
        let down = self.require(downstream)?;
        if self.downstream[up.index()].contains(&down) {
            return Err(TopologyError::DuplicateConnection {
                upstream:   upstream.to_owned(),
                downstream: downstream.to_owned(),
            });
        }
        self.edges.push((up, down));
        self.downstream[up.index()].push(down);
        self.upstream[down.index()].push(up);
        Ok(())
    }

    /// Compute and cache the execution order, then freeze the graph.
    ///
    /// Fails with [`TopologyError::Cyclic`] if any flow loop exists; the error
    /// lists every component that could not be ordered.
    pub fn build(&mut self) -> TopologyResult<&[ComponentIdx]> {
        self.ensure_mutable("build")?;
        let n = self.components.len();

        let mut in_degree: Vec<usize> = self.upstream.iter().map(Vec::len).collect();
        let mut ready: BinaryHeap<Reverse<u32>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == 0)
            .map(|(i, _)| Reverse(i as u32))
            .collect();

        let mut order = Vec::with_capacity(n);
        while let Some(Reverse(i)) = ready.pop() {
            let idx = ComponentIdx(i);
            order.push(idx);
            for &next in &self.downstream[idx.index()] {
                let d = &mut in_degree[next.index()];
                *d -= 1;
                if *d == 0 {
                    ready.push(Reverse(next.0));
                }
            }
        }

        if order.len() != n {
            let remaining = in_degree
                .iter()
                .enumerate()
                .filter(|(_, d)| **d > 0)
                .map(|(i, _)| self.components[i].id().to_owned())
                .collect();
            return Err(TopologyError::Cyclic { remaining });
        }

        debug!(components = n, edges = self.edges.len(), "topology built");
        let order = self.order.insert(order);
        Ok(order.as_slice())
    }

    // ── Queries ───────────────────────────────────────────────────────────

    pub fn is_frozen(&self) -> bool {
        self.order.is_some()
    }

    /// The cached topological order.
    pub fn order(&self) -> TopologyResult<&[ComponentIdx]> {
        self.order.as_deref().ok_or(TopologyError::NotBuilt)
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn index_of(&self, id: &str) -> Option<ComponentIdx> {
        self.ids.get(id).copied()
    }

    /// Like [`index_of`](Self::index_of) but fails with `UnknownComponent`.
    pub fn require(&self, id: &str) -> TopologyResult<ComponentIdx> {
        self.index_of(id).ok_or_else(|| TopologyError::UnknownComponent(id.to_owned()))
    }

    #[inline]
    pub fn component(&self, idx: ComponentIdx) -> &dyn Component {
        self.components[idx.index()].as_ref()
    }

    #[inline]
    pub fn component_mut(&mut self, idx: ComponentIdx) -> &mut dyn Component {
        self.components[idx.index()].as_mut()
    }

    pub fn get(&self, id: &str) -> Option<&dyn Component> {
        self.index_of(id).map(|idx| self.component(idx))
    }

    #[inline]
    pub fn id_of(&self, idx: ComponentIdx) -> &str {
        self.components[idx.index()].id()
    }

    /// In-neighbours of `idx`, in connection order.
    #[inline]
    pub fn upstream_of(&self, idx: ComponentIdx) -> &[ComponentIdx] {
        &self.upstream[idx.index()]
    }

    /// Out-neighbours of `idx`, in connection order.
    #[inline]
    pub fn downstream_of(&self, idx: ComponentIdx) -> &[ComponentIdx] {
        &self.downstream[idx.index()]
    }

    /// All edges in insertion order.
    pub fn edges(&self) -> &[(ComponentIdx, ComponentIdx)] {
        &self.edges
    }

    /// Iterate `(idx, component)` in arena (insertion) order.
    pub fn iter(&self) -> impl Iterator<Item = (ComponentIdx, &dyn Component)> + '_ {
        self.components
            .iter()
            .enumerate()
            .map(|(i, c)| (ComponentIdx(i as u32), c.as_ref()))
    }

    /// State of `id`, if it exists.
    pub fn state_of(&self, id: &str) -> Option<&Fields> {
        self.get(id).map(|c| c.state())
    }

    /// Read-only view of every component's state, in arena order.
    pub fn states(&self) -> impl Iterator<Item = (&str, &Fields)> + '_ {
        self.components.iter().map(|c| (c.id(), c.state()))
    }

    /// Copy of every component's state keyed by id.
    pub fn snapshot(&self) -> BTreeMap<String, Fields> {
        self.components
            .iter()
            .map(|c| (c.id().to_owned(), c.state().clone()))
            .collect()
    }

    fn ensure_mutable(&self, operation: &'static str) -> TopologyResult<()> {
        if self.is_frozen() {
            return Err(TopologyError::Frozen { operation });
        }
        Ok(())
    }
}
