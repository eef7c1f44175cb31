//! Graph Snapshots
//!
//! The slot graph has no central registry: each slot only knows its own
//! neighbours. A [`GraphSnapshot`] walks the graph from a set of root slots
//! and records what it finds, for inspection, consistency checks and
//! ordered refreshes.
//!
//! # Algorithm
//!
//! 1. Breadth-first from the roots along dependent edges. Reaching a
//!    participant of a dependency group pulls in every other participant.
//! 2. Record each slot's state as a [`NodeInfo`].
//! 3. For ordering, sort the recorded slots topologically (Kahn's
//!    algorithm) over the dependent edges between them, so controllers
//!    come before the slots they feed.

use std::collections::{HashMap, HashSet, VecDeque};

use indexmap::IndexMap;
use tracing::trace;

use super::node::{NodeInfo, NodeKind};
use crate::error::Result;
use crate::slot::{AnySlot, SlotId};

/// Something wrong with the recorded edges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeViolation {
    /// A slot lists itself as a dependent.
    SelfDependency(SlotId),

    /// `dependent` names `controller` as its controller, but is missing from
    /// the controller's dependents.
    MissingDependentEdge { controller: SlotId, dependent: SlotId },

    /// A stale slot with nothing to refresh it from.
    StaleWithoutSource(SlotId),
}

/// The reachable part of a slot graph, recorded at one point in time.
///
/// The snapshot holds handles to every slot it recorded, keeping them alive
/// until it is dropped.
#[derive(Debug, Default)]
pub struct GraphSnapshot {
    nodes: IndexMap<SlotId, (NodeInfo, AnySlot)>,
}

impl GraphSnapshot {
    /// Record every slot reachable from `roots`.
    pub fn collect(roots: &[AnySlot]) -> Self {
        let mut nodes = IndexMap::new();
        let mut visited = HashSet::new();
        let mut queue: VecDeque<AnySlot> = roots.iter().cloned().collect();

        while let Some(slot) = queue.pop_front() {
            if !visited.insert(slot.id()) {
                continue;
            }

            for dependent in slot.node.dependents() {
                queue.push_back(AnySlot::from_node(dependent));
            }
            if let Some(binding) = slot.node.group() {
                for member in binding.group.member_nodes() {
                    queue.push_back(AnySlot::from_node(member));
                }
            }

            let info = NodeInfo::describe(&slot);
            nodes.insert(slot.id(), (info, slot));
        }

        trace!(nodes = nodes.len(), "graph snapshot collected");
        Self { nodes }
    }

    pub fn node(&self, id: SlotId) -> Option<&NodeInfo> {
        self.nodes.get(&id).map(|(info, _)| info)
    }

    /// Recorded nodes, in discovery order.
    pub fn nodes(&self) -> impl Iterator<Item = &NodeInfo> {
        self.nodes.values().map(|(info, _)| info)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of recorded slots with a stale cache.
    pub fn stale_count(&self) -> usize {
        self.nodes().filter(|info| !info.cache_valid).count()
    }

    /// Stale slots, upstream first.
    pub fn stale_in_order(&self) -> Vec<SlotId> {
        let stale: Vec<SlotId> = self
            .nodes()
            .filter(|info| !info.cache_valid)
            .map(|info| info.id)
            .collect();
        self.topological_sort(stale)
    }

    /// Refresh every stale slot, upstream first. Returns how many were
    /// stale.
    pub fn refresh_stale(&self) -> Result<usize> {
        let order = self.stale_in_order();
        for id in &order {
            if let Some((_, slot)) = self.nodes.get(id) {
                slot.refresh()?;
            }
        }
        Ok(order.len())
    }

    /// Check the recorded edges for consistency.
    pub fn verify(&self) -> Vec<EdgeViolation> {
        let mut violations = Vec::new();
        for info in self.nodes() {
            if info.dependents.contains(&info.id) {
                violations.push(EdgeViolation::SelfDependency(info.id));
            }
            if let Some(controller) = info.controller.and_then(|id| self.node(id)) {
                if !controller.dependents.contains(&info.id) {
                    violations.push(EdgeViolation::MissingDependentEdge {
                        controller: controller.id,
                        dependent: info.id,
                    });
                }
            }
            if !info.cache_valid && !info.is_recomputable() {
                violations.push(EdgeViolation::StaleWithoutSource(info.id));
            }
        }
        violations
    }

    /// Order `ids` so that every slot comes after the recorded slots it
    /// depends on. Slots caught in a cycle (which the graph should never
    /// contain) are appended at the end.
    fn topological_sort(&self, ids: Vec<SlotId>) -> Vec<SlotId> {
        let id_set: HashSet<SlotId> = ids.iter().copied().collect();
        let mut in_degree: HashMap<SlotId, usize> = ids.iter().map(|id| (*id, 0)).collect();

        for id in &ids {
            if let Some(info) = self.node(*id) {
                for dependent in info.dependents.iter().filter(|d| id_set.contains(d)) {
                    *in_degree.entry(*dependent).or_insert(0) += 1;
                }
            }
        }

        let mut queue: VecDeque<SlotId> = ids
            .iter()
            .copied()
            .filter(|id| in_degree.get(id) == Some(&0))
            .collect();
        let mut result = Vec::with_capacity(ids.len());

        while let Some(id) = queue.pop_front() {
            result.push(id);
            if let Some(info) = self.node(id) {
                for dependent in info.dependents.iter().filter(|d| id_set.contains(d)) {
                    if let Some(degree) = in_degree.get_mut(dependent) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push_back(*dependent);
                        }
                    }
                }
            }
        }

        if result.len() < ids.len() {
            let placed: HashSet<SlotId> = result.iter().copied().collect();
            result.extend(ids.into_iter().filter(|id| !placed.contains(id)));
        }
        result
    }

    /// Number of recorded slots of each kind.
    pub fn count_by_kind(&self) -> HashMap<NodeKind, usize> {
        let mut counts = HashMap::new();
        for info in self.nodes() {
            *counts.entry(info.kind).or_insert(0) += 1;
        }
        counts
    }
}
