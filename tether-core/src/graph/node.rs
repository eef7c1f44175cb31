//! Graph Nodes
//!
//! Point-in-time descriptions of slots, as collected by a
//! [`GraphSnapshot`](super::GraphSnapshot).

use serde::{Deserialize, Serialize};

use crate::slot::{AnySlot, GroupId, SlotId, ValueKind};

/// How a slot gets its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// A value box, written with `set` or fed by a controller.
    Stored,

    /// Computed by a callback from the slots it reads.
    Procedural,

    /// A read-only projection of a master slot.
    ReadOnlyView,
}

/// The state of one slot when the snapshot was taken.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeInfo {
    pub id: SlotId,
    pub kind: NodeKind,
    pub value_kind: ValueKind,
    pub cache_valid: bool,
    pub controller: Option<SlotId>,
    pub group: Option<GroupId>,
    pub dependents: Vec<SlotId>,
}

impl NodeInfo {
    pub(crate) fn describe(slot: &AnySlot) -> Self {
        let node = &slot.node;
        Self {
            id: node.id(),
            kind: node.node_kind(),
            value_kind: node.value_kind(),
            cache_valid: node.is_cache_valid(),
            controller: node.controller_id(),
            group: slot.group_id(),
            dependents: node.dependents().iter().map(|d| d.id()).collect(),
        }
    }

    /// Roots have no controller and are not computed.
    pub fn is_root(&self) -> bool {
        self.controller.is_none() && self.kind == NodeKind::Stored
    }

    /// Whether a stale cache can be refreshed from somewhere.
    pub fn is_recomputable(&self) -> bool {
        self.controller.is_some() || self.kind != NodeKind::Stored || self.group.is_some()
    }
}
