//! Type-erased slot nodes.
//!
//! Edges in the slot graph connect slots of different value types: a
//! procedural `f64` slot may read a `Vec3` slot, and a `Vec3` sub-slot
//! depends on a `Mat4` master. Notification therefore goes through the
//! [`SlotNode`] trait object, which every `Slot<T>` implements regardless of
//! `T`.
//!
//! # Ownership
//!
//! Edges are weak in both directions. A slot lives as long as some owner
//! (a component, a closure, a local variable) holds a [`Slot`] handle; the
//! graph itself never keeps a slot alive. Dropping the last handle detaches
//! the slot from its neighbours.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

use super::cell::SlotInner;
use super::{GroupId, Slot, SlotId, SlotValue, ValueKind};
use crate::error::{Result, SlotError};
use crate::graph::NodeKind;
use crate::interdep::GroupBinding;

/// Notification interface shared by all slots.
pub(crate) trait SlotNode: Send + Sync + 'static {
    fn id(&self) -> SlotId;

    fn value_kind(&self) -> ValueKind;

    fn node_kind(&self) -> NodeKind;

    fn is_cache_valid(&self) -> bool;

    fn controller_id(&self) -> Option<SlotId>;

    fn controller_node(&self) -> Option<Arc<dyn SlotNode>>;

    /// Live dependents, dead edges pruned.
    fn dependents(&self) -> Vec<Arc<dyn SlotNode>>;

    fn group(&self) -> Option<GroupBinding>;

    /// External trigger: an upstream value changed.
    fn on_value_changed(&self);

    /// Internal trigger: a sibling in dependency group `origin` changed.
    fn on_dependent_value_changed(&self, origin: GroupId);

    /// Pull a stale cache from the controller or the compute callback,
    /// without routing through a dependency group.
    fn refresh(&self) -> Result<()>;

    /// Mark the cache stale without notifying anyone. Returns whether the
    /// flag changed.
    fn invalidate_quiet(&self) -> bool;

    fn add_dependent_edge(&self, edge: Edge);

    fn drop_dependent_edge(&self, id: SlotId);

    /// Sever every relation this slot has with upstream slot `id`.
    fn forget_source(&self, id: SlotId);

    /// Record an explicitly declared input of a procedural slot.
    fn pin_input(&self, edge: Edge);

    /// Connect `controller` to this slot. Fails with a type mismatch when
    /// the value types differ.
    fn accept_controller(&self, controller: Arc<dyn SlotNode>) -> Result<()>;

    fn bind_group(&self, binding: GroupBinding) -> Result<()>;

    fn unbind_group(&self, group: GroupId);

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// A weak, id-tagged reference to a slot node.
#[derive(Clone)]
pub(crate) struct Edge {
    pub(crate) id: SlotId,
    pub(crate) node: Weak<dyn SlotNode>,
}

impl Edge {
    pub(crate) fn upgrade(&self) -> Option<Arc<dyn SlotNode>> {
        self.node.upgrade()
    }
}

impl fmt::Debug for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Edge").field(&self.id).finish()
    }
}

/// A slot handle with its value type erased.
///
/// Components store `AnySlot`s so slots of different types can live in one
/// name table. Recover the typed handle with [`downcast`](Self::downcast).
#[derive(Clone)]
pub struct AnySlot {
    pub(crate) node: Arc<dyn SlotNode>,
}

impl AnySlot {
    pub(crate) fn from_node(node: Arc<dyn SlotNode>) -> Self {
        Self { node }
    }

    pub fn id(&self) -> SlotId {
        self.node.id()
    }

    /// The value type of the underlying slot.
    pub fn kind(&self) -> ValueKind {
        self.node.value_kind()
    }

    pub fn node_kind(&self) -> NodeKind {
        self.node.node_kind()
    }

    pub fn is_cache_valid(&self) -> bool {
        self.node.is_cache_valid()
    }

    pub fn controller_id(&self) -> Option<SlotId> {
        self.node.controller_id()
    }

    pub fn group_id(&self) -> Option<GroupId> {
        self.node.group().map(|binding| binding.group.id())
    }

    /// See [`Slot::on_value_changed`].
    pub fn on_value_changed(&self) {
        self.node.on_value_changed();
    }

    /// Refresh a stale cache without returning the value. Participants of a
    /// dependency group are refreshed through the group.
    pub fn refresh(&self) -> Result<()> {
        if self.node.is_cache_valid() {
            return Ok(());
        }
        match self.node.group() {
            Some(binding) => binding.group.resolve(),
            None => self.node.refresh(),
        }
    }

    /// Recover the typed handle.
    pub fn downcast<T: SlotValue>(&self) -> Result<Slot<T>> {
        let found = self.node.value_kind();
        Arc::clone(&self.node)
            .into_any()
            .downcast::<SlotInner<T>>()
            .map(Slot::from_inner)
            .map_err(|_| SlotError::TypeMismatch {
                expected: T::kind(),
                found,
            })
    }

    pub(crate) fn edge(&self) -> Edge {
        Edge {
            id: self.node.id(),
            node: Arc::downgrade(&self.node),
        }
    }
}

impl fmt::Debug for AnySlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnySlot")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .field("cache_valid", &self.is_cache_valid())
            .finish()
    }
}

impl<T: SlotValue> From<Slot<T>> for AnySlot {
    fn from(slot: Slot<T>) -> Self {
        slot.erase()
    }
}

impl<T: SlotValue> From<&Slot<T>> for AnySlot {
    fn from(slot: &Slot<T>) -> Self {
        slot.erase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slot::Vec3;

    #[test]
    fn downcast_recovers_typed_handle() {
        let slot = Slot::new(4.5_f64);
        let any = slot.erase();

        let typed: Slot<f64> = any.downcast().unwrap();
        assert_eq!(typed.id(), slot.id());
        assert_eq!(typed.get().unwrap(), 4.5);
    }

    #[test]
    fn downcast_to_wrong_type_reports_kinds() {
        let any = AnySlot::from(Slot::new(Vec3::ZERO));

        let err = any.downcast::<f64>().unwrap_err();
        assert_eq!(
            err,
            SlotError::TypeMismatch {
                expected: ValueKind::Float,
                found: ValueKind::Vec3,
            }
        );
    }
}
