//! Connections between slots.
//!
//! `connect(controller, dependent)` makes `dependent` mirror `controller`:
//! the dependent's cache is invalidated whenever the controller changes and
//! refreshed from it on the next read. A slot has at most one controller.
//! Connections never form cycles; loops between algebraically linked slots
//! go through a [`DependencyGroup`](crate::interdep::DependencyGroup)
//! instead.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use super::cell::{Controller, SlotInner, Source};
use super::node::{AnySlot, SlotNode};
use super::{Slot, SlotId, SlotValue};
use crate::error::{Result, SlotError};

/// Connect `controller` to `dependent`.
///
/// Reconnecting the same pair is a no-op. The dependent is invalidated and
/// takes the controller's value on its next read.
///
/// # Errors
///
/// - [`SlotError::AlreadyControlled`] if `dependent` has a different
///   controller, or is computed and can never have one.
/// - [`SlotError::CyclicConnection`] if `controller` is (transitively)
///   driven by `dependent`.
/// - [`SlotError::InvalidGroupConfiguration`] if the edge would run inside a
///   dependency group or into a participant other than its primary.
pub fn connect<T: SlotValue>(controller: &Slot<T>, dependent: &Slot<T>) -> Result<()> {
    connect_inner(&controller.inner, &dependent.inner)
}

/// Detach `dependent` from its controller, keeping the last value.
///
/// A stale cache is refreshed from the departing controller first, if it can
/// be. Returns whether a controller was removed.
pub fn disconnect<T: SlotValue>(dependent: &Slot<T>) -> bool {
    let d = &dependent.inner;
    if !d.is_cache_valid() && d.controller_id().is_some() {
        if let Err(err) = d.refresh_cache() {
            warn!(slot = %d.id, error = %err, "could not pull before disconnecting");
        }
    }

    let removed = {
        let mut state = d.state.lock();
        let removed = state.controller.take();
        if removed.is_some() && state.value.is_some() {
            state.valid = true;
        }
        removed
    };

    match removed {
        Some(controller) => {
            if let Some(node) = controller.slot.upgrade() {
                node.drop_dependent_edge(d.id);
            }
            debug!(slot = %d.id, controller = %controller.id, "disconnected");
            true
        }
        None => false,
    }
}

/// Connect two type-erased slots.
///
/// Fails with [`SlotError::TypeMismatch`] when their value types differ.
pub fn connect_any(controller: &AnySlot, dependent: &AnySlot) -> Result<()> {
    let (expected, found) = (controller.kind(), dependent.kind());
    if expected != found {
        return Err(SlotError::TypeMismatch { expected, found });
    }
    dependent.node.accept_controller(Arc::clone(&controller.node))
}

pub(crate) fn connect_inner<T: SlotValue>(c: &Arc<SlotInner<T>>, d: &Arc<SlotInner<T>>) -> Result<()> {
    if c.id == d.id {
        return Err(SlotError::CyclicConnection {
            controller: c.id,
            dependent: d.id,
        });
    }
    if matches!(d.source, Source::Procedural { .. }) {
        return Err(SlotError::AlreadyControlled { slot: d.id });
    }

    let dependent_group = d.state.lock().group.clone();
    if let Some(binding) = &dependent_group {
        if binding.index != 0 {
            return Err(SlotError::InvalidGroupConfiguration(format!(
                "{} is driven by {}; only its primary slot can be connected",
                d.id,
                binding.group.id()
            )));
        }
        let same_group = c
            .state
            .lock()
            .group
            .as_ref()
            .is_some_and(|b| b.group.id() == binding.group.id());
        if same_group {
            return Err(SlotError::InvalidGroupConfiguration(format!(
                "{} and {} share {}; no direct edges inside a group",
                c.id,
                d.id,
                binding.group.id()
            )));
        }
    }

    if let Some(existing) = d.controller_id() {
        return if existing == c.id {
            Ok(())
        } else {
            Err(SlotError::AlreadyControlled { slot: d.id })
        };
    }

    let start: Arc<dyn SlotNode> = c.clone();
    let mut cursor = Some(start);
    while let Some(node) = cursor {
        if node.id() == d.id {
            return Err(SlotError::CyclicConnection {
                controller: c.id,
                dependent: d.id,
            });
        }
        cursor = node.controller_node();
    }

    {
        let mut state = d.state.lock();
        if state.controller.is_some() {
            return Err(SlotError::AlreadyControlled { slot: d.id });
        }
        state.controller = Some(Controller {
            id: c.id,
            slot: Arc::downgrade(c),
        });
    }
    c.add_dependent_edge(d.edge());
    debug!(controller = %c.id, dependent = %d.id, "connected");

    d.on_value_changed();
    Ok(())
}

/// Whether `target` is `from` or one of its transitive dependents.
fn reaches(from: &Arc<dyn SlotNode>, target: SlotId) -> bool {
    let mut seen = HashSet::new();
    let mut stack = vec![Arc::clone(from)];
    while let Some(node) = stack.pop() {
        if node.id() == target {
            return true;
        }
        if seen.insert(node.id()) {
            stack.extend(node.dependents());
        }
    }
    false
}

impl<T: SlotValue> Slot<T> {
    /// Make this slot the controller of `dependent`. See [`connect`].
    pub fn connect(&self, dependent: &Slot<T>) -> Result<()> {
        connect(self, dependent)
    }

    /// Detach this slot from its controller. See [`disconnect`].
    pub fn disconnect(&self) -> bool {
        disconnect(self)
    }

    /// Register `dependent` for invalidation whenever this slot changes.
    ///
    /// Unlike [`connect`] this does not make this slot the dependent's
    /// controller. A computed dependent keeps this slot as a declared input
    /// across recomputations.
    ///
    /// Fails with [`SlotError::CyclicConnection`] if this slot is already
    /// downstream of `dependent`.
    pub fn add_dependent(&self, dependent: &AnySlot) -> Result<()> {
        if reaches(&dependent.node, self.id()) {
            return Err(SlotError::CyclicConnection {
                controller: self.id(),
                dependent: dependent.id(),
            });
        }
        self.inner.add_dependent_edge(dependent.edge());
        dependent.node.pin_input(self.edge());
        debug!(slot = %self.id(), dependent = %dependent.id(), "dependent added");
        dependent.node.on_value_changed();
        Ok(())
    }

    /// Remove `dependent` from this slot's dependents.
    ///
    /// If this slot was the dependent's controller, the dependent keeps its
    /// last value and becomes writable again.
    pub fn remove_dependent(&self, dependent: &AnySlot) {
        self.inner.drop_dependent_edge(dependent.id());
        dependent.node.forget_source(self.id());
        debug!(slot = %self.id(), dependent = %dependent.id(), "dependent removed");
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
