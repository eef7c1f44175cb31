//! Slot Implementation
//!
//! A slot holds a value of a fixed type, a cache-valid flag, an optional
//! controller and a set of dependents.
//!
//! # How Slots Work
//!
//! 1. `set` stores the value, marks the cache valid and notifies every
//!    dependent with `on_value_changed`.
//!
//! 2. A dependent receiving `on_value_changed` marks its own cache invalid
//!    and forwards the notification. A dependent that is already invalid
//!    stops there, so one change visits each downstream slot at most once.
//!
//! 3. `get` on a valid slot returns the cached value. On an invalid slot it
//!    pulls from the controller (or runs the compute callback) first.
//!
//! Invalidation is eager and cheap; recomputation is lazy and only happens
//! for slots that are actually read. Slots that never go stale (plain slots
//! with no controller) are bounded by the walk epoch instead: each one
//! forwards a given fan-out at most once.
//!
//! # Locking
//!
//! Each slot's state sits behind its own `parking_lot::Mutex`. The lock is
//! never held while another slot is called, so walks over the graph cannot
//! deadlock on a slot's own lock.

use std::any::Any;
use std::fmt::{self, Debug};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use super::context::{EvalContext, InvalidationWalk};
use super::node::{AnySlot, Edge, SlotNode};
use super::{GroupId, SlotId, SlotValue, ValueKind};
use crate::config::{NotifyPolicy, SlotConfig};
use crate::error::{Result, SlotError};
use crate::graph::NodeKind;
use crate::interdep::GroupBinding;

/// Callback of a procedural slot.
pub type ComputeFn<T> = Arc<dyn Fn() -> Result<T> + Send + Sync>;

/// Where a stale slot gets its value from, besides a controller.
pub(crate) enum Source<T> {
    /// Plain value box, written with `set`.
    Stored,
    /// Computed by a callback. `view` marks read-only sub-slots.
    Procedural { compute: ComputeFn<T>, view: bool },
}

pub(crate) struct Controller<T: SlotValue> {
    pub(crate) id: SlotId,
    pub(crate) slot: Weak<SlotInner<T>>,
}

pub(crate) struct SlotState<T: SlotValue> {
    /// `None` only for procedural slots that have never been computed.
    pub(crate) value: Option<T>,
    pub(crate) valid: bool,
    pub(crate) controller: Option<Controller<T>>,
    pub(crate) dependents: SmallVec<[Edge; 4]>,
    /// Inputs read by the last run of the compute callback.
    pub(crate) inputs: SmallVec<[Edge; 4]>,
    /// Inputs declared explicitly; they survive re-tracking.
    pub(crate) pinned: SmallVec<[Edge; 2]>,
    pub(crate) group: Option<GroupBinding>,
    /// Epoch of the last invalidation walk that reached this slot.
    pub(crate) walk: u64,
}

impl<T: SlotValue> SlotState<T> {
    /// A stale slot can only be refreshed if something upstream produces
    /// its value.
    fn is_recomputable(&self, source: &Source<T>) -> bool {
        self.controller.is_some() || matches!(source, Source::Procedural { .. })
    }

    fn live_dependents(&mut self) -> Vec<Arc<dyn SlotNode>> {
        let mut live = Vec::with_capacity(self.dependents.len());
        self.dependents.retain(|edge| match edge.upgrade() {
            Some(node) => {
                live.push(node);
                true
            }
            None => false,
        });
        live
    }
}

/// Shared state behind every handle to one slot.
pub(crate) struct SlotInner<T: SlotValue> {
    pub(crate) id: SlotId,
    pub(crate) me: Weak<SlotInner<T>>,
    pub(crate) config: SlotConfig,
    pub(crate) source: Source<T>,
    pub(crate) state: Mutex<SlotState<T>>,
}

/// A typed, cacheable value holder: the atomic unit of the dependency graph.
///
/// Handles are cheap to clone and share one underlying slot.
///
/// # Example
///
/// ```rust
/// use tether_core::slot::{connect, Slot};
///
/// let source = Slot::new(1.0_f64);
/// let mirror = Slot::new(0.0_f64);
/// connect(&source, &mirror).unwrap();
///
/// source.set(5.0).unwrap();
/// assert_eq!(mirror.get().unwrap(), 5.0);
/// ```
pub struct Slot<T: SlotValue> {
    pub(crate) inner: Arc<SlotInner<T>>,
}

impl<T: SlotValue> Slot<T> {
    /// Create a plain slot holding `value`.
    pub fn new(value: T) -> Self {
        Self::with_config(value, SlotConfig::default())
    }

    /// Create a plain slot with an explicit configuration.
    pub fn with_config(value: T, config: SlotConfig) -> Self {
        Self::build(Some(value), true, Source::Stored, config)
    }

    pub(crate) fn build(value: Option<T>, valid: bool, source: Source<T>, config: SlotConfig) -> Self {
        let inner = Arc::new_cyclic(|me| SlotInner {
            id: SlotId::new(),
            me: me.clone(),
            config,
            source,
            state: Mutex::new(SlotState {
                value,
                valid,
                controller: None,
                dependents: SmallVec::new(),
                inputs: SmallVec::new(),
                pinned: SmallVec::new(),
                group: None,
                walk: 0,
            }),
        });
        Self { inner }
    }

    pub(crate) fn from_inner(inner: Arc<SlotInner<T>>) -> Self {
        Self { inner }
    }

    /// Get the slot's unique ID.
    pub fn id(&self) -> SlotId {
        self.inner.id
    }

    /// The runtime kind of the value type.
    pub fn kind(&self) -> ValueKind {
        T::kind()
    }

    pub fn node_kind(&self) -> NodeKind {
        self.inner.node_kind()
    }

    /// Get the current value, recomputing it first if the cache is stale.
    ///
    /// When called from inside a procedural slot's callback, the procedural
    /// slot is registered as a dependent of this slot.
    pub fn get(&self) -> Result<T> {
        self.inner.get()
    }

    /// Like [`get`](Self::get), without registering a dependency.
    pub fn get_untracked(&self) -> Result<T> {
        EvalContext::untracked(|| self.inner.get())
    }

    /// The stored value, whether or not the cache is valid. Never evaluates.
    pub fn peek(&self) -> Option<T> {
        self.inner.state.lock().value.clone()
    }

    /// Set a new value and notify dependents.
    ///
    /// Fails with [`SlotError::AlreadyControlled`] while the slot has a
    /// controller, and with [`SlotError::ReadOnlyViolation`] for computed
    /// slots and read-only sub-slots.
    pub fn set(&self, value: T) -> Result<()> {
        self.inner.set(value)
    }

    /// Update the value using a function of the current value.
    pub fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&T) -> T,
    {
        let current = self.get_untracked()?;
        self.set(f(&current))
    }

    /// External trigger: treat this slot's value as changed.
    ///
    /// A slot that can recompute (it has a controller or a compute callback)
    /// marks its cache stale. A plain slot keeps its value and just
    /// invalidates its dependents. Either way the notification is forwarded
    /// downstream.
    pub fn on_value_changed(&self) {
        self.inner.on_value_changed();
    }

    /// Internal trigger sent by dependency group `origin`.
    ///
    /// A participant of `origin` forwards it to its own dependents without
    /// calling back into the group. Every other slot handles it like
    /// [`on_value_changed`](Self::on_value_changed).
    pub fn on_dependent_value_changed(&self, origin: GroupId) {
        self.inner.on_dependent_value_changed(origin);
    }

    pub fn is_cache_valid(&self) -> bool {
        self.inner.is_cache_valid()
    }

    pub fn has_controller(&self) -> bool {
        self.inner.state.lock().controller.is_some()
    }

    pub fn controller_id(&self) -> Option<SlotId> {
        self.inner.controller_id()
    }

    /// Number of live dependents.
    pub fn dependent_count(&self) -> usize {
        self.inner.state.lock().live_dependents().len()
    }

    /// Ids of live dependents.
    pub fn dependent_ids(&self) -> Vec<SlotId> {
        self.inner.dependents().iter().map(|node| node.id()).collect()
    }

    /// The dependency group this slot participates in, if any.
    pub fn group_id(&self) -> Option<GroupId> {
        self.inner.state.lock().group.as_ref().map(|b| b.group.id())
    }

    /// Type-erased handle to the same slot.
    pub fn erase(&self) -> AnySlot {
        let node: Arc<dyn SlotNode> = self.inner.clone();
        AnySlot::from_node(node)
    }

    pub(crate) fn edge(&self) -> Edge {
        self.inner.edge()
    }
}

impl<T: SlotValue> Clone for Slot<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: SlotValue> Debug for Slot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Slot")
            .field("id", &self.inner.id)
            .field("value", &state.value)
            .field("cache_valid", &state.valid)
            .field("controller", &state.controller.as_ref().map(|c| c.id))
            .field("dependents", &state.dependents)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Core protocol
// ----------------------------------------------------------------------------

impl<T: SlotValue> SlotInner<T> {
    pub(crate) fn edge(&self) -> Edge {
        let node: Weak<dyn SlotNode> = self.me.clone();
        Edge { id: self.id, node }
    }

    fn is_procedural(&self) -> bool {
        matches!(self.source, Source::Procedural { .. })
    }

    pub(crate) fn get(&self) -> Result<T> {
        if let Some(observer) = EvalContext::record_read(&self.edge()) {
            self.add_dependent_edge(observer);
        }

        {
            let state = self.state.lock();
            if state.valid {
                if let Some(value) = &state.value {
                    return Ok(value.clone());
                }
            }
        }

        let group = self.state.lock().group.clone();
        match group {
            Some(binding) => binding.group.resolve()?,
            None => self.refresh_cache()?,
        }

        let state = self.state.lock();
        match (&state.value, state.valid) {
            (Some(value), true) => Ok(value.clone()),
            _ => Err(SlotError::consistency(self.id, "cache still stale after refresh")),
        }
    }

    /// Refresh a stale cache from the controller or the compute callback.
    pub(crate) fn refresh_cache(&self) -> Result<()> {
        let controller = {
            let state = self.state.lock();
            if state.valid && state.value.is_some() {
                return Ok(());
            }
            state.controller.as_ref().map(|c| (c.id, c.slot.upgrade()))
        };

        match controller {
            Some((controller_id, Some(controller))) => {
                let _frame = EvalContext::enter(self.id, None)?;
                trace!(slot = %self.id, controller = %controller_id, "pulling from controller");
                let value = controller.get()?;
                self.store(value);
                Ok(())
            }
            Some((controller_id, None)) => Err(SlotError::consistency(
                self.id,
                format!("controller {controller_id} is gone"),
            )),
            None => match &self.source {
                Source::Procedural { compute, .. } => self.recompute(compute),
                Source::Stored => Err(SlotError::consistency(
                    self.id,
                    "stale slot has no controller and no compute source",
                )),
            },
        }
    }

    /// Store a freshly pulled value and mark the cache valid.
    pub(crate) fn store(&self, value: T) {
        let mut state = self.state.lock();
        state.value = Some(value);
        state.valid = true;
    }

    fn set(&self, value: T) -> Result<()> {
        if let Source::Procedural { view, .. } = &self.source {
            let reason = if *view {
                "read-only projection"
            } else {
                "computed slot"
            };
            return Err(SlotError::ReadOnlyViolation {
                slot: self.id,
                reason,
            });
        }

        let group = self.state.lock().group.clone();
        if let Some(binding) = &group {
            binding.group.check_writable(binding.index)?;
        }

        let walk = InvalidationWalk::enter();
        let previous = {
            let mut state = self.state.lock();
            if state.controller.is_some() {
                return Err(SlotError::AlreadyControlled { slot: self.id });
            }
            let changed = match self.config.notify {
                NotifyPolicy::Always => true,
                NotifyPolicy::OnChange => !state.valid || state.value.as_ref() != Some(&value),
            };
            if !changed {
                trace!(slot = %self.id, "value unchanged, skipping notification");
                return Ok(());
            }
            let previous = (state.value.replace(value), state.valid);
            state.valid = true;
            state.walk = walk.epoch();
            previous
        };

        if let Some(binding) = group {
            if let Err(err) = binding.group.slot_changed(binding.index) {
                // The siblings were not brought in line; put the old value back
                // so the group stays consistent.
                let mut state = self.state.lock();
                (state.value, state.valid) = previous;
                return Err(err);
            }
        }
        self.notify_dependents();
        Ok(())
    }

    /// Invalidate every dependent.
    pub(crate) fn notify_dependents(&self) {
        let dependents = self.state.lock().live_dependents();
        for dependent in dependents {
            dependent.on_value_changed();
        }
    }

    fn notify_dependents_internal(&self, origin: GroupId) {
        let dependents = self.state.lock().live_dependents();
        for dependent in dependents {
            dependent.on_dependent_value_changed(origin);
        }
    }

    pub(crate) fn on_value_changed(&self) {
        let walk = InvalidationWalk::enter();
        let (recomputable, group) = {
            let mut state = self.state.lock();
            let recomputable = state.is_recomputable(&self.source);
            let visited = state.walk == walk.epoch();
            match (recomputable, state.valid) {
                (true, true) => state.valid = false,
                // A stale group primary still tells its group that the source
                // moved, so views written since the last read are dropped.
                (true, false) if !visited && state.group.is_some() => {}
                (true, false) => return,
                (false, _) if visited => return,
                (false, _) => {}
            }
            state.walk = walk.epoch();
            (recomputable, state.group.clone())
        };
        trace!(slot = %self.id, recomputable, "value changed");

        if let Some(binding) = group {
            if recomputable {
                binding.group.participant_invalidated(binding.index);
            } else if let Err(err) = binding.group.slot_changed(binding.index) {
                warn!(slot = %self.id, error = %err, "dependency group rejected change");
            }
        }
        self.notify_dependents();
    }

    pub(crate) fn on_dependent_value_changed(&self, origin: GroupId) {
        let walk = InvalidationWalk::enter();
        let own_group = {
            let mut state = self.state.lock();
            let own_group = state
                .group
                .as_ref()
                .is_some_and(|binding| binding.group.id() == origin);
            if own_group {
                if state.walk == walk.epoch() {
                    return;
                }
                state.walk = walk.epoch();
            }
            own_group
        };

        if own_group {
            trace!(slot = %self.id, group = %origin, "sibling changed");
            self.notify_dependents_internal(origin);
        } else {
            self.on_value_changed();
        }
    }
}

// ----------------------------------------------------------------------------
// Type-erased node
// ----------------------------------------------------------------------------

impl<T: SlotValue> SlotNode for SlotInner<T> {
    fn id(&self) -> SlotId {
        self.id
    }

    fn value_kind(&self) -> ValueKind {
        T::kind()
    }

    fn node_kind(&self) -> NodeKind {
        match &self.source {
            Source::Stored => NodeKind::Stored,
            Source::Procedural { view: false, .. } => NodeKind::Procedural,
            Source::Procedural { view: true, .. } => NodeKind::ReadOnlyView,
        }
    }

    fn is_cache_valid(&self) -> bool {
        self.state.lock().valid
    }

    fn controller_id(&self) -> Option<SlotId> {
        self.state.lock().controller.as_ref().map(|c| c.id)
    }

    fn controller_node(&self) -> Option<Arc<dyn SlotNode>> {
        let controller: Arc<dyn SlotNode> = self.state.lock().controller.as_ref()?.slot.upgrade()?;
        Some(controller)
    }

    fn dependents(&self) -> Vec<Arc<dyn SlotNode>> {
        self.state.lock().live_dependents()
    }

    fn group(&self) -> Option<GroupBinding> {
        self.state.lock().group.clone()
    }

    fn on_value_changed(&self) {
        SlotInner::on_value_changed(self);
    }

    fn on_dependent_value_changed(&self, origin: GroupId) {
        SlotInner::on_dependent_value_changed(self, origin);
    }

    fn refresh(&self) -> Result<()> {
        self.refresh_cache()
    }

    fn invalidate_quiet(&self) -> bool {
        let mut state = self.state.lock();
        std::mem::replace(&mut state.valid, false)
    }

    fn add_dependent_edge(&self, edge: Edge) {
        if edge.id == self.id {
            return;
        }
        let mut state = self.state.lock();
        if !state.dependents.iter().any(|e| e.id == edge.id) {
            state.dependents.push(edge);
        }
    }

    fn drop_dependent_edge(&self, id: SlotId) {
        self.state.lock().dependents.retain(|e| e.id != id);
    }

    fn forget_source(&self, id: SlotId) {
        let mut state = self.state.lock();
        if state.controller.as_ref().is_some_and(|c| c.id == id) {
            state.controller = None;
            if state.value.is_some() {
                state.valid = true;
            }
            debug!(slot = %self.id, controller = %id, "controller detached");
        }
        state.inputs.retain(|e| e.id != id);
        state.pinned.retain(|e| e.id != id);
    }

    fn pin_input(&self, edge: Edge) {
        let mut state = self.state.lock();
        if !state.pinned.iter().any(|e| e.id == edge.id) {
            state.pinned.push(edge);
        }
    }

    fn accept_controller(&self, controller: Arc<dyn SlotNode>) -> Result<()> {
        let found = controller.value_kind();
        let controller = controller
            .into_any()
            .downcast::<SlotInner<T>>()
            .map_err(|_| SlotError::TypeMismatch {
                expected: T::kind(),
                found,
            })?;
        let me = self
            .me
            .upgrade()
            .ok_or_else(|| SlotError::consistency(self.id, "slot is being dropped"))?;
        super::connect::connect_inner(&controller, &me)
    }

    fn bind_group(&self, binding: GroupBinding) -> Result<()> {
        if self.is_procedural() {
            return Err(SlotError::InvalidGroupConfiguration(format!(
                "{} is computed and cannot join a group",
                self.id
            )));
        }
        let mut state = self.state.lock();
        if let Some(existing) = &state.group {
            return Err(SlotError::InvalidGroupConfiguration(format!(
                "{} already participates in {}",
                self.id,
                existing.group.id()
            )));
        }
        if binding.index != 0 && state.controller.is_some() {
            return Err(SlotError::InvalidGroupConfiguration(format!(
                "{} has a controller but is not the group's primary",
                self.id
            )));
        }
        state.group = Some(binding);
        Ok(())
    }

    fn unbind_group(&self, group: GroupId) {
        let mut state = self.state.lock();
        if state.group.as_ref().is_some_and(|b| b.group.id() == group) {
            state.group = None;
        }
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl<T: SlotValue> Drop for SlotInner<T> {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        let controller = state.controller.take();
        let dependents = std::mem::take(&mut state.dependents);
        let inputs: Vec<Edge> = state.inputs.drain(..).chain(state.pinned.drain(..)).collect();
        state.group = None;

        if let Some(controller) = controller.and_then(|c| c.slot.upgrade()) {
            controller.drop_dependent_edge(self.id);
        }
        for input in inputs.iter().filter_map(Edge::upgrade) {
            input.drop_dependent_edge(self.id);
        }
        for dependent in dependents.iter().filter_map(Edge::upgrade) {
            dependent.forget_source(self.id);
        }
        trace!(slot = %self.id, "slot dropped");
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
