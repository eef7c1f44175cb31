//! Dependency Groups
//!
//! Some slots are algebraically linked in both directions: a transform
//! matrix and its position, rotation and scale parts can each be written,
//! and writing any one of them changes the others. Modelling that with
//! controller edges would create cycles, so such slots are instead bound
//! into a [`DependencyGroup`] whose [`DependencyController`] keeps them in
//! sync. No edges are created between participants.
//!
//! # Notification
//!
//! Participants distinguish two triggers:
//!
//! - **External** (`on_value_changed`): something outside the group changed
//!   the participant. The group runs the controller's change handler, which
//!   writes the new values of the other participants.
//! - **Internal** (`on_dependent_value_changed`): a sibling changed and the
//!   group already updated this participant. The participant forwards the
//!   notification to its own dependents and never calls back into the
//!   group.
//!
//! The split is what keeps a change to one participant from bouncing
//! around the group forever.
//!
//! # Primary Participant
//!
//! Participant `0` is the group's primary. It is the only participant that
//! may be connected to a controller. While it is, the group is driven from
//! outside: the other participants become stale whenever the primary does
//! and are recomputed from it on their next read, and writing them directly
//! fails.

mod transform;

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use tracing::{debug, trace, warn};

use crate::error::{Result, SlotError};
use crate::slot::{AnySlot, Edge, GroupId, Slot, SlotId, SlotInner, SlotNode, SlotValue};

pub use transform::{TransformGroup, TransformGroupBuilder, TransformPart};

/// Keeps the participants of a group consistent with each other.
///
/// Implementations hold [`Participant`] handles to the slots they manage and
/// read and write them directly. The group calls the controller; it never
/// calls itself back while a handler runs.
pub trait DependencyController: Send + Sync + 'static {
    /// Participant `changed` has a new value. Recompute and assign every
    /// other participant.
    ///
    /// Returning an error from a `set` puts the previous value back on the
    /// changed participant; nothing downstream is notified.
    fn slot_changed(&self, changed: usize) -> Result<()>;

    /// Bring every stale participant up to date from the valid ones.
    ///
    /// Called when a stale participant is read. If the primary was stale it
    /// has already been refreshed from its controller.
    fn update_all(&self) -> Result<()>;

    /// Participant `index` went stale because its controller changed. The
    /// group invalidates the other participants after this returns.
    fn participant_invalidated(&self, _index: usize) {}
}

pub(crate) struct GroupInner {
    id: GroupId,
    label: String,
    members: Vec<Edge>,
    controller: Box<dyn DependencyController>,
    busy: AtomicBool,
}

/// Marks the group busy while a handler runs.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl GroupInner {
    pub(crate) fn id(&self) -> GroupId {
        self.id
    }

    fn enter(&self) -> Result<BusyGuard<'_>> {
        if self.busy.swap(true, Ordering::AcqRel) {
            return Err(SlotError::ReentrantGroup { group: self.id });
        }
        Ok(BusyGuard(&self.busy))
    }

    /// Live participants in index order.
    pub(crate) fn member_nodes(&self) -> Vec<Arc<dyn SlotNode>> {
        self.members.iter().filter_map(Edge::upgrade).collect()
    }

    fn member(&self, index: usize) -> Option<Arc<dyn SlotNode>> {
        self.members.get(index).and_then(Edge::upgrade)
    }

    fn others(&self, index: usize) -> impl Iterator<Item = Arc<dyn SlotNode>> + '_ {
        self.members
            .iter()
            .enumerate()
            .filter(move |(i, _)| *i != index)
            .filter_map(|(_, edge)| edge.upgrade())
    }

    fn primary_is_driven(&self) -> bool {
        self.member(0).is_some_and(|primary| primary.controller_id().is_some())
    }

    /// Participants other than the primary are read-only while the primary
    /// has a controller.
    pub(crate) fn check_writable(&self, index: usize) -> Result<()> {
        if index != 0 && self.primary_is_driven() {
            let slot = self.members[index].id;
            return Err(SlotError::AlreadyControlled { slot });
        }
        Ok(())
    }

    /// External change on participant `index`, whose new value is already
    /// stored.
    pub(crate) fn slot_changed(&self, index: usize) -> Result<()> {
        let _busy = self.enter()?;
        trace!(group = %self.id, participant = index, "participant changed");

        if self.others(index).any(|node| !node.is_cache_valid()) {
            self.controller.update_all()?;
        }
        self.controller.slot_changed(index)?;

        for node in self.others(index) {
            node.on_dependent_value_changed(self.id);
        }
        Ok(())
    }

    /// Participant `index` went stale because its controller changed.
    pub(crate) fn participant_invalidated(&self, index: usize) {
        let Ok(_busy) = self.enter() else {
            warn!(group = %self.id, participant = index, "dropping invalidation to break a loop");
            return;
        };
        self.controller.participant_invalidated(index);

        for node in self.others(index) {
            if node.invalidate_quiet() {
                node.on_dependent_value_changed(self.id);
            }
        }
    }

    /// Read path for a stale participant.
    pub(crate) fn resolve(&self) -> Result<()> {
        let _busy = self.enter()?;
        if let Some(primary) = self.member(0) {
            if primary.controller_id().is_some() && !primary.is_cache_valid() {
                primary.refresh()?;
            }
        }
        trace!(group = %self.id, "updating participants");
        self.controller.update_all()
    }
}

/// A participant's link to its group.
#[derive(Clone)]
pub(crate) struct GroupBinding {
    pub(crate) group: Arc<GroupInner>,
    pub(crate) index: usize,
}

/// A set of interdependent slots kept consistent by one controller.
///
/// The group lives as long as any of its participants does.
#[derive(Clone)]
pub struct DependencyGroup {
    inner: Arc<GroupInner>,
}

impl DependencyGroup {
    /// Bind `participants` into a group managed by `controller`.
    ///
    /// `participants[0]` is the primary. Participant indices passed to the
    /// controller follow the order given here.
    ///
    /// # Errors
    ///
    /// [`SlotError::InvalidGroupConfiguration`] if fewer than two slots are
    /// given, a slot is listed twice or already belongs to a group, a
    /// non-primary slot has a controller, a slot is computed, or two
    /// participants are connected to each other.
    pub fn new(
        label: impl Into<String>,
        controller: impl DependencyController,
        participants: Vec<AnySlot>,
    ) -> Result<Self> {
        let label = label.into();
        if participants.len() < 2 {
            return Err(SlotError::InvalidGroupConfiguration(format!(
                "group '{label}' needs at least two participants, got {}",
                participants.len()
            )));
        }

        let ids: HashSet<SlotId> = participants.iter().map(AnySlot::id).collect();
        if ids.len() != participants.len() {
            return Err(SlotError::InvalidGroupConfiguration(format!(
                "group '{label}' lists a participant twice"
            )));
        }
        for slot in &participants {
            let linked = slot
                .node
                .dependents()
                .iter()
                .map(|node| node.id())
                .chain(slot.controller_id())
                .find(|id| ids.contains(id));
            if let Some(other) = linked {
                return Err(SlotError::InvalidGroupConfiguration(format!(
                    "{} and {other} are connected; participants of '{label}' cannot share edges",
                    slot.id()
                )));
            }
        }

        let inner = Arc::new(GroupInner {
            id: GroupId::new(),
            label,
            members: participants.iter().map(AnySlot::edge).collect(),
            controller: Box::new(controller),
            busy: AtomicBool::new(false),
        });

        for (index, slot) in participants.iter().enumerate() {
            let binding = GroupBinding {
                group: Arc::clone(&inner),
                index,
            };
            if let Err(err) = slot.node.bind_group(binding) {
                for bound in &participants[..index] {
                    bound.node.unbind_group(inner.id);
                }
                return Err(err);
            }
        }
        debug!(group = %inner.id, label = %inner.label, participants = participants.len(), "group bound");

        // Non-primary participants take their first value from the primary.
        for node in inner.others(0) {
            if node.invalidate_quiet() {
                node.on_dependent_value_changed(inner.id);
            }
        }

        Ok(Self { inner })
    }

    pub fn id(&self) -> GroupId {
        self.inner.id
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Number of participants, including dropped ones.
    pub fn len(&self) -> usize {
        self.inner.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.members.is_empty()
    }

    /// Participant ids in index order.
    pub fn participant_ids(&self) -> Vec<SlotId> {
        self.inner.members.iter().map(|edge| edge.id).collect()
    }

    /// Whether the primary is driven by a controller.
    pub fn is_driven(&self) -> bool {
        self.inner.primary_is_driven()
    }
}

impl fmt::Debug for DependencyGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyGroup")
            .field("id", &self.inner.id)
            .field("label", &self.inner.label)
            .field("participants", &self.participant_ids())
            .finish()
    }
}

/// A controller's handle to one participant.
///
/// Reads and writes go straight to the slot's cache and never notify, so a
/// controller can update participants without triggering itself.
pub struct Participant<T: SlotValue> {
    id: SlotId,
    slot: Weak<SlotInner<T>>,
}

impl<T: SlotValue> Participant<T> {
    pub fn new(slot: &Slot<T>) -> Self {
        Self {
            id: slot.id(),
            slot: Arc::downgrade(&slot.inner),
        }
    }

    pub fn id(&self) -> SlotId {
        self.id
    }

    fn inner(&self) -> Result<Arc<SlotInner<T>>> {
        self.slot
            .upgrade()
            .ok_or_else(|| SlotError::consistency(self.id, "participant was dropped"))
    }

    /// Whether the participant slot is still alive.
    pub fn is_alive(&self) -> bool {
        self.slot.strong_count() > 0
    }

    /// The cached value, valid or not.
    pub fn peek(&self) -> Result<T> {
        self.inner()?
            .state
            .lock()
            .value
            .clone()
            .ok_or_else(|| SlotError::consistency(self.id, "participant has no value"))
    }

    pub fn is_valid(&self) -> bool {
        self.slot
            .upgrade()
            .is_some_and(|slot| slot.state.lock().valid)
    }

    pub fn is_controlled(&self) -> bool {
        self.slot
            .upgrade()
            .is_some_and(|slot| slot.state.lock().controller.is_some())
    }

    /// Store `value` and mark the cache valid, without notifying anyone.
    ///
    /// A dropped participant is skipped.
    pub fn assign(&self, value: T) {
        if let Some(slot) = self.slot.upgrade() {
            slot.store(value);
        }
    }

    /// Mark the cache stale, without notifying anyone.
    pub fn invalidate(&self) {
        if let Some(slot) = self.slot.upgrade() {
            slot.state.lock().valid = false;
        }
    }
}

impl<T: SlotValue> Clone for Participant<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            slot: self.slot.clone(),
        }
    }
}

impl<T: SlotValue> fmt::Debug for Participant<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Participant").field(&self.id).finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
