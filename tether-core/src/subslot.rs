//! Sub-slot Views
//!
//! A sub-slot is a slot holding one fragment of a master slot's composite
//! value: the `x` of a vector, the translation of a matrix, one element of
//! an array.
//!
//! # Read-only Views
//!
//! A read-only view is a computed slot deriving its value from
//! `master.get()`. It is an ordinary dependent of the master and rejects
//! writes with [`SlotError::ReadOnlyViolation`].
//!
//! # Write-capable Views
//!
//! Write-capable views are bound with their master into a
//! [`DependencyGroup`], the master as primary:
//!
//! - Writing a view marks it dirty (newer than the master) and invalidates
//!   the master and the other clean views. Nothing is merged yet.
//! - Reading the stale master merges every dirty view into its stored value.
//! - Writing the master re-projects every view and clears the dirty flags.
//!
//! ```rust
//! use tether_core::slot::{Slot, Vec3};
//! use tether_core::subslot::SubSlots;
//!
//! let position = Slot::new(Vec3::new(1.0, 2.0, 3.0));
//! let mut views = SubSlots::new(&position);
//! let x = views.writable(|v: &Vec3| v.x, |v, x| v.x = *x).unwrap();
//! let y = views.read_only(|v: &Vec3| v.y);
//! let _group = views.bind().unwrap();
//!
//! x.set(10.0).unwrap();
//! assert_eq!(position.get().unwrap(), Vec3::new(10.0, 2.0, 3.0));
//! assert!(y.set(0.0).is_err());
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Result, SlotError};
use crate::interdep::{DependencyController, DependencyGroup, Participant};
use crate::slot::{AnySlot, Slot, SlotId, SlotValue};

type Getter<M, F> = Arc<dyn Fn(&M) -> F + Send + Sync>;
type Putter<M, F> = Arc<dyn Fn(&mut M, &F) + Send + Sync>;

/// A write-capable view as seen by the master's controller, with the
/// fragment type erased.
trait ViewBinding<M: SlotValue>: Send + Sync {
    fn id(&self) -> SlotId;

    /// Overwrite the view with its fragment of `master`.
    fn project(&self, master: &M);

    /// Write the view's value into its fragment of `master`.
    fn merge_into(&self, master: &mut M) -> Result<()>;

    fn is_valid(&self) -> bool;

    fn invalidate(&self);

    fn dirty(&self) -> &AtomicBool;
}

struct View<M, F: SlotValue> {
    slot: Participant<F>,
    get: Getter<M, F>,
    put: Putter<M, F>,
    dirty: AtomicBool,
}

impl<M: SlotValue, F: SlotValue> ViewBinding<M> for View<M, F> {
    fn id(&self) -> SlotId {
        self.slot.id()
    }

    fn project(&self, master: &M) {
        self.slot.assign((self.get)(master));
    }

    fn merge_into(&self, master: &mut M) -> Result<()> {
        let fragment = self.slot.peek()?;
        (self.put)(master, &fragment);
        Ok(())
    }

    fn is_valid(&self) -> bool {
        self.slot.is_valid()
    }

    fn invalidate(&self) {
        self.slot.invalidate();
    }

    fn dirty(&self) -> &AtomicBool {
        &self.dirty
    }
}

/// Keeps a master and its write-capable views in sync. The master is
/// participant 0, view `i` is participant `i + 1`.
struct CompositeController<M: SlotValue> {
    master: Participant<M>,
    views: Vec<Box<dyn ViewBinding<M>>>,
}

impl<M: SlotValue> CompositeController<M> {
    fn view(&self, index: usize) -> Result<&dyn ViewBinding<M>> {
        index
            .checked_sub(1)
            .and_then(|i| self.views.get(i))
            .map(|view| &**view)
            .ok_or_else(|| {
                SlotError::consistency(self.master.id(), format!("no sub-slot view at {index}"))
            })
    }
}

impl<M: SlotValue> DependencyController for CompositeController<M> {
    fn slot_changed(&self, changed: usize) -> Result<()> {
        if changed == 0 {
            let master = self.master.peek()?;
            for view in &self.views {
                view.dirty().store(false, Ordering::Release);
                view.project(&master);
            }
            return Ok(());
        }

        let written = self.view(changed)?;
        written.dirty().store(true, Ordering::Release);
        self.master.invalidate();
        for view in &self.views {
            if view.id() != written.id() && !view.dirty().load(Ordering::Acquire) {
                view.invalidate();
            }
        }
        Ok(())
    }

    fn update_all(&self) -> Result<()> {
        let master = if self.master.is_valid() {
            self.master.peek()?
        } else {
            let mut master = self.master.peek()?;
            for view in &self.views {
                if view.dirty().swap(false, Ordering::AcqRel) {
                    view.merge_into(&mut master)?;
                }
            }
            self.master.assign(master.clone());
            master
        };

        for view in &self.views {
            if !view.is_valid() {
                view.project(&master);
            }
        }
        Ok(())
    }

    fn participant_invalidated(&self, _index: usize) {
        // The master's controller is now the newest source.
        for view in &self.views {
            view.dirty().store(false, Ordering::Release);
        }
    }
}

/// Builder for the sub-slot views of one master slot.
pub struct SubSlots<M: SlotValue> {
    label: String,
    master: Slot<M>,
    views: Vec<Box<dyn ViewBinding<M>>>,
    slots: Vec<AnySlot>,
}

impl<M: SlotValue> SubSlots<M> {
    pub fn new(master: &Slot<M>) -> Self {
        Self {
            label: format!("subslots of {}", master.id()),
            master: master.clone(),
            views: Vec::new(),
            slots: Vec::new(),
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Create a write-capable view. `get` extracts the fragment from the
    /// master value, `put` writes it back.
    ///
    /// The view is live once [`bind`](Self::bind) succeeds.
    pub fn writable<F, G, P>(&mut self, get: G, put: P) -> Result<Slot<F>>
    where
        F: SlotValue,
        G: Fn(&M) -> F + Send + Sync + 'static,
        P: Fn(&mut M, &F) + Send + Sync + 'static,
    {
        let initial = self.master.peek().map(|m| get(&m)).ok_or_else(|| {
            SlotError::InvalidGroupConfiguration(format!(
                "{} has no stored value to project",
                self.master.id()
            ))
        })?;
        let slot = Slot::with_config(initial, self.master.inner.config);
        self.views.push(Box::new(View {
            slot: Participant::new(&slot),
            get: Arc::new(get),
            put: Arc::new(put),
            dirty: AtomicBool::new(false),
        }));
        self.slots.push(slot.erase());
        Ok(slot)
    }

    /// Create a read-only view. It is live immediately.
    pub fn read_only<F, G>(&self, get: G) -> Slot<F>
    where
        F: SlotValue,
        G: Fn(&M) -> F + Send + Sync + 'static,
    {
        Slot::projection(&self.master, get)
    }

    /// Bind the master and its write-capable views.
    ///
    /// Fails with [`SlotError::InvalidGroupConfiguration`] when no
    /// write-capable view was created.
    pub fn bind(self) -> Result<DependencyGroup> {
        if self.views.is_empty() {
            return Err(SlotError::InvalidGroupConfiguration(format!(
                "'{}' has no write-capable views",
                self.label
            )));
        }
        let mut participants = Vec::with_capacity(self.slots.len() + 1);
        participants.push(self.master.erase());
        participants.extend(self.slots);

        let controller = CompositeController {
            master: Participant::new(&self.master),
            views: self.views,
        };
        DependencyGroup::new(self.label, controller, participants)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slot::{connect, Mat4, Vec3};

    fn xyz(master: &Slot<Vec3>) -> (Slot<f64>, Slot<f64>, Slot<f64>, DependencyGroup) {
        let mut views = SubSlots::new(master);
        let x = views.writable(|v: &Vec3| v.x, |v, x| v.x = *x).unwrap();
        let y = views.writable(|v: &Vec3| v.y, |v, y| v.y = *y).unwrap();
        let z = views.writable(|v: &Vec3| v.z, |v, z| v.z = *z).unwrap();
        let group = views.bind().unwrap();
        (x, y, z, group)
    }

    #[test]
    fn view_write_merges_into_master() {
        let master = Slot::new(Vec3::new(1.0, 2.0, 3.0));
        let (x, y, z, _group) = xyz(&master);

        x.set(10.0).unwrap();
        assert_eq!(x.get().unwrap(), 10.0);
        assert!(!master.is_cache_valid());
        assert_eq!(master.get().unwrap(), Vec3::new(10.0, 2.0, 3.0));
        assert_eq!(y.get().unwrap(), 2.0);
        assert_eq!(z.get().unwrap(), 3.0);
    }

    #[test]
    fn two_dirty_views_merge_together() {
        let master = Slot::new(Vec3::ZERO);
        let (x, y, _z, _group) = xyz(&master);

        x.set(1.0).unwrap();
        y.set(2.0).unwrap();
        assert_eq!(master.get().unwrap(), Vec3::new(1.0, 2.0, 0.0));
    }

    #[test]
    fn master_write_reprojects_views() {
        let master = Slot::new(Vec3::ZERO);
        let (x, _y, z, _group) = xyz(&master);

        x.set(5.0).unwrap();
        master.set(Vec3::new(7.0, 8.0, 9.0)).unwrap();
        assert_eq!(x.get().unwrap(), 7.0);
        assert_eq!(z.get().unwrap(), 9.0);
        assert_eq!(master.get().unwrap(), Vec3::new(7.0, 8.0, 9.0));
    }

    #[test]
    fn master_dependents_see_view_writes() {
        let master = Slot::new(Vec3::ZERO);
        let (_x, y, _z, _group) = xyz(&master);
        let follower = Slot::new(Vec3::ZERO);
        connect(&master, &follower).unwrap();
        assert_eq!(follower.get().unwrap(), Vec3::ZERO);

        y.set(4.0).unwrap();
        assert!(!follower.is_cache_valid());
        assert_eq!(follower.get().unwrap(), Vec3::new(0.0, 4.0, 0.0));
    }

    #[test]
    fn read_only_view_follows_master() {
        let master = Slot::new(Mat4::IDENTITY);
        let mut views = SubSlots::new(&master);
        let translation = views.writable(Mat4::translation, |m, t| *m = m.with_translation(*t)).unwrap();
        let row = views.read_only(|m: &Mat4| m.cols[3][1]);
        let _group = views.bind().unwrap();

        translation.set(Vec3::new(0.0, 3.0, 0.0)).unwrap();
        assert_eq!(row.get().unwrap(), 3.0);

        assert!(matches!(row.set(1.0), Err(SlotError::ReadOnlyViolation { .. })));
        assert_eq!(master.get().unwrap().translation(), Vec3::new(0.0, 3.0, 0.0));
    }

    #[test]
    fn driven_master_makes_views_read_only() {
        let source = Slot::new(Vec3::ZERO);
        let master = Slot::new(Vec3::ZERO);
        let (x, _y, _z, _group) = xyz(&master);
        connect(&source, &master).unwrap();

        source.set(Vec3::new(3.0, 0.0, 0.0)).unwrap();
        assert_eq!(x.get().unwrap(), 3.0);
        assert_eq!(x.set(1.0), Err(SlotError::AlreadyControlled { slot: x.id() }));
    }

    #[test]
    fn connecting_a_driver_discards_pending_view_writes() {
        let master = Slot::new(Vec3::ZERO);
        let (x, y, _z, _group) = xyz(&master);

        x.set(5.0).unwrap();
        let source = Slot::new(Vec3::new(1.0, 2.0, 3.0));
        connect(&source, &master).unwrap();

        assert_eq!(master.get().unwrap(), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(x.get().unwrap(), 1.0);
        assert_eq!(y.get().unwrap(), 2.0);
    }

    #[test]
    fn bind_without_writable_views_fails() {
        let master = Slot::new(Vec3::ZERO);
        let views = SubSlots::new(&master);
        let _ro = views.read_only(|v: &Vec3| v.x);
        assert!(matches!(views.bind(), Err(SlotError::InvalidGroupConfiguration(_))));
    }
}
