//! Procedural Slots
//!
//! A procedural slot has no stored value of its own: its value is produced
//! by a callback, and the cache holds the last result until an input
//! changes. Procedural slots cannot be written and cannot be connected to a
//! controller.
//!
//! # Input Tracking
//!
//! While the callback runs, every slot it reads with [`Slot::get`] adds the
//! procedural slot to its dependents. After each run the set of inputs is
//! replaced by what was actually read, so an input that stops being read
//! (say, behind a branch) no longer invalidates the slot. Inputs declared
//! up front through [`Slot::procedural_with_inputs`] or
//! [`Slot::add_dependent`] stay subscribed regardless.

use std::sync::Weak;

use smallvec::SmallVec;
use tracing::{trace, warn};

use super::cell::{ComputeFn, SlotInner, Source};
use super::context::EvalContext;
use super::node::{AnySlot, Edge, SlotNode};
use super::{Slot, SlotValue};
use crate::config::SlotConfig;
use crate::error::Result;

impl<T: SlotValue> Slot<T> {
    /// Create a slot computed by `f`.
    ///
    /// The callback runs lazily, on the first read and on the first read
    /// after any input changed.
    ///
    /// # Example
    ///
    /// ```rust
    /// use tether_core::slot::Slot;
    ///
    /// let a = Slot::new(2_i64);
    /// let b = Slot::new(3_i64);
    /// let sum = {
    ///     let (a, b) = (a.clone(), b.clone());
    ///     Slot::procedural(move || Ok(a.get()? + b.get()?))
    /// };
    ///
    /// assert_eq!(sum.get().unwrap(), 5);
    /// a.set(10).unwrap();
    /// assert_eq!(sum.get().unwrap(), 13);
    /// ```
    pub fn procedural<F>(f: F) -> Self
    where
        F: Fn() -> Result<T> + Send + Sync + 'static,
    {
        Self::procedural_with_config(SlotConfig::default(), f)
    }

    pub fn procedural_with_config<F>(config: SlotConfig, f: F) -> Self
    where
        F: Fn() -> Result<T> + Send + Sync + 'static,
    {
        let compute: ComputeFn<T> = std::sync::Arc::new(f);
        Self::build(
            None,
            false,
            Source::Procedural {
                compute,
                view: false,
            },
            config,
        )
    }

    /// Create a procedural slot with inputs declared up front.
    ///
    /// The declared inputs invalidate the slot even if the callback reads
    /// them untracked or not at all.
    pub fn procedural_with_inputs<F>(inputs: &[AnySlot], f: F) -> Self
    where
        F: Fn() -> Result<T> + Send + Sync + 'static,
    {
        let slot = Self::procedural(f);
        for input in inputs {
            slot.pin(input);
        }
        slot
    }

    /// Create a read-only view of `master` through `get`.
    ///
    /// Writing to the view fails with a read-only error; reading it always
    /// goes through the master's own pull.
    pub fn projection<M, G>(master: &Slot<M>, get: G) -> Self
    where
        M: SlotValue,
        G: Fn(&M) -> T + Send + Sync + 'static,
    {
        let source = master.clone();
        let compute: ComputeFn<T> = std::sync::Arc::new(move || source.get().map(|m| get(&m)));
        let view = Self::build(
            None,
            false,
            Source::Procedural {
                compute,
                view: true,
            },
            master.inner.config,
        );
        view.pin(&master.erase());
        view
    }

    /// Subscribe this slot to `input` permanently.
    pub(crate) fn pin(&self, input: &AnySlot) {
        input.node.add_dependent_edge(self.edge());
        self.inner.pin_input(input.edge());
    }
}

impl<T: SlotValue> SlotInner<T> {
    /// Run the compute callback and store its result.
    ///
    /// On failure the cache stays stale and the error is returned to the
    /// reader.
    pub(crate) fn recompute(&self, compute: &ComputeFn<T>) -> Result<()> {
        let observer: Weak<dyn SlotNode> = self.me.clone();
        let frame = EvalContext::enter(self.id, Some(observer))?;
        let result = compute();
        let reads = frame.reads();
        drop(frame);

        let value = match result {
            Ok(value) => value,
            Err(err) => {
                warn!(slot = %self.id, error = %err, "computation failed");
                // Inputs read before the failure already list this slot as a
                // dependent; keep them so the next run can unsubscribe them.
                let mut state = self.state.lock();
                for edge in reads {
                    if !state.inputs.iter().any(|e| e.id == edge.id) {
                        state.inputs.push(edge);
                    }
                }
                return Err(err);
            }
        };

        let stale: SmallVec<[Edge; 4]> = {
            let mut state = self.state.lock();
            state.value = Some(value);
            state.valid = true;
            let previous = std::mem::replace(&mut state.inputs, reads);
            previous
                .into_iter()
                .filter(|old| {
                    !state.inputs.iter().any(|e| e.id == old.id)
                        && !state.pinned.iter().any(|e| e.id == old.id)
                })
                .collect()
        };
        trace!(slot = %self.id, dropped_inputs = stale.len(), "recomputed");

        for input in stale.iter().filter_map(Edge::upgrade) {
            input.drop_dependent_edge(self.id);
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SlotError;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Arc;

    #[test]
    fn procedural_computes_lazily() {
        let count = Arc::new(AtomicI32::new(0));
        let count_clone = count.clone();

        let a = Slot::new(1_i64);
        let a_clone = a.clone();
        let doubled = Slot::procedural(move || {
            count_clone.fetch_add(1, Ordering::SeqCst);
            Ok(a_clone.get()? * 2)
        });

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(doubled.get().unwrap(), 2);
        assert_eq!(doubled.get().unwrap(), 2);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        a.set(5).unwrap();
        a.set(6).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(doubled.get().unwrap(), 12);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn procedural_rejects_writes() {
        let slot = Slot::procedural(|| Ok(1_i64));
        assert!(matches!(
            slot.set(2),
            Err(SlotError::ReadOnlyViolation { reason: "computed slot", .. })
        ));
    }

    #[test]
    fn unread_inputs_are_unsubscribed() {
        let flag = Slot::new(true);
        let a = Slot::new(1_i64);
        let b = Slot::new(2_i64);

        let (f, x, y) = (flag.clone(), a.clone(), b.clone());
        let pick = Slot::procedural(move || if f.get()? { x.get() } else { y.get() });

        assert_eq!(pick.get().unwrap(), 1);
        assert_eq!(a.dependent_count(), 1);
        assert_eq!(b.dependent_count(), 0);

        flag.set(false).unwrap();
        assert_eq!(pick.get().unwrap(), 2);
        assert_eq!(a.dependent_count(), 0);
        assert_eq!(b.dependent_count(), 1);

        a.set(10).unwrap();
        assert!(pick.is_cache_valid());
    }

    #[test]
    fn pinned_inputs_survive_retracking() {
        let a = Slot::new(1_i64);
        let slot = Slot::procedural_with_inputs(&[a.erase()], || Ok(0_i64));

        assert_eq!(slot.get().unwrap(), 0);
        assert_eq!(a.dependent_count(), 1);

        a.set(2).unwrap();
        assert!(!slot.is_cache_valid());
    }

    #[test]
    fn failed_computation_leaves_cache_stale() {
        let fail = Slot::new(true);
        let f = fail.clone();
        let slot = Slot::procedural(move || {
            if f.get()? {
                Err(SlotError::compute("not ready"))
            } else {
                Ok(1_i64)
            }
        });

        assert_eq!(slot.get(), Err(SlotError::Compute("not ready".into())));
        assert!(!slot.is_cache_valid());

        fail.set(false).unwrap();
        assert_eq!(slot.get().unwrap(), 1);
    }

    #[test]
    fn inputs_read_before_a_failure_are_unsubscribed_later() {
        let fail = Slot::new(true);
        let a = Slot::new(1_i64);
        let (f, x) = (fail.clone(), a.clone());
        let slot = Slot::procedural(move || {
            if f.get()? {
                x.get()?;
                Err(SlotError::compute("not ready"))
            } else {
                Ok(0_i64)
            }
        });

        assert!(slot.get().is_err());
        assert_eq!(a.dependent_count(), 1);

        fail.set(false).unwrap();
        assert_eq!(slot.get().unwrap(), 0);
        assert_eq!(a.dependent_count(), 0);

        a.set(2).unwrap();
        assert!(slot.is_cache_valid());
    }

    #[test]
    fn self_read_is_reentrant() {
        let holder: Arc<parking_lot::Mutex<Option<Slot<i64>>>> = Arc::default();
        let h = holder.clone();
        let slot = Slot::procedural(move || {
            let me = h.lock().clone();
            match me {
                Some(me) => me.get(),
                None => Ok(0),
            }
        });
        *holder.lock() = Some(slot.clone());

        assert_eq!(slot.get(), Err(SlotError::Reentrant { slot: slot.id() }));
        holder.lock().take();
    }

    #[test]
    fn projection_reads_master() {
        let master = Slot::new(crate::slot::Vec3::new(1.0, 2.0, 3.0));
        let y = Slot::projection(&master, |v| v.y);

        assert_eq!(y.get().unwrap(), 2.0);
        master.set(crate::slot::Vec3::new(0.0, 5.0, 0.0)).unwrap();
        assert!(!y.is_cache_valid());
        assert_eq!(y.get().unwrap(), 5.0);
        assert!(matches!(
            y.set(1.0),
            Err(SlotError::ReadOnlyViolation { reason: "read-only projection", .. })
        ));
    }
}
