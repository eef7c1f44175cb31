//! Evaluation Context
//!
//! The evaluation context tracks which slots are currently being pulled on
//! this thread. It serves two purposes:
//!
//! 1. **Re-entrancy detection.** A slot whose cache is being refreshed must
//!    not be pulled again before the refresh completes. Entering a frame
//!    for a slot that is already on the stack fails with
//!    [`SlotError::Reentrant`].
//!
//! 2. **Input tracking.** While a procedural slot runs its callback, every
//!    slot the callback reads is recorded against the procedural slot's
//!    frame, and the read slot registers the procedural slot as one of its
//!    dependents.
//!
//! # Implementation
//!
//! A thread-local stack of frames. Pulling a controlled slot pushes a
//! non-tracking frame, so reads performed on behalf of a controller chain
//! are not attributed to an outer procedural slot. Frames are popped by the
//! guard's `Drop`, which keeps the stack balanced when a callback returns an
//! error or panics.
//!
//! # Invalidation Walks
//!
//! A notification fan-out runs inside an [`InvalidationWalk`]. The outermost
//! walk on a thread draws a fresh epoch; nested walks join it. Each slot
//! records the epoch of the last walk that reached it, so a slot that is
//! reached again through a second path (or around a loop) is skipped.

use std::cell::{Cell, RefCell};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Weak;

use smallvec::SmallVec;

use super::node::{Edge, SlotNode};
use super::SlotId;
use crate::error::{Result, SlotError};

thread_local! {
    static EVAL_STACK: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
    static CURRENT_WALK: Cell<u64> = const { Cell::new(0) };
}

/// Epoch 0 means "never visited".
static NEXT_WALK: AtomicU64 = AtomicU64::new(1);

/// An entry in the evaluation stack.
struct Frame {
    /// The slot being evaluated, `None` for an untracked scope.
    slot: Option<SlotId>,
    /// Set when the frame belongs to a procedural slot that records inputs.
    observer: Option<Weak<dyn SlotNode>>,
    /// Slots read while this frame was innermost.
    reads: SmallVec<[Edge; 4]>,
}

/// Guard that pops its frame when dropped.
pub struct EvalContext {
    slot: Option<SlotId>,
}

impl EvalContext {
    /// Enter an evaluation frame for `slot`.
    ///
    /// When `observer` is given, reads made while this frame is innermost are
    /// recorded and reported to the observer's inputs.
    pub(crate) fn enter(slot: SlotId, observer: Option<Weak<dyn SlotNode>>) -> Result<Self> {
        EVAL_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.iter().any(|frame| frame.slot == Some(slot)) {
                return Err(SlotError::Reentrant { slot });
            }
            stack.push(Frame {
                slot: Some(slot),
                observer,
                reads: SmallVec::new(),
            });
            Ok(Self { slot: Some(slot) })
        })
    }

    /// Run `f` with input tracking suspended.
    pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
        EVAL_STACK.with(|stack| {
            stack.borrow_mut().push(Frame {
                slot: None,
                observer: None,
                reads: SmallVec::new(),
            });
        });
        let _guard = Self { slot: None };
        f()
    }

    /// Check if any slot is being evaluated on this thread.
    pub fn is_active() -> bool {
        EVAL_STACK.with(|stack| !stack.borrow().is_empty())
    }

    /// The innermost slot under evaluation, if any.
    pub fn current_slot() -> Option<SlotId> {
        EVAL_STACK.with(|stack| stack.borrow().last().and_then(|frame| frame.slot))
    }

    /// Number of nested frames.
    pub fn depth() -> usize {
        EVAL_STACK.with(|stack| stack.borrow().len())
    }

    /// Record that `read` was read by the innermost frame.
    ///
    /// Returns the observing procedural slot, if the innermost frame tracks
    /// its inputs, so the caller can register it as a dependent.
    pub(crate) fn record_read(read: &Edge) -> Option<Edge> {
        EVAL_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            let frame = stack.last_mut()?;
            let observer = frame.observer.clone()?;
            let observer_id = frame.slot?;
            if observer_id == read.id {
                return None;
            }
            if !frame.reads.iter().any(|edge| edge.id == read.id) {
                frame.reads.push(read.clone());
            }
            Some(Edge {
                id: observer_id,
                node: observer,
            })
        })
    }

    /// The reads recorded in this guard's frame so far.
    pub(crate) fn reads(&self) -> SmallVec<[Edge; 4]> {
        EVAL_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .filter(|frame| frame.slot == self.slot)
                .map(|frame| frame.reads.clone())
                .unwrap_or_default()
        })
    }
}

impl Drop for EvalContext {
    fn drop(&mut self) {
        EVAL_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();

            if let Some(frame) = popped {
                debug_assert_eq!(
                    frame.slot, self.slot,
                    "EvalContext mismatch: expected {:?}, got {:?}",
                    self.slot, frame.slot
                );
            }
        });
    }
}

/// Guard for one invalidation walk on this thread.
pub(crate) struct InvalidationWalk {
    epoch: u64,
    outermost: bool,
}

impl InvalidationWalk {
    pub(crate) fn enter() -> Self {
        CURRENT_WALK.with(|current| match current.get() {
            0 => {
                let epoch = NEXT_WALK.fetch_add(1, Ordering::Relaxed);
                current.set(epoch);
                Self {
                    epoch,
                    outermost: true,
                }
            }
            epoch => Self {
                epoch,
                outermost: false,
            },
        })
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.epoch
    }
}

impl Drop for InvalidationWalk {
    fn drop(&mut self) {
        if self.outermost {
            CURRENT_WALK.with(|current| current.set(0));
        }
    }
}
