//! Tether Core
//!
//! This crate provides the time-varying value graph of the Tether animation
//! framework. It implements:
//!
//! - Typed slots with cached values and a single controller each
//! - Eager invalidation and lazy, pull-based recomputation
//! - Procedural slots computed from the slots they read
//! - Dependency groups for slots linked in both directions
//! - Read-only and write-capable sub-slot views
//! - Components, a clock driver and per-frame observers
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `slot`: Slots, connections and the evaluation context
//! - `interdep`: Dependency groups and the transform group
//! - `subslot`: Views onto fragments of a master slot
//! - `component`: Named slot tables and the `declare_slots!` macro
//! - `clock`: The time driver and its `on_frame_step` hook
//! - `graph`: Snapshots of the graph for inspection
//!
//! # Example
//!
//! ```rust
//! use tether_core::slot::{connect, Slot};
//!
//! // Two inputs
//! let a = Slot::new(2.0_f64);
//! let b = Slot::new(3.0_f64);
//!
//! // A computed value
//! let sum = {
//!     let (a, b) = (a.clone(), b.clone());
//!     Slot::procedural(move || Ok(a.get()? + b.get()?))
//! };
//! assert_eq!(sum.get().unwrap(), 5.0);
//!
//! // Writing an input only invalidates; the sum is recomputed on read
//! a.set(10.0).unwrap();
//! assert!(!sum.is_cache_valid());
//! assert_eq!(sum.get().unwrap(), 13.0);
//! ```

pub mod clock;
pub mod component;
pub mod config;
pub mod error;
pub mod event;
pub mod graph;
pub mod interdep;
pub mod slot;
pub mod subslot;

pub use clock::{Clock, FrameStep};
pub use component::Component;
pub use config::{ClockConfig, EngineConfig, NotifyPolicy, SlotConfig};
pub use error::{Result, SlotError};
pub use interdep::{DependencyController, DependencyGroup, Participant, TransformGroup};
pub use slot::{connect, connect_any, disconnect, AnySlot, Slot, SlotValue};
pub use subslot::SubSlots;
