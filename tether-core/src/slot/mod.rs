//! Slots
//!
//! The slot graph: typed value holders connected by controller edges, with
//! eager invalidation and lazy evaluation.
//!
//! # Core Concepts
//!
//! - **Slot**: holds a value and a cache-valid flag. See [`Slot`].
//! - **Controller**: the single upstream slot a slot takes its value from.
//! - **Dependents**: the slots invalidated when this slot changes.
//! - **Procedural slot**: a slot whose value is computed by a callback.
//!
//! # Example
//!
//! ```rust
//! use tether_core::slot::{connect, Slot};
//!
//! let a = Slot::new(2.0_f64);
//! let b = Slot::new(3.0_f64);
//! let sum = {
//!     let (a, b) = (a.clone(), b.clone());
//!     Slot::procedural(move || Ok(a.get()? + b.get()?))
//! };
//! let out = Slot::new(0.0_f64);
//! connect(&sum, &out).unwrap();
//!
//! assert_eq!(out.get().unwrap(), 5.0);
//! a.set(10.0).unwrap();
//! assert!(!out.is_cache_valid());
//! assert_eq!(out.get().unwrap(), 13.0);
//! ```

mod cell;
mod connect;
mod context;
mod id;
mod node;
mod procedural;
mod value;

pub use self::connect::{connect, connect_any, disconnect};
pub use self::context::EvalContext;
pub use self::cell::{ComputeFn, Slot};
pub use self::id::{GroupId, SlotId};
pub use self::node::AnySlot;
pub use self::value::{Mat4, Quat, SlotValue, ValueKind, Vec2, Vec3, Vec4};

pub(crate) use self::cell::SlotInner;
pub(crate) use self::node::{Edge, SlotNode};
