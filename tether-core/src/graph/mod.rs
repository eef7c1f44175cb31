//! Dependency Graph Inspection
//!
//! The slot graph is distributed: every slot stores its own controller and
//! dependents, and notification walks those edges directly. This module
//! does not take part in propagation. It collects snapshots of the graph
//! for inspection, consistency checks and ordered refreshes.

mod node;
mod snapshot;

pub use node::{NodeInfo, NodeKind};
pub use snapshot::{EdgeViolation, GraphSnapshot};
