//! Identifier types for the slot graph.
//!
//! Slots and dependency groups are referenced by id in edge lists, error
//! messages and log fields, so ids are cheap `Copy` values handed out by
//! process-wide counters.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a slot.
///
/// Every slot gets a fresh id at construction. Edge lists key on it to
/// avoid duplicate dependents and to remove edges without upgrading weak
/// references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotId(u64);

impl SlotId {
    /// Generate a new unique slot ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SlotId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot#{}", self.0)
    }
}

/// Unique identifier for a dependency group.
///
/// Internal notifications carry the id of the group that sent them so a
/// participant can tell its own group's fan-out from anyone else's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupId(u64);

impl GroupId {
    /// Generate a new unique group ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for GroupId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_ids_are_unique() {
        let id1 = SlotId::new();
        let id2 = SlotId::new();
        let id3 = SlotId::new();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn ids_display_with_prefix() {
        let id = SlotId::new();
        assert_eq!(id.to_string(), format!("slot#{}", id.raw()));
        assert!(GroupId::new().to_string().starts_with("group#"));
    }
}
