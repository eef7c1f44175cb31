//! Error Types
//!
//! Every failure in the slot graph is a contract violation by the caller
//! (wrong wiring, wrong type, writing something that cannot be written), so
//! errors are reported synchronously to whoever invoked the offending
//! operation. The graph stays usable after any of them.

use thiserror::Error;

use crate::slot::{GroupId, SlotId, ValueKind};

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SlotError>;

/// Errors raised by slot, connection, group and component operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SlotError {
    /// Two slots of different value types were connected or compared.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: ValueKind, found: ValueKind },

    /// The slot is already driven by a (different) controller.
    #[error("{slot} is already controlled")]
    AlreadyControlled { slot: SlotId },

    /// The slot cannot be written: a read-only projection or a computed slot.
    #[error("{slot} is read-only: {reason}")]
    ReadOnlyViolation { slot: SlotId, reason: &'static str },

    /// A dependency group was wired incorrectly.
    #[error("invalid group configuration: {0}")]
    InvalidGroupConfiguration(String),

    /// A slot was found stale with nothing to recompute it from.
    #[error("internal consistency error on {slot}: {detail}")]
    InternalConsistency { slot: SlotId, detail: String },

    /// A slot (or group) was pulled again while it was still being evaluated.
    #[error("re-entrant evaluation of {slot}")]
    Reentrant { slot: SlotId },

    /// A dependency group was re-entered while it was updating its participants.
    #[error("re-entrant update of {group}")]
    ReentrantGroup { group: GroupId },

    /// The connection would make a slot (transitively) control itself.
    #[error("connecting {controller} -> {dependent} would create a cycle")]
    CyclicConnection { controller: SlotId, dependent: SlotId },

    /// No slot registered under that name.
    #[error("unknown slot '{name}'")]
    UnknownSlot { name: String },

    /// A slot with that name is already registered.
    #[error("slot '{name}' already exists")]
    DuplicateSlot { name: String },

    /// A procedural callback reported its own failure.
    #[error("computation failed: {0}")]
    Compute(String),

    /// Engine configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SlotError {
    /// Build a [`SlotError::Compute`] from anything printable.
    pub fn compute(message: impl std::fmt::Display) -> Self {
        Self::Compute(message.to_string())
    }

    pub(crate) fn consistency(slot: SlotId, detail: impl Into<String>) -> Self {
        Self::InternalConsistency {
            slot,
            detail: detail.into(),
        }
    }
}

impl From<serde_json::Error> for SlotError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(err.to_string())
    }
}
