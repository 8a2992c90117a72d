//! Structural errors raised by the typed builders on [`crate::Topology`].
//!
//! Each variant names the rule an element would have broken. Importers record these
//! per row and keep going; callers that need a single error type wrap them in
//! `anyhow` or in their own `thiserror` enum.

use thiserror::Error;

/// Structural violations detected while building a topology.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopologyError {
    /// Both endpoints of a line or switch are the same bus
    #[error("{kind} '{id}' connects bus '{bus}' to itself")]
    SelfLoop {
        kind: &'static str,
        id: String,
        bus: String,
    },

    /// Endpoints of a line or switch sit in different voltage levels
    #[error("{kind} '{id}' joins voltage level '{left}' to '{right}'")]
    VoltageLevelMismatch {
        kind: &'static str,
        id: String,
        left: String,
        right: String,
    },

    /// The target slot already holds an element with this id
    #[error("duplicate id '{id}' in slot '{slot}' of '{container}'")]
    DuplicateId {
        container: String,
        slot: &'static str,
        id: String,
    },

    /// The handle does not refer to an entity of the expected kind
    #[error("'{id}' is a {actual}, expected {expected}")]
    WrongKind {
        id: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// A referenced entity is not present where it was expected
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },
}
