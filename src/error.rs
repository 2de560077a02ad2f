//! Core Errors
//!
//! Every failure the engine can report. Content mistakes, missing IDs and
//! misuse of a state machine all surface here as values so callers (and
//! tests) decide whether to abort.

use thiserror::Error;

/// Broad classification of a [`CoreError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad content: duplicate ids, malformed definitions, dangling references
    Authoring,
    /// An id that should exist does not
    Lookup,
    /// An operation was called in the wrong state
    Misuse,
    /// Engine bookkeeping is inconsistent
    Invariant,
    /// Filesystem or configuration trouble outside the engine's control
    Environment,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoreError {
    #[error("{kind} has an empty id")]
    EmptyId { kind: &'static str },

    #[error("duplicate {kind} id: {id}")]
    DuplicateId { kind: &'static str, id: String },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("invalid {kind} '{id}': {reason}")]
    InvalidDefinition {
        kind: &'static str,
        id: String,
        reason: String,
    },

    #[error("{machine}: {reason}")]
    InvalidTransition { machine: &'static str, reason: String },

    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error("content error: {0}")]
    Content(String),

    #[error("config error: {0}")]
    Config(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        CoreError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn duplicate(kind: &'static str, id: impl ToString) -> Self {
        CoreError::DuplicateId {
            kind,
            id: id.to_string(),
        }
    }

    pub fn invalid(kind: &'static str, id: impl ToString, reason: impl Into<String>) -> Self {
        CoreError::InvalidDefinition {
            kind,
            id: id.to_string(),
            reason: reason.into(),
        }
    }

    pub fn misuse(machine: &'static str, reason: impl Into<String>) -> Self {
        CoreError::InvalidTransition {
            machine,
            reason: reason.into(),
        }
    }

    pub fn invariant(reason: impl Into<String>) -> Self {
        CoreError::Invariant(reason.into())
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            CoreError::EmptyId { .. }
            | CoreError::DuplicateId { .. }
            | CoreError::InvalidDefinition { .. } => ErrorCategory::Authoring,
            CoreError::NotFound { .. } => ErrorCategory::Lookup,
            CoreError::InvalidTransition { .. } => ErrorCategory::Misuse,
            CoreError::Invariant(_) => ErrorCategory::Invariant,
            CoreError::Content(_) | CoreError::Config(_) => ErrorCategory::Environment,
        }
    }

    /// True for everything that points at a bug in content or calling code.
    pub fn is_bug(&self) -> bool {
        self.category() != ErrorCategory::Environment
    }
}
