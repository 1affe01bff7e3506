//! Errors raised at the rule store boundary

use crate::tags_state::TagsState;
use thiserror::Error;

/// Errors that can occur during storage operations
///
/// `ConcurrentModification` is recoverable (skip the rule, retry next pass).
/// `InvalidTransition` and `ImmutableField` are contract violations and are
/// surfaced to the operator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// Backend (database, serialization) failure
    #[error("Database error: {0}")]
    Backend(String),

    /// Rule or record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// A rule or record with this id already exists
    #[error("Duplicate id: {0}")]
    Duplicate(String),

    /// Rule changed between read and write
    #[error("Concurrent modification of {id}: expected version {expected}, found {actual}")]
    ConcurrentModification {
        /// Rule id
        id: String,
        /// Version the caller read
        expected: u64,
        /// Version currently stored
        actual: u64,
    },

    /// State change outside the allowed graph
    #[error("Invalid transition for {id}: {from} -> {to}")]
    InvalidTransition {
        /// Rule id
        id: String,
        /// Current state
        from: TagsState,
        /// Requested state
        to: TagsState,
    },

    /// Attempt to change an immutable field
    #[error("Field '{field}' of {id} is immutable")]
    ImmutableField {
        /// Rule id
        id: String,
        /// Field name
        field: &'static str,
    },

    /// Stored data could not be decoded
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl StoreError {
    /// Wrap any displayable backend error
    pub fn backend(e: impl std::fmt::Display) -> Self {
        StoreError::Backend(e.to_string())
    }

    /// Whether this is a stale-read conflict
    pub fn is_concurrent_modification(&self) -> bool {
        matches!(self, StoreError::ConcurrentModification { .. })
    }

    /// Whether this error signals a programming-contract violation
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            StoreError::InvalidTransition { .. } | StoreError::ImmutableField { .. }
        )
    }
}
