//! Error types for conflict operations

use lore_domain::{ConflictId, RuleId, StoreError, TagsState};
use thiserror::Error;

/// Errors from the conflict engine and its manual entrypoints
///
/// Oracle failures and per-rule write failures during a run are not errors;
/// they escalate or defer the conflict and are counted in the report.
#[derive(Error, Debug)]
pub enum ConflictError {
    /// Storage contract violation or unreadable store
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// No conflict record with this id
    #[error("Conflict not found: {0}")]
    NotFound(ConflictId),

    /// No rule with this id
    #[error("Rule not found: {0}")]
    RuleNotFound(RuleId),

    /// The conflict is already resolved
    #[error("Conflict {0} is already resolved")]
    AlreadyResolved(ConflictId),

    /// The conflict was closed as stale and can no longer be resolved
    #[error("Conflict {0} was closed because its rules changed; resolve the re-detected conflict instead")]
    Closed(ConflictId),

    /// The rule to keep is not part of the conflict
    #[error("Rule {rule} is not part of conflict {conflict}")]
    NotInConflict {
        /// Conflict id
        conflict: ConflictId,
        /// Rule named as the one to keep
        rule: RuleId,
    },

    /// A rule of the conflict left `needs_review` since detection
    #[error("Conflict {conflict}: rule {rule} is now {state}")]
    Stale {
        /// Conflict id
        conflict: ConflictId,
        /// Rule that moved on
        rule: RuleId,
        /// Its current state
        state: TagsState,
    },

    /// Rule is not in the state the operation requires
    #[error("Rule {id} is {actual}, expected {expected}")]
    WrongState {
        /// Rule id
        id: RuleId,
        /// Current state
        actual: TagsState,
        /// Required state
        expected: TagsState,
    },
}
