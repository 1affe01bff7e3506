//! Error types for the Tag Optimization Loop

use lore_domain::{RuleId, StoreError, TagsState};
use lore_vocab::VocabError;
use thiserror::Error;

/// Errors that abort a tagging operation
///
/// Oracle failures and per-rule write failures never appear here; they are
/// counted in the pass report and the loop moves on.
#[derive(Error, Debug)]
pub enum TaggerError {
    /// Storage contract violation or unreadable store
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// Vocabulary growth failed
    #[error("Vocabulary error: {0}")]
    Vocabulary(#[from] VocabError),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// No rule with this id
    #[error("Rule not found: {0}")]
    NotFound(RuleId),

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

    /// No proposed tag validates under the rule's domain any more
    #[error("No valid tags left to approve for {0}")]
    NoValidTags(RuleId),

    /// An oracle worker task panicked or was aborted
    #[error("Worker error: {0}")]
    Worker(String),
}
