//! Error types for curator operations

use lore_domain::{RuleId, StoreError};
use thiserror::Error;

/// Errors that abort a curator run
///
/// Per-rule write failures are counted in the report instead.
#[derive(Error, Debug)]
pub enum CuratorError {
    /// Storage contract violation or unreadable store
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Migration target is not a tier-1 domain
    #[error("Unknown domain: {0}")]
    UnknownDomain(String),

    /// No rule with this id
    #[error("Rule not found: {0}")]
    NotFound(RuleId),

    /// Archived rules are never migrated
    #[error("Rule {0} is archived")]
    Archived(RuleId),
}
