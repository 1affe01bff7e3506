//! Lore Domain Layer
//!
//! Core data model for the rule curation engine. Every other crate in the
//! workspace depends on the types and trait boundaries defined here.
//!
//! ## Key Concepts
//!
//! - **Rule**: An atomic knowledge unit (decision, constraint, invariant, pattern)
//! - **TagsState**: The lifecycle stage that drives every curation pass
//! - **Salience**: Priority weight, either computed or manually pinned
//! - **Vocabulary**: Versioned two-level taxonomy snapshot (tier-1 domains, tier-2 tags)
//! - **ConflictRecord**: A detected contradiction between rules and its resolution
//!
//! ## Architecture
//!
//! - Pure data and state-machine logic only
//! - Storage implementations live in `lore-store`
//! - Oracle access lives in `lore-oracle`
//! - The [`traits::RuleStore`] trait is the single persistence boundary

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod budget;
pub mod cancel;
pub mod conflict;
pub mod error;
pub mod metadata;
pub mod relationship;
pub mod rule;
pub mod salience;
pub mod tags_state;
pub mod traits;
pub mod vocabulary;

use std::time::{SystemTime, UNIX_EPOCH};

// Re-exports for convenience
pub use budget::{BudgetExceeded, CostBudget};
pub use cancel::CancelToken;
pub use conflict::{AutoPolicy, ConflictId, ConflictRecord, ConflictStatus, ContradictionKind, ResolutionStrategy};
pub use error::StoreError;
pub use metadata::Metadata;
pub use relationship::{Relationship, RelationshipType};
pub use rule::{Provenance, Rule, RuleId, RuleType};
pub use salience::{set_salience, Salience, SalienceError, SalienceMethod};
pub use tags_state::{InvalidTransition, TagsState};
pub use traits::{apply_mutation, RuleQuery, RuleSnapshot, RuleStore, StoreStats};
pub use vocabulary::{normalize_term, DomainEntry, TagEntry, Vocabulary};

/// Current timestamp in seconds since Unix epoch
///
/// Falls back to zero if the system clock is set before the epoch.
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
