//! Lore Vocabulary Manager
//!
//! Owns the two-level tag taxonomy and is the only writer of vocabulary
//! entries.
//!
//! The manager provides:
//! - Canonicalization (synonym mappings, term normalization)
//! - Forbidden-stopword filtering
//! - Per-domain tag validation that is independent of the oracle
//! - Idempotent, append-only organic growth that yields a new snapshot version
//! - An explicitly invoked health check that never mutates
//!
//! # Examples
//!
//! ```
//! use lore_domain::Vocabulary;
//! use lore_vocab::VocabularyManager;
//!
//! let vocab = Vocabulary::new()
//!     .with_domain("api", "HTTP API design and conventions", &[])
//!     .with_tags("api", &["pagination"])
//!     .with_mapping("paging", "pagination");
//! let manager = VocabularyManager::new(vocab);
//!
//! assert_eq!(manager.canonicalize("Paging").as_deref(), Some("pagination"));
//! ```

#![warn(missing_docs)]

mod error;
mod file;
mod health;
mod manager;

pub use error::VocabError;
pub use file::{load_vocabulary, save_vocabulary};
pub use health::{check_health, levenshtein_distance, HealthIssue, HealthReport, Severity};
pub use manager::{
    is_valid_slug, validate_tags, GrowthOutcome, Rejection, RejectionReason, TagValidation,
    VocabularyManager, MAX_TAG_LENGTH,
};
