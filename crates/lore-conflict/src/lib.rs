//! Lore Conflict Engine
//!
//! Finds approved rules that contradict each other, flags both for review
//! and resolves the conflict with the strategy chosen for the run.
//!
//! # Strategies
//!
//! | Strategy | Behaviour |
//! |----------|-----------|
//! | `manual` | Both rules stay in `needs_review` until [`resolve_manually`] |
//! | `auto` | A deterministic policy picks the rule to keep |
//! | `llm_assisted` | The oracle adjudicates; applied only at or above the threshold, escalated otherwise |
//!
//! `llm_assisted` is bounded per run by a cost budget and a cap on the
//! number of adjudications. Conflicts past either ceiling are escalated
//! without an oracle call.
//!
//! # Configuration
//!
//! ```toml
//! [conflicts]
//! max_conflicts = 50
//! max_oracle_cost = 25.0
//! min_tag_overlap = 1
//! negation_similarity = 0.5
//! strategy = { mode = "llm_assisted", threshold = 0.8 }
//! ```

#![warn(missing_docs)]

mod config;
mod detect;
mod engine;
mod error;
mod report;

pub use config::ConflictConfig;
pub use detect::{content_tokens, find_contradictions, has_negation, Contradiction, NEGATION_CUES};
pub use engine::{
    choose_keep, request_retag, resolve_manually, ConflictEngine, CONFLICT_RESOLVED,
    CONFLICT_REVIEW,
};
pub use error::ConflictError;
pub use report::{ConflictOutcome, ConflictReport};
