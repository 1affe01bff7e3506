//! Lore Tag Optimization Loop
//!
//! Drives every rule in `needs_tags` to `approved` (or parks it for review)
//! across bounded passes, growing the vocabulary organically.
//!
//! # Pass Structure
//!
//! 1. Select the ids of all `needs_tags` rules (fixed for the pass)
//! 2. Ask the oracle for a suggestion per rule, up to `max_workers` at once
//! 3. Validate and canonicalize the tags, then apply the admission gate
//! 4. Write results one rule at a time, in id order
//! 5. Grow novel tags of approved rules into the vocabulary
//!
//! A rule that failed the gate is not sent again until the vocabulary
//! version changes. Oracle timeouts and malformed responses leave the rule
//! untouched and only show up in the pass report.
//!
//! # Convergence
//!
//! The loop stops on the first of: a pass approving nothing, no rule left
//! in `needs_tags`, `max_passes`, the cost ceiling, or cancellation.
//!
//! # Configuration
//!
//! ```toml
//! [tagger]
//! min_confidence = 0.70
//! min_coherence = 0.30
//! max_passes = 5
//! max_workers = 3
//! on_gate_failure = "leave_pending"
//! ```

#![warn(missing_docs)]

mod config;
mod error;
mod gate;
mod optimizer;
mod report;

pub use config::{GateFailurePolicy, TaggerConfig};
pub use error::TaggerError;
pub use gate::{evaluate, local_coherence, GateFailure, GateOutcome};
pub use optimizer::TagOptimizer;
pub use report::{ConvergenceReason, DomainProgress, LoopReport, PassReport};
