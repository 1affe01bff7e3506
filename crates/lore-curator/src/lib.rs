//! Lore Duplicate & Domain Curator
//!
//! Batch maintenance over the rule store: retires superseded rules, merges
//! near-duplicates, archives rules that never gain salience, and moves
//! rules between tier-1 domains with an explicit history.
//!
//! # Phases
//!
//! | Phase | Selects | Outcome |
//! |-------|---------|---------|
//! | Supersession | `superseded_by` relationships (table or metadata) | archived, `archive_reason = superseded` |
//! | Merge | same-domain pairs at or above the similarity cutoff | loser archived, survivor gains `merged_from` |
//! | Low salience | computed salience below the floor, not approved | archived after N runs, `archive_reason = low_confidence` |
//! | Migration | configured `from → to` moves | `domain_history` entry, review if tags no longer fit |
//! | Scope | `reusability_scope` in `archive_scopes` | archived, `archive_reason = scope_excluded` |
//!
//! The merge survivor is the rule with higher salience, then higher tag
//! confidence, then the lower id. Borderline pairs (between `review_floor`
//! and the cutoff) are merged only when merge review is enabled and the
//! oracle confirms them.
//!
//! # Usage
//!
//! ```no_run
//! use lore_curator::{Curator, CuratorConfig};
//! use lore_domain::{CancelToken, RuleStore, Vocabulary};
//! use lore_store::SqliteStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut store = SqliteStore::new("lore.db")?;
//! let vocab = store.load_vocabulary()?.unwrap_or_else(Vocabulary::new);
//! let curator = Curator::new(CuratorConfig::default())?;
//!
//! let report = curator.run(&mut store, &vocab, &CancelToken::new()).await?;
//! println!("{}", report.summary());
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! ```toml
//! [curator]
//! similarity_threshold = 0.85
//! review_floor = 0.70
//! merge_review = false
//! salience_floor = 0.30
//! low_salience_passes = 3
//! archive_scopes = ["project-local"]
//!
//! [[curator.migrations]]
//! from = "web"
//! to = "api"
//! ```

#![warn(missing_docs)]

mod config;
mod curator;
mod error;
mod report;
mod similarity;

pub use config::{CuratorConfig, DomainMigration};
pub use curator::{archive_reason, migrate_domain, Curator, MIGRATION_TRIGGER};
pub use error::CuratorError;
pub use report::{CuratorReport, MergeRecord};
pub use similarity::{jaccard, normalize_text, rule_similarity, tokenize};
