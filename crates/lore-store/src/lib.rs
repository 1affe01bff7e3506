//! Lore Storage Layer
//!
//! Implements the [`RuleStore`](lore_domain::RuleStore) trait twice:
//!
//! - [`SqliteStore`] for persistent storage (rules, relationships, conflict
//!   records and vocabulary snapshots in one SQLite file)
//! - [`MemoryStore`] for tests and dry runs
//!
//! Both backends run every update through
//! [`apply_mutation`](lore_domain::apply_mutation), so optimistic version
//! checks, the tags_state transition graph and the immutable fields are
//! enforced identically.
//!
//! # Examples
//!
//! ```no_run
//! use lore_store::SqliteStore;
//!
//! let store = SqliteStore::new(":memory:").unwrap();
//! // Store is now ready for rule operations
//! ```

#![warn(missing_docs)]

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
