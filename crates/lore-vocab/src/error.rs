//! Vocabulary error types

use thiserror::Error;

/// Errors that can occur during vocabulary operations
#[derive(Error, Debug)]
pub enum VocabError {
    /// Reading or writing the vocabulary file failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The vocabulary file could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// The vocabulary could not be serialized
    #[error("Serialize error: {0}")]
    Serialize(String),

    /// Domain does not resolve to a tier-1 entry
    #[error("Unknown domain: {0}")]
    UnknownDomain(String),

    /// Term cannot become a vocabulary entry
    #[error("Invalid term '{term}': {reason}")]
    InvalidTerm {
        /// Offending term
        term: String,
        /// Why it was refused
        reason: String,
    },

    /// A synonym is already mapped to a different canonical tag
    #[error("Mapping conflict: '{synonym}' already maps to '{existing}'")]
    MappingConflict {
        /// Synonym being mapped
        synonym: String,
        /// Canonical tag it already maps to
        existing: String,
    },
}
