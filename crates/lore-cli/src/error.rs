//! Error types for the CLI application.

use thiserror::Error;

/// Result type alias for CLI operations.
pub type Result<T> = std::result::Result<T, CliError>;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rule store error
    #[error("Store error: {0}")]
    Store(#[from] lore_domain::StoreError),

    /// Vocabulary error
    #[error("Vocabulary error: {0}")]
    Vocabulary(#[from] lore_vocab::VocabError),

    /// Oracle setup error
    #[error("Oracle error: {0}")]
    Oracle(#[from] lore_oracle::OracleError),

    /// Tag optimization error
    #[error("Tagging error: {0}")]
    Tagger(#[from] lore_tagger::TaggerError),

    /// Curator error
    #[error("Curation error: {0}")]
    Curator(#[from] lore_curator::CuratorError),

    /// Conflict engine error
    #[error("Conflict error: {0}")]
    Conflict(#[from] lore_conflict::ConflictError),

    /// Manual salience override error
    #[error("Salience error: {0}")]
    Salience(#[from] lore_domain::SalienceError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Vocabulary health check failed
    #[error("Vocabulary check failed: {0} finding(s)")]
    Unhealthy(usize),
}
