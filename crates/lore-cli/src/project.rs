//! The rule database, vocabulary and oracle a command works against.

use crate::config::Config;
use crate::error::{CliError, Result};
use lore_domain::{RuleStore, Vocabulary};
use lore_oracle::{OllamaBackend, OracleGateway};
use lore_store::SqliteStore;
use lore_vocab::VocabularyManager;
use std::sync::Arc;

/// Oracle used by the binary.
pub type Gateway = OracleGateway<OllamaBackend>;

/// An opened project.
pub struct Project {
    /// Effective configuration
    pub config: Config,
    /// Rule store
    pub store: SqliteStore,
    /// Vocabulary in force
    pub vocab: VocabularyManager,
}

impl Project {
    /// Open the store and load the newest vocabulary.
    ///
    /// The vocabulary file and the snapshot saved in the store are compared
    /// by version; the newer one wins, so hand edits that bump the version
    /// take effect.
    pub fn open(config: Config) -> Result<Self> {
        let store = SqliteStore::new(&config.store.path)?;
        let vocabulary = newest_vocabulary(&config, &store)?;
        tracing::debug!(
            "Opened {} with vocabulary v{}",
            config.store.path.display(),
            vocabulary.version
        );
        Ok(Self {
            config,
            store,
            vocab: VocabularyManager::new(vocabulary),
        })
    }

    /// Current vocabulary snapshot.
    pub fn vocabulary(&self) -> Arc<Vocabulary> {
        self.vocab.snapshot()
    }

    /// Write the vocabulary back if it grew past `since`.
    ///
    /// Returns whether anything was written.
    pub fn persist_vocabulary(&mut self, since: u64) -> Result<bool> {
        let snapshot = self.vocab.snapshot();
        if snapshot.version <= since {
            return Ok(false);
        }
        lore_vocab::save_vocabulary(&self.config.vocabulary.path, &snapshot)?;
        self.store.save_vocabulary(&snapshot)?;
        tracing::info!("Vocabulary saved at v{}", snapshot.version);
        Ok(true)
    }

    /// Build the oracle gateway from the `[oracle]` section.
    pub fn oracle(&self) -> Result<Arc<Gateway>> {
        let settings = &self.config.oracle;
        let backend = OllamaBackend::new(settings.endpoint.clone(), settings.model.clone())?;
        Ok(Arc::new(OracleGateway::new(backend, settings.clone())))
    }
}

fn newest_vocabulary(config: &Config, store: &SqliteStore) -> Result<Vocabulary> {
    let path = &config.vocabulary.path;
    let from_file = if path.exists() {
        Some(lore_vocab::load_vocabulary(path)?)
    } else {
        None
    };
    let from_store = store.load_vocabulary()?;

    match (from_file, from_store) {
        (Some(file), Some(stored)) if stored.version > file.version => {
            tracing::warn!(
                "{} is at v{} but the store holds v{}; using the stored snapshot",
                path.display(),
                file.version,
                stored.version
            );
            Ok(stored)
        }
        (Some(file), _) => Ok(file),
        (None, Some(stored)) => Ok(stored),
        (None, None) => Err(CliError::Config(format!(
            "No vocabulary at {} or in the store; run `lore init` first",
            path.display()
        ))),
    }
}
