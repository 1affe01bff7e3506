//! Vocabulary file IO (TOML)

use crate::VocabError;
use lore_domain::Vocabulary;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Load a vocabulary from a TOML file
pub fn load_vocabulary(path: &Path) -> Result<Vocabulary, VocabError> {
    let contents = fs::read_to_string(path)?;
    let vocab: Vocabulary =
        toml::from_str(&contents).map_err(|e| VocabError::Parse(e.to_string()))?;
    debug!(
        "Loaded vocabulary v{} from {} ({} domains, {} tags)",
        vocab.version,
        path.display(),
        vocab.domains.len(),
        vocab.tag_count()
    );
    Ok(vocab)
}

/// Save a vocabulary to a TOML file, creating parent directories
pub fn save_vocabulary(path: &Path, vocab: &Vocabulary) -> Result<(), VocabError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let contents =
        toml::to_string_pretty(vocab).map_err(|e| VocabError::Serialize(e.to_string()))?;
    fs::write(path, contents)?;
    Ok(())
}
