//! Init command implementation.

use crate::cli::InitArgs;
use crate::config::{Config, CONFIG_FILE};
use crate::error::Result;
use crate::output::Formatter;
use lore_domain::{RuleStore, Vocabulary};
use lore_store::SqliteStore;
use std::path::{Path, PathBuf};

/// Description of the domain every new vocabulary starts with.
const STARTER_DESCRIPTION: &str = "Rules that do not belong to a more specific domain yet";

/// Execute the init command.
///
/// Existing files are left alone unless `--force` is given, and then only
/// the configuration file is rewritten.
pub fn execute_init(
    args: InitArgs,
    config_path: Option<&Path>,
    config: &Config,
    formatter: &Formatter,
) -> Result<()> {
    let path = config_path.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from(CONFIG_FILE));
    if path.exists() && !args.force {
        println!("{}", formatter.info(&format!("Keeping existing {}", path.display())));
    } else {
        config.save(&path)?;
        println!("{}", formatter.success(&format!("Wrote {}", path.display())));
    }

    let vocab_path = &config.vocabulary.path;
    let vocabulary = if vocab_path.exists() {
        println!("{}", formatter.info(&format!("Keeping existing {}", vocab_path.display())));
        lore_vocab::load_vocabulary(vocab_path)?
    } else {
        let starter = starter_vocabulary();
        lore_vocab::save_vocabulary(vocab_path, &starter)?;
        println!("{}", formatter.success(&format!("Wrote {}", vocab_path.display())));
        starter
    };

    let mut store = SqliteStore::new(&config.store.path)?;
    if store.load_vocabulary()?.is_none() {
        store.save_vocabulary(&vocabulary)?;
    }
    println!(
        "{}",
        formatter.success(&format!("Rule store ready at {}", config.store.path.display()))
    );
    Ok(())
}

/// Vocabulary with a single catch-all domain.
pub fn starter_vocabulary() -> Vocabulary {
    Vocabulary::new().with_domain("general", STARTER_DESCRIPTION, &[])
}
