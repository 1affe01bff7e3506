//! Configuration management for the CLI.
//!
//! One TOML file holds every component's settings:
//!
//! ```toml
//! [store]
//! path = "lore.db"
//!
//! [vocabulary]
//! path = "vocabulary.toml"
//!
//! [oracle]
//! model = "llama3.1"
//! timeout_secs = 120
//!
//! [tagger]
//! min_confidence = 0.7
//!
//! [curator]
//! similarity_threshold = 0.85
//!
//! [conflicts]
//! strategy = { mode = "llm_assisted", threshold = 0.8 }
//!
//! [output]
//! format = "table"
//! ```
//!
//! Missing sections and fields fall back to their defaults.

use crate::error::{CliError, Result};
use lore_conflict::ConflictConfig;
use lore_curator::CuratorConfig;
use lore_oracle::GatewayConfig;
use lore_tagger::TaggerConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the project-local configuration file.
pub const CONFIG_FILE: &str = "lore.toml";

/// CLI configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Rule store settings
    pub store: StoreSettings,

    /// Vocabulary file settings
    pub vocabulary: VocabularySettings,

    /// Oracle gateway settings
    pub oracle: GatewayConfig,

    /// Tag optimization loop settings
    pub tagger: TaggerConfig,

    /// Curator settings
    pub curator: CuratorConfig,

    /// Conflict engine settings
    pub conflicts: ConflictConfig,

    /// Output settings
    pub output: OutputSettings,
}

/// Rule store settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// SQLite database file
    pub path: PathBuf,
}

/// Vocabulary file settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VocabularySettings {
    /// Vocabulary TOML file, edited by hand and grown by tagging
    pub path: PathBuf,
}

/// Output settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    /// Enable colored output
    pub color: bool,

    /// Default output format
    pub format: OutputFormat,
}

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Table format
    Table,
    /// JSON format
    Json,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("lore.db"),
        }
    }
}

impl Default for VocabularySettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("vocabulary.toml"),
        }
    }
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            color: true,
            format: OutputFormat::Table,
        }
    }
}

impl Config {
    /// Get the user-level configuration file path.
    pub fn user_path() -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or_else(|| CliError::Config("Could not find home directory".into()))?;
        Ok(home.join(".lore").join("config.toml"))
    }

    /// Find the configuration file to use.
    ///
    /// An explicit path must exist. Otherwise `lore.toml` in the working
    /// directory wins over `~/.lore/config.toml`; `None` means defaults.
    pub fn locate(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(CliError::Config(format!(
                    "Configuration file {} does not exist",
                    path.display()
                )));
            }
            return Ok(Some(path.to_path_buf()));
        }

        let local = PathBuf::from(CONFIG_FILE);
        if local.exists() {
            return Ok(Some(local));
        }
        match Self::user_path() {
            Ok(path) if path.exists() => Ok(Some(path)),
            _ => Ok(None),
        }
    }

    /// Load configuration from the located file or use defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let config = match Self::locate(explicit)? {
            Some(path) => {
                tracing::debug!("Loading configuration from {}", path.display());
                Self::from_toml(&fs::read_to_string(&path)?)?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| CliError::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// Validate every component section.
    pub fn validate(&self) -> Result<()> {
        let sections = [
            ("oracle", self.oracle.validate()),
            ("tagger", self.tagger.validate()),
            ("curator", self.curator.validate()),
            ("conflicts", self.conflicts.validate()),
        ];
        for (section, result) in sections {
            result.map_err(|e| CliError::Config(format!("[{}] {}", section, e)))?;
        }
        Ok(())
    }

    /// Apply command-line overrides.
    pub fn apply_overrides(&mut self, db: Option<PathBuf>, dry_run: bool) {
        if let Some(db) = db {
            self.store.path = db;
        }
        if dry_run {
            self.tagger.dry_run = true;
            self.curator.dry_run = true;
            self.conflicts.dry_run = true;
        }
    }
}
