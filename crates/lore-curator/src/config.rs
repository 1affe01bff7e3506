//! Configuration for the Duplicate & Domain Curator
//!
//! Similarity cutoffs, the low-salience floor, domain migrations and
//! archived reuse scopes.

use serde::{Deserialize, Serialize};

/// A configured move of rules from one tier-1 domain to another
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainMigration {
    /// Domain rules currently carry
    pub from: String,

    /// Domain to move them to (must exist in the vocabulary)
    pub to: String,

    /// Only move rules captured before this timestamp (seconds since epoch)
    #[serde(default)]
    pub created_before: Option<u64>,
}

impl DomainMigration {
    /// Create a migration without a date cutoff
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            created_before: None,
        }
    }

    /// Restrict the migration to rules captured before `timestamp`
    pub fn created_before(mut self, timestamp: u64) -> Self {
        self.created_before = Some(timestamp);
        self
    }
}

/// Configuration for the curator
///
/// # Examples
///
/// ```
/// use lore_curator::CuratorConfig;
///
/// let config = CuratorConfig::default();
/// assert_eq!(config.similarity_threshold, 0.85);
///
/// // Merge more eagerly
/// let config = CuratorConfig::aggressive();
/// assert!(config.similarity_threshold < CuratorConfig::default().similarity_threshold);
///
/// // Only merge near-verbatim copies
/// let config = CuratorConfig::lenient();
/// assert!(config.similarity_threshold > CuratorConfig::default().similarity_threshold);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CuratorConfig {
    /// Similarity at or above which two rules of a domain are merged
    /// Default: 0.85
    pub similarity_threshold: f64,

    /// Lower bound of the borderline band sent to merge review
    /// Default: 0.70
    pub review_floor: f64,

    /// Share of the similarity taken from tag overlap when both rules carry tags
    /// Default: 0.25
    pub tag_weight: f64,

    /// Ask the oracle to confirm borderline pairs
    /// Default: false
    pub merge_review: bool,

    /// Minimum oracle confidence for a confirmed merge
    /// Default: 0.80
    pub merge_review_confidence: f64,

    /// Cumulative oracle cost ceiling for merge reviews
    /// Default: none
    pub max_oracle_cost: Option<f64>,

    /// Computed salience below which a rule counts as a low-salience pass
    /// Default: 0.30
    pub salience_floor: f64,

    /// Consecutive low-salience passes before archival
    /// Default: 3
    pub low_salience_passes: u64,

    /// Reuse scopes whose rules are archived
    /// Default: none
    pub archive_scopes: Vec<String>,

    /// Report what would change without writing
    /// Default: false
    pub dry_run: bool,

    /// Domain migrations, applied in order
    /// Default: none
    pub migrations: Vec<DomainMigration>,
}

impl Default for CuratorConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.85,
            review_floor: 0.70,
            tag_weight: 0.25,
            merge_review: false,
            merge_review_confidence: 0.80,
            max_oracle_cost: None,
            salience_floor: 0.30,
            low_salience_passes: 3,
            archive_scopes: Vec::new(),
            dry_run: false,
            migrations: Vec::new(),
        }
    }
}

impl CuratorConfig {
    /// Merge more eagerly and archive sooner
    pub fn aggressive() -> Self {
        Self {
            similarity_threshold: 0.75,
            review_floor: 0.60,
            salience_floor: 0.40,
            low_salience_passes: 2,
            ..Self::default()
        }
    }

    /// Merge only near-verbatim copies and archive late
    pub fn lenient() -> Self {
        Self {
            similarity_threshold: 0.95,
            review_floor: 0.85,
            salience_floor: 0.20,
            low_salience_passes: 5,
            ..Self::default()
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("similarity_threshold", self.similarity_threshold),
            ("review_floor", self.review_floor),
            ("tag_weight", self.tag_weight),
            ("merge_review_confidence", self.merge_review_confidence),
            ("salience_floor", self.salience_floor),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("{} must be between 0.0 and 1.0", name));
            }
        }
        if self.review_floor > self.similarity_threshold {
            return Err("review_floor must not exceed similarity_threshold".to_string());
        }
        if self.low_salience_passes == 0 {
            return Err("low_salience_passes must be greater than 0".to_string());
        }
        if let Some(cost) = self.max_oracle_cost {
            if cost.is_nan() || cost < 0.0 {
                return Err("max_oracle_cost must not be negative".to_string());
            }
        }
        for migration in &self.migrations {
            if migration.from.trim().is_empty() || migration.to.trim().is_empty() {
                return Err("migration domains must not be empty".to_string());
            }
            if migration.from == migration.to {
                return Err(format!("migration from '{}' to itself", migration.from));
            }
        }
        Ok(())
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, String> {
        toml::from_str(toml_str).map_err(|e| format!("Failed to parse TOML: {}", e))
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String, String> {
        toml::to_string_pretty(self).map_err(|e| format!("Failed to serialize to TOML: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CuratorConfig::default();
        assert_eq!(config.review_floor, 0.70);
        assert_eq!(config.low_salience_passes, 3);
        assert!(!config.merge_review);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_presets_are_valid() {
        assert!(CuratorConfig::aggressive().validate().is_ok());
        assert!(CuratorConfig::lenient().validate().is_ok());
    }

    #[test]
    fn test_invalid_configs() {
        let config = CuratorConfig { review_floor: 0.9, ..Default::default() };
        assert!(config.validate().is_err());

        let config = CuratorConfig { low_salience_passes: 0, ..Default::default() };
        assert!(config.validate().is_err());

        let config = CuratorConfig {
            migrations: vec![DomainMigration::new("api", "api")],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_migrations() {
        let config = CuratorConfig::from_toml(
            r#"
archive_scopes = ["project-local"]

[[migrations]]
from = "web"
to = "api"
created_before = 1700000000
"#,
        )
        .unwrap();
        assert_eq!(config.migrations, vec![DomainMigration::new("web", "api").created_before(1_700_000_000)]);
        assert_eq!(config.archive_scopes, vec!["project-local"]);
        assert_eq!(config.similarity_threshold, 0.85);

        let back = CuratorConfig::from_toml(&config.to_toml().unwrap()).unwrap();
        assert_eq!(back, config);
    }
}
