//! Configuration for the Conflict Engine
//!
//! Strategy selection, negation heuristics and the per-run ceilings on
//! oracle adjudication.

use lore_domain::{AutoPolicy, ResolutionStrategy};
use serde::{Deserialize, Serialize};

/// Configuration for the conflict engine
///
/// # Examples
///
/// ```
/// use lore_conflict::ConflictConfig;
/// use lore_domain::ResolutionStrategy;
///
/// let config = ConflictConfig::default();
/// assert_eq!(config.strategy, ResolutionStrategy::Manual);
///
/// let config = ConflictConfig::from_toml(
///     "max_conflicts = 10\n[strategy]\nmode = \"llm_assisted\"\nthreshold = 0.9\n",
/// ).unwrap();
/// assert_eq!(config.strategy, ResolutionStrategy::LlmAssisted { threshold: 0.9 });
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConflictConfig {
    /// Most conflicts `llm_assisted` may adjudicate in one run
    /// Default: 50
    pub max_conflicts: usize,

    /// Cumulative oracle cost ceiling per run
    /// Default: none
    pub max_oracle_cost: Option<f64>,

    /// Tags two rules must share before a negation is considered
    /// Default: 1
    pub min_tag_overlap: usize,

    /// Content-token Jaccard at or above which a negated pair contradicts
    /// Default: 0.50
    pub negation_similarity: f64,

    /// Detect and report without writing
    /// Default: false
    pub dry_run: bool,

    /// How detected conflicts are resolved
    /// Default: manual
    pub strategy: ResolutionStrategy,
}

impl Default for ConflictConfig {
    fn default() -> Self {
        Self {
            max_conflicts: 50,
            max_oracle_cost: None,
            min_tag_overlap: 1,
            negation_similarity: 0.50,
            dry_run: false,
            strategy: ResolutionStrategy::Manual,
        }
    }
}

impl ConflictConfig {
    /// Wider negation net, resolved immediately by salience
    pub fn aggressive() -> Self {
        Self {
            min_tag_overlap: 0,
            negation_similarity: 0.40,
            strategy: ResolutionStrategy::Auto {
                policy: AutoPolicy::KeepHigherSalience,
            },
            ..Self::default()
        }
    }

    /// Only close negations, every conflict left to a human
    pub fn lenient() -> Self {
        Self {
            min_tag_overlap: 2,
            negation_similarity: 0.70,
            max_conflicts: 20,
            ..Self::default()
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.negation_similarity) {
            return Err("negation_similarity must be between 0.0 and 1.0".to_string());
        }
        if self.max_conflicts == 0 {
            return Err("max_conflicts must be greater than 0".to_string());
        }
        if let Some(cost) = self.max_oracle_cost {
            if cost.is_nan() || cost < 0.0 {
                return Err("max_oracle_cost must not be negative".to_string());
            }
        }
        if let ResolutionStrategy::LlmAssisted { threshold } = self.strategy {
            if !(0.0..=1.0).contains(&threshold) {
                return Err("strategy threshold must be between 0.0 and 1.0".to_string());
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
