//! Configuration for the Tag Optimization Loop
//!
//! Admission thresholds, pass and concurrency bounds, and the cost ceiling.

use serde::{Deserialize, Serialize};

/// What to do with a suggestion that fails the admission gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateFailurePolicy {
    /// Keep the rule in `needs_tags` for a later pass
    #[default]
    LeavePending,

    /// Move the rule to `proposed` and park the suggestion for a human
    Propose,
}

/// Configuration for the Tag Optimization Loop
///
/// # Examples
///
/// ```
/// use lore_tagger::TaggerConfig;
///
/// let config = TaggerConfig::default();
/// assert_eq!(config.min_confidence, 0.70);
/// assert_eq!(config.min_coherence, 0.30);
///
/// // Stricter gate
/// let config = TaggerConfig::aggressive();
/// assert!(config.min_confidence > TaggerConfig::default().min_confidence);
///
/// // Looser gate, more passes
/// let config = TaggerConfig::lenient();
/// assert!(config.max_passes > TaggerConfig::default().max_passes);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaggerConfig {
    /// Minimum oracle confidence for auto-approval (inclusive)
    /// Default: 0.70
    pub min_confidence: f64,

    /// Minimum effective coherence for auto-approval (inclusive)
    /// Default: 0.30
    pub min_coherence: f64,

    /// Maximum number of passes per run
    /// Default: 5
    pub max_passes: usize,

    /// Maximum concurrent oracle calls within a pass
    /// Default: 3
    pub max_workers: usize,

    /// Fewest tags a suggestion may carry after validation
    /// Default: 1
    pub min_tags: usize,

    /// Most tags a suggestion may carry after validation
    /// Default: 5
    pub max_tags: usize,

    /// Domains with fewer tier-2 tags than this skip the local coherence check
    /// Default: 5
    pub bootstrap_tag_floor: usize,

    /// Handling of suggestions that fail the gate
    /// Default: leave_pending
    pub on_gate_failure: GateFailurePolicy,

    /// Cumulative oracle cost ceiling per run
    /// Default: none, meaning `max(500, corpus * 0.5)` calls
    pub max_oracle_cost: Option<f64>,

    /// Evaluate suggestions without writing anything
    /// Default: false
    pub dry_run: bool,
}

impl Default for TaggerConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.70,
            min_coherence: 0.30,
            max_passes: 5,
            max_workers: 3,
            min_tags: 1,
            max_tags: 5,
            bootstrap_tag_floor: 5,
            on_gate_failure: GateFailurePolicy::LeavePending,
            max_oracle_cost: None,
            dry_run: false,
        }
    }
}

impl TaggerConfig {
    /// Strict gate: fewer auto-approvals, fewer passes
    pub fn aggressive() -> Self {
        Self {
            min_confidence: 0.80,
            min_coherence: 0.40,
            max_passes: 3,
            min_tags: 2,
            ..Self::default()
        }
    }

    /// Loose gate: more auto-approvals, more passes
    pub fn lenient() -> Self {
        Self {
            min_confidence: 0.60,
            min_coherence: 0.20,
            max_passes: 10,
            ..Self::default()
        }
    }

    /// Cost ceiling for a corpus of `corpus` pending rules
    pub fn cost_ceiling(&self, corpus: usize) -> f64 {
        self.max_oracle_cost
            .unwrap_or_else(|| (corpus as f64 * 0.5).max(500.0))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err("min_confidence must be between 0.0 and 1.0".to_string());
        }
        if !(0.0..=1.0).contains(&self.min_coherence) {
            return Err("min_coherence must be between 0.0 and 1.0".to_string());
        }
        if self.max_passes == 0 {
            return Err("max_passes must be greater than 0".to_string());
        }
        if self.max_workers == 0 {
            return Err("max_workers must be greater than 0".to_string());
        }
        if self.min_tags == 0 || self.min_tags > self.max_tags {
            return Err("min_tags must be at least 1 and at most max_tags".to_string());
        }
        if let Some(cost) = self.max_oracle_cost {
            if cost.is_nan() || cost < 0.0 {
                return Err("max_oracle_cost must not be negative".to_string());
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
        let config = TaggerConfig::default();
        assert_eq!(config.max_passes, 5);
        assert_eq!(config.max_workers, 3);
        assert_eq!(config.on_gate_failure, GateFailurePolicy::LeavePending);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_presets_are_valid() {
        assert!(TaggerConfig::aggressive().validate().is_ok());
        assert!(TaggerConfig::lenient().validate().is_ok());
    }

    #[test]
    fn test_cost_ceiling() {
        let config = TaggerConfig::default();
        assert_eq!(config.cost_ceiling(10), 500.0);
        assert_eq!(config.cost_ceiling(3000), 1500.0);

        let capped = TaggerConfig { max_oracle_cost: Some(4.0), ..Default::default() };
        assert_eq!(capped.cost_ceiling(3000), 4.0);
    }

    #[test]
    fn test_invalid_configs() {
        let config = TaggerConfig { min_confidence: 1.5, ..Default::default() };
        assert!(config.validate().is_err());

        let config = TaggerConfig { max_workers: 0, ..Default::default() };
        assert!(config.validate().is_err());

        let config = TaggerConfig { min_tags: 6, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_policy() {
        let config = TaggerConfig::from_toml(
            "on_gate_failure = \"propose\"\nmax_oracle_cost = 12.0\n",
        )
        .unwrap();
        assert_eq!(config.on_gate_failure, GateFailurePolicy::Propose);
        assert_eq!(config.max_oracle_cost, Some(12.0));
        assert_eq!(config.min_confidence, 0.70);

        let back = TaggerConfig::from_toml(&config.to_toml().unwrap()).unwrap();
        assert_eq!(back, config);
    }
}
