//! Configuration for the Oracle Gateway

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the Oracle Gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Maximum time for a single oracle call (seconds)
    pub timeout_secs: u64,

    /// Backend endpoint
    pub endpoint: String,

    /// Model name passed to the backend
    pub model: String,

    /// Budget cost charged per oracle call
    pub cost_per_call: f64,
}

impl GatewayConfig {
    /// Get the call timeout as a Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.timeout_secs == 0 {
            return Err("timeout_secs must be greater than 0".to_string());
        }
        if self.endpoint.trim().is_empty() {
            return Err("endpoint must not be empty".to_string());
        }
        if self.model.trim().is_empty() {
            return Err("model must not be empty".to_string());
        }
        if self.cost_per_call.is_nan() || self.cost_per_call <= 0.0 {
            return Err("cost_per_call must be greater than 0".to_string());
        }
        Ok(())
    }

    /// Aggressive preset: short timeout for fast batch runs
    pub fn aggressive() -> Self {
        Self {
            timeout_secs: 30,
            ..Self::default()
        }
    }

    /// Lenient preset: long timeout for slow local models
    pub fn lenient() -> Self {
        Self {
            timeout_secs: 300,
            ..Self::default()
        }
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

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 120,
            endpoint: crate::ollama::DEFAULT_ENDPOINT.to_string(),
            model: crate::ollama::DEFAULT_MODEL.to_string(),
            cost_per_call: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = GatewayConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.timeout(), Duration::from_secs(120));
    }

    #[test]
    fn test_presets_are_valid() {
        assert!(GatewayConfig::aggressive().validate().is_ok());
        assert!(GatewayConfig::lenient().validate().is_ok());
        assert!(GatewayConfig::aggressive().timeout_secs < GatewayConfig::lenient().timeout_secs);
    }

    #[test]
    fn test_invalid_timeout() {
        let config = GatewayConfig { timeout_secs: 0, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = GatewayConfig::from_toml("model = \"mistral\"").unwrap();
        assert_eq!(config.model, "mistral");
        assert_eq!(config.timeout_secs, 120);
    }

    #[test]
    fn test_toml_round_trip() {
        let config = GatewayConfig::lenient();
        let parsed = GatewayConfig::from_toml(&config.to_toml().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }
}
