//! Salience - the priority weight on a rule
//!
//! Salience is computed by default. A manual override pins it: once the
//! method is [`SalienceMethod::Manual`] the store refuses any update that
//! would hand the value back to an automated pass.

use crate::error::StoreError;
use crate::rule::{Rule, RuleId, RuleType};
use crate::traits::RuleStore;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How the current salience value was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SalienceMethod {
    /// Derived from rule type and tag confidence
    Computed,

    /// Pinned by an operator
    Manual,
}

impl SalienceMethod {
    /// Get the method name as stored
    pub fn as_str(&self) -> &'static str {
        match self {
            SalienceMethod::Computed => "computed",
            SalienceMethod::Manual => "manual",
        }
    }

    /// Parse a method from its stored name
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "computed" => Some(SalienceMethod::Computed),
            "manual" => Some(SalienceMethod::Manual),
            _ => None,
        }
    }
}

/// Salience value in [0, 1] with its provenance
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Salience {
    /// Weight in [0, 1]
    pub value: f64,

    /// How the weight was obtained
    pub method: SalienceMethod,
}

impl Salience {
    /// A computed salience
    pub fn computed(value: f64) -> Self {
        Self {
            value,
            method: SalienceMethod::Computed,
        }
    }

    /// A manually pinned salience
    pub fn manual(value: f64) -> Self {
        Self {
            value,
            method: SalienceMethod::Manual,
        }
    }

    /// Whether the value is pinned
    pub fn is_manual(&self) -> bool {
        self.method == SalienceMethod::Manual
    }
}

/// Compute salience from rule type and, when known, tag confidence
///
/// Without confidence the type baseline is used as is. With confidence the
/// result is the mean of baseline and confidence, clamped to [0, 1].
pub fn compute_salience(rule_type: RuleType, tag_confidence: Option<f64>) -> f64 {
    let base = rule_type.base_salience();
    let value = match tag_confidence {
        Some(confidence) => (base + confidence) / 2.0,
        None => base,
    };
    value.clamp(0.0, 1.0)
}

/// Errors from the manual salience override
#[derive(Error, Debug)]
pub enum SalienceError {
    /// No rule with this id
    #[error("Rule not found: {0}")]
    NotFound(RuleId),

    /// Value outside [0, 1]
    #[error("Salience out of range: {0} (expected 0.0..=1.0)")]
    OutOfRange(f64),

    /// Storage layer error
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Pin a rule's salience (manual override entrypoint)
///
/// Sets `salience = value` and `salience_method = manual`. Idempotent:
/// repeating the call with the same value performs no write.
///
/// # Examples
///
/// ```ignore
/// let rule = set_salience(&mut store, &id, 0.9)?;
/// assert!(rule.salience.is_manual());
/// ```
pub fn set_salience<S>(store: &mut S, id: &RuleId, value: f64) -> Result<Rule, SalienceError>
where
    S: RuleStore + ?Sized,
{
    if !(0.0..=1.0).contains(&value) {
        return Err(SalienceError::OutOfRange(value));
    }

    let rule = store.get(id)?.ok_or(SalienceError::NotFound(*id))?;
    let target = Salience::manual(value);
    if rule.salience == target {
        return Ok(rule);
    }

    let updated = store.update(id, rule.version, &mut |r: &mut Rule| {
        r.salience = target;
    })?;
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_salience_baseline() {
        assert_eq!(compute_salience(RuleType::Invariant, None), 0.8);
        assert_eq!(compute_salience(RuleType::Pattern, None), 0.5);
    }

    #[test]
    fn test_compute_salience_with_confidence() {
        let value = compute_salience(RuleType::Decision, Some(0.9));
        assert!((value - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_method_parse() {
        assert_eq!(SalienceMethod::parse("manual"), Some(SalienceMethod::Manual));
        assert_eq!(SalienceMethod::parse("computed"), Some(SalienceMethod::Computed));
        assert_eq!(SalienceMethod::parse("other"), None);
    }
}
