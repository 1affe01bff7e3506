//! Admission gate
//!
//! Decides whether an oracle suggestion may be auto-approved. The decision
//! is deterministic given the suggestion, the rule's domain and the pass
//! snapshot of the vocabulary.

use crate::config::TaggerConfig;
use lore_domain::Vocabulary;
use lore_oracle::TagSuggestion;
use lore_vocab::{validate_tags, Rejection};
use std::fmt;

/// Local coherence: share of tags already registered under the domain
///
/// Domains holding fewer than `bootstrap_floor` tags score 1.0, so a young
/// domain can grow at all. An empty tag list scores 0.0.
///
/// # Examples
///
/// ```
/// use lore_domain::Vocabulary;
/// use lore_tagger::local_coherence;
///
/// let vocab = Vocabulary::new()
///     .with_domain("api", "HTTP API design and conventions", &[])
///     .with_tags("api", &["a", "b", "c", "d", "e"]);
///
/// let tags = vec!["a".to_string(), "novel".to_string()];
/// assert_eq!(local_coherence(&vocab, "api", &tags, 5), 0.5);
/// assert_eq!(local_coherence(&vocab, "api", &tags, 10), 1.0);
/// ```
pub fn local_coherence(vocab: &Vocabulary, domain: &str, tags: &[String], bootstrap_floor: usize) -> f64 {
    let domain = vocab.resolve_domain(domain).unwrap_or(domain);
    if vocab.domain_tags(domain).len() < bootstrap_floor {
        return 1.0;
    }
    if tags.is_empty() {
        return 0.0;
    }
    let known = tags.iter().filter(|t| vocab.has_tag(domain, t)).count();
    known as f64 / tags.len() as f64
}

/// Why a suggestion failed the gate
#[derive(Debug, Clone, PartialEq)]
pub enum GateFailure {
    /// Too few or too many tags survived validation
    TagCount {
        /// Surviving tags
        count: usize,
        /// Configured minimum
        min: usize,
        /// Configured maximum
        max: usize,
    },

    /// Confidence below threshold
    LowConfidence {
        /// Observed confidence
        confidence: f64,
        /// Configured threshold
        threshold: f64,
    },

    /// Effective coherence below threshold
    LowCoherence {
        /// Observed coherence
        coherence: f64,
        /// Configured threshold
        threshold: f64,
    },
}

impl fmt::Display for GateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateFailure::TagCount { count, min, max } => {
                write!(f, "{} tags after validation (expected {}-{})", count, min, max)
            }
            GateFailure::LowConfidence { confidence, threshold } => {
                write!(f, "confidence {:.2} < {:.2}", confidence, threshold)
            }
            GateFailure::LowCoherence { coherence, threshold } => {
                write!(f, "coherence {:.2} < {:.2}", coherence, threshold)
            }
        }
    }
}

/// Gate evaluation of one suggestion
#[derive(Debug, Clone, PartialEq)]
pub struct GateOutcome {
    /// Canonical tags registered under the domain
    pub valid: Vec<String>,

    /// Well-formed tags the vocabulary does not know yet
    pub novel: Vec<String>,

    /// Tags dropped by validation
    pub rejected: Vec<Rejection>,

    /// Oracle confidence
    pub confidence: f64,

    /// Effective coherence (minimum of oracle-reported and local)
    pub coherence: f64,

    /// `None` when the suggestion is admitted
    pub failure: Option<GateFailure>,
}

impl GateOutcome {
    /// Whether the suggestion is admitted
    pub fn is_admitted(&self) -> bool {
        self.failure.is_none()
    }

    /// Valid and novel tags, in that order
    pub fn tags(&self) -> Vec<String> {
        self.valid.iter().chain(self.novel.iter()).cloned().collect()
    }
}

/// Evaluate a suggestion for a rule in `domain`
///
/// Both thresholds are inclusive: confidence 0.70 with coherence 0.30 is
/// admitted under the default configuration.
pub fn evaluate(
    suggestion: &TagSuggestion,
    domain: &str,
    vocab: &Vocabulary,
    config: &TaggerConfig,
) -> GateOutcome {
    let validation = validate_tags(vocab, domain, &suggestion.tags);
    let tags = validation.accepted();

    let local = local_coherence(vocab, domain, &tags, config.bootstrap_tag_floor);
    let coherence = suggestion.coherence.map_or(local, |reported| reported.min(local));
    let confidence = suggestion.confidence;

    let failure = if tags.len() < config.min_tags || tags.len() > config.max_tags {
        Some(GateFailure::TagCount {
            count: tags.len(),
            min: config.min_tags,
            max: config.max_tags,
        })
    } else if confidence < config.min_confidence {
        Some(GateFailure::LowConfidence {
            confidence,
            threshold: config.min_confidence,
        })
    } else if coherence < config.min_coherence {
        Some(GateFailure::LowCoherence {
            coherence,
            threshold: config.min_coherence,
        })
    } else {
        None
    };

    GateOutcome {
        valid: validation.valid,
        novel: validation.novel,
        rejected: validation.rejected,
        confidence,
        coherence,
        failure,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocab(tag_count: usize) -> Vocabulary {
        let names: Vec<String> = (0..tag_count).map(|i| format!("tag-{}", i)).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        Vocabulary::new()
            .with_domain("api", "HTTP API design and conventions", &["rest"])
            .with_domain("data", "Persistence and schema evolution", &[])
            .with_tags("api", &refs)
            .with_tags("data", &["migrations"])
            .with_forbidden(&["misc"])
    }

    #[test]
    fn test_boundary_is_inclusive() {
        let config = TaggerConfig::default();
        let suggestion = TagSuggestion::new(["tag-0"], 0.70, Some(0.30));
        let outcome = evaluate(&suggestion, "api", &vocab(2), &config);
        assert!(outcome.is_admitted());
        assert_eq!(outcome.coherence, 0.30);
    }

    #[test]
    fn test_confidence_just_below_threshold() {
        let config = TaggerConfig::default();
        let suggestion = TagSuggestion::new(["tag-0"], 0.699, Some(0.30));
        let outcome = evaluate(&suggestion, "api", &vocab(2), &config);
        assert!(matches!(outcome.failure, Some(GateFailure::LowConfidence { .. })));
    }

    #[test]
    fn test_local_precision_caps_reported_coherence() {
        let config = TaggerConfig::default();
        // 1 of 4 tags known in a mature domain: local precision 0.25
        let suggestion = TagSuggestion::new(["tag-0", "new-a", "new-b", "new-c"], 0.9, Some(0.9));
        let outcome = evaluate(&suggestion, "api", &vocab(6), &config);
        assert_eq!(outcome.coherence, 0.25);
        assert!(matches!(outcome.failure, Some(GateFailure::LowCoherence { .. })));
    }

    #[test]
    fn test_bootstrap_domain_admits_novel_tags() {
        let config = TaggerConfig::default();
        let suggestion = TagSuggestion::new(["brand-new"], 0.8, None);
        let outcome = evaluate(&suggestion, "rest", &vocab(3), &config);
        assert!(outcome.is_admitted());
        assert_eq!(outcome.novel, vec!["brand-new"]);
        assert_eq!(outcome.coherence, 1.0);
    }

    #[test]
    fn test_rejected_tags_are_dropped_individually() {
        let config = TaggerConfig::default();
        let suggestion = TagSuggestion::new(["misc", "migrations", "tag-1"], 0.9, None);
        let outcome = evaluate(&suggestion, "api", &vocab(3), &config);
        assert!(outcome.is_admitted());
        assert_eq!(outcome.tags(), vec!["tag-1"]);
        assert_eq!(outcome.rejected.len(), 2);
    }

    #[test]
    fn test_tag_count_bounds() {
        let config = TaggerConfig::default();

        let empty = TagSuggestion::new(["misc"], 0.95, None);
        let outcome = evaluate(&empty, "api", &vocab(3), &config);
        assert!(matches!(outcome.failure, Some(GateFailure::TagCount { count: 0, .. })));

        let many = TagSuggestion::new(["a", "b", "c", "d", "e", "f"], 0.95, None);
        let outcome = evaluate(&many, "api", &vocab(3), &config);
        assert!(matches!(outcome.failure, Some(GateFailure::TagCount { count: 6, .. })));
    }

    #[test]
    fn test_unknown_domain_fails() {
        let config = TaggerConfig::default();
        let suggestion = TagSuggestion::new(["tag-0"], 0.95, None);
        let outcome = evaluate(&suggestion, "ops", &vocab(3), &config);
        assert!(!outcome.is_admitted());
    }
}
