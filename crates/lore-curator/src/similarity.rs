//! Lexical similarity between rules

use lore_domain::Rule;
use std::collections::BTreeSet;

/// Lowercase alphanumeric tokens of a text
pub fn tokenize(text: &str) -> BTreeSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Text reduced to lowercase hyphen-separated alphanumerics
///
/// Two rules with the same normalized text are exact duplicates.
///
/// ```
/// use lore_curator::normalize_text;
///
/// assert_eq!(normalize_text("  Use UTC timestamps!"), "use-utc-timestamps");
/// ```
pub fn normalize_text(text: &str) -> String {
    text.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Jaccard index of two sets; 0.0 when both are empty
pub fn jaccard<T: Ord>(a: &BTreeSet<T>, b: &BTreeSet<T>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Similarity of two rules
///
/// Token-set Jaccard of the texts. When both rules carry tags, tag overlap
/// contributes `tag_weight` of the score.
pub fn rule_similarity(a: &Rule, b: &Rule, tag_weight: f64) -> f64 {
    let text = jaccard(&tokenize(&a.text), &tokenize(&b.text));
    blend(text, &a.tags, &b.tags, tag_weight)
}

/// Mix a text similarity with tag overlap
pub(crate) fn blend(text: f64, a: &BTreeSet<String>, b: &BTreeSet<String>, tag_weight: f64) -> f64 {
    if a.is_empty() || b.is_empty() || tag_weight <= 0.0 {
        return text;
    }
    (1.0 - tag_weight) * text + tag_weight * jaccard(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lore_domain::{Provenance, RuleId, RuleType};

    fn rule(seq: u64, text: &str, tags: &[&str]) -> Rule {
        Rule::new(RuleId::new(RuleType::Pattern, seq), text, "api", Provenance::new("s", 0))
            .with_tags(tags.iter().copied())
    }

    #[test]
    fn test_jaccard() {
        let a = tokenize("retry idempotent requests");
        let b = tokenize("Retry idempotent HTTP requests");
        assert_eq!(jaccard(&a, &b), 0.75);
        assert_eq!(jaccard(&BTreeSet::<String>::new(), &BTreeSet::new()), 0.0);
    }

    #[test]
    fn test_tokenize_ignores_punctuation() {
        let tokens = tokenize("Don't log secrets, ever.");
        assert!(tokens.contains("don"));
        assert!(tokens.contains("secrets"));
        assert!(!tokens.contains(","));
    }

    #[test]
    fn test_tag_weight_only_applies_when_both_tagged() {
        let a = rule(1, "retry idempotent requests", &["retries"]);
        let b = rule(2, "retry idempotent requests", &["errors"]);
        assert_eq!(rule_similarity(&a, &b, 0.25), 0.75);

        let untagged = rule(3, "retry idempotent requests", &[]);
        assert_eq!(rule_similarity(&a, &untagged, 0.25), 1.0);
    }
}
