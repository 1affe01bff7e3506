//! Contradiction detection between approved rules
//!
//! Two rules contradict when an author declared it (`conflicts_with`, in the
//! relationships table or in metadata) or when one negates the other: same
//! domain, enough shared tags, near-identical content words, and a negation
//! cue on exactly one side.

use crate::config::ConflictConfig;
use lore_domain::{ContradictionKind, RelationshipType, Rule, RuleId, Vocabulary};
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

/// Words that flip the polarity of a statement
pub const NEGATION_CUES: &[&str] = &[
    "avoid", "cannot", "can't", "disable", "disallow", "don't", "dont", "doesn't", "forbid",
    "forbidden", "mustn't", "never", "no", "not", "shouldn't", "stop", "without",
];

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "in", "is", "of", "on", "or", "the",
    "to",
];

/// A rule pair judged contradictory
#[derive(Debug, Clone, PartialEq)]
pub struct Contradiction {
    /// The pair, lower id first
    pub rules: [RuleId; 2],
    /// How it was found
    pub kind: ContradictionKind,
    /// Why the pair was flagged
    pub evidence: Vec<String>,
}

/// Order a pair so the lower id comes first
pub fn ordered(a: RuleId, b: RuleId) -> (RuleId, RuleId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\'' || c == '’'))
        .map(|w| w.trim_matches(|c: char| c == '\'' || c == '’').replace('’', "'").to_lowercase())
        .filter(|w| !w.is_empty())
}

/// Whether a text carries a negation cue
///
/// ```
/// use lore_conflict::has_negation;
///
/// assert!(has_negation("Don't retry POST requests"));
/// assert!(!has_negation("Retry idempotent requests"));
/// ```
pub fn has_negation(text: &str) -> bool {
    words(text).any(|w| NEGATION_CUES.contains(&w.as_str()))
}

/// Words of a text minus negation cues and stopwords
pub fn content_tokens(text: &str) -> BTreeSet<String> {
    words(text)
        .filter(|w| !NEGATION_CUES.contains(&w.as_str()) && !STOPWORDS.contains(&w.as_str()))
        .collect()
}

fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Find contradictions among approved rules
///
/// `declared` holds `conflicts_with` pairs from the relationships table;
/// metadata declarations are read from the rules themselves. Pairs in
/// `skip` (those with an open conflict record) are never returned.
/// Results are ordered by pair.
pub fn find_contradictions(
    approved: &[Rule],
    declared: &BTreeSet<(RuleId, RuleId)>,
    vocab: &Vocabulary,
    config: &ConflictConfig,
    skip: &BTreeSet<(RuleId, RuleId)>,
) -> Vec<Contradiction> {
    let known: BTreeSet<RuleId> = approved.iter().map(|r| r.id).collect();
    let mut found: BTreeMap<(RuleId, RuleId), Contradiction> = BTreeMap::new();

    let mut declarations: BTreeMap<(RuleId, RuleId), &'static str> = BTreeMap::new();
    for (a, b) in declared {
        declarations.insert(ordered(*a, *b), "relationships table");
    }
    for rule in approved {
        for rel in rule.metadata.declared_relationships() {
            if RelationshipType::parse(&rel.kind) != Some(RelationshipType::ConflictsWith) {
                continue;
            }
            match RuleId::parse(&rel.target) {
                Ok(target) => {
                    declarations.entry(ordered(rule.id, target)).or_insert("metadata");
                }
                Err(e) => warn!("{}: ignoring conflicts_with relationship: {}", rule.id, e),
            }
        }
    }

    for (pair, source) in declarations {
        let (a, b) = pair;
        if a == b || skip.contains(&pair) || !known.contains(&a) || !known.contains(&b) {
            continue;
        }
        found.insert(
            pair,
            Contradiction {
                rules: [a, b],
                kind: ContradictionKind::Declared,
                evidence: vec![format!("declared conflicts_with ({})", source)],
            },
        );
    }

    let mut by_domain: BTreeMap<&str, Vec<&Rule>> = BTreeMap::new();
    for rule in approved {
        let domain = vocab.resolve_domain(&rule.domain).unwrap_or(&rule.domain);
        by_domain.entry(domain).or_default().push(rule);
    }

    for rules in by_domain.values() {
        let tokens: Vec<BTreeSet<String>> = rules.iter().map(|r| content_tokens(&r.text)).collect();
        let negated: Vec<bool> = rules.iter().map(|r| has_negation(&r.text)).collect();

        for i in 0..rules.len() {
            for j in (i + 1)..rules.len() {
                if negated[i] == negated[j] {
                    continue;
                }
                let pair = ordered(rules[i].id, rules[j].id);
                if found.contains_key(&pair) || skip.contains(&pair) {
                    continue;
                }
                let shared: Vec<&str> = rules[i]
                    .tags
                    .intersection(&rules[j].tags)
                    .map(String::as_str)
                    .collect();
                if shared.len() < config.min_tag_overlap {
                    continue;
                }
                let similarity = jaccard(&tokens[i], &tokens[j]);
                if similarity < config.negation_similarity {
                    continue;
                }

                let negating = if negated[i] { rules[i].id } else { rules[j].id };
                found.insert(
                    pair,
                    Contradiction {
                        rules: [pair.0, pair.1],
                        kind: ContradictionKind::Negation,
                        evidence: vec![format!(
                            "{} negates the other rule (content similarity {:.2}, shared tags: [{}])",
                            negating,
                            similarity,
                            shared.join(", ")
                        )],
                    },
                );
            }
        }
    }

    found.into_values().collect()
}
