//! Request and response types for the oracle contract

use crate::prompt::{PROMPT_FORBIDDEN_LIMIT, PROMPT_MAPPING_LIMIT, PROMPT_TAG_LIMIT};
use lore_domain::{Rule, RuleId, Vocabulary};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of oracle request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    /// Suggest tier-2 tags for a rule
    TagSuggestion,
    /// Decide which of two contradicting rules to keep
    ConflictAdjudication,
    /// Confirm whether two rules say the same thing
    MergeReview,
}

impl RequestKind {
    /// Get the kind name as used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::TagSuggestion => "tag_suggestion",
            RequestKind::ConflictAdjudication => "conflict_adjudication",
            RequestKind::MergeReview => "merge_review",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subject key for a pair of rules, order-independent
pub fn pair_subject(a: &RuleId, b: &RuleId) -> String {
    let (first, second) = if a <= b { (a, b) } else { (b, a) };
    format!("{}|{}", first, second)
}

/// Compact view of a rule sent to the oracle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleBrief {
    /// Rule id
    pub id: RuleId,
    /// Rule statement
    pub text: String,
    /// Tier-1 domain
    pub domain: String,
    /// Current tags
    pub tags: Vec<String>,
    /// Current salience
    pub salience: f64,
}

impl RuleBrief {
    /// Summarize a rule
    pub fn from_rule(rule: &Rule) -> Self {
        Self {
            id: rule.id,
            text: rule.text.clone(),
            domain: rule.domain.clone(),
            tags: rule.tags.iter().cloned().collect(),
            salience: rule.salience.value,
        }
    }
}

/// Payload of a tag suggestion request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagRequest {
    /// Rule being tagged
    pub rule_id: RuleId,
    /// Rule statement
    pub text: String,
    /// Rule domain
    pub domain: String,
    /// Tier-2 tags already registered under the domain
    pub domain_tags: Vec<String>,
    /// Synonym mappings relevant to the domain
    pub mappings: Vec<(String, String)>,
    /// Forbidden stopwords
    pub forbidden: Vec<String>,
    /// Vocabulary version the request was built from
    pub vocabulary_version: u64,
}

impl TagRequest {
    /// Create a request without vocabulary context
    pub fn new(rule_id: RuleId, text: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            rule_id,
            text: text.into(),
            domain: domain.into(),
            domain_tags: Vec::new(),
            mappings: Vec::new(),
            forbidden: Vec::new(),
            vocabulary_version: 0,
        }
    }

    /// Build a request for a rule against a vocabulary snapshot
    pub fn from_rule(rule: &Rule, vocab: &Vocabulary) -> Self {
        Self::new(rule.id, rule.text.clone(), rule.domain.clone()).with_vocabulary(vocab)
    }

    /// Attach vocabulary context, truncated to what a prompt carries
    pub fn with_vocabulary(mut self, vocab: &Vocabulary) -> Self {
        let domain = vocab.resolve_domain(&self.domain).unwrap_or(&self.domain);
        self.domain_tags = vocab
            .domain_tags(domain)
            .iter()
            .take(PROMPT_TAG_LIMIT)
            .map(|e| e.name.clone())
            .collect();
        self.mappings = vocab
            .mappings
            .iter()
            .filter(|(_, canonical)| vocab.has_tag(domain, canonical))
            .take(PROMPT_MAPPING_LIMIT)
            .map(|(s, c)| (s.clone(), c.clone()))
            .collect();
        self.forbidden = vocab
            .forbidden
            .iter()
            .take(PROMPT_FORBIDDEN_LIMIT)
            .cloned()
            .collect();
        self.vocabulary_version = vocab.version;
        self
    }
}

/// Payload of a conflict adjudication request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictRequest {
    /// First rule of the pair
    pub first: RuleBrief,
    /// Second rule of the pair
    pub second: RuleBrief,
    /// Why the pair was flagged
    pub evidence: Vec<String>,
}

impl ConflictRequest {
    /// Ids of the pair
    pub fn candidates(&self) -> [RuleId; 2] {
        [self.first.id, self.second.id]
    }
}

/// Payload of a merge review request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeRequest {
    /// Candidate survivor
    pub first: RuleBrief,
    /// Candidate loser
    pub second: RuleBrief,
    /// Lexical similarity that triggered the review
    pub similarity: f64,
}

/// A request to the oracle
#[derive(Debug, Clone, PartialEq)]
pub enum OracleRequest {
    /// Tag suggestion
    TagSuggestion(TagRequest),
    /// Conflict adjudication
    ConflictAdjudication(ConflictRequest),
    /// Merge review
    MergeReview(MergeRequest),
}

impl OracleRequest {
    /// Request kind
    pub fn kind(&self) -> RequestKind {
        match self {
            OracleRequest::TagSuggestion(_) => RequestKind::TagSuggestion,
            OracleRequest::ConflictAdjudication(_) => RequestKind::ConflictAdjudication,
            OracleRequest::MergeReview(_) => RequestKind::MergeReview,
        }
    }

    /// Subject key: the rule id, or the sorted pair of ids
    pub fn subject(&self) -> String {
        match self {
            OracleRequest::TagSuggestion(r) => r.rule_id.to_string(),
            OracleRequest::ConflictAdjudication(r) => pair_subject(&r.first.id, &r.second.id),
            OracleRequest::MergeReview(r) => pair_subject(&r.first.id, &r.second.id),
        }
    }
}

/// Structured tag suggestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagSuggestion {
    /// Suggested tags, as returned (not yet canonicalized)
    pub tags: Vec<String>,
    /// Oracle confidence in [0, 1]
    pub confidence: f64,
    /// Oracle-reported coherence in [0, 1], if any
    pub coherence: Option<f64>,
    /// Free-text rationale
    pub rationale: String,
}

impl TagSuggestion {
    /// Create a suggestion (convenient for tests and fakes)
    pub fn new<I, T>(tags: I, confidence: f64, coherence: Option<f64>) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            tags: tags.into_iter().map(Into::into).collect(),
            confidence,
            coherence,
            rationale: String::new(),
        }
    }
}

/// Structured conflict adjudication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Adjudication {
    /// Rule to keep
    pub keep: RuleId,
    /// Oracle confidence in [0, 1]
    pub confidence: f64,
    /// Free-text rationale
    pub rationale: String,
}

/// Structured merge review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeVerdict {
    /// Whether the two rules are equivalent
    pub equivalent: bool,
    /// Oracle confidence in [0, 1]
    pub confidence: f64,
    /// Free-text rationale
    pub rationale: String,
}

/// A validated oracle response
#[derive(Debug, Clone, PartialEq)]
pub enum OracleResponse {
    /// Tag suggestion
    Tags(TagSuggestion),
    /// Conflict adjudication
    Adjudication(Adjudication),
    /// Merge review
    Merge(MergeVerdict),
}

#[cfg(test)]
mod tests {
    use super::*;
    use lore_domain::{Provenance, RuleType};

    #[test]
    fn test_pair_subject_is_order_independent() {
        let a = RuleId::new(RuleType::Decision, 2);
        let b = RuleId::new(RuleType::Constraint, 7);
        assert_eq!(pair_subject(&a, &b), "constraint-7|decision-2");
        assert_eq!(pair_subject(&a, &b), pair_subject(&b, &a));
    }

    #[test]
    fn test_tag_request_truncates_context() {
        let tags: Vec<String> = (0..15).map(|i| format!("tag-{}", i)).collect();
        let tag_refs: Vec<&str> = tags.iter().map(String::as_str).collect();
        let forbidden: Vec<String> = (0..30).map(|i| format!("stop-{}", i)).collect();
        let forbidden_refs: Vec<&str> = forbidden.iter().map(String::as_str).collect();

        let mut vocab = Vocabulary::new()
            .with_domain("api", "HTTP API design", &["rest"])
            .with_tags("api", &tag_refs)
            .with_forbidden(&forbidden_refs);
        for i in 0..8 {
            vocab = vocab.with_mapping(&format!("syn-{}", i), &format!("tag-{}", i));
        }
        vocab = vocab.with_mapping("elsewhere", "not-in-api");

        let rule = Rule::new(
            RuleId::new(RuleType::Pattern, 1),
            "Paginate everything",
            "rest",
            Provenance::new("s", 0),
        );
        let request = TagRequest::from_rule(&rule, &vocab);

        assert_eq!(request.domain_tags.len(), PROMPT_TAG_LIMIT);
        assert_eq!(request.mappings.len(), PROMPT_MAPPING_LIMIT);
        assert!(request.mappings.iter().all(|(_, c)| c.starts_with("tag-")));
        assert_eq!(request.forbidden.len(), PROMPT_FORBIDDEN_LIMIT);
    }

    #[test]
    fn test_request_subject_and_kind() {
        let id = RuleId::new(RuleType::Invariant, 4);
        let request = OracleRequest::TagSuggestion(TagRequest::new(id, "t", "data"));
        assert_eq!(request.kind(), RequestKind::TagSuggestion);
        assert_eq!(request.subject(), "invariant-4");
    }
}
