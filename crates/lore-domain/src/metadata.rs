//! Metadata bag attached to every rule
//!
//! Curation passes record confidence scores, merge lineage, conflict
//! references and domain history here. Writes happen inside the same store
//! transaction as the state change they describe.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Well-known metadata keys written by the curation passes
pub mod keys {
    /// Confidence of the approved tag suggestion
    pub const TAG_CONFIDENCE: &str = "tag_confidence";
    /// Effective coherence of the approved tag suggestion
    pub const TAG_COHERENCE: &str = "tag_coherence";
    /// Oracle rationale for the approved tags
    pub const OPTIMIZATION_REASONING: &str = "optimization_reasoning";
    /// When the tags were approved
    pub const OPTIMIZED_AT: &str = "optimized_at";
    /// Vocabulary version the tags were validated against
    pub const VOCABULARY_VERSION: &str = "vocabulary_version";
    /// Vocabulary version of the last failed admission gate
    pub const GATE_FAILED_VOCAB_VERSION: &str = "gate_failed_vocab_version";
    /// Tags awaiting a manual decision
    pub const PROPOSED_TAGS: &str = "proposed_tags";
    /// Confidence of the suggestion awaiting a manual decision
    pub const PROPOSED_CONFIDENCE: &str = "proposed_confidence";
    /// Ids of rules merged into this one
    pub const MERGED_FROM: &str = "merged_from";
    /// Survivor this rule was merged into
    pub const MERGED_INTO: &str = "merged_into";
    /// When the last merge into this rule happened
    pub const MERGED_AT: &str = "merged_at";
    /// Why the rule was archived
    pub const ARCHIVE_REASON: &str = "archive_reason";
    /// When the rule was archived
    pub const ARCHIVED_AT: &str = "archived_at";
    /// Rule that supersedes this one
    pub const SUPERSEDED_BY: &str = "superseded_by";
    /// Consecutive curator passes spent below the salience floor
    pub const LOW_SALIENCE_PASSES: &str = "low_salience_passes";
    /// Domain migration log
    pub const DOMAIN_HISTORY: &str = "domain_history";
    /// Why the rule is held for review
    pub const REVIEW_REASON: &str = "review_reason";
    /// Conflict records involving this rule
    pub const CONFLICT_REFS: &str = "conflict_refs";
    /// Outcome of the conflict that archived this rule
    pub const CONFLICT_RESOLUTION: &str = "conflict_resolution";
    /// Author-declared relationships (`[{type, target}]`)
    pub const RELATIONSHIPS: &str = "relationships";
    /// Reuse scope assigned at capture
    pub const REUSABILITY_SCOPE: &str = "reusability_scope";
}

/// One entry of the domain migration log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainChange {
    /// Domain before the move
    pub from_domain: String,
    /// Domain after the move
    pub to_domain: String,
    /// When the move happened
    pub timestamp: u64,
    /// What caused the move (e.g. `config:migration`, `manual`)
    pub trigger: String,
}

/// A relationship declared in metadata rather than the relationships table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredRelationship {
    /// Relationship kind, e.g. `conflicts_with`
    #[serde(rename = "type")]
    pub kind: String,
    /// Target rule id
    pub target: String,
}

/// Extensible key/value bag backed by a JSON object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(Map<String, Value>);

impl Metadata {
    /// Create an empty bag
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing JSON object
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Borrow the underlying JSON object
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Get a raw value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Whether a key is present
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Set a value, replacing any previous one
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    /// Remove a value
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Get a string value
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Get a float value
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(Value::as_f64)
    }

    /// Get an unsigned integer value
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.0.get(key).and_then(Value::as_u64)
    }

    /// Get a list of strings; non-string items are ignored
    pub fn string_list(&self, key: &str) -> Vec<String> {
        self.0
            .get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Append a string to a list unless already present
    ///
    /// Returns `true` when the value was added.
    pub fn push_unique(&mut self, key: &str, value: &str) -> bool {
        let mut list = self.string_list(key);
        if list.iter().any(|v| v == value) {
            return false;
        }
        list.push(value.to_string());
        self.set(key, list);
        true
    }

    /// Append an arbitrary JSON value to a list
    pub fn append(&mut self, key: &str, value: Value) {
        match self.0.get_mut(key) {
            Some(Value::Array(items)) => items.push(value),
            _ => {
                self.0.insert(key.to_string(), Value::Array(vec![value]));
            }
        }
    }

    /// The domain migration log, oldest first
    pub fn domain_history(&self) -> Vec<DomainChange> {
        self.typed_list(keys::DOMAIN_HISTORY)
    }

    /// Relationships declared in metadata
    pub fn declared_relationships(&self) -> Vec<DeclaredRelationship> {
        self.typed_list(keys::RELATIONSHIPS)
    }

    fn typed_list<T: serde::de::DeserializeOwned>(&self, key: &str) -> Vec<T> {
        self.0
            .get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| serde_json::from_value(v.clone()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_unique() {
        let mut meta = Metadata::new();
        assert!(meta.push_unique(keys::MERGED_FROM, "decision-2"));
        assert!(!meta.push_unique(keys::MERGED_FROM, "decision-2"));
        assert!(meta.push_unique(keys::MERGED_FROM, "decision-3"));
        assert_eq!(meta.string_list(keys::MERGED_FROM), vec!["decision-2", "decision-3"]);
    }

    #[test]
    fn test_string_list_missing_key() {
        let meta = Metadata::new();
        assert!(meta.string_list(keys::MERGED_FROM).is_empty());
    }

    #[test]
    fn test_domain_history_append() {
        let mut meta = Metadata::new();
        let change = DomainChange {
            from_domain: "api".to_string(),
            to_domain: "http".to_string(),
            timestamp: 10,
            trigger: "manual".to_string(),
        };
        meta.append(keys::DOMAIN_HISTORY, serde_json::to_value(&change).unwrap());
        assert_eq!(meta.domain_history(), vec![change]);
    }

    #[test]
    fn test_declared_relationships() {
        let meta: Metadata = serde_json::from_str(
            r#"{"relationships": [{"type": "conflicts_with", "target": "decision-4"}, {"bogus": 1}]}"#,
        )
        .unwrap();
        let rels = meta.declared_relationships();
        assert_eq!(rels.len(), 1);
        assert_eq!(rels[0].kind, "conflicts_with");
        assert_eq!(rels[0].target, "decision-4");
    }
}
