//! Vocabulary snapshot - the two-level tag taxonomy
//!
//! A [`Vocabulary`] is an immutable-by-convention snapshot carrying a
//! monotonically increasing `version`. Components receive a snapshot per
//! pass; growth produces a new snapshot through `lore-vocab`.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Default schema version for new vocabularies
pub const DEFAULT_SCHEMA_VERSION: &str = "1.0.0";

/// A tier-1 domain
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DomainEntry {
    /// Human description of the domain
    #[serde(default)]
    pub description: String,

    /// Alternative names resolving to this domain
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// A tier-2 tag within a domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagEntry {
    /// Canonical tag name
    pub name: String,

    /// Human description
    #[serde(default)]
    pub description: String,

    /// Rule whose approval grew this tag, if grown organically
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grown_from: Option<String>,
}

impl TagEntry {
    /// Create a tag entry
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            grown_from: None,
        }
    }
}

/// Versioned taxonomy snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vocabulary {
    /// Schema version of the vocabulary file (X.Y.Z)
    #[serde(default = "default_schema_version")]
    pub schema_version: String,

    /// Snapshot version, bumped on every growth
    #[serde(default)]
    pub version: u64,

    /// Forbidden stopwords
    #[serde(default)]
    pub forbidden: BTreeSet<String>,

    /// Tier-1 domains by name
    #[serde(default)]
    pub domains: BTreeMap<String, DomainEntry>,

    /// Tier-2 tags by domain name
    #[serde(default)]
    pub tags: BTreeMap<String, Vec<TagEntry>>,

    /// Synonym to canonical tag mappings
    #[serde(default)]
    pub mappings: BTreeMap<String, String>,
}

fn default_schema_version() -> String {
    DEFAULT_SCHEMA_VERSION.to_string()
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            version: 0,
            forbidden: BTreeSet::new(),
            domains: BTreeMap::new(),
            tags: BTreeMap::new(),
            mappings: BTreeMap::new(),
        }
    }
}

/// Normalize a term for lookup
///
/// Trims, lowercases, and turns runs of whitespace or underscores into
/// single hyphens.
///
/// # Examples
///
/// ```
/// use lore_domain::normalize_term;
///
/// assert_eq!(normalize_term("  Error_Handling "), "error-handling");
/// assert_eq!(normalize_term("Rate   Limit"), "rate-limit");
/// ```
pub fn normalize_term(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    let mut pending_sep = false;
    for ch in term.trim().chars() {
        if ch.is_whitespace() || ch == '_' || ch == '-' {
            pending_sep = !out.is_empty();
        } else {
            if pending_sep {
                out.push('-');
                pending_sep = false;
            }
            out.extend(ch.to_lowercase());
        }
    }
    out
}

impl Vocabulary {
    /// Create an empty vocabulary
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tier-1 domain (builder style, for seeding)
    pub fn with_domain(mut self, name: &str, description: &str, aliases: &[&str]) -> Self {
        self.domains.insert(
            normalize_term(name),
            DomainEntry {
                description: description.to_string(),
                aliases: aliases.iter().map(|a| normalize_term(a)).collect(),
            },
        );
        self
    }

    /// Add tier-2 tags under a domain (builder style, for seeding)
    pub fn with_tags(mut self, domain: &str, tags: &[&str]) -> Self {
        let entries = self.tags.entry(normalize_term(domain)).or_default();
        for tag in tags {
            let name = normalize_term(tag);
            if !entries.iter().any(|e| e.name == name) {
                entries.push(TagEntry::new(name, ""));
            }
        }
        self
    }

    /// Add a synonym mapping (builder style, for seeding)
    pub fn with_mapping(mut self, synonym: &str, canonical: &str) -> Self {
        self.mappings
            .insert(normalize_term(synonym), normalize_term(canonical));
        self
    }

    /// Add forbidden stopwords (builder style, for seeding)
    pub fn with_forbidden(mut self, terms: &[&str]) -> Self {
        self.forbidden.extend(terms.iter().map(|t| normalize_term(t)));
        self
    }

    /// Resolve a domain name or alias to the primary domain name
    pub fn resolve_domain(&self, name: &str) -> Option<&str> {
        let wanted = normalize_term(name);
        if let Some((key, _)) = self.domains.get_key_value(&wanted) {
            return Some(key.as_str());
        }
        self.domains
            .iter()
            .find(|(_, entry)| entry.aliases.iter().any(|a| *a == wanted))
            .map(|(key, _)| key.as_str())
    }

    /// Tier-2 tags registered under a domain
    pub fn domain_tags(&self, domain: &str) -> &[TagEntry] {
        self.tags.get(domain).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether a canonical tag exists under a domain
    pub fn has_tag(&self, domain: &str, tag: &str) -> bool {
        self.domain_tags(domain).iter().any(|e| e.name == tag)
    }

    /// Whether a canonical tag exists under any domain
    pub fn has_tag_anywhere(&self, tag: &str) -> bool {
        self.tags.values().flatten().any(|e| e.name == tag)
    }

    /// Total number of tier-2 tags
    pub fn tag_count(&self) -> usize {
        self.tags.values().map(Vec::len).sum()
    }

    /// Append a tier-2 tag; returns `false` if it already exists
    ///
    /// This is the primitive used by organic growth. It never removes or
    /// rewrites existing entries, and it does not bump `version`.
    pub fn insert_tag(&mut self, domain: &str, entry: TagEntry) -> bool {
        let entries = self.tags.entry(domain.to_string()).or_default();
        if entries.iter().any(|e| e.name == entry.name) {
            return false;
        }
        entries.push(entry);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vocabulary {
        Vocabulary::new()
            .with_domain("api", "HTTP API design and conventions", &["http", "rest"])
            .with_tags("api", &["pagination", "versioning"])
            .with_mapping("paging", "pagination")
            .with_forbidden(&["misc"])
    }

    #[test]
    fn test_normalize_term() {
        assert_eq!(normalize_term("Error Handling"), "error-handling");
        assert_eq!(normalize_term("__a__b__"), "a-b");
        assert_eq!(normalize_term(""), "");
    }

    #[test]
    fn test_resolve_domain_by_alias() {
        let vocab = sample();
        assert_eq!(vocab.resolve_domain("API"), Some("api"));
        assert_eq!(vocab.resolve_domain("rest"), Some("api"));
        assert_eq!(vocab.resolve_domain("storage"), None);
    }

    #[test]
    fn test_insert_tag_is_idempotent() {
        let mut vocab = sample();
        assert!(!vocab.insert_tag("api", TagEntry::new("pagination", "")));
        assert!(vocab.insert_tag("api", TagEntry::new("idempotency", "")));
        assert_eq!(vocab.domain_tags("api").len(), 3);
        assert_eq!(vocab.version, 0);
    }

    #[test]
    fn test_has_tag() {
        let vocab = sample();
        assert!(vocab.has_tag("api", "pagination"));
        assert!(!vocab.has_tag("data", "pagination"));
        assert!(vocab.has_tag_anywhere("versioning"));
        assert_eq!(vocab.tag_count(), 2);
    }
}
