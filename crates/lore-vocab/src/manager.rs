//! Canonicalization, validation and organic growth

use crate::VocabError;
use lore_domain::{normalize_term, TagEntry, Vocabulary};
use std::fmt;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::{debug, info};

/// Longest tag name accepted for growth
pub const MAX_TAG_LENGTH: usize = 40;

/// Whether a term is a well-formed slug (`[a-z0-9]+(-[a-z0-9]+)*`, at most 40 chars)
///
/// # Examples
///
/// ```
/// use lore_vocab::is_valid_slug;
///
/// assert!(is_valid_slug("rate-limit"));
/// assert!(!is_valid_slug("rate--limit"));
/// assert!(!is_valid_slug("Rate"));
/// ```
pub fn is_valid_slug(term: &str) -> bool {
    !term.is_empty()
        && term.len() <= MAX_TAG_LENGTH
        && term.split('-').all(|part| {
            !part.is_empty()
                && part
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        })
}

/// Why a tag was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectionReason {
    /// Term is a forbidden stopword (or maps to one)
    Forbidden,

    /// Term is not a well-formed slug
    Malformed,

    /// Rule's domain does not resolve to a tier-1 entry
    UnknownDomain,

    /// Canonical tag exists, but under another domain
    OutsideDomain {
        /// Domain that owns the tag
        owner: String,
    },
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::Forbidden => f.write_str("forbidden term"),
            RejectionReason::Malformed => f.write_str("not a well-formed tag"),
            RejectionReason::UnknownDomain => f.write_str("unknown domain"),
            RejectionReason::OutsideDomain { owner } => {
                write!(f, "belongs to domain '{}'", owner)
            }
        }
    }
}

/// A tag dropped by validation
///
/// Rejections drop the single tag, never the whole suggestion.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Tag '{tag}' rejected: {reason}")]
pub struct Rejection {
    /// Tag as submitted
    pub tag: String,

    /// Why it was dropped
    pub reason: RejectionReason,
}

/// Result of validating a tag list against one domain
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagValidation {
    /// Canonical tags already registered under the domain
    pub valid: Vec<String>,

    /// Well-formed tags unknown to the vocabulary (growth candidates)
    pub novel: Vec<String>,

    /// Dropped tags
    pub rejected: Vec<Rejection>,
}

impl TagValidation {
    /// Valid and novel tags, in that order
    pub fn accepted(&self) -> Vec<String> {
        self.valid.iter().chain(self.novel.iter()).cloned().collect()
    }

    /// Whether every tag is already registered under the domain
    pub fn is_clean(&self) -> bool {
        self.novel.is_empty() && self.rejected.is_empty()
    }
}

/// Outcome of a growth request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrowthOutcome {
    /// Whether the entry was newly created
    pub created: bool,

    /// Snapshot version after the request
    pub version: u64,
}

/// Owner of the vocabulary
///
/// Readers take an [`Arc`] snapshot per pass; writers replace the snapshot
/// with a clone carrying the next version. Existing entries are never
/// removed or rewritten.
#[derive(Debug)]
pub struct VocabularyManager {
    current: RwLock<Arc<Vocabulary>>,
}

impl VocabularyManager {
    /// Create a manager owning the given vocabulary
    pub fn new(vocabulary: Vocabulary) -> Self {
        Self {
            current: RwLock::new(Arc::new(vocabulary)),
        }
    }

    /// Consistent snapshot of the current vocabulary
    pub fn snapshot(&self) -> Arc<Vocabulary> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Current snapshot version
    pub fn version(&self) -> u64 {
        self.snapshot().version
    }

    /// Map a term to its canonical tag, if the vocabulary knows it
    ///
    /// Returns `None` for forbidden terms and for terms that neither map to
    /// nor name a registered tier-2 tag.
    pub fn canonicalize(&self, term: &str) -> Option<String> {
        let vocab = self.snapshot();
        let canonical = resolve_mapping(&vocab, &normalize_term(term));
        if canonical.is_empty() || vocab.forbidden.contains(&canonical) {
            return None;
        }
        vocab.has_tag_anywhere(&canonical).then_some(canonical)
    }

    /// Whether a term is a forbidden stopword
    pub fn is_forbidden(&self, term: &str) -> bool {
        self.snapshot().forbidden.contains(&normalize_term(term))
    }

    /// Validate tags against a domain
    ///
    /// Deterministic and independent of the oracle. Results are
    /// canonicalized and deduplicated, keeping submission order.
    pub fn validate<I, T>(&self, domain: &str, tags: I) -> TagValidation
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        validate_tags(&self.snapshot(), domain, tags)
    }

    /// Grow a tier-2 tag under a domain
    ///
    /// Idempotent: an existing tag yields `created = false` and leaves the
    /// version untouched. Safe under concurrent requests for the same tag.
    pub fn grow(
        &self,
        domain: &str,
        tag: &str,
        description: &str,
        grown_from: Option<&str>,
    ) -> Result<GrowthOutcome, VocabError> {
        let name = normalize_term(tag);
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let domain_key = guard
            .resolve_domain(domain)
            .ok_or_else(|| VocabError::UnknownDomain(domain.to_string()))?
            .to_string();

        if guard.forbidden.contains(&name) {
            return Err(VocabError::InvalidTerm {
                term: tag.to_string(),
                reason: "forbidden term".to_string(),
            });
        }
        if !is_valid_slug(&name) {
            return Err(VocabError::InvalidTerm {
                term: tag.to_string(),
                reason: "not a well-formed tag".to_string(),
            });
        }

        if guard.has_tag(&domain_key, &name) {
            return Ok(GrowthOutcome {
                created: false,
                version: guard.version,
            });
        }
        // A tag lives in exactly one domain
        if let Some(owner) = owning_domain(&guard, &name) {
            return Err(VocabError::InvalidTerm {
                term: tag.to_string(),
                reason: format!("already belongs to domain '{}'", owner),
            });
        }

        let mut next = Vocabulary::clone(&guard);
        next.insert_tag(
            &domain_key,
            TagEntry {
                name: name.clone(),
                description: description.to_string(),
                grown_from: grown_from.map(str::to_string),
            },
        );
        next.version += 1;
        let version = next.version;
        *guard = Arc::new(next);

        info!("Vocabulary grew '{}/{}' (v{})", domain_key, name, version);
        Ok(GrowthOutcome {
            created: true,
            version,
        })
    }

    /// Register a synonym for an existing canonical tag
    ///
    /// Append-only: re-adding the same mapping is a no-op, remapping a
    /// synonym to a different tag is refused.
    pub fn add_mapping(&self, synonym: &str, canonical: &str) -> Result<bool, VocabError> {
        let synonym = normalize_term(synonym);
        let canonical = normalize_term(canonical);
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if !guard.has_tag_anywhere(&canonical) {
            return Err(VocabError::InvalidTerm {
                term: canonical,
                reason: "canonical tag is not registered".to_string(),
            });
        }
        if synonym.is_empty() || synonym == canonical {
            return Err(VocabError::InvalidTerm {
                term: synonym,
                reason: "synonym must differ from the canonical tag".to_string(),
            });
        }

        match guard.mappings.get(&synonym) {
            Some(existing) if *existing == canonical => return Ok(false),
            Some(existing) => {
                return Err(VocabError::MappingConflict {
                    synonym,
                    existing: existing.clone(),
                })
            }
            None => {}
        }

        let mut next = Vocabulary::clone(&guard);
        next.mappings.insert(synonym.clone(), canonical.clone());
        next.version += 1;
        debug!("Mapped '{}' -> '{}' (v{})", synonym, canonical, next.version);
        *guard = Arc::new(next);
        Ok(true)
    }
}

fn resolve_mapping(vocab: &Vocabulary, term: &str) -> String {
    vocab
        .mappings
        .get(term)
        .cloned()
        .unwrap_or_else(|| term.to_string())
}

/// Validate tags against a domain of a given snapshot
///
/// Same rules as [`VocabularyManager::validate`], for callers that hold a
/// snapshot for a whole pass.
pub fn validate_tags<I, T>(vocab: &Vocabulary, domain: &str, tags: I) -> TagValidation
where
    I: IntoIterator<Item = T>,
    T: AsRef<str>,
{
    let mut result = TagValidation::default();
    let domain_key = vocab.resolve_domain(domain);

    for tag in tags {
        let raw = tag.as_ref();
        let normalized = normalize_term(raw);
        let canonical = resolve_mapping(vocab, &normalized);

        let reject = |reason| Rejection {
            tag: raw.to_string(),
            reason,
        };

        if vocab.forbidden.contains(&normalized) || vocab.forbidden.contains(&canonical) {
            result.rejected.push(reject(RejectionReason::Forbidden));
            continue;
        }

        let Some(domain_key) = domain_key else {
            result.rejected.push(reject(RejectionReason::UnknownDomain));
            continue;
        };

        if result.valid.contains(&canonical) || result.novel.contains(&canonical) {
            continue;
        }

        if vocab.has_tag(domain_key, &canonical) {
            result.valid.push(canonical);
        } else if let Some(owner) = owning_domain(vocab, &canonical) {
            result
                .rejected
                .push(reject(RejectionReason::OutsideDomain { owner }));
        } else if is_valid_slug(&canonical) {
            result.novel.push(canonical);
        } else {
            result.rejected.push(reject(RejectionReason::Malformed));
        }
    }

    result
}

fn owning_domain(vocab: &Vocabulary, tag: &str) -> Option<String> {
    vocab
        .tags
        .iter()
        .find(|(_, entries)| entries.iter().any(|e| e.name == tag))
        .map(|(domain, _)| domain.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> VocabularyManager {
        VocabularyManager::new(
            Vocabulary::new()
                .with_domain("api", "HTTP API design and conventions", &["rest"])
                .with_domain("data", "Persistence and schema evolution", &[])
                .with_tags("api", &["pagination", "versioning"])
                .with_tags("data", &["migrations"])
                .with_mapping("paging", "pagination")
                .with_mapping("other", "misc")
                .with_forbidden(&["misc", "general"]),
        )
    }

    #[test]
    fn test_slug_rules() {
        assert!(is_valid_slug("a"));
        assert!(is_valid_slug("http2-push"));
        assert!(!is_valid_slug(""));
        assert!(!is_valid_slug("-lead"));
        assert!(!is_valid_slug("trail-"));
        assert!(!is_valid_slug("under_score"));
        assert!(!is_valid_slug(&"x".repeat(41)));
        assert!(is_valid_slug(&"x".repeat(40)));
    }

    #[test]
    fn test_canonicalize() {
        let m = manager();
        assert_eq!(m.canonicalize("Paging").as_deref(), Some("pagination"));
        assert_eq!(m.canonicalize("versioning").as_deref(), Some("versioning"));
        assert_eq!(m.canonicalize("unknown"), None);
        assert_eq!(m.canonicalize("misc"), None);
        assert_eq!(m.canonicalize("other"), None);
    }

    #[test]
    fn test_is_forbidden() {
        let m = manager();
        assert!(m.is_forbidden(" General "));
        assert!(!m.is_forbidden("pagination"));
    }

    #[test]
    fn test_validate_partitions_tags() {
        let m = manager();
        let v = m.validate("rest", ["paging", "Pagination", "rate limit", "misc", "migrations", "a_b!"]);
        assert_eq!(v.valid, vec!["pagination"]);
        assert_eq!(v.novel, vec!["rate-limit"]);
        assert_eq!(v.rejected.len(), 3);
        assert_eq!(v.rejected[0].reason, RejectionReason::Forbidden);
        assert_eq!(
            v.rejected[1].reason,
            RejectionReason::OutsideDomain { owner: "data".to_string() }
        );
        assert_eq!(v.rejected[2].reason, RejectionReason::Malformed);
        assert_eq!(v.accepted(), vec!["pagination", "rate-limit"]);
        assert!(!v.is_clean());
    }

    #[test]
    fn test_validate_unknown_domain() {
        let m = manager();
        let v = m.validate("ops", ["pagination"]);
        assert!(v.valid.is_empty());
        assert_eq!(v.rejected[0].reason, RejectionReason::UnknownDomain);
    }

    #[test]
    fn test_grow_is_idempotent() {
        let m = manager();
        let first = m.grow("api", "Rate Limit", "Throttling clients", Some("decision-1")).unwrap();
        assert_eq!(first, GrowthOutcome { created: true, version: 1 });

        let second = m.grow("rest", "rate-limit", "", None).unwrap();
        assert_eq!(second, GrowthOutcome { created: false, version: 1 });

        let snapshot = m.snapshot();
        let entry = snapshot.domain_tags("api").iter().find(|e| e.name == "rate-limit").unwrap();
        assert_eq!(entry.grown_from.as_deref(), Some("decision-1"));
    }

    #[test]
    fn test_grow_keeps_old_snapshot_intact() {
        let m = manager();
        let before = m.snapshot();
        m.grow("api", "idempotency", "", None).unwrap();
        assert!(!before.has_tag("api", "idempotency"));
        assert!(m.snapshot().has_tag("api", "idempotency"));
        assert_eq!(before.version + 1, m.version());
    }

    #[test]
    fn test_grow_refuses_bad_terms() {
        let m = manager();
        assert!(matches!(m.grow("ops", "x", "", None), Err(VocabError::UnknownDomain(_))));
        assert!(matches!(m.grow("api", "misc", "", None), Err(VocabError::InvalidTerm { .. })));
        assert!(matches!(m.grow("api", "bad!", "", None), Err(VocabError::InvalidTerm { .. })));
        assert_eq!(m.version(), 0);
    }

    #[test]
    fn test_grow_refuses_tag_of_another_domain() {
        let m = manager();
        let err = m.grow("api", "Migrations", "", Some("decision-4")).unwrap_err();
        match err {
            VocabError::InvalidTerm { reason, .. } => assert!(reason.contains("'data'")),
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(m.version(), 0);
        assert!(!m.snapshot().has_tag("api", "migrations"));
        assert!(m.snapshot().has_tag("data", "migrations"));
    }

    #[test]
    fn test_add_mapping() {
        let m = manager();
        assert!(m.add_mapping("pages", "pagination").unwrap());
        assert!(!m.add_mapping("pages", "pagination").unwrap());
        assert!(matches!(
            m.add_mapping("pages", "versioning"),
            Err(VocabError::MappingConflict { .. })
        ));
        assert!(m.add_mapping("x", "nonexistent").is_err());
        assert_eq!(m.canonicalize("pages").as_deref(), Some("pagination"));
        assert_eq!(m.version(), 1);
    }

    #[test]
    fn test_concurrent_growth_of_same_tag() {
        let m = Arc::new(manager());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let m = Arc::clone(&m);
                std::thread::spawn(move || m.grow("api", "caching", "", None).unwrap())
            })
            .collect();
        let created = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|o| o.created)
            .count();
        assert_eq!(created, 1);
        assert_eq!(m.version(), 1);
        assert_eq!(m.snapshot().domain_tags("api").len(), 3);
    }
}
