//! Vocabulary health check
//!
//! Explicitly invoked review of a snapshot. Never mutates: entries flagged
//! here are left for an operator to act on.

use lore_domain::Vocabulary;
use std::collections::BTreeMap;
use std::fmt;

/// Minimum words in a domain or tag description
const MIN_DESCRIPTION_WORDS: usize = 5;

/// Maximum words in a domain or tag description
const MAX_DESCRIPTION_WORDS: usize = 50;

/// Tags used by at most this many rules are reported as rare
const RARE_TAG_MAX_USES: usize = 2;

/// How serious a finding is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Informational
    Info,
    /// Should be looked at
    Warning,
    /// Structural problem
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        })
    }
}

/// One finding of the health check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthIssue {
    /// Tier-2 tags keyed by a domain with no tier-1 entry
    PhantomDomain {
        /// Domain key
        domain: String,
    },

    /// Tier-1 domain without any tier-2 tags
    EmptyDomain {
        /// Domain name
        domain: String,
    },

    /// Two tags in one domain at edit distance 1
    NearDuplicate {
        /// Domain name
        domain: String,
        /// First tag
        first: String,
        /// Second tag
        second: String,
    },

    /// An alias shared by two domains, or shadowing a domain name
    AliasCollision {
        /// Alias
        alias: String,
        /// Domains claiming it
        domains: Vec<String>,
    },

    /// `schema_version` is not `X.Y.Z`
    BadSchemaVersion {
        /// Value found
        found: String,
    },

    /// Description outside the allowed word count
    DescriptionLength {
        /// `domain` or `domain/tag`
        entry: String,
        /// Words found
        words: usize,
    },

    /// Alias not in lowercase
    AliasNotLowercase {
        /// Domain name
        domain: String,
        /// Alias
        alias: String,
    },

    /// Tag used by very few rules
    RareTag {
        /// Tag
        tag: String,
        /// Rules using it
        uses: usize,
    },

    /// Tag used by no rule
    UnusedTag {
        /// Tag
        tag: String,
    },
}

impl HealthIssue {
    /// Severity of the finding
    pub fn severity(&self) -> Severity {
        match self {
            HealthIssue::PhantomDomain { .. }
            | HealthIssue::AliasCollision { .. }
            | HealthIssue::BadSchemaVersion { .. } => Severity::Error,
            HealthIssue::EmptyDomain { .. }
            | HealthIssue::NearDuplicate { .. }
            | HealthIssue::DescriptionLength { .. }
            | HealthIssue::AliasNotLowercase { .. } => Severity::Warning,
            HealthIssue::RareTag { .. } | HealthIssue::UnusedTag { .. } => Severity::Info,
        }
    }
}

impl fmt::Display for HealthIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthIssue::PhantomDomain { domain } => {
                write!(f, "tags registered under unknown domain '{}'", domain)
            }
            HealthIssue::EmptyDomain { domain } => {
                write!(f, "domain '{}' has no tier-2 tags", domain)
            }
            HealthIssue::NearDuplicate { domain, first, second } => {
                write!(f, "'{}' and '{}' in '{}' differ by one edit", first, second, domain)
            }
            HealthIssue::AliasCollision { alias, domains } => {
                write!(f, "alias '{}' claimed by {}", alias, domains.join(", "))
            }
            HealthIssue::BadSchemaVersion { found } => {
                write!(f, "schema_version '{}' is not X.Y.Z", found)
            }
            HealthIssue::DescriptionLength { entry, words } => write!(
                f,
                "description of '{}' has {} words (expected {}-{})",
                entry, words, MIN_DESCRIPTION_WORDS, MAX_DESCRIPTION_WORDS
            ),
            HealthIssue::AliasNotLowercase { domain, alias } => {
                write!(f, "alias '{}' of '{}' is not lowercase", alias, domain)
            }
            HealthIssue::RareTag { tag, uses } => write!(f, "tag '{}' used by {} rule(s)", tag, uses),
            HealthIssue::UnusedTag { tag } => write!(f, "tag '{}' is unused", tag),
        }
    }
}

/// Findings of a health check
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthReport {
    /// All findings, errors first
    pub issues: Vec<HealthIssue>,
}

impl HealthReport {
    /// Whether any finding is an error
    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(|i| i.severity() == Severity::Error)
    }

    /// Number of findings at a severity
    pub fn count(&self, severity: Severity) -> usize {
        self.issues.iter().filter(|i| i.severity() == severity).count()
    }

    /// Whether the check found nothing
    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Levenshtein edit distance between two strings
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();

    if a_chars.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a_chars.len();
    }

    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a_chars.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_chars.len()]
}

fn is_semver(s: &str) -> bool {
    let parts: Vec<&str> = s.split('.').collect();
    parts.len() == 3
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}

fn description_issue(entry: String, description: &str) -> Option<HealthIssue> {
    let words = description.split_whitespace().count();
    (!(MIN_DESCRIPTION_WORDS..=MAX_DESCRIPTION_WORDS).contains(&words))
        .then_some(HealthIssue::DescriptionLength { entry, words })
}

/// Run the health check over a snapshot
///
/// `usage` maps tag names to the number of non-archived rules carrying
/// them; when supplied, rare and unused tags are reported too. Only tag
/// descriptions that are present are length-checked, since grown tags may
/// legitimately carry none.
pub fn check_health(vocab: &Vocabulary, usage: Option<&BTreeMap<String, usize>>) -> HealthReport {
    let mut issues = Vec::new();

    if !is_semver(&vocab.schema_version) {
        issues.push(HealthIssue::BadSchemaVersion {
            found: vocab.schema_version.clone(),
        });
    }

    for domain in vocab.tags.keys() {
        if !vocab.domains.contains_key(domain) {
            issues.push(HealthIssue::PhantomDomain {
                domain: domain.clone(),
            });
        }
    }

    let mut alias_owners: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for (name, entry) in &vocab.domains {
        if vocab.domain_tags(name).is_empty() {
            issues.push(HealthIssue::EmptyDomain {
                domain: name.clone(),
            });
        }
        issues.extend(description_issue(name.clone(), &entry.description));

        for alias in &entry.aliases {
            if *alias != alias.to_lowercase() {
                issues.push(HealthIssue::AliasNotLowercase {
                    domain: name.clone(),
                    alias: alias.clone(),
                });
            }
            alias_owners.entry(alias.as_str()).or_default().push(name.clone());
        }
    }

    for (alias, mut owners) in alias_owners {
        if vocab.domains.contains_key(alias) {
            owners.insert(0, alias.to_string());
        }
        owners.dedup();
        if owners.len() > 1 {
            issues.push(HealthIssue::AliasCollision {
                alias: alias.to_string(),
                domains: owners,
            });
        }
    }

    for (domain, entries) in &vocab.tags {
        for (i, first) in entries.iter().enumerate() {
            if !first.description.is_empty() {
                issues.extend(description_issue(
                    format!("{}/{}", domain, first.name),
                    &first.description,
                ));
            }
            for second in &entries[i + 1..] {
                if levenshtein_distance(&first.name, &second.name) == 1 {
                    issues.push(HealthIssue::NearDuplicate {
                        domain: domain.clone(),
                        first: first.name.clone(),
                        second: second.name.clone(),
                    });
                }
            }
        }
    }

    if let Some(usage) = usage {
        for entry in vocab.tags.values().flatten() {
            match usage.get(&entry.name).copied().unwrap_or(0) {
                0 => issues.push(HealthIssue::UnusedTag {
                    tag: entry.name.clone(),
                }),
                uses if uses <= RARE_TAG_MAX_USES => issues.push(HealthIssue::RareTag {
                    tag: entry.name.clone(),
                    uses,
                }),
                _ => {}
            }
        }
    }

    issues.sort_by_key(|i| std::cmp::Reverse(i.severity()));
    HealthReport { issues }
}
