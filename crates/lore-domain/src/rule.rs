//! Rule module - the atomic unit of curated knowledge

use crate::metadata::Metadata;
use crate::salience::Salience;
use crate::tags_state::TagsState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Kind of knowledge a rule captures
///
/// The kind is also the prefix of the rule identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    /// A limit that must be respected
    Constraint,

    /// A choice made between alternatives
    Decision,

    /// A property that must always hold
    Invariant,

    /// A reusable approach
    Pattern,
}

impl RuleType {
    /// All rule types, in identifier order
    pub const ALL: [RuleType; 4] = [
        RuleType::Constraint,
        RuleType::Decision,
        RuleType::Invariant,
        RuleType::Pattern,
    ];

    /// Get the rule type name as used in identifiers
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleType::Decision => "decision",
            RuleType::Constraint => "constraint",
            RuleType::Invariant => "invariant",
            RuleType::Pattern => "pattern",
        }
    }

    /// Parse a rule type from a string
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "decision" => Some(RuleType::Decision),
            "constraint" => Some(RuleType::Constraint),
            "invariant" => Some(RuleType::Invariant),
            "pattern" => Some(RuleType::Pattern),
            _ => None,
        }
    }

    /// Baseline salience before any tag confidence is known
    ///
    /// Invariants outrank constraints, which outrank decisions and patterns.
    pub fn base_salience(&self) -> f64 {
        match self {
            RuleType::Invariant => 0.8,
            RuleType::Constraint => 0.7,
            RuleType::Decision => 0.6,
            RuleType::Pattern => 0.5,
        }
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RuleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("Invalid rule type: {}", s))
    }
}

/// Stable rule identifier in `{type}-{sequence}` form
///
/// Identifiers are assigned by the capture collaborator and never change.
/// Ordering compares the type name first, then the numeric sequence, so
/// `decision-9 < decision-10`.
///
/// # Examples
///
/// ```
/// use lore_domain::{RuleId, RuleType};
///
/// let id = RuleId::new(RuleType::Constraint, 42);
/// assert_eq!(id.to_string(), "constraint-42");
/// assert_eq!(RuleId::parse("constraint-42").unwrap(), id);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RuleId {
    rule_type: RuleType,
    sequence: u64,
}

impl RuleId {
    /// Create an identifier from its parts
    pub fn new(rule_type: RuleType, sequence: u64) -> Self {
        Self { rule_type, sequence }
    }

    /// Parse an identifier of the form `{type}-{sequence}`
    pub fn parse(s: &str) -> Result<Self, String> {
        let (kind, seq) = s
            .trim()
            .rsplit_once('-')
            .ok_or_else(|| format!("Invalid rule id '{}': expected {{type}}-{{sequence}}", s))?;

        let rule_type = RuleType::parse(kind)
            .ok_or_else(|| format!("Invalid rule id '{}': unknown type '{}'", s, kind))?;

        let sequence = seq
            .parse::<u64>()
            .map_err(|_| format!("Invalid rule id '{}': sequence must be a number", s))?;

        Ok(Self { rule_type, sequence })
    }

    /// The rule type encoded in the identifier
    pub fn rule_type(&self) -> RuleType {
        self.rule_type
    }

    /// The numeric sequence encoded in the identifier
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.rule_type, self.sequence)
    }
}

impl std::str::FromStr for RuleId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RuleId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RuleId> for String {
    fn from(id: RuleId) -> Self {
        id.to_string()
    }
}

/// Where a rule came from
///
/// Set once by the capture collaborator. The store rejects any update that
/// changes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    /// Reference to the source session record
    pub session: String,

    /// When the rule was captured (seconds since Unix epoch)
    pub created_at: u64,
}

impl Provenance {
    /// Create a new provenance entry
    pub fn new(session: impl Into<String>, created_at: u64) -> Self {
        Self {
            session: session.into(),
            created_at,
        }
    }
}

/// A rule - the atomic unit of curated knowledge
///
/// Rules are created in [`TagsState::NeedsTags`] and are never deleted;
/// [`TagsState::Archived`] is terminal but retained for lineage traversal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Stable identifier
    pub id: RuleId,

    /// Rule statement
    pub text: String,

    /// Tier-1 vocabulary domain
    pub domain: String,

    /// Tier-2 tags (canonical form once approved)
    #[serde(default)]
    pub tags: BTreeSet<String>,

    /// Lifecycle stage
    pub tags_state: TagsState,

    /// Priority weight
    pub salience: Salience,

    /// Capture provenance (immutable)
    pub provenance: Provenance,

    /// Extensible key/value bag (confidence scores, lineage, conflict refs)
    #[serde(default)]
    pub metadata: Metadata,

    /// Optimistic concurrency counter, bumped by the store on every write
    #[serde(default)]
    pub version: u64,
}

impl Rule {
    /// Create a freshly captured rule awaiting tags
    pub fn new(
        id: RuleId,
        text: impl Into<String>,
        domain: impl Into<String>,
        provenance: Provenance,
    ) -> Self {
        Self {
            id,
            text: text.into(),
            domain: domain.into(),
            tags: BTreeSet::new(),
            tags_state: TagsState::NeedsTags,
            salience: Salience::computed(id.rule_type().base_salience()),
            provenance,
            metadata: Metadata::new(),
            version: 0,
        }
    }

    /// Set an initial computed salience (builder style, for capture)
    pub fn with_salience(mut self, value: f64) -> Self {
        self.salience = Salience::computed(value.clamp(0.0, 1.0));
        self
    }

    /// Set initial tags (builder style, for capture)
    pub fn with_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// The rule type encoded in the identifier
    pub fn rule_type(&self) -> RuleType {
        self.id.rule_type()
    }

    /// Whether the rule is archived
    pub fn is_archived(&self) -> bool {
        self.tags_state == TagsState::Archived
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_id_display_and_parse() {
        let id = RuleId::new(RuleType::Decision, 7);
        assert_eq!(id.to_string(), "decision-7");
        assert_eq!(RuleId::parse("decision-7").unwrap(), id);
        assert_eq!("Invariant-3".parse::<RuleId>().unwrap(), RuleId::new(RuleType::Invariant, 3));
    }

    #[test]
    fn test_rule_id_invalid() {
        assert!(RuleId::parse("decision").is_err());
        assert!(RuleId::parse("policy-1").is_err());
        assert!(RuleId::parse("pattern-x").is_err());
        assert!(RuleId::parse("").is_err());
    }

    #[test]
    fn test_rule_id_numeric_ordering() {
        let a = RuleId::new(RuleType::Decision, 9);
        let b = RuleId::new(RuleType::Decision, 10);
        assert!(a < b);
    }

    #[test]
    fn test_rule_id_serde_as_string() {
        let id = RuleId::new(RuleType::Pattern, 12);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"pattern-12\"");
        let back: RuleId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_new_rule_defaults() {
        let rule = Rule::new(
            RuleId::new(RuleType::Invariant, 1),
            "Timestamps are stored in UTC",
            "data",
            Provenance::new("session-1", 1000),
        );
        assert_eq!(rule.tags_state, TagsState::NeedsTags);
        assert!(rule.tags.is_empty());
        assert_eq!(rule.salience.value, 0.8);
        assert_eq!(rule.version, 0);
        assert_eq!(rule.rule_type(), RuleType::Invariant);
    }

    #[test]
    fn test_with_salience_clamps() {
        let rule = Rule::new(
            RuleId::new(RuleType::Decision, 1),
            "text",
            "api",
            Provenance::new("s", 0),
        )
        .with_salience(1.7);
        assert_eq!(rule.salience.value, 1.0);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn rule_type() -> impl Strategy<Value = RuleType> {
        prop::sample::select(RuleType::ALL.to_vec())
    }

    proptest! {
        /// Property: identifiers survive a trip through their string form
        #[test]
        fn test_rule_id_string_form(kind in rule_type(), seq in any::<u64>()) {
            let id = RuleId::new(kind, seq);
            prop_assert_eq!(RuleId::parse(&id.to_string()).unwrap(), id);
        }

        /// Property: ordering within a type follows the sequence number
        #[test]
        fn test_rule_id_ordering(kind in rule_type(), a in any::<u64>(), b in any::<u64>()) {
            let id_a = RuleId::new(kind, a);
            let id_b = RuleId::new(kind, b);
            prop_assert_eq!(id_a < id_b, a < b);
        }
    }
}
