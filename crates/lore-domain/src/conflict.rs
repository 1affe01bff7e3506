//! Conflict records - detected contradictions and their resolution

use crate::rule::RuleId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default confidence an oracle adjudication needs to be auto-applied
pub const DEFAULT_RESOLUTION_THRESHOLD: f64 = 0.80;

/// Unique identifier for a conflict record based on UUIDv7
///
/// UUIDv7 keeps records sortable by detection time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ConflictId(u128);

impl ConflictId {
    /// Generate a new UUIDv7-based ConflictId
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7().as_u128())
    }

    /// Parse a ConflictId from its UUID string form
    pub fn from_string(s: &str) -> Result<Self, String> {
        uuid::Uuid::parse_str(s.trim())
            .map(|u| Self(u.as_u128()))
            .map_err(|e| format!("Invalid conflict id: {}", e))
    }
}

impl Default for ConflictId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConflictId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", uuid::Uuid::from_u128(self.0))
    }
}

impl TryFrom<String> for ConflictId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_string(&value)
    }
}

impl From<ConflictId> for String {
    fn from(id: ConflictId) -> Self {
        id.to_string()
    }
}

/// How a contradiction was detected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContradictionKind {
    /// Author-declared `conflicts_with` relationship
    Declared,

    /// Same domain, overlapping tags, opposite polarity
    Negation,
}

impl ContradictionKind {
    /// Get the kind name as stored
    pub fn as_str(&self) -> &'static str {
        match self {
            ContradictionKind::Declared => "declared",
            ContradictionKind::Negation => "negation",
        }
    }
}

/// Outcome of a conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStatus {
    /// Awaiting action (manual strategy, or deferred after a stale read)
    Unresolved,

    /// One rule kept, the other archived
    Resolved,

    /// Handed to a human; both rules stay in needs_review
    Escalated,

    /// Closed without a verdict because a rule moved on; the pair is
    /// detected afresh if it still contradicts
    Stale,
}

impl ConflictStatus {
    /// Get the status name as stored
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictStatus::Unresolved => "unresolved",
            ConflictStatus::Resolved => "resolved",
            ConflictStatus::Escalated => "escalated",
            ConflictStatus::Stale => "stale",
        }
    }

    /// Parse a status from its stored name
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unresolved" => Some(ConflictStatus::Unresolved),
            "resolved" => Some(ConflictStatus::Resolved),
            "escalated" => Some(ConflictStatus::Escalated),
            "stale" => Some(ConflictStatus::Stale),
            _ => None,
        }
    }

    /// Whether the conflict still needs attention
    pub fn is_open(&self) -> bool {
        matches!(self, ConflictStatus::Unresolved | ConflictStatus::Escalated)
    }
}

/// Deterministic policy used by the `auto` strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoPolicy {
    /// Keep the rule with higher salience
    #[default]
    KeepHigherSalience,

    /// Keep the more recently captured rule
    KeepNewer,

    /// Keep the rule whose tags were approved with higher confidence
    KeepHigherConfidence,
}

impl AutoPolicy {
    /// Get the policy name as stored
    pub fn as_str(&self) -> &'static str {
        match self {
            AutoPolicy::KeepHigherSalience => "keep_higher_salience",
            AutoPolicy::KeepNewer => "keep_newer",
            AutoPolicy::KeepHigherConfidence => "keep_higher_confidence",
        }
    }
}

fn default_resolution_threshold() -> f64 {
    DEFAULT_RESOLUTION_THRESHOLD
}

/// Conflict resolution strategy, selected per run
///
/// Serialized as a tagged table, e.g. `{ mode = "llm_assisted", threshold = 0.8 }`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// Leave both rules in needs_review for a human
    Manual,

    /// Apply a deterministic policy immediately
    Auto {
        /// Which rule to keep
        #[serde(default)]
        policy: AutoPolicy,
    },

    /// Ask the oracle; apply only at or above the threshold
    LlmAssisted {
        /// Minimum adjudication confidence
        #[serde(default = "default_resolution_threshold")]
        threshold: f64,
    },
}

impl Default for ResolutionStrategy {
    fn default() -> Self {
        ResolutionStrategy::Manual
    }
}

impl ResolutionStrategy {
    /// Short name for logs and reports
    pub fn name(&self) -> &'static str {
        match self {
            ResolutionStrategy::Manual => "manual",
            ResolutionStrategy::Auto { .. } => "auto",
            ResolutionStrategy::LlmAssisted { .. } => "llm_assisted",
        }
    }
}

/// A detected contradiction between rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictRecord {
    /// Unique identifier
    pub id: ConflictId,

    /// Rules involved (sorted)
    pub rules: Vec<RuleId>,

    /// How the contradiction was detected
    pub kind: ContradictionKind,

    /// Strategy in force when the conflict was detected
    pub strategy: ResolutionStrategy,

    /// Current outcome
    pub status: ConflictStatus,

    /// Evidence used for detection and resolution
    #[serde(default)]
    pub evidence: Vec<String>,

    /// Rule kept by the resolution
    #[serde(default)]
    pub kept: Option<RuleId>,

    /// Rules archived by the resolution
    #[serde(default)]
    pub archived: Vec<RuleId>,

    /// Adjudication confidence, when the oracle was consulted
    #[serde(default)]
    pub oracle_confidence: Option<f64>,

    /// Number of resolution attempts
    #[serde(default)]
    pub attempts: u32,

    /// When the conflict was detected
    pub detected_at: u64,

    /// When the conflict was resolved or escalated
    #[serde(default)]
    pub resolved_at: Option<u64>,
}

impl ConflictRecord {
    /// Create an unresolved record for a set of rules
    pub fn new(
        mut rules: Vec<RuleId>,
        kind: ContradictionKind,
        strategy: ResolutionStrategy,
        detected_at: u64,
    ) -> Self {
        rules.sort();
        rules.dedup();
        Self {
            id: ConflictId::new(),
            rules,
            kind,
            strategy,
            status: ConflictStatus::Unresolved,
            evidence: Vec::new(),
            kept: None,
            archived: Vec::new(),
            oracle_confidence: None,
            attempts: 0,
            detected_at,
            resolved_at: None,
        }
    }

    /// Attach a piece of evidence (builder style)
    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence.push(evidence.into());
        self
    }

    /// Whether a rule is part of this conflict
    pub fn involves(&self, id: &RuleId) -> bool {
        self.rules.contains(id)
    }

    /// Mark the record resolved
    pub fn resolve(&mut self, kept: RuleId, archived: Vec<RuleId>, at: u64) {
        self.status = ConflictStatus::Resolved;
        self.kept = Some(kept);
        self.archived = archived;
        self.resolved_at = Some(at);
    }

    /// Mark the record escalated to manual review
    pub fn escalate(&mut self, reason: impl Into<String>, at: u64) {
        self.status = ConflictStatus::Escalated;
        self.evidence.push(reason.into());
        self.resolved_at = Some(at);
    }

    /// Close the record without a verdict
    pub fn mark_stale(&mut self, reason: impl Into<String>, at: u64) {
        self.status = ConflictStatus::Stale;
        self.evidence.push(reason.into());
        self.resolved_at = Some(at);
    }
}
