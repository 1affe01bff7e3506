//! Relationship module - pairwise links between rules

use crate::rule::RuleId;
use serde::{Deserialize, Serialize};

/// Type of relationship between rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    /// Author-declared contradiction
    ConflictsWith,

    /// The source rule is replaced by the target rule
    SupersededBy,
}

impl RelationshipType {
    /// Get the relationship name as stored
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::ConflictsWith => "conflicts_with",
            RelationshipType::SupersededBy => "superseded_by",
        }
    }

    /// Parse a relationship from its stored name
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "conflicts_with" => Some(RelationshipType::ConflictsWith),
            "superseded_by" => Some(RelationshipType::SupersededBy),
            _ => None,
        }
    }
}

/// A pairwise relationship between two rules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    /// Source rule
    pub from_rule: RuleId,

    /// Target rule
    pub to_rule: RuleId,

    /// Type of relationship
    pub relationship_type: RelationshipType,

    /// When this relationship was established
    pub created_at: u64,
}

impl Relationship {
    /// Create a new relationship
    pub fn new(
        from_rule: RuleId,
        to_rule: RuleId,
        relationship_type: RelationshipType,
        created_at: u64,
    ) -> Self {
        Self {
            from_rule,
            to_rule,
            relationship_type,
            created_at,
        }
    }
}
