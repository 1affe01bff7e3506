//! Tags state module - lifecycle stages for rules

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Lifecycle stage of a rule
///
/// The transition graph only moves forward
/// (`needs_tags → proposed → approved → needs_review → archived`, skipping
/// stages is allowed) with two exceptions: `needs_review → approved` and
/// `needs_review → needs_tags`. `archived` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagsState {
    /// Awaiting tag optimization
    NeedsTags,

    /// A suggestion is recorded and awaits a manual decision
    Proposed,

    /// Tags accepted; participates in conflict detection
    Approved,

    /// Held for human review (conflict or domain migration)
    NeedsReview,

    /// Retired; kept for audit and lineage
    Archived,
}

/// Error raised for a state change outside the allowed graph
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Invalid tags_state transition: {from} -> {to}")]
pub struct InvalidTransition {
    /// State before the attempted change
    pub from: TagsState,

    /// Requested state
    pub to: TagsState,
}

impl TagsState {
    /// All states in graph order
    pub const ALL: [TagsState; 5] = [
        TagsState::NeedsTags,
        TagsState::Proposed,
        TagsState::Approved,
        TagsState::NeedsReview,
        TagsState::Archived,
    ];

    /// Get the state name as stored
    pub fn as_str(&self) -> &'static str {
        match self {
            TagsState::NeedsTags => "needs_tags",
            TagsState::Proposed => "proposed",
            TagsState::Approved => "approved",
            TagsState::NeedsReview => "needs_review",
            TagsState::Archived => "archived",
        }
    }

    /// Parse a state from its stored name
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "needs_tags" => Some(TagsState::NeedsTags),
            "proposed" => Some(TagsState::Proposed),
            "approved" => Some(TagsState::Approved),
            "needs_review" => Some(TagsState::NeedsReview),
            "archived" => Some(TagsState::Archived),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            TagsState::NeedsTags => 0,
            TagsState::Proposed => 1,
            TagsState::Approved => 2,
            TagsState::NeedsReview => 3,
            TagsState::Archived => 4,
        }
    }

    /// Whether no further transition is possible
    pub fn is_terminal(&self) -> bool {
        *self == TagsState::Archived
    }

    /// Whether `self → next` is an edge of the transition graph
    ///
    /// Staying in the same state is not a transition and returns `false`.
    pub fn can_transition_to(&self, next: TagsState) -> bool {
        match (self, next) {
            (TagsState::Archived, _) => false,
            (TagsState::NeedsReview, TagsState::Approved) => true,
            (TagsState::NeedsReview, TagsState::NeedsTags) => true,
            (from, to) => to.rank() > from.rank(),
        }
    }

    /// Check a transition, returning [`InvalidTransition`] when disallowed
    pub fn check_transition(&self, next: TagsState) -> Result<(), InvalidTransition> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(InvalidTransition { from: *self, to: next })
        }
    }
}

impl fmt::Display for TagsState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TagsState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("Invalid tags_state: {}", s))
    }
}
