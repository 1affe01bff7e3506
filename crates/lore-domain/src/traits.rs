//! Trait definitions for external interactions
//!
//! [`RuleStore`] is the single persistence boundary. Implementations live in
//! `lore-store`.

use crate::conflict::{ConflictId, ConflictRecord, ConflictStatus};
use crate::error::StoreError;
use crate::relationship::{Relationship, RelationshipType};
use crate::rule::{Rule, RuleId, RuleType};
use crate::tags_state::TagsState;
use crate::vocabulary::Vocabulary;
use serde::Serialize;
use std::collections::BTreeMap;

/// Query criteria for selecting rules
#[derive(Debug, Clone, Default)]
pub struct RuleQuery {
    /// Only rules in one of these states (empty = any state)
    pub states: Vec<TagsState>,

    /// Filter by domain
    pub domain: Option<String>,

    /// Maximum results to return
    pub limit: Option<usize>,
}

impl RuleQuery {
    /// Rules in a single state
    pub fn in_state(state: TagsState) -> Self {
        Self {
            states: vec![state],
            ..Default::default()
        }
    }

    /// Every rule that is not archived
    pub fn live() -> Self {
        Self {
            states: vec![
                TagsState::NeedsTags,
                TagsState::Proposed,
                TagsState::Approved,
                TagsState::NeedsReview,
            ],
            ..Default::default()
        }
    }

    /// Whether a rule satisfies the predicate (limit excluded)
    pub fn matches(&self, rule: &Rule) -> bool {
        (self.states.is_empty() || self.states.contains(&rule.tags_state))
            && self.domain.as_ref().is_none_or(|d| *d == rule.domain)
    }
}

/// Snapshot of matching rule ids, fixed when the query ran
///
/// Iteration fetches each rule lazily and can be restarted any number of
/// times. Rules changed after the snapshot was taken are returned in their
/// current form; callers re-check state before writing.
#[derive(Debug, Clone, Default)]
pub struct RuleSnapshot {
    ids: Vec<RuleId>,
}

impl RuleSnapshot {
    /// Wrap a list of ids
    pub fn new(mut ids: Vec<RuleId>) -> Self {
        ids.sort();
        Self { ids }
    }

    /// The ids captured by the snapshot, sorted
    pub fn ids(&self) -> &[RuleId] {
        &self.ids
    }

    /// Number of ids captured
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the snapshot is empty
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Lazily fetch each rule from the store
    pub fn iter<'a, S>(&'a self, store: &'a S) -> impl Iterator<Item = Result<Rule, StoreError>> + 'a
    where
        S: RuleStore + ?Sized,
    {
        self.ids
            .iter()
            .filter_map(move |id| store.get(id).transpose())
    }
}

/// Aggregate counts for reporting
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreStats {
    /// Total rules
    pub total: usize,
    /// Rules per tags_state
    pub by_state: BTreeMap<String, usize>,
    /// Non-archived rules per domain
    pub by_domain: BTreeMap<String, usize>,
    /// Conflict records that are not resolved
    pub open_conflicts: usize,
}

/// Trait for storing and retrieving rules
///
/// Every write is a single-rule transaction. `update` is optimistic: the
/// caller passes the version it read and the store refuses the write with
/// [`StoreError::ConcurrentModification`] if the rule moved on.
pub trait RuleStore {
    /// Insert a newly captured rule
    fn insert(&mut self, rule: Rule) -> Result<(), StoreError>;

    /// Get a rule by id
    fn get(&self, id: &RuleId) -> Result<Option<Rule>, StoreError>;

    /// Ids of rules matching the query, sorted
    fn select_ids(&self, query: &RuleQuery) -> Result<Vec<RuleId>, StoreError>;

    /// Apply a mutation in one transaction
    ///
    /// Implementations must run [`apply_mutation`] so version, transition
    /// and immutability checks behave identically across backends.
    fn update(
        &mut self,
        id: &RuleId,
        expected_version: u64,
        mutation: &mut dyn FnMut(&mut Rule),
    ) -> Result<Rule, StoreError>;

    /// Next free identifier for a rule type
    fn next_id(&self, rule_type: RuleType) -> Result<RuleId, StoreError>;

    /// Record a relationship (idempotent)
    fn add_relationship(&mut self, relationship: Relationship) -> Result<(), StoreError>;

    /// All relationships of one kind
    fn relationships(&self, kind: RelationshipType) -> Result<Vec<Relationship>, StoreError>;

    /// Insert a conflict record
    fn insert_conflict(&mut self, record: ConflictRecord) -> Result<(), StoreError>;

    /// Replace a stored conflict record
    fn update_conflict(&mut self, record: &ConflictRecord) -> Result<(), StoreError>;

    /// Get a conflict record by id
    fn get_conflict(&self, id: &ConflictId) -> Result<Option<ConflictRecord>, StoreError>;

    /// Conflict records, optionally filtered by status
    fn conflicts(&self, status: Option<ConflictStatus>) -> Result<Vec<ConflictRecord>, StoreError>;

    /// Persist a vocabulary snapshot
    fn save_vocabulary(&mut self, vocabulary: &Vocabulary) -> Result<(), StoreError>;

    /// Latest persisted vocabulary snapshot
    fn load_vocabulary(&self) -> Result<Option<Vocabulary>, StoreError>;

    /// Snapshot of ids matching a query
    fn query(&self, query: &RuleQuery) -> Result<RuleSnapshot, StoreError> {
        Ok(RuleSnapshot::new(self.select_ids(query)?))
    }

    /// Aggregate counts
    fn stats(&self) -> Result<StoreStats, StoreError> {
        let mut stats = StoreStats::default();
        let snapshot = self.query(&RuleQuery::default())?;
        for rule in snapshot.iter(self) {
            let rule = rule?;
            stats.total += 1;
            *stats.by_state.entry(rule.tags_state.to_string()).or_insert(0) += 1;
            if !rule.is_archived() {
                *stats.by_domain.entry(rule.domain.clone()).or_insert(0) += 1;
            }
        }
        stats.open_conflicts = self
            .conflicts(None)?
            .iter()
            .filter(|c| c.status.is_open())
            .count();
        Ok(stats)
    }
}

/// Validate and apply a mutation to a copy of `current`
///
/// Checks, in order: the version the caller read, the immutable fields
/// (`id`, `provenance`), manual salience stickiness, and the tags_state
/// transition. On success the returned rule carries the next version.
pub fn apply_mutation(
    current: &Rule,
    expected_version: u64,
    mutation: &mut dyn FnMut(&mut Rule),
) -> Result<Rule, StoreError> {
    let id = current.id.to_string();

    if current.version != expected_version {
        return Err(StoreError::ConcurrentModification {
            id,
            expected: expected_version,
            actual: current.version,
        });
    }

    let mut next = current.clone();
    mutation(&mut next);

    if next.id != current.id {
        return Err(StoreError::ImmutableField { id, field: "id" });
    }
    if next.provenance != current.provenance {
        return Err(StoreError::ImmutableField { id, field: "provenance" });
    }
    if current.salience.is_manual() && !next.salience.is_manual() {
        return Err(StoreError::ImmutableField { id, field: "salience" });
    }
    if next.tags_state != current.tags_state
        && !current.tags_state.can_transition_to(next.tags_state)
    {
        return Err(StoreError::InvalidTransition {
            id,
            from: current.tags_state,
            to: next.tags_state,
        });
    }

    next.version = current.version + 1;
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::Provenance;
    use crate::salience::Salience;

    fn rule() -> Rule {
        Rule::new(
            RuleId::new(RuleType::Decision, 1),
            "Use cursor pagination",
            "api",
            Provenance::new("s1", 100),
        )
    }

    #[test]
    fn test_apply_mutation_bumps_version() {
        let current = rule();
        let next = apply_mutation(&current, 0, &mut |r| r.text.push('!')).unwrap();
        assert_eq!(next.version, 1);
        assert!(next.text.ends_with('!'));
    }

    #[test]
    fn test_apply_mutation_stale_version() {
        let current = rule();
        let err = apply_mutation(&current, 3, &mut |_| {}).unwrap_err();
        assert!(err.is_concurrent_modification());
    }

    #[test]
    fn test_apply_mutation_rejects_invalid_transition() {
        let mut current = rule();
        current.tags_state = TagsState::Archived;
        let err = apply_mutation(&current, 0, &mut |r| r.tags_state = TagsState::Approved).unwrap_err();
        assert!(err.is_contract_violation());
    }

    #[test]
    fn test_apply_mutation_rejects_provenance_change() {
        let current = rule();
        let err = apply_mutation(&current, 0, &mut |r| r.provenance.created_at = 1).unwrap_err();
        assert_eq!(
            err,
            StoreError::ImmutableField { id: "decision-1".to_string(), field: "provenance" }
        );
    }

    #[test]
    fn test_apply_mutation_keeps_manual_salience() {
        let mut current = rule();
        current.salience = Salience::manual(0.9);
        let err = apply_mutation(&current, 0, &mut |r| r.salience = Salience::computed(0.2)).unwrap_err();
        assert!(err.is_contract_violation());
        let ok = apply_mutation(&current, 0, &mut |r| r.salience = Salience::manual(0.3)).unwrap();
        assert_eq!(ok.salience.value, 0.3);
    }

    #[test]
    fn test_query_matches() {
        let r = rule();
        assert!(RuleQuery::in_state(TagsState::NeedsTags).matches(&r));
        assert!(!RuleQuery::in_state(TagsState::Approved).matches(&r));
        assert!(RuleQuery::live().matches(&r));
        let q = RuleQuery { domain: Some("data".to_string()), ..Default::default() };
        assert!(!q.matches(&r));
    }
}
