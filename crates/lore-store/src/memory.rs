//! In-memory rule store

use lore_domain::traits::{apply_mutation, RuleQuery, RuleStore};
use lore_domain::{
    ConflictId, ConflictRecord, ConflictStatus, Relationship, RelationshipType, Rule, RuleId,
    RuleType, StoreError, Vocabulary,
};
use std::collections::{BTreeMap, BTreeSet};

/// Rule store held entirely in memory
///
/// Mirrors [`SqliteStore`](crate::SqliteStore) semantics. Also offers
/// fault hooks so callers can exercise concurrent-modification and
/// write-failure paths deterministically.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rules: BTreeMap<RuleId, Rule>,
    relationships: BTreeSet<(RuleId, RuleId, RelationshipType, u64)>,
    conflicts: BTreeMap<ConflictId, ConflictRecord>,
    vocabularies: BTreeMap<u64, Vocabulary>,
    interference: BTreeSet<RuleId>,
    failing: BTreeSet<RuleId>,
    failing_conflict_insert: bool,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate another writer touching `id` just before the next update
    ///
    /// The next `update` of that rule sees a bumped version and fails with
    /// [`StoreError::ConcurrentModification`]. The hook fires once.
    pub fn schedule_interference(&mut self, id: RuleId) {
        self.interference.insert(id);
    }

    /// Make every update of `id` fail with a backend error
    pub fn fail_writes_for(&mut self, id: RuleId) {
        self.failing.insert(id);
    }

    /// Make the next `insert_conflict` fail with a backend error
    pub fn fail_next_conflict_insert(&mut self) {
        self.failing_conflict_insert = true;
    }

    /// Number of stored rules
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the store holds no rules
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl RuleStore for MemoryStore {
    fn insert(&mut self, rule: Rule) -> Result<(), StoreError> {
        if self.rules.contains_key(&rule.id) {
            return Err(StoreError::Duplicate(rule.id.to_string()));
        }
        self.rules.insert(rule.id, rule);
        Ok(())
    }

    fn get(&self, id: &RuleId) -> Result<Option<Rule>, StoreError> {
        Ok(self.rules.get(id).cloned())
    }

    fn select_ids(&self, query: &RuleQuery) -> Result<Vec<RuleId>, StoreError> {
        let ids = self
            .rules
            .values()
            .filter(|r| query.matches(r))
            .map(|r| r.id)
            .take(query.limit.unwrap_or(usize::MAX))
            .collect();
        Ok(ids)
    }

    fn update(
        &mut self,
        id: &RuleId,
        expected_version: u64,
        mutation: &mut dyn FnMut(&mut Rule),
    ) -> Result<Rule, StoreError> {
        if self.failing.contains(id) {
            return Err(StoreError::Backend(format!("write to {} failed", id)));
        }

        let current = self
            .rules
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        if self.interference.remove(id) {
            current.version += 1;
        }

        let next = apply_mutation(current, expected_version, mutation)?;
        *current = next.clone();
        Ok(next)
    }

    fn next_id(&self, rule_type: RuleType) -> Result<RuleId, StoreError> {
        let max = self
            .rules
            .keys()
            .filter(|id| id.rule_type() == rule_type)
            .map(|id| id.sequence())
            .max()
            .unwrap_or(0);
        Ok(RuleId::new(rule_type, max + 1))
    }

    fn add_relationship(&mut self, relationship: Relationship) -> Result<(), StoreError> {
        let exists = self.relationships.iter().any(|(from, to, kind, _)| {
            *from == relationship.from_rule
                && *to == relationship.to_rule
                && *kind == relationship.relationship_type
        });
        if !exists {
            self.relationships.insert((
                relationship.from_rule,
                relationship.to_rule,
                relationship.relationship_type,
                relationship.created_at,
            ));
        }
        Ok(())
    }

    fn relationships(&self, kind: RelationshipType) -> Result<Vec<Relationship>, StoreError> {
        Ok(self
            .relationships
            .iter()
            .filter(|(_, _, k, _)| *k == kind)
            .map(|(from, to, k, at)| Relationship {
                from_rule: *from,
                to_rule: *to,
                relationship_type: *k,
                created_at: *at,
            })
            .collect())
    }

    fn insert_conflict(&mut self, record: ConflictRecord) -> Result<(), StoreError> {
        if std::mem::take(&mut self.failing_conflict_insert) {
            return Err(StoreError::Backend(format!("injected failure inserting conflict {}", record.id)));
        }
        if self.conflicts.contains_key(&record.id) {
            return Err(StoreError::Duplicate(record.id.to_string()));
        }
        self.conflicts.insert(record.id, record);
        Ok(())
    }

    fn update_conflict(&mut self, record: &ConflictRecord) -> Result<(), StoreError> {
        match self.conflicts.get_mut(&record.id) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(record.id.to_string())),
        }
    }

    fn get_conflict(&self, id: &ConflictId) -> Result<Option<ConflictRecord>, StoreError> {
        Ok(self.conflicts.get(id).cloned())
    }

    fn conflicts(&self, status: Option<ConflictStatus>) -> Result<Vec<ConflictRecord>, StoreError> {
        let mut records: Vec<ConflictRecord> = self
            .conflicts
            .values()
            .filter(|c| status.is_none_or(|s| c.status == s))
            .cloned()
            .collect();
        records.sort_by(|a, b| a.detected_at.cmp(&b.detected_at).then(a.id.cmp(&b.id)));
        Ok(records)
    }

    fn save_vocabulary(&mut self, vocabulary: &Vocabulary) -> Result<(), StoreError> {
        self.vocabularies.insert(vocabulary.version, vocabulary.clone());
        Ok(())
    }

    fn load_vocabulary(&self) -> Result<Option<Vocabulary>, StoreError> {
        Ok(self.vocabularies.values().next_back().cloned())
    }
}
