//! SQLite-backed rule store

use lore_domain::traits::{apply_mutation, RuleQuery, RuleStore, StoreStats};
use lore_domain::{
    current_timestamp, ConflictId, ConflictRecord, ConflictStatus, Metadata, Provenance,
    Relationship, RelationshipType, Rule, RuleId, RuleType, Salience, SalienceMethod,
    StoreError, TagsState, Vocabulary,
};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, TransactionBehavior};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::debug;

const RULE_COLUMNS: &str = "id, text, domain, tags, tags_state, salience, salience_method, \
                            source_session, created_at, metadata, version";

/// SQLite-based implementation of RuleStore
///
/// Each `update` runs inside an IMMEDIATE transaction, so concurrent writers
/// (other processes sharing the file) are serialized by SQLite's write lock
/// and stale reads are caught by the version check.
///
/// # Thread Safety
///
/// SQLite connections are not thread-safe. Each thread should have its own
/// SqliteStore instance.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) a store at the given database path
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use lore_store::SqliteStore;
    ///
    /// let store = SqliteStore::new("lore.db").unwrap();
    /// ```
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(StoreError::backend)?;
        Self::with_connection(conn)
    }

    /// Create a store backed by an in-memory database (useful for testing)
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(StoreError::backend)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        let store = Self { conn };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Initialize the database schema
    fn initialize_schema(&self) -> Result<(), StoreError> {
        let schema = include_str!("schema.sql");
        self.conn.execute_batch(schema).map_err(StoreError::backend)
    }
}

fn conversion_error<E>(idx: usize, ty: Type, e: E) -> rusqlite::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    rusqlite::Error::FromSqlConversionFailure(idx, ty, e.into())
}

/// Convert an unsigned counter for an INTEGER column
fn to_sql_int(value: u64, what: &str) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::InvalidData(format!("{} {} exceeds the SQLite integer range", what, value)))
}

/// Read an INTEGER column back into an unsigned counter
fn read_u64(row: &Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    let value: i64 = row.get(idx)?;
    u64::try_from(value).map_err(|e| conversion_error(idx, Type::Integer, e))
}

fn to_json<T: Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::InvalidData(e.to_string()))
}

fn row_to_rule(row: &Row<'_>) -> rusqlite::Result<Rule> {
    let id: String = row.get(0)?;
    let id = RuleId::parse(&id).map_err(|e| conversion_error(0, Type::Text, e))?;

    let tags: String = row.get(3)?;
    let tags: BTreeSet<String> =
        serde_json::from_str(&tags).map_err(|e| conversion_error(3, Type::Text, e))?;

    let state: String = row.get(4)?;
    let tags_state = TagsState::parse(&state)
        .ok_or_else(|| conversion_error(4, Type::Text, format!("Unknown tags_state: {}", state)))?;

    let method: String = row.get(6)?;
    let method = SalienceMethod::parse(&method)
        .ok_or_else(|| conversion_error(6, Type::Text, format!("Unknown salience method: {}", method)))?;

    let metadata: String = row.get(9)?;
    let metadata: Metadata =
        serde_json::from_str(&metadata).map_err(|e| conversion_error(9, Type::Text, e))?;

    Ok(Rule {
        id,
        text: row.get(1)?,
        domain: row.get(2)?,
        tags,
        tags_state,
        salience: Salience {
            value: row.get(5)?,
            method,
        },
        provenance: Provenance::new(row.get::<_, String>(7)?, read_u64(row, 8)?),
        metadata,
        version: read_u64(row, 10)?,
    })
}

fn read_rule(conn: &Connection, id: &RuleId) -> Result<Option<Rule>, StoreError> {
    let sql = format!("SELECT {} FROM rules WHERE id = ?1", RULE_COLUMNS);
    conn.query_row(&sql, params![id.to_string()], row_to_rule)
        .optional()
        .map_err(StoreError::backend)
}

impl RuleStore for SqliteStore {
    fn insert(&mut self, rule: Rule) -> Result<(), StoreError> {
        let id = rule.id.to_string();

        let exists: bool = self
            .conn
            .query_row("SELECT 1 FROM rules WHERE id = ?1", params![&id], |_| Ok(true))
            .optional()
            .map_err(StoreError::backend)?
            .unwrap_or(false);

        if exists {
            return Err(StoreError::Duplicate(id));
        }

        self.conn
            .execute(
                "INSERT INTO rules (id, rule_type, sequence, text, domain, tags, tags_state, salience,
                                    salience_method, source_session, created_at, metadata, version, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    &id,
                    rule.id.rule_type().as_str(),
                    to_sql_int(rule.id.sequence(), "sequence")?,
                    &rule.text,
                    &rule.domain,
                    to_json(&rule.tags)?,
                    rule.tags_state.as_str(),
                    rule.salience.value,
                    rule.salience.method.as_str(),
                    &rule.provenance.session,
                    to_sql_int(rule.provenance.created_at, "created_at")?,
                    to_json(&rule.metadata)?,
                    to_sql_int(rule.version, "version")?,
                    to_sql_int(current_timestamp(), "timestamp")?,
                ],
            )
            .map_err(StoreError::backend)?;

        debug!("Inserted rule {}", id);
        Ok(())
    }

    fn get(&self, id: &RuleId) -> Result<Option<Rule>, StoreError> {
        read_rule(&self.conn, id)
    }

    fn select_ids(&self, query: &RuleQuery) -> Result<Vec<RuleId>, StoreError> {
        let mut sql = String::from("SELECT id FROM rules WHERE 1=1");
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if !query.states.is_empty() {
            let placeholders = vec!["?"; query.states.len()].join(", ");
            sql.push_str(&format!(" AND tags_state IN ({})", placeholders));
            for state in &query.states {
                params.push(Box::new(state.as_str()));
            }
        }

        if let Some(domain) = &query.domain {
            sql.push_str(" AND domain = ?");
            params.push(Box::new(domain.clone()));
        }

        sql.push_str(" ORDER BY rule_type, sequence");

        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            params.push(Box::new(to_sql_int(limit as u64, "limit")?));
        }

        let mut stmt = self.conn.prepare(&sql).map_err(StoreError::backend)?;
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let ids = stmt
            .query_map(&param_refs[..], |row| {
                let id: String = row.get(0)?;
                RuleId::parse(&id).map_err(|e| conversion_error(0, Type::Text, e))
            })
            .map_err(StoreError::backend)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::backend)?;

        Ok(ids)
    }

    fn update(
        &mut self,
        id: &RuleId,
        expected_version: u64,
        mutation: &mut dyn FnMut(&mut Rule),
    ) -> Result<Rule, StoreError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StoreError::backend)?;

        let current = read_rule(&tx, id)?.ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let next = apply_mutation(&current, expected_version, mutation)?;

        let changed = tx
            .execute(
                "UPDATE rules SET text = ?1, domain = ?2, tags = ?3, tags_state = ?4, salience = ?5,
                                  salience_method = ?6, metadata = ?7, version = ?8, updated_at = ?9
                 WHERE id = ?10 AND version = ?11",
                params![
                    &next.text,
                    &next.domain,
                    to_json(&next.tags)?,
                    next.tags_state.as_str(),
                    next.salience.value,
                    next.salience.method.as_str(),
                    to_json(&next.metadata)?,
                    to_sql_int(next.version, "version")?,
                    to_sql_int(current_timestamp(), "timestamp")?,
                    id.to_string(),
                    to_sql_int(current.version, "version")?,
                ],
            )
            .map_err(StoreError::backend)?;

        if changed != 1 {
            return Err(StoreError::ConcurrentModification {
                id: id.to_string(),
                expected: expected_version,
                actual: current.version + 1,
            });
        }

        tx.commit().map_err(StoreError::backend)?;

        debug!("Updated rule {} to version {} ({})", id, next.version, next.tags_state);
        Ok(next)
    }

    fn next_id(&self, rule_type: RuleType) -> Result<RuleId, StoreError> {
        let max: i64 = self
            .conn
            .query_row(
                "SELECT COALESCE(MAX(sequence), 0) FROM rules WHERE rule_type = ?1",
                params![rule_type.as_str()],
                |row| row.get(0),
            )
            .map_err(StoreError::backend)?;
        let next = u64::try_from(max)
            .ok()
            .and_then(|max| max.checked_add(1))
            .ok_or_else(|| StoreError::InvalidData(format!("{} sequence {} cannot be extended", rule_type, max)))?;
        Ok(RuleId::new(rule_type, next))
    }

    fn add_relationship(&mut self, relationship: Relationship) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO rule_relationships (from_rule, to_rule, relationship_type, created_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(from_rule, to_rule, relationship_type) DO NOTHING",
                params![
                    relationship.from_rule.to_string(),
                    relationship.to_rule.to_string(),
                    relationship.relationship_type.as_str(),
                    to_sql_int(relationship.created_at, "created_at")?,
                ],
            )
            .map_err(StoreError::backend)?;
        Ok(())
    }

    fn relationships(&self, kind: RelationshipType) -> Result<Vec<Relationship>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT from_rule, to_rule, created_at FROM rule_relationships
                 WHERE relationship_type = ?1 ORDER BY from_rule, to_rule",
            )
            .map_err(StoreError::backend)?;

        let relationships = stmt
            .query_map(params![kind.as_str()], |row| {
                let from: String = row.get(0)?;
                let to: String = row.get(1)?;
                Ok(Relationship {
                    from_rule: RuleId::parse(&from).map_err(|e| conversion_error(0, Type::Text, e))?,
                    to_rule: RuleId::parse(&to).map_err(|e| conversion_error(1, Type::Text, e))?,
                    relationship_type: kind,
                    created_at: read_u64(row, 2)?,
                })
            })
            .map_err(StoreError::backend)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::backend)?;

        Ok(relationships)
    }

    fn insert_conflict(&mut self, record: ConflictRecord) -> Result<(), StoreError> {
        let id = record.id.to_string();
        let inserted = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO conflicts (id, status, body, detected_at) VALUES (?1, ?2, ?3, ?4)",
                params![&id, record.status.as_str(), to_json(&record)?, to_sql_int(record.detected_at, "detected_at")?],
            )
            .map_err(StoreError::backend)?;

        if inserted == 0 {
            return Err(StoreError::Duplicate(id));
        }
        Ok(())
    }

    fn update_conflict(&mut self, record: &ConflictRecord) -> Result<(), StoreError> {
        let id = record.id.to_string();
        let changed = self
            .conn
            .execute(
                "UPDATE conflicts SET status = ?1, body = ?2 WHERE id = ?3",
                params![record.status.as_str(), to_json(record)?, &id],
            )
            .map_err(StoreError::backend)?;

        if changed == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    fn get_conflict(&self, id: &ConflictId) -> Result<Option<ConflictRecord>, StoreError> {
        let body: Option<String> = self
            .conn
            .query_row(
                "SELECT body FROM conflicts WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(StoreError::backend)?;

        body.map(|b| serde_json::from_str(&b).map_err(|e| StoreError::InvalidData(e.to_string())))
            .transpose()
    }

    fn conflicts(&self, status: Option<ConflictStatus>) -> Result<Vec<ConflictRecord>, StoreError> {
        let filter = status.map(|s| s.as_str());
        let sql = if filter.is_some() {
            "SELECT body FROM conflicts WHERE status = ?1 ORDER BY detected_at, id"
        } else {
            "SELECT body FROM conflicts ORDER BY detected_at, id"
        };

        let mut stmt = self.conn.prepare(sql).map_err(StoreError::backend)?;
        let bodies = stmt
            .query_map(params_from_iter(filter.iter()), |row| row.get::<_, String>(0))
            .map_err(StoreError::backend)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::backend)?;

        bodies
            .iter()
            .map(|b| serde_json::from_str(b).map_err(|e| StoreError::InvalidData(e.to_string())))
            .collect()
    }

    fn save_vocabulary(&mut self, vocabulary: &Vocabulary) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO vocabulary_snapshots (version, body, saved_at) VALUES (?1, ?2, ?3)",
                params![
                    to_sql_int(vocabulary.version, "version")?,
                    to_json(vocabulary)?,
                    to_sql_int(current_timestamp(), "timestamp")?
                ],
            )
            .map_err(StoreError::backend)?;
        Ok(())
    }

    fn load_vocabulary(&self) -> Result<Option<Vocabulary>, StoreError> {
        let body: Option<String> = self
            .conn
            .query_row(
                "SELECT body FROM vocabulary_snapshots ORDER BY version DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(StoreError::backend)?;

        body.map(|b| serde_json::from_str(&b).map_err(|e| StoreError::InvalidData(e.to_string())))
            .transpose()
    }

    fn stats(&self) -> Result<StoreStats, StoreError> {
        let mut stats = StoreStats::default();

        let mut stmt = self
            .conn
            .prepare("SELECT tags_state, COUNT(*) FROM rules GROUP BY tags_state")
            .map_err(StoreError::backend)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .map_err(StoreError::backend)?;
        for row in rows {
            let (state, count) = row.map_err(StoreError::backend)?;
            stats.total += count as usize;
            stats.by_state.insert(state, count as usize);
        }

        let mut stmt = self
            .conn
            .prepare("SELECT domain, COUNT(*) FROM rules WHERE tags_state != 'archived' GROUP BY domain")
            .map_err(StoreError::backend)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .map_err(StoreError::backend)?;
        for row in rows {
            let (domain, count) = row.map_err(StoreError::backend)?;
            stats.by_domain.insert(domain, count as usize);
        }

        let open: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM conflicts WHERE status IN ('unresolved', 'escalated')",
                [],
                |row| row.get(0),
            )
            .map_err(StoreError::backend)?;
        stats.open_conflicts = open as usize;

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(seq: u64) -> Rule {
        Rule::new(
            RuleId::new(RuleType::Decision, seq),
            "Prefer cursor pagination for list endpoints",
            "api",
            Provenance::new("session-1", 1_000),
        )
    }

    #[test]
    fn test_store_initialization() {
        assert!(SqliteStore::open_in_memory().is_ok());
    }

    #[test]
    fn test_insert_and_get() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let original = rule(1).with_tags(["pagination"]);
        store.insert(original.clone()).unwrap();

        let loaded = store.get(&original.id).unwrap().unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.insert(rule(1)).unwrap();
        assert!(matches!(store.insert(rule(1)), Err(StoreError::Duplicate(_))));
    }

    #[test]
    fn test_update_checks_version() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let r = rule(1);
        store.insert(r.clone()).unwrap();

        let updated = store
            .update(&r.id, 0, &mut |r| r.tags_state = TagsState::Approved)
            .unwrap();
        assert_eq!(updated.version, 1);

        let stale = store.update(&r.id, 0, &mut |r| r.text.push('.'));
        assert!(stale.unwrap_err().is_concurrent_modification());

        let loaded = store.get(&r.id).unwrap().unwrap();
        assert_eq!(loaded.tags_state, TagsState::Approved);
        assert_eq!(loaded.version, 1);
    }

    #[test]
    fn test_invalid_transition_rolls_back() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let r = rule(1);
        store.insert(r.clone()).unwrap();
        store.update(&r.id, 0, &mut |r| r.tags_state = TagsState::Archived).unwrap();

        let err = store
            .update(&r.id, 1, &mut |r| r.tags_state = TagsState::Approved)
            .unwrap_err();
        assert!(err.is_contract_violation());
        assert_eq!(store.get(&r.id).unwrap().unwrap().tags_state, TagsState::Archived);
    }

    #[test]
    fn test_next_id() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.next_id(RuleType::Decision).unwrap(), RuleId::new(RuleType::Decision, 1));
        store.insert(rule(7)).unwrap();
        assert_eq!(store.next_id(RuleType::Decision).unwrap(), RuleId::new(RuleType::Decision, 8));
        assert_eq!(store.next_id(RuleType::Pattern).unwrap(), RuleId::new(RuleType::Pattern, 1));
    }

    #[test]
    fn test_counters_outside_integer_range() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let mut r = rule(1);
        r.version = u64::MAX;
        assert!(matches!(store.insert(r.clone()), Err(StoreError::InvalidData(_))));
        assert!(store.get(&r.id).unwrap().is_none());

        let far = Rule::new(
            RuleId::new(RuleType::Decision, u64::MAX),
            "Prefer cursor pagination for list endpoints",
            "api",
            Provenance::new("session-1", 1_000),
        );
        assert!(matches!(store.insert(far), Err(StoreError::InvalidData(_))));

        // A negative counter written by another tool is not read back as a huge one
        store
            .conn
            .execute(
                "INSERT INTO rules (id, rule_type, sequence, text, domain, salience, source_session,
                                    created_at, version, updated_at)
                 VALUES ('decision-2', 'decision', 2, 'x', 'api', 0.6, 's', 0, -1, 0)",
                [],
            )
            .unwrap();
        let err = store.get(&RuleId::new(RuleType::Decision, 2)).unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
    }
}
