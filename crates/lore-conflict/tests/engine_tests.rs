//! Conflict Engine against real stores and a scripted oracle

use lore_conflict::{
    request_retag, resolve_manually, ConflictConfig, ConflictEngine, ConflictError, ConflictReport,
    CONFLICT_RESOLVED,
};
use lore_domain::metadata::keys;
use lore_domain::{
    set_salience, AutoPolicy, CancelToken, ConflictId, ConflictRecord, ConflictStatus,
    ContradictionKind, Provenance, Relationship, RelationshipType, ResolutionStrategy, Rule,
    RuleId, RuleStore, RuleType, TagsState, Vocabulary,
};
use lore_oracle::{AdjudicateConflict, Adjudication, RequestKind, Scripted, ScriptedOracle};
use lore_store::{MemoryStore, SqliteStore};

fn vocab() -> Vocabulary {
    Vocabulary::new()
        .with_domain("api", "HTTP API design and conventions", &["rest"])
        .with_domain("data", "Persistence and schema evolution", &[])
        .with_tags("api", &["pagination", "errors"])
}

fn approved<S: RuleStore + ?Sized>(
    store: &mut S,
    seq: u64,
    text: &str,
    salience: f64,
    created_at: u64,
) -> RuleId {
    let id = RuleId::new(RuleType::Decision, seq);
    let mut rule = Rule::new(id, text, "api", Provenance::new("session-1", created_at))
        .with_salience(salience)
        .with_tags(["pagination"]);
    rule.tags_state = TagsState::Approved;
    store.insert(rule).unwrap();
    id
}

/// Two approved rules, the second negating the first
fn negated_pair<S: RuleStore + ?Sized>(store: &mut S) -> (RuleId, RuleId) {
    let plain = approved(store, 1, "Use offset pagination for list endpoints", 0.4, 100);
    let negated = approved(store, 2, "Never use offset pagination for list endpoints", 0.9, 50);
    (plain, negated)
}

fn fetch<S: RuleStore + ?Sized>(store: &S, id: &RuleId) -> Rule {
    store.get(id).unwrap().unwrap()
}

fn only_record<S: RuleStore + ?Sized>(store: &S) -> ConflictRecord {
    let records = store.conflicts(None).unwrap();
    assert_eq!(records.len(), 1);
    records.into_iter().next().unwrap()
}

fn with_strategy(strategy: ResolutionStrategy) -> ConflictConfig {
    ConflictConfig {
        strategy,
        ..ConflictConfig::default()
    }
}

fn llm_assisted() -> ConflictConfig {
    with_strategy(ResolutionStrategy::LlmAssisted { threshold: 0.80 })
}

fn adjudication(keep: RuleId, confidence: f64) -> Scripted<Adjudication> {
    Scripted::Reply(Adjudication {
        keep,
        confidence,
        rationale: "the negated form matches current practice".to_string(),
    })
}

async fn run<S: RuleStore + ?Sized>(
    store: &mut S,
    config: ConflictConfig,
    oracle: Option<&ScriptedOracle>,
) -> ConflictReport {
    ConflictEngine::new(config)
        .unwrap()
        .run(
            store,
            &vocab(),
            oracle.map(|o| o as &dyn AdjudicateConflict),
            &CancelToken::new(),
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn test_manual_strategy_flags_both_rules() {
    let mut store = MemoryStore::new();
    let (a, b) = negated_pair(&mut store);

    let report = run(&mut store, ConflictConfig::default(), None).await;

    assert_eq!(report.detected, 1);
    assert_eq!(report.manual, 1);
    assert_eq!(report.resolved, 0);

    let record = only_record(&store);
    assert_eq!(record.status, ConflictStatus::Unresolved);
    assert_eq!(record.kind, ContradictionKind::Negation);
    assert_eq!(record.rules, vec![a, b]);
    for id in [a, b] {
        let rule = fetch(&store, &id);
        assert_eq!(rule.tags_state, TagsState::NeedsReview);
        assert_eq!(rule.metadata.get_str(keys::REVIEW_REASON), Some("conflict"));
        assert_eq!(rule.metadata.string_list(keys::CONFLICT_REFS), vec![record.id.to_string()]);
    }

    let again = run(&mut store, ConflictConfig::default(), None).await;
    assert_eq!(again.detected, 0);
    assert_eq!(store.conflicts(None).unwrap().len(), 1);
}

#[tokio::test]
async fn test_auto_keeps_higher_salience() {
    let mut store = MemoryStore::new();
    let (plain, negated) = negated_pair(&mut store);

    let report = run(
        &mut store,
        with_strategy(ResolutionStrategy::Auto { policy: AutoPolicy::KeepHigherSalience }),
        None,
    )
    .await;

    assert_eq!(report.resolved, 1);
    let record = only_record(&store);
    assert_eq!(record.status, ConflictStatus::Resolved);
    assert_eq!(record.kept, Some(negated));
    assert_eq!(record.archived, vec![plain]);

    let kept = fetch(&store, &negated);
    assert_eq!(kept.tags_state, TagsState::Approved);
    assert!(!kept.metadata.contains(keys::REVIEW_REASON));

    let loser = fetch(&store, &plain);
    assert_eq!(loser.tags_state, TagsState::Archived);
    assert_eq!(loser.metadata.get_str(keys::ARCHIVE_REASON), Some(CONFLICT_RESOLVED));
    let resolution = loser.metadata.get(keys::CONFLICT_RESOLUTION).unwrap();
    assert_eq!(resolution["strategy"], "keep_higher_salience");
    assert_eq!(resolution["kept_rule"], "decision-2");
    assert_eq!(resolution["conflict_id"], record.id.to_string());
}

#[tokio::test]
async fn test_auto_keeps_newer() {
    let mut store = MemoryStore::new();
    let (plain, negated) = negated_pair(&mut store);

    run(
        &mut store,
        with_strategy(ResolutionStrategy::Auto { policy: AutoPolicy::KeepNewer }),
        None,
    )
    .await;

    assert_eq!(fetch(&store, &plain).tags_state, TagsState::Approved);
    assert_eq!(fetch(&store, &negated).tags_state, TagsState::Archived);
}

#[tokio::test]
async fn test_manual_salience_survives_resolution() {
    let mut store = MemoryStore::new();
    let (plain, _) = negated_pair(&mut store);
    set_salience(&mut store, &plain, 0.95).unwrap();

    run(
        &mut store,
        with_strategy(ResolutionStrategy::Auto { policy: AutoPolicy::KeepHigherSalience }),
        None,
    )
    .await;

    let kept = fetch(&store, &plain);
    assert_eq!(kept.tags_state, TagsState::Approved);
    assert!(kept.salience.is_manual());
    assert_eq!(kept.salience.value, 0.95);
}

#[tokio::test]
async fn test_low_confidence_adjudication_escalates() {
    let mut store = MemoryStore::new();
    let (a, b) = negated_pair(&mut store);
    let oracle = ScriptedOracle::new();
    oracle.script_adjudication(&a, &b, adjudication(b, 0.79));

    let report = run(&mut store, llm_assisted(), Some(&oracle)).await;

    assert_eq!(report.escalated, 1);
    assert_eq!(report.resolved, 0);
    assert_eq!(report.oracle_calls, 1);

    let record = only_record(&store);
    assert_eq!(record.status, ConflictStatus::Escalated);
    assert_eq!(record.oracle_confidence, Some(0.79));
    assert!(record.kept.is_none());
    assert_eq!(fetch(&store, &a).tags_state, TagsState::NeedsReview);
    assert_eq!(fetch(&store, &b).tags_state, TagsState::NeedsReview);
}

#[tokio::test]
async fn test_adjudication_at_threshold_resolves() {
    let mut store = MemoryStore::new();
    let (a, b) = negated_pair(&mut store);
    let oracle = ScriptedOracle::new();
    // The oracle may keep the lower-salience rule
    oracle.script_adjudication(&a, &b, adjudication(a, 0.80));

    let report = run(&mut store, llm_assisted(), Some(&oracle)).await;

    assert_eq!(report.resolved, 1);
    let record = only_record(&store);
    assert_eq!(record.kept, Some(a));
    assert_eq!(record.oracle_confidence, Some(0.80));
    assert_eq!(fetch(&store, &a).tags_state, TagsState::Approved);

    let loser = fetch(&store, &b);
    assert_eq!(loser.tags_state, TagsState::Archived);
    assert_eq!(loser.metadata.get(keys::CONFLICT_RESOLUTION).unwrap()["strategy"], "llm_assisted");
}

#[tokio::test]
async fn test_oracle_failures_escalate() {
    for outcome in [Scripted::Timeout, Scripted::Malformed] {
        let mut store = MemoryStore::new();
        let (a, b) = negated_pair(&mut store);
        let oracle = ScriptedOracle::new();
        oracle.script_adjudication(&a, &b, outcome);

        let report = run(&mut store, llm_assisted(), Some(&oracle)).await;

        assert_eq!(report.escalated, 1);
        let record = only_record(&store);
        assert_eq!(record.status, ConflictStatus::Escalated);
        assert!(record.evidence.iter().any(|e| e.starts_with("adjudication failed")));
        assert_eq!(fetch(&store, &a).tags_state, TagsState::NeedsReview);
        assert_eq!(fetch(&store, &b).tags_state, TagsState::NeedsReview);
    }
}

#[tokio::test]
async fn test_ceilings_escalate_without_oracle_call() {
    let configs = [
        ConflictConfig { max_oracle_cost: Some(1.0), ..llm_assisted() },
        ConflictConfig { max_conflicts: 1, ..llm_assisted() },
    ];
    for config in configs {
        let mut store = MemoryStore::new();
        let (a, b) = negated_pair(&mut store);
        let c = approved(&mut store, 3, "Return errors as problem details", 0.5, 0);
        let d = approved(&mut store, 4, "Return errors as plain text", 0.5, 0);
        store
            .add_relationship(Relationship::new(c, d, RelationshipType::ConflictsWith, 0))
            .unwrap();

        let oracle = ScriptedOracle::new();
        oracle.script_adjudication(&a, &b, adjudication(b, 0.95));
        oracle.script_adjudication(&c, &d, adjudication(c, 0.95));

        let report = run(&mut store, config, Some(&oracle)).await;

        assert_eq!(report.detected, 2);
        assert_eq!(report.resolved, 1);
        assert_eq!(report.escalated, 1);
        assert!(report.budget_exhausted);
        assert_eq!(oracle.calls_of(RequestKind::ConflictAdjudication), 1);
        assert_eq!(fetch(&store, &c).tags_state, TagsState::NeedsReview);
        assert_eq!(fetch(&store, &d).tags_state, TagsState::NeedsReview);
    }
}

#[tokio::test]
async fn test_llm_assisted_requires_oracle() {
    let mut store = MemoryStore::new();
    let result = ConflictEngine::new(llm_assisted())
        .unwrap()
        .run(&mut store, &vocab(), None, &CancelToken::new())
        .await;
    assert!(matches!(result, Err(ConflictError::Config(_))));
}

#[tokio::test]
async fn test_failed_second_flag_restores_first_rule() {
    let mut store = MemoryStore::new();
    let (a, b) = negated_pair(&mut store);
    store.schedule_interference(b);

    let report = run(&mut store, ConflictConfig::default(), None).await;

    assert_eq!(report.detected, 0);
    assert_eq!(report.compensated, 1);
    assert_eq!(report.failed_writes, 1);
    assert!(store.conflicts(None).unwrap().is_empty());
    let restored = fetch(&store, &a);
    assert_eq!(restored.tags_state, TagsState::Approved);
    assert!(!restored.metadata.contains(keys::CONFLICT_REFS));
    assert!(!restored.metadata.contains(keys::REVIEW_REASON));

    // Found again on the next run
    let again = run(&mut store, ConflictConfig::default(), None).await;
    assert_eq!(again.detected, 1);
}

#[tokio::test]
async fn test_deferred_resolution_completes_next_run() {
    let mut store = MemoryStore::new();
    let (plain, negated) = negated_pair(&mut store);
    for id in [plain, negated] {
        store
            .update(&id, 0, &mut |r: &mut Rule| r.tags_state = TagsState::NeedsReview)
            .unwrap();
    }
    let strategy = ResolutionStrategy::Auto { policy: AutoPolicy::KeepHigherSalience };
    store
        .insert_conflict(ConflictRecord::new(
            vec![plain, negated],
            ContradictionKind::Declared,
            strategy,
            0,
        ))
        .unwrap();
    store.schedule_interference(plain);

    let first = run(&mut store, with_strategy(strategy), None).await;
    assert_eq!(first.retried, 1);
    assert_eq!(first.deferred, 1);
    let record = only_record(&store);
    assert_eq!(record.status, ConflictStatus::Unresolved);
    assert_eq!(record.kept, Some(negated));
    assert_eq!(fetch(&store, &negated).tags_state, TagsState::Approved);
    assert_eq!(fetch(&store, &plain).tags_state, TagsState::NeedsReview);

    let second = run(&mut store, with_strategy(strategy), None).await;
    assert_eq!(second.resolved, 1);
    assert_eq!(only_record(&store).status, ConflictStatus::Resolved);
    assert_eq!(fetch(&store, &plain).tags_state, TagsState::Archived);
}

#[tokio::test]
async fn test_resolve_by_hand() {
    let mut store = MemoryStore::new();
    let c = approved(&mut store, 1, "Return errors as problem details", 0.5, 0);
    let d = approved(&mut store, 2, "Return errors as plain text", 0.5, 0);
    store
        .add_relationship(Relationship::new(d, c, RelationshipType::ConflictsWith, 0))
        .unwrap();

    run(&mut store, ConflictConfig::default(), None).await;
    let record = only_record(&store);
    assert_eq!(record.kind, ContradictionKind::Declared);

    let outsider = RuleId::new(RuleType::Decision, 9);
    assert!(matches!(
        resolve_manually(&mut store, &record.id, &outsider),
        Err(ConflictError::NotInConflict { .. })
    ));
    assert!(matches!(
        resolve_manually(&mut store, &ConflictId::new(), &c),
        Err(ConflictError::NotFound(_))
    ));

    let resolved = resolve_manually(&mut store, &record.id, &d).unwrap();
    assert_eq!(resolved.status, ConflictStatus::Resolved);
    assert_eq!(resolved.kept, Some(d));
    assert_eq!(fetch(&store, &d).tags_state, TagsState::Approved);
    let loser = fetch(&store, &c);
    assert_eq!(loser.tags_state, TagsState::Archived);
    assert_eq!(loser.metadata.get(keys::CONFLICT_RESOLUTION).unwrap()["strategy"], "manual");

    assert!(matches!(
        resolve_manually(&mut store, &record.id, &d),
        Err(ConflictError::AlreadyResolved(_))
    ));
}

#[tokio::test]
async fn test_retag_request() {
    let mut store = MemoryStore::new();
    let (a, b) = negated_pair(&mut store);
    run(&mut store, ConflictConfig::default(), None).await;

    let retagged = request_retag(&mut store, &a).unwrap();
    assert_eq!(retagged.tags_state, TagsState::NeedsTags);
    assert!(retagged.tags.is_empty());
    assert!(!retagged.metadata.contains(keys::REVIEW_REASON));

    assert!(matches!(
        request_retag(&mut store, &a),
        Err(ConflictError::WrongState { .. })
    ));

    // The record is closed and the other side goes back to approved
    let record = only_record(&store);
    assert_eq!(record.status, ConflictStatus::Stale);
    assert!(record.evidence.iter().any(|e| e == "decision-1 sent back for tagging"));
    let other = fetch(&store, &b);
    assert_eq!(other.tags_state, TagsState::Approved);
    assert!(!other.metadata.contains(keys::REVIEW_REASON));
    assert_eq!(store.stats().unwrap().open_conflicts, 0);

    assert!(matches!(
        resolve_manually(&mut store, &record.id, &b),
        Err(ConflictError::Closed(_))
    ));
}

#[tokio::test]
async fn test_retagged_pair_is_detected_again() {
    let mut store = MemoryStore::new();
    let (a, b) = negated_pair(&mut store);
    assert_eq!(run(&mut store, ConflictConfig::default(), None).await.detected, 1);

    let retagged = request_retag(&mut store, &a).unwrap();
    store
        .update(&a, retagged.version, &mut |r: &mut Rule| {
            r.tags = ["pagination".to_string()].into_iter().collect();
            r.tags_state = TagsState::Approved;
        })
        .unwrap();

    let report = run(&mut store, ConflictConfig::default(), None).await;
    assert_eq!(report.detected, 1);

    let records = store.conflicts(None).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records.iter().filter(|r| r.status.is_open()).count(), 1);
    assert_eq!(store.stats().unwrap().open_conflicts, 1);
    for id in [a, b] {
        assert_eq!(fetch(&store, &id).tags_state, TagsState::NeedsReview);
    }
}

#[tokio::test]
async fn test_unrecorded_conflict_restores_both_rules() {
    let mut store = MemoryStore::new();
    let (a, b) = negated_pair(&mut store);
    store.fail_next_conflict_insert();

    let report = run(&mut store, ConflictConfig::default(), None).await;

    assert_eq!(report.detected, 0);
    assert_eq!(report.failed_writes, 1);
    assert_eq!(report.compensated, 1);
    assert!(store.conflicts(None).unwrap().is_empty());
    for id in [a, b] {
        let rule = fetch(&store, &id);
        assert_eq!(rule.tags_state, TagsState::Approved);
        assert!(!rule.metadata.contains(keys::CONFLICT_REFS));
        assert!(!rule.metadata.contains(keys::REVIEW_REASON));
    }

    let again = run(&mut store, ConflictConfig::default(), None).await;
    assert_eq!(again.detected, 1);
}

#[tokio::test]
async fn test_record_closed_when_rule_moves_on() {
    let mut store = MemoryStore::new();
    let (plain, negated) = negated_pair(&mut store);
    run(&mut store, ConflictConfig::default(), None).await;

    // A reviewer approves one side outside the engine
    let version = fetch(&store, &negated).version;
    store
        .update(&negated, version, &mut |r: &mut Rule| {
            r.tags_state = TagsState::Approved;
            r.metadata.remove(keys::REVIEW_REASON);
        })
        .unwrap();

    let report = run(
        &mut store,
        with_strategy(ResolutionStrategy::Auto { policy: AutoPolicy::KeepHigherSalience }),
        None,
    )
    .await;

    assert_eq!(report.stale, 1);
    assert_eq!(report.escalated, 0);
    assert_eq!(report.detected, 1);
    assert_eq!(report.resolved, 1);

    let mut statuses: Vec<_> = store
        .conflicts(None)
        .unwrap()
        .into_iter()
        .map(|r| r.status.as_str())
        .collect();
    statuses.sort();
    assert_eq!(statuses, vec!["resolved", "stale"]);
    assert_eq!(fetch(&store, &negated).tags_state, TagsState::Approved);
    assert_eq!(fetch(&store, &plain).tags_state, TagsState::Archived);
}

#[tokio::test]
async fn test_dry_run_writes_nothing() {
    let mut store = MemoryStore::new();
    let (a, b) = negated_pair(&mut store);

    let config = ConflictConfig {
        dry_run: true,
        ..with_strategy(ResolutionStrategy::Auto { policy: AutoPolicy::KeepNewer })
    };
    let report = run(&mut store, config, None).await;

    assert!(report.dry_run);
    assert_eq!(report.detected, 1);
    assert!(store.conflicts(None).unwrap().is_empty());
    assert_eq!(fetch(&store, &a).version, 0);
    assert_eq!(fetch(&store, &b).version, 0);
}

#[tokio::test]
async fn test_auto_resolution_on_sqlite_store() {
    let mut store = SqliteStore::open_in_memory().unwrap();
    let (plain, negated) = negated_pair(&mut store);

    let report = run(
        &mut store,
        with_strategy(ResolutionStrategy::Auto { policy: AutoPolicy::KeepHigherSalience }),
        None,
    )
    .await;

    assert_eq!(report.resolved, 1);
    let record = only_record(&store);
    assert_eq!(record.status, ConflictStatus::Resolved);
    assert_eq!(record.kept, Some(negated));
    assert!(store.conflicts(Some(ConflictStatus::Unresolved)).unwrap().is_empty());
    assert_eq!(fetch(&store, &plain).tags_state, TagsState::Archived);
}
