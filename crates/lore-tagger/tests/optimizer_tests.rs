//! Tag Optimization Loop against real stores and a scripted oracle

use lore_domain::metadata::keys;
use lore_domain::{
    set_salience, CancelToken, Provenance, Rule, RuleId, RuleStore, RuleType, Salience, TagsState,
    Vocabulary,
};
use lore_oracle::{Scripted, ScriptedOracle, TagSuggestion};
use lore_store::{MemoryStore, SqliteStore};
use lore_tagger::{
    ConvergenceReason, GateFailurePolicy, LoopReport, TagOptimizer, TaggerConfig, TaggerError,
};
use lore_vocab::VocabularyManager;
use std::sync::Arc;
use std::time::Duration;

fn vocab() -> VocabularyManager {
    VocabularyManager::new(
        Vocabulary::new()
            .with_domain("api", "HTTP API design and conventions", &["rest"])
            .with_domain("data", "Persistence and schema evolution", &[])
            .with_tags("api", &["pagination", "versioning"])
            .with_mapping("paging", "pagination")
            .with_forbidden(&["misc"]),
    )
}

fn insert<S: RuleStore + ?Sized>(store: &mut S, seq: u64, text: &str, domain: &str) -> RuleId {
    let id = RuleId::new(RuleType::Decision, seq);
    store
        .insert(Rule::new(id, text, domain, Provenance::new("session-1", 1_700_000_000)))
        .unwrap();
    id
}

fn reply(tags: &[&str], confidence: f64, coherence: Option<f64>) -> Scripted<TagSuggestion> {
    Scripted::Reply(TagSuggestion::new(tags.iter().copied(), confidence, coherence))
}

fn state<S: RuleStore + ?Sized>(store: &S, id: &RuleId) -> TagsState {
    store.get(id).unwrap().unwrap().tags_state
}

async fn run<S: RuleStore + ?Sized>(
    store: &mut S,
    vocab: &VocabularyManager,
    oracle: &ScriptedOracle,
    config: TaggerConfig,
) -> LoopReport {
    TagOptimizer::new(config)
        .unwrap()
        .run(store, vocab, Arc::new(oracle.clone()), &CancelToken::new())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_admission_boundary() {
    let mut store = MemoryStore::new();
    let at = insert(&mut store, 1, "Use cursor pagination", "api");
    let below = insert(&mut store, 2, "Paginate with offsets", "api");

    let oracle = ScriptedOracle::new();
    oracle.script_tags(&at, [reply(&["pagination"], 0.70, Some(0.30))]);
    oracle.script_tags(&below, [reply(&["pagination"], 0.699, Some(0.30))]);

    let report = run(&mut store, &vocab(), &oracle, TaggerConfig::default()).await;

    assert_eq!(state(&store, &at), TagsState::Approved);
    assert_eq!(state(&store, &below), TagsState::NeedsTags);
    assert_eq!(report.passes[0].approved, 1);
    assert_eq!(report.passes[0].skipped, 1);
}

#[tokio::test]
async fn test_converges_after_one_pass() {
    let mut store = MemoryStore::new();
    for seq in 1..=4 {
        insert(&mut store, seq, &format!("Rule number {}", seq), "api");
    }
    let oracle = ScriptedOracle::new().with_default_tags(reply(&["pagination"], 0.9, None));

    let report = run(&mut store, &vocab(), &oracle, TaggerConfig::default()).await;

    assert_eq!(report.passes.len(), 1);
    assert_eq!(report.passes[0].approved, 4);
    assert_eq!(report.convergence, ConvergenceReason::AllTagged);
    assert_eq!(report.remaining, 0);
    assert_eq!(oracle.call_count(), 4);
}

#[tokio::test]
async fn test_second_run_is_a_no_op() {
    let mut store = MemoryStore::new();
    let a = insert(&mut store, 1, "Version APIs in the path", "api");
    let b = insert(&mut store, 2, "Cap page size at 100", "api");
    let c = insert(&mut store, 3, "Avoid chatty endpoints", "api");

    let oracle = ScriptedOracle::new();
    oracle.script_tags(&a, [reply(&["versioning"], 0.9, None)]);
    oracle.script_tags(&b, [reply(&["pagination"], 0.8, None)]);
    oracle.script_tags(&c, [reply(&["pagination"], 0.4, None)]);
    let vocab = vocab();

    run(&mut store, &vocab, &oracle, TaggerConfig::default()).await;
    let first: Vec<Rule> = [a, b, c].iter().map(|id| store.get(id).unwrap().unwrap()).collect();
    let calls = oracle.call_count();

    let second = run(&mut store, &vocab, &oracle, TaggerConfig::default()).await;
    let after: Vec<Rule> = [a, b, c].iter().map(|id| store.get(id).unwrap().unwrap()).collect();

    assert_eq!(first, after);
    assert_eq!(second.total_approved(), 0);
    assert_eq!(oracle.call_count(), calls);
}

#[tokio::test]
async fn test_manual_salience_survives_approval() {
    let mut store = MemoryStore::new();
    let id = insert(&mut store, 1, "Use cursor pagination", "api");
    set_salience(&mut store, &id, 0.9).unwrap();

    let oracle = ScriptedOracle::new().with_default_tags(reply(&["pagination"], 0.75, None));
    run(&mut store, &vocab(), &oracle, TaggerConfig::default()).await;

    let rule = store.get(&id).unwrap().unwrap();
    assert_eq!(rule.tags_state, TagsState::Approved);
    assert_eq!(rule.salience, Salience::manual(0.9));
}

#[tokio::test]
async fn test_oracle_failures_leave_rules_untouched() {
    let mut store = MemoryStore::new();
    let slow = insert(&mut store, 1, "Retry idempotent requests", "api");
    let garbled = insert(&mut store, 2, "Return problem+json errors", "api");
    let fine = insert(&mut store, 3, "Use cursor pagination", "api");

    let oracle = ScriptedOracle::new();
    oracle.script_tags(&slow, [Scripted::Timeout]);
    oracle.script_tags(&garbled, [Scripted::Malformed]);
    oracle.script_tags(&fine, [reply(&["pagination"], 0.9, None)]);

    let report = run(&mut store, &vocab(), &oracle, TaggerConfig::default()).await;

    assert_eq!(report.passes[0].timeouts, 1);
    assert_eq!(report.passes[0].malformed, 1);
    assert_eq!(report.passes[0].approved, 1);
    assert_eq!(report.convergence, ConvergenceReason::NoProgress);

    for id in [slow, garbled] {
        let rule = store.get(&id).unwrap().unwrap();
        assert_eq!(rule.tags_state, TagsState::NeedsTags);
        assert_eq!(rule.version, 0);
        assert!(rule.metadata.as_map().is_empty());
    }
}

#[tokio::test]
async fn test_gate_failure_waits_for_vocabulary_change() {
    let mut store = MemoryStore::new();
    let weak = insert(&mut store, 1, "Throttle per client", "api");
    let strong = insert(&mut store, 2, "Return 429 with Retry-After", "api");

    let oracle = ScriptedOracle::new();
    oracle.script_tags(&weak, [reply(&["rate-limit"], 0.5, None)]);
    oracle.script_tags(&strong, [reply(&["rate-limit"], 0.9, None)]);
    let vocab = vocab();

    let report = run(&mut store, &vocab, &oracle, TaggerConfig::default()).await;

    // Pass 1 grows "rate-limit"; pass 2 re-sends the weak rule and stops
    assert_eq!(report.passes.len(), 2);
    assert_eq!(report.vocabulary_growth(), 1);
    assert_eq!(report.convergence, ConvergenceReason::NoProgress);
    assert_eq!(oracle.calls_for("decision-1"), 2);

    let rule = store.get(&weak).unwrap().unwrap();
    assert_eq!(rule.metadata.get_u64(keys::GATE_FAILED_VOCAB_VERSION), Some(vocab.version()));

    // Nothing changed since: the weak rule is deferred without an oracle call
    let again = run(&mut store, &vocab, &oracle, TaggerConfig::default()).await;
    assert_eq!(again.passes[0].deferred, 1);
    assert_eq!(oracle.calls_for("decision-1"), 2);
}

#[tokio::test]
async fn test_growth_lets_pending_rule_pass_later() {
    let mut store = MemoryStore::new();
    let late = insert(&mut store, 1, "Throttle per client", "api");
    let early = insert(&mut store, 2, "Return 429 with Retry-After", "api");

    let oracle = ScriptedOracle::new();
    oracle.script_tags(
        &late,
        [reply(&["rate-limit"], 0.5, None), reply(&["rate-limit"], 0.85, None)],
    );
    oracle.script_tags(&early, [reply(&["rate-limit", "Misc"], 0.9, None)]);
    let vocab = vocab();

    let report = run(&mut store, &vocab, &oracle, TaggerConfig::default()).await;

    assert_eq!(report.passes.len(), 2);
    assert_eq!(report.convergence, ConvergenceReason::AllTagged);
    assert_eq!(state(&store, &late), TagsState::Approved);

    let rule = store.get(&early).unwrap().unwrap();
    assert_eq!(rule.tags.len(), 1);
    assert!(rule.tags.contains("rate-limit"));
    assert_eq!(rule.metadata.get_f64(keys::TAG_CONFIDENCE), Some(0.9));
    assert_eq!(rule.metadata.get_u64(keys::VOCABULARY_VERSION), Some(0));

    let entry = vocab
        .snapshot()
        .domain_tags("api")
        .iter()
        .find(|e| e.name == "rate-limit")
        .cloned()
        .unwrap();
    assert_eq!(entry.grown_from.as_deref(), Some("decision-2"));
}

#[tokio::test(start_paused = true)]
async fn test_oracle_concurrency_is_bounded() {
    let mut store = MemoryStore::new();
    for seq in 1..=6 {
        insert(&mut store, seq, &format!("Rule number {}", seq), "api");
    }
    let oracle = ScriptedOracle::new()
        .with_delay(Duration::from_secs(1))
        .with_default_tags(reply(&["pagination"], 0.9, None));

    let report = run(&mut store, &vocab(), &oracle, TaggerConfig::default()).await;

    assert_eq!(report.total_approved(), 6);
    assert_eq!(oracle.max_in_flight(), 3);
}

#[tokio::test]
async fn test_cost_ceiling_stops_dispatch() {
    let mut store = MemoryStore::new();
    for seq in 1..=5 {
        insert(&mut store, seq, &format!("Rule number {}", seq), "api");
    }
    let oracle = ScriptedOracle::new().with_default_tags(reply(&["pagination"], 0.9, None));
    let config = TaggerConfig {
        max_oracle_cost: Some(2.0),
        ..Default::default()
    };

    let report = run(&mut store, &vocab(), &oracle, config).await;

    assert_eq!(report.convergence, ConvergenceReason::CostCeiling);
    assert_eq!(report.oracle_calls, 2);
    assert_eq!(oracle.call_count(), 2);
    assert_eq!(report.total_approved(), 2);
    assert_eq!(report.remaining, 3);
}

#[tokio::test]
async fn test_concurrent_modification_retried_next_pass() {
    let mut store = MemoryStore::new();
    let contested = insert(&mut store, 1, "Use cursor pagination", "api");
    insert(&mut store, 2, "Version APIs in the path", "api");
    store.schedule_interference(contested);

    let oracle = ScriptedOracle::new().with_default_tags(reply(&["pagination"], 0.9, None));
    let report = run(&mut store, &vocab(), &oracle, TaggerConfig::default()).await;

    assert_eq!(report.passes[0].failed_writes, 1);
    assert_eq!(report.passes[0].approved, 1);
    assert_eq!(report.passes[1].approved, 1);
    assert_eq!(report.convergence, ConvergenceReason::AllTagged);
    assert_eq!(state(&store, &contested), TagsState::Approved);
}

#[tokio::test]
async fn test_failed_write_does_not_stop_batch() {
    let mut store = MemoryStore::new();
    let broken = insert(&mut store, 1, "Use cursor pagination", "api");
    let ok = insert(&mut store, 2, "Version APIs in the path", "api");
    store.fail_writes_for(broken);

    let oracle = ScriptedOracle::new().with_default_tags(reply(&["pagination"], 0.9, None));
    let config = TaggerConfig {
        max_passes: 1,
        ..Default::default()
    };
    let report = run(&mut store, &vocab(), &oracle, config).await;

    assert_eq!(report.passes[0].failed_writes, 1);
    assert_eq!(state(&store, &ok), TagsState::Approved);
    assert_eq!(state(&store, &broken), TagsState::NeedsTags);
    assert_eq!(report.convergence, ConvergenceReason::MaxPasses);
}

#[tokio::test]
async fn test_proposals_parked_and_decided() {
    let mut store = MemoryStore::new();
    let keep = insert(&mut store, 1, "Page with opaque cursors", "api");
    let vague = insert(&mut store, 2, "Something vague", "api");

    let oracle = ScriptedOracle::new();
    oracle.script_tags(&keep, [reply(&["pagination", "cursor-paging"], 0.6, None)]);
    oracle.script_tags(&vague, [reply(&["pagination"], 0.3, None)]);
    let vocab = vocab();
    let config = TaggerConfig {
        on_gate_failure: GateFailurePolicy::Propose,
        ..Default::default()
    };
    let optimizer = TagOptimizer::new(config).unwrap();

    let report = optimizer
        .run(&mut store, &vocab, Arc::new(oracle), &CancelToken::new())
        .await
        .unwrap();
    assert_eq!(report.passes[0].parked, 2);
    assert_eq!(state(&store, &keep), TagsState::Proposed);

    let accepted = optimizer.decide_proposal(&mut store, &vocab, &keep, true).unwrap();
    assert_eq!(accepted.tags_state, TagsState::Approved);
    assert!(accepted.tags.contains("cursor-paging"));
    assert_eq!(accepted.metadata.get_f64(keys::TAG_CONFIDENCE), Some(0.6));
    assert!(vocab.snapshot().has_tag("api", "cursor-paging"));

    let rejected = optimizer.decide_proposal(&mut store, &vocab, &vague, false).unwrap();
    assert_eq!(rejected.tags_state, TagsState::NeedsReview);

    let err = optimizer.decide_proposal(&mut store, &vocab, &vague, true).unwrap_err();
    assert!(matches!(err, TaggerError::WrongState { .. }));
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let mut store = MemoryStore::new();
    let id = insert(&mut store, 1, "Use cursor pagination", "api");
    let oracle = ScriptedOracle::new().with_default_tags(reply(&["pagination"], 0.9, None));
    let cancel = CancelToken::new();
    cancel.cancel();

    let report = TagOptimizer::new(TaggerConfig::default())
        .unwrap()
        .run(&mut store, &vocab(), Arc::new(oracle.clone()), &cancel)
        .await
        .unwrap();

    assert_eq!(report.convergence, ConvergenceReason::Cancelled);
    assert!(report.passes.is_empty());
    assert_eq!(oracle.call_count(), 0);
    assert_eq!(state(&store, &id), TagsState::NeedsTags);
}

#[tokio::test]
async fn test_dry_run_writes_nothing() {
    let mut store = MemoryStore::new();
    let id = insert(&mut store, 1, "Throttle per client", "api");
    let oracle = ScriptedOracle::new().with_default_tags(reply(&["rate-limit"], 0.9, None));
    let vocab = vocab();
    let config = TaggerConfig {
        dry_run: true,
        ..Default::default()
    };

    let report = run(&mut store, &vocab, &oracle, config).await;

    assert_eq!(report.total_approved(), 1);
    assert_eq!(report.passes.len(), 1);
    assert_eq!(state(&store, &id), TagsState::NeedsTags);
    assert_eq!(vocab.version(), 0);
}

#[tokio::test]
async fn test_sqlite_backend() {
    let mut store = SqliteStore::open_in_memory().unwrap();
    let a = insert(&mut store, 1, "Use cursor pagination", "rest");
    let b = insert(&mut store, 2, "Migrations are forward only", "data");

    let oracle = ScriptedOracle::new();
    oracle.script_tags(&a, [reply(&["Paging", "pagination"], 0.88, None)]);
    oracle.script_tags(&b, [reply(&["migrations"], 0.8, None)]);
    let vocab = vocab();

    let report = run(&mut store, &vocab, &oracle, TaggerConfig::default()).await;

    assert_eq!(report.total_approved(), 2);
    assert_eq!(report.passes[0].domains["rest"].approved, 1);
    let rule = store.get(&a).unwrap().unwrap();
    assert_eq!(rule.tags.len(), 1);
    assert!(rule.tags.contains("pagination"));
    assert!(vocab.snapshot().has_tag("data", "migrations"));
}
