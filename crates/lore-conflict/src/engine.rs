//! Conflict engine: detection, review marking and strategy-driven resolution

use crate::config::ConflictConfig;
use crate::detect::{find_contradictions, ordered, Contradiction};
use crate::report::ConflictReport;
use crate::ConflictError;
use lore_domain::metadata::keys;
use lore_domain::{
    current_timestamp, AutoPolicy, CancelToken, ConflictId, ConflictRecord, ConflictStatus,
    CostBudget, RelationshipType, ResolutionStrategy, Rule, RuleId, RuleQuery, RuleStore,
    StoreError, TagsState, Vocabulary,
};
use lore_oracle::{AdjudicateConflict, ConflictRequest, RuleBrief};
use serde_json::json;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// `metadata.archive_reason` of a rule that lost a conflict
pub const CONFLICT_RESOLVED: &str = "conflict_resolved";

/// `metadata.review_reason` of a rule flagged by a conflict
pub const CONFLICT_REVIEW: &str = "conflict";

/// What to do with one conflict
enum Decision {
    Keep(RuleId),
    Escalate(String),
    Stale(String),
    Leave,
}

/// Adjudication ceilings for one run
struct Ceiling {
    budget: CostBudget,
    attempts: usize,
    limit: usize,
}

impl Ceiling {
    fn admit(&mut self, cost: f64) -> Result<(), String> {
        if self.attempts >= self.limit {
            return Err(format!("conflict cap of {} reached", self.limit));
        }
        self.budget.try_charge(cost).map_err(|e| e.to_string())?;
        self.attempts += 1;
        Ok(())
    }
}

/// Conflict Engine
///
/// One run:
///
/// 1. Closes open records whose rules moved on (retagged, approved or
///    archived elsewhere) as stale, returning the remaining rules to
///    `approved` so the pair is judged afresh.
/// 2. Retries deferred conflicts (unresolved under a non-manual strategy)
///    against fresh reads.
/// 3. Detects contradictions among approved rules, skipping pairs that
///    already have an open record.
/// 4. For each, records the conflict, moves both rules to `needs_review`
///    and applies the configured strategy.
///
/// With `llm_assisted`, an adjudication below the threshold, a timeout, a
/// malformed response or an exhausted ceiling escalates the conflict; both
/// rules stay in `needs_review`.
///
/// # Examples
///
/// ```
/// use lore_conflict::{ConflictConfig, ConflictEngine};
/// use lore_domain::{
///     AutoPolicy, CancelToken, Provenance, ResolutionStrategy, Rule, RuleId, RuleStore, RuleType,
///     TagsState, Vocabulary,
/// };
/// use lore_store::MemoryStore;
///
/// # tokio_test::block_on(async {
/// let mut store = MemoryStore::new();
/// for (seq, text, salience) in [(1, "Use offset pagination", 0.4), (2, "Never use offset pagination", 0.9)] {
///     let id = RuleId::new(RuleType::Decision, seq);
///     let mut rule = Rule::new(id, text, "api", Provenance::new("s1", 0))
///         .with_salience(salience)
///         .with_tags(["pagination"]);
///     rule.tags_state = TagsState::Approved;
///     store.insert(rule).unwrap();
/// }
///
/// let vocab = Vocabulary::new().with_domain("api", "HTTP API design and conventions", &[]);
/// let config = ConflictConfig {
///     strategy: ResolutionStrategy::Auto { policy: AutoPolicy::KeepHigherSalience },
///     ..ConflictConfig::default()
/// };
/// let engine = ConflictEngine::new(config).unwrap();
/// let report = engine.run(&mut store, &vocab, None, &CancelToken::new()).await.unwrap();
///
/// assert_eq!(report.resolved, 1);
/// let loser = store.get(&RuleId::new(RuleType::Decision, 1)).unwrap().unwrap();
/// assert_eq!(loser.tags_state, TagsState::Archived);
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct ConflictEngine {
    config: ConflictConfig,
    call_cost: f64,
}

impl ConflictEngine {
    /// Create an engine, validating the configuration
    pub fn new(config: ConflictConfig) -> Result<Self, ConflictError> {
        config.validate().map_err(ConflictError::Config)?;
        Ok(Self {
            config,
            call_cost: 1.0,
        })
    }

    /// Budget cost charged per adjudication (default 1.0)
    pub fn with_call_cost(mut self, cost: f64) -> Self {
        self.call_cost = cost;
        self
    }

    /// Get the configuration
    pub fn config(&self) -> &ConflictConfig {
        &self.config
    }

    /// Run detection and resolution once
    ///
    /// `oracle` is required by the `llm_assisted` strategy and ignored by
    /// the others.
    pub async fn run<S>(
        &self,
        store: &mut S,
        vocab: &Vocabulary,
        oracle: Option<&dyn AdjudicateConflict>,
        cancel: &CancelToken,
    ) -> Result<ConflictReport, ConflictError>
    where
        S: RuleStore + ?Sized,
    {
        let strategy = self.config.strategy;
        if matches!(strategy, ResolutionStrategy::LlmAssisted { .. }) && oracle.is_none() {
            return Err(ConflictError::Config(
                "llm_assisted strategy needs an oracle".to_string(),
            ));
        }

        let mut report = ConflictReport::new(strategy.name(), self.config.dry_run);
        let mut ceiling = Ceiling {
            budget: CostBudget::new(self.config.max_oracle_cost),
            attempts: 0,
            limit: self.config.max_conflicts,
        };

        info!(
            "Conflict run: strategy {}{}",
            self.strategy_label(),
            if self.config.dry_run { " (dry run)" } else { "" }
        );

        if !self.config.dry_run {
            self.close_moved_on(store, cancel, &mut report)?;
            self.retry_deferred(store, oracle, &mut ceiling, cancel, &mut report)
                .await?;
        }

        let found = self.detect(&*store, vocab)?;
        debug!("{} new contradictions", found.len());

        for contradiction in found {
            if cancel.is_cancelled() {
                break;
            }
            if self.config.dry_run {
                info!(
                    "DRY RUN: Would flag {} and {} ({})",
                    contradiction.rules[0],
                    contradiction.rules[1],
                    contradiction.kind.as_str()
                );
                report.detected += 1;
                continue;
            }

            let Some(mut record) = self.flag(store, contradiction, &mut report)? else {
                continue;
            };
            report.detected += 1;
            self.settle_record(store, &mut record, oracle, &mut ceiling, &mut report)
                .await?;
        }

        report.cancelled = cancel.is_cancelled();
        info!(
            "Conflict run finished: {} detected, {} resolved, {} escalated, {} manual, {} deferred, {} stale",
            report.detected, report.resolved, report.escalated, report.manual, report.deferred, report.stale
        );
        Ok(report)
    }

    /// Contradictions among approved rules without an open record
    pub fn detect<S>(&self, store: &S, vocab: &Vocabulary) -> Result<Vec<Contradiction>, ConflictError>
    where
        S: RuleStore + ?Sized,
    {
        let snapshot = store.query(&RuleQuery::in_state(TagsState::Approved))?;
        let approved = snapshot.iter(store).collect::<Result<Vec<_>, _>>()?;

        let declared: BTreeSet<(RuleId, RuleId)> = store
            .relationships(RelationshipType::ConflictsWith)?
            .into_iter()
            .map(|rel| ordered(rel.from_rule, rel.to_rule))
            .collect();

        let mut open = BTreeSet::new();
        for record in store.conflicts(None)? {
            if !record.status.is_open() {
                continue;
            }
            for (i, a) in record.rules.iter().enumerate() {
                for b in &record.rules[i + 1..] {
                    open.insert(ordered(*a, *b));
                }
            }
        }

        Ok(find_contradictions(&approved, &declared, vocab, &self.config, &open))
    }

    /// Strategy name written into `conflict_resolution`
    fn strategy_label(&self) -> &'static str {
        match self.config.strategy {
            ResolutionStrategy::Auto { policy } => policy.as_str(),
            other => other.name(),
        }
    }

    fn close_moved_on<S>(
        &self,
        store: &mut S,
        cancel: &CancelToken,
        report: &mut ConflictReport,
    ) -> Result<(), ConflictError>
    where
        S: RuleStore + ?Sized,
    {
        let open: Vec<ConflictRecord> = store
            .conflicts(None)?
            .into_iter()
            .filter(|record| record.status.is_open())
            .collect();

        for mut record in open {
            if cancel.is_cancelled() {
                return Ok(());
            }
            if let Some(reason) = moved_on(&*store, &record)? {
                close_record(store, &mut record, reason)?;
                report.stale += 1;
                report.record_outcome(&record);
            }
        }
        Ok(())
    }

    async fn retry_deferred<S>(
        &self,
        store: &mut S,
        oracle: Option<&dyn AdjudicateConflict>,
        ceiling: &mut Ceiling,
        cancel: &CancelToken,
        report: &mut ConflictReport,
    ) -> Result<(), ConflictError>
    where
        S: RuleStore + ?Sized,
    {
        if self.config.strategy == ResolutionStrategy::Manual {
            return Ok(());
        }
        let deferred: Vec<ConflictRecord> = store
            .conflicts(Some(ConflictStatus::Unresolved))?
            .into_iter()
            .filter(|record| record.strategy != ResolutionStrategy::Manual)
            .collect();

        for mut record in deferred {
            if cancel.is_cancelled() {
                return Ok(());
            }
            debug!("Retrying deferred conflict {}", record.id);
            record.strategy = self.config.strategy;
            report.retried += 1;
            self.settle_record(store, &mut record, oracle, ceiling, report)
                .await?;
        }
        Ok(())
    }

    /// Move both rules to needs_review and store the record
    ///
    /// Returns `None` when the pair changed since detection or a write
    /// failed; flagged rules are put back and the pair is found again next
    /// run.
    fn flag<S>(
        &self,
        store: &mut S,
        contradiction: Contradiction,
        report: &mut ConflictReport,
    ) -> Result<Option<ConflictRecord>, ConflictError>
    where
        S: RuleStore + ?Sized,
    {
        let [a, b] = contradiction.rules;
        let mut record = ConflictRecord::new(
            vec![a, b],
            contradiction.kind,
            self.config.strategy,
            current_timestamp(),
        );
        record.evidence = contradiction.evidence;
        let conflict_ref = record.id.to_string();

        let (Some(first), Some(second)) = (store.get(&a)?, store.get(&b)?) else {
            return Ok(None);
        };
        if first.tags_state != TagsState::Approved || second.tags_state != TagsState::Approved {
            debug!("{} and {} are no longer both approved", a, b);
            return Ok(None);
        }

        let Some(first) = settle(mark_for_review(store, &first, &conflict_ref), &a, report)? else {
            return Ok(None);
        };
        let Some(second) = settle(mark_for_review(store, &second, &conflict_ref), &b, report)? else {
            if unflag(store, &first, &conflict_ref, report)? {
                report.compensated += 1;
            }
            return Ok(None);
        };

        if let Err(e) = store.insert_conflict(record.clone()) {
            warn!("Conflict {} could not be recorded, restoring {} and {}: {}", record.id, a, b, e);
            report.failed_writes += 1;
            let first_restored = unflag(store, &first, &conflict_ref, report)?;
            let second_restored = unflag(store, &second, &conflict_ref, report)?;
            if first_restored && second_restored {
                report.compensated += 1;
            }
            return Ok(None);
        }
        info!(
            "Conflict {} recorded: {} vs {} ({})",
            record.id,
            a,
            b,
            record.kind.as_str()
        );
        Ok(Some(record))
    }

    async fn settle_record<S>(
        &self,
        store: &mut S,
        record: &mut ConflictRecord,
        oracle: Option<&dyn AdjudicateConflict>,
        ceiling: &mut Ceiling,
        report: &mut ConflictReport,
    ) -> Result<(), ConflictError>
    where
        S: RuleStore + ?Sized,
    {
        let decision = match record.kept {
            // Decided in an earlier run; only the writes are missing
            Some(keep) => Decision::Keep(keep),
            None => self.decide(&*store, record, oracle, ceiling, report).await?,
        };

        match decision {
            Decision::Leave => {
                debug!("Conflict {} left for manual review", record.id);
                report.manual += 1;
            }
            Decision::Escalate(reason) => escalate(store, record, reason, report)?,
            Decision::Stale(reason) => {
                close_record(store, record, reason)?;
                report.stale += 1;
            }
            Decision::Keep(keep) => self.finish(store, record, keep, report)?,
        }
        report.record_outcome(record);
        Ok(())
    }

    async fn decide<S>(
        &self,
        store: &S,
        record: &mut ConflictRecord,
        oracle: Option<&dyn AdjudicateConflict>,
        ceiling: &mut Ceiling,
        report: &mut ConflictReport,
    ) -> Result<Decision, ConflictError>
    where
        S: RuleStore + ?Sized,
    {
        let threshold = match self.config.strategy {
            ResolutionStrategy::Manual => return Ok(Decision::Leave),
            ResolutionStrategy::Auto { policy } => {
                let rules = match pending_rules(store, record) {
                    Ok(rules) => rules,
                    Err(e @ (ConflictError::Stale { .. } | ConflictError::RuleNotFound(_))) => {
                        return Ok(Decision::Stale(e.to_string()))
                    }
                    Err(e) => return Err(e),
                };
                record.attempts += 1;
                return Ok(match choose_keep(policy, &rules) {
                    Some(keep) => Decision::Keep(keep),
                    None => Decision::Escalate("no rule to keep".to_string()),
                });
            }
            ResolutionStrategy::LlmAssisted { threshold } => threshold,
        };

        let Some(oracle) = oracle else {
            return Ok(Decision::Escalate("no oracle available".to_string()));
        };
        let rules = match pending_rules(store, record) {
            Ok(rules) => rules,
            Err(e @ (ConflictError::Stale { .. } | ConflictError::RuleNotFound(_))) => {
                return Ok(Decision::Stale(e.to_string()))
            }
            Err(e) => return Err(e),
        };
        let [first, second] = rules.as_slice() else {
            return Ok(Decision::Escalate(format!(
                "adjudication needs two rules, conflict has {}",
                rules.len()
            )));
        };

        if let Err(reason) = ceiling.admit(self.call_cost) {
            if !report.budget_exhausted {
                warn!("Adjudication ceiling reached: {}", reason);
            }
            report.budget_exhausted = true;
            return Ok(Decision::Escalate(format!("not adjudicated: {}", reason)));
        }

        report.oracle_calls += 1;
        record.attempts += 1;
        let request = ConflictRequest {
            first: RuleBrief::from_rule(first),
            second: RuleBrief::from_rule(second),
            evidence: record.evidence.clone(),
        };

        match oracle.adjudicate(&request).await {
            Ok(adjudication) => {
                record.oracle_confidence = Some(adjudication.confidence);
                if adjudication.confidence >= threshold {
                    debug!(
                        "Conflict {}: oracle keeps {} ({:.2})",
                        record.id, adjudication.keep, adjudication.confidence
                    );
                    Ok(Decision::Keep(adjudication.keep))
                } else {
                    Ok(Decision::Escalate(format!(
                        "adjudication confidence {:.2} below threshold {:.2}",
                        adjudication.confidence, threshold
                    )))
                }
            }
            Err(e) => {
                warn!("Adjudication of conflict {} failed: {}", record.id, e);
                Ok(Decision::Escalate(format!("adjudication failed: {}", e)))
            }
        }
    }

    /// Apply a decision; a failed write defers the conflict to the next run
    fn finish<S>(
        &self,
        store: &mut S,
        record: &mut ConflictRecord,
        keep: RuleId,
        report: &mut ConflictReport,
    ) -> Result<(), ConflictError>
    where
        S: RuleStore + ?Sized,
    {
        let now = current_timestamp();
        match write_resolution(store, record, keep, self.strategy_label(), now) {
            Ok(archived) => {
                record.resolve(keep, archived, now);
                store.update_conflict(record)?;
                info!("Conflict {} resolved: kept {}", record.id, keep);
                report.resolved += 1;
            }
            Err(e @ (ConflictError::Stale { .. } | ConflictError::RuleNotFound(_))) => {
                close_record(store, record, e.to_string())?;
                report.stale += 1;
            }
            Err(e @ ConflictError::NotInConflict { .. }) => escalate(store, record, e.to_string(), report)?,
            Err(ConflictError::Store(e)) if !e.is_contract_violation() => {
                warn!("Conflict {} deferred to the next run: {}", record.id, e);
                record.kept = Some(keep);
                store.update_conflict(record)?;
                report.failed_writes += 1;
                report.deferred += 1;
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }
}

/// Resolve a conflict by hand, keeping `keep` and archiving the rest
///
/// Works on unresolved and escalated records.
pub fn resolve_manually<S>(
    store: &mut S,
    conflict: &ConflictId,
    keep: &RuleId,
) -> Result<ConflictRecord, ConflictError>
where
    S: RuleStore + ?Sized,
{
    let mut record = store
        .get_conflict(conflict)?
        .ok_or(ConflictError::NotFound(*conflict))?;
    match record.status {
        ConflictStatus::Resolved => return Err(ConflictError::AlreadyResolved(*conflict)),
        ConflictStatus::Stale => return Err(ConflictError::Closed(*conflict)),
        ConflictStatus::Unresolved | ConflictStatus::Escalated => {}
    }

    let now = current_timestamp();
    let archived = write_resolution(store, &record, *keep, ResolutionStrategy::Manual.name(), now)?;
    record.resolve(*keep, archived, now);
    store.update_conflict(&record)?;
    info!("Conflict {} resolved by hand: kept {}", conflict, keep);
    Ok(record)
}

/// Send a rule under review back to the tagger (`needs_review → needs_tags`)
///
/// Tags are cleared so the next tagging pass starts fresh. Open conflicts
/// naming the rule are closed as stale and their other rules return to
/// `approved`; once the rule is approved again the pair is re-detected if
/// it still contradicts.
pub fn request_retag<S>(store: &mut S, id: &RuleId) -> Result<Rule, ConflictError>
where
    S: RuleStore + ?Sized,
{
    let rule = store.get(id)?.ok_or(ConflictError::RuleNotFound(*id))?;
    if rule.tags_state != TagsState::NeedsReview {
        return Err(ConflictError::WrongState {
            id: *id,
            actual: rule.tags_state,
            expected: TagsState::NeedsReview,
        });
    }

    let updated = store.update(id, rule.version, &mut |r: &mut Rule| {
        r.tags_state = TagsState::NeedsTags;
        r.tags.clear();
        r.metadata.remove(keys::REVIEW_REASON);
        r.metadata.remove(keys::GATE_FAILED_VOCAB_VERSION);
    })?;
    info!("{} sent back for tagging", id);

    for conflict_ref in updated.metadata.string_list(keys::CONFLICT_REFS) {
        let Ok(conflict) = ConflictId::from_string(&conflict_ref) else {
            warn!("{}: ignoring unreadable conflict reference {}", id, conflict_ref);
            continue;
        };
        let Some(mut record) = store.get_conflict(&conflict)? else {
            continue;
        };
        if record.status.is_open() {
            close_record(store, &mut record, format!("{} sent back for tagging", id))?;
        }
    }
    Ok(updated)
}

/// Rules of a record, all still in needs_review
fn pending_rules<S>(store: &S, record: &ConflictRecord) -> Result<Vec<Rule>, ConflictError>
where
    S: RuleStore + ?Sized,
{
    let mut rules = Vec::with_capacity(record.rules.len());
    for id in &record.rules {
        let rule = store.get(id)?.ok_or(ConflictError::RuleNotFound(*id))?;
        if rule.tags_state != TagsState::NeedsReview {
            return Err(ConflictError::Stale {
                conflict: record.id,
                rule: *id,
                state: rule.tags_state,
            });
        }
        rules.push(rule);
    }
    Ok(rules)
}

/// Approve the kept rule and archive the others
///
/// Rules already in their final state are left alone, so a resolution
/// interrupted halfway completes on the next attempt. Returns the ids of
/// the archived rules.
fn write_resolution<S>(
    store: &mut S,
    record: &ConflictRecord,
    keep: RuleId,
    strategy: &str,
    now: u64,
) -> Result<Vec<RuleId>, ConflictError>
where
    S: RuleStore + ?Sized,
{
    if !record.involves(&keep) {
        return Err(ConflictError::NotInConflict {
            conflict: record.id,
            rule: keep,
        });
    }

    let mut rules = Vec::with_capacity(record.rules.len());
    for id in &record.rules {
        let rule = store.get(id)?.ok_or(ConflictError::RuleNotFound(*id))?;
        let target = if *id == keep {
            TagsState::Approved
        } else {
            TagsState::Archived
        };
        if rule.tags_state != TagsState::NeedsReview && rule.tags_state != target {
            return Err(ConflictError::Stale {
                conflict: record.id,
                rule: *id,
                state: rule.tags_state,
            });
        }
        rules.push(rule);
    }

    let resolution = json!({
        "strategy": strategy,
        "kept_rule": keep.to_string(),
        "conflict_id": record.id.to_string(),
        "resolved_at": now,
    });

    // Kept rule first: a half-finished resolution never archives both
    rules.sort_by_key(|r| r.id != keep);
    let mut archived = Vec::new();
    for rule in rules {
        if rule.id == keep {
            if rule.tags_state == TagsState::NeedsReview {
                store.update(&rule.id, rule.version, &mut |r: &mut Rule| {
                    r.tags_state = TagsState::Approved;
                    r.metadata.remove(keys::REVIEW_REASON);
                })?;
            }
            continue;
        }
        if rule.tags_state == TagsState::NeedsReview {
            store.update(&rule.id, rule.version, &mut |r: &mut Rule| {
                r.tags_state = TagsState::Archived;
                r.metadata.set(keys::ARCHIVE_REASON, CONFLICT_RESOLVED);
                r.metadata.set(keys::ARCHIVED_AT, now);
                r.metadata.set(keys::CONFLICT_RESOLUTION, resolution.clone());
            })?;
            debug!("{} archived: lost conflict {}", rule.id, record.id);
        }
        archived.push(rule.id);
    }
    Ok(archived)
}

/// Why a record no longer matches the state of its rules, if it does not
///
/// Rules are expected in `needs_review`, or in their final state once a
/// decision has been recorded.
fn moved_on<S>(store: &S, record: &ConflictRecord) -> Result<Option<String>, ConflictError>
where
    S: RuleStore + ?Sized,
{
    for id in &record.rules {
        let Some(rule) = store.get(id)? else {
            return Ok(Some(format!("rule {} no longer exists", id)));
        };
        let settled = match record.kept {
            Some(keep) if keep == *id => TagsState::Approved,
            Some(_) => TagsState::Archived,
            None => TagsState::NeedsReview,
        };
        if rule.tags_state != TagsState::NeedsReview && rule.tags_state != settled {
            return Ok(Some(format!("{} is now {}", id, rule.tags_state)));
        }
    }
    Ok(None)
}

/// Close a record without a verdict and release its rules
///
/// Returns how many rules went back to approved.
fn close_record<S>(store: &mut S, record: &mut ConflictRecord, reason: String) -> Result<usize, ConflictError>
where
    S: RuleStore + ?Sized,
{
    let released = release_rules(store, record)?;
    record.mark_stale(reason, current_timestamp());
    store.update_conflict(record)?;
    info!("Conflict {} closed as stale, {} rule(s) back to approved", record.id, released);
    Ok(released)
}

/// Return rules held in review only by this record to approved
fn release_rules<S>(store: &mut S, record: &ConflictRecord) -> Result<usize, ConflictError>
where
    S: RuleStore + ?Sized,
{
    let conflict_ref = record.id.to_string();
    let mut released = 0;
    for id in &record.rules {
        let Some(rule) = store.get(id)? else {
            continue;
        };
        if rule.tags_state != TagsState::NeedsReview
            || rule.metadata.get_str(keys::REVIEW_REASON) != Some(CONFLICT_REVIEW)
        {
            continue;
        }
        if held_elsewhere(&*store, &rule, &conflict_ref)? {
            debug!("{} stays in needs_review for another conflict", id);
            continue;
        }

        let result = store.update(id, rule.version, &mut |r: &mut Rule| {
            r.tags_state = TagsState::Approved;
            r.metadata.remove(keys::REVIEW_REASON);
        });
        match result {
            Ok(_) => released += 1,
            Err(e) if e.is_contract_violation() => return Err(e.into()),
            Err(e) => warn!("{} stays in needs_review: {}", id, e),
        }
    }
    Ok(released)
}

/// Whether another open record still keeps the rule in review
fn held_elsewhere<S>(store: &S, rule: &Rule, conflict_ref: &str) -> Result<bool, ConflictError>
where
    S: RuleStore + ?Sized,
{
    for other in rule.metadata.string_list(keys::CONFLICT_REFS) {
        if other == conflict_ref {
            continue;
        }
        let Ok(id) = ConflictId::from_string(&other) else {
            continue;
        };
        if store.get_conflict(&id)?.is_some_and(|record| record.status.is_open()) {
            return Ok(true);
        }
    }
    Ok(false)
}

fn escalate<S>(
    store: &mut S,
    record: &mut ConflictRecord,
    reason: String,
    report: &mut ConflictReport,
) -> Result<(), ConflictError>
where
    S: RuleStore + ?Sized,
{
    debug!("Conflict {} escalated: {}", record.id, reason);
    record.escalate(reason, current_timestamp());
    store.update_conflict(record)?;
    info!("Conflict {} escalated to manual review", record.id);
    report.escalated += 1;
    Ok(())
}

fn mark_for_review<S>(store: &mut S, rule: &Rule, conflict_ref: &str) -> Result<Rule, StoreError>
where
    S: RuleStore + ?Sized,
{
    store.update(&rule.id, rule.version, &mut |r: &mut Rule| {
        r.tags_state = TagsState::NeedsReview;
        r.metadata.set(keys::REVIEW_REASON, CONFLICT_REVIEW);
        r.metadata.push_unique(keys::CONFLICT_REFS, conflict_ref);
    })
}

/// Put a rule flagged for an unrecorded conflict back to approved
///
/// Returns whether the rule was restored.
fn unflag<S>(
    store: &mut S,
    flagged: &Rule,
    conflict_ref: &str,
    report: &mut ConflictReport,
) -> Result<bool, ConflictError>
where
    S: RuleStore + ?Sized,
{
    let restored = store.update(&flagged.id, flagged.version, &mut |r: &mut Rule| {
        r.tags_state = TagsState::Approved;
        r.metadata.remove(keys::REVIEW_REASON);
        drop_ref(r, conflict_ref);
    });
    match restored {
        Ok(_) => Ok(true),
        Err(e) if e.is_contract_violation() => Err(e.into()),
        Err(e) => {
            warn!("{} left in needs_review without a conflict record: {}", flagged.id, e);
            report.failed_writes += 1;
            Ok(false)
        }
    }
}

fn drop_ref(rule: &mut Rule, conflict_ref: &str) {
    let refs: Vec<String> = rule
        .metadata
        .string_list(keys::CONFLICT_REFS)
        .into_iter()
        .filter(|r| r != conflict_ref)
        .collect();
    if refs.is_empty() {
        rule.metadata.remove(keys::CONFLICT_REFS);
    } else {
        rule.metadata.set(keys::CONFLICT_REFS, refs);
    }
}

/// Turn a per-rule write result into "written" or "counted as failed"
fn settle(
    result: Result<Rule, StoreError>,
    id: &RuleId,
    report: &mut ConflictReport,
) -> Result<Option<Rule>, ConflictError> {
    match result {
        Ok(rule) => Ok(Some(rule)),
        Err(e) if e.is_contract_violation() => Err(e.into()),
        Err(e) => {
            if e.is_concurrent_modification() {
                warn!("{} changed during the run, retrying next run", id);
            } else {
                warn!("Write to {} failed: {}", id, e);
            }
            report.failed_writes += 1;
            Ok(None)
        }
    }
}

/// Rule an auto policy keeps
pub fn choose_keep(policy: AutoPolicy, rules: &[Rule]) -> Option<RuleId> {
    rules
        .iter()
        .max_by(|a, b| prefer(policy, a, b))
        .map(|rule| rule.id)
}

/// `Greater` when `a` should be kept over `b`
fn prefer(policy: AutoPolicy, a: &Rule, b: &Rule) -> Ordering {
    let primary = match policy {
        AutoPolicy::KeepHigherSalience => a.salience.value.total_cmp(&b.salience.value),
        AutoPolicy::KeepNewer => a
            .provenance
            .created_at
            .cmp(&b.provenance.created_at)
            .then_with(|| a.id.cmp(&b.id)),
        AutoPolicy::KeepHigherConfidence => confidence(a)
            .partial_cmp(&confidence(b))
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.salience.value.total_cmp(&b.salience.value)),
    };
    // Remaining ties keep the lower id
    primary.then_with(|| b.id.cmp(&a.id))
}

fn confidence(rule: &Rule) -> Option<f64> {
    rule.metadata.get_f64(keys::TAG_CONFIDENCE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lore_domain::{Provenance, RuleType};

    fn rule(seq: u64, salience: f64, created_at: u64) -> Rule {
        Rule::new(
            RuleId::new(RuleType::Constraint, seq),
            "text",
            "api",
            Provenance::new("s", created_at),
        )
        .with_salience(salience)
    }

    #[test]
    fn test_keep_higher_salience() {
        let rules = [rule(1, 0.4, 0), rule(2, 0.9, 0)];
        assert_eq!(choose_keep(AutoPolicy::KeepHigherSalience, &rules), Some(rules[1].id));

        let tied = [rule(3, 0.5, 0), rule(4, 0.5, 0)];
        assert_eq!(choose_keep(AutoPolicy::KeepHigherSalience, &tied), Some(tied[0].id));
    }

    #[test]
    fn test_keep_newer() {
        let rules = [rule(1, 0.9, 200), rule(2, 0.1, 100)];
        assert_eq!(choose_keep(AutoPolicy::KeepNewer, &rules), Some(rules[0].id));

        let same_time = [rule(1, 0.5, 100), rule(2, 0.5, 100)];
        assert_eq!(choose_keep(AutoPolicy::KeepNewer, &same_time), Some(same_time[1].id));
    }

    #[test]
    fn test_keep_higher_confidence() {
        let mut a = rule(1, 0.9, 0);
        let mut b = rule(2, 0.1, 0);
        b.metadata.set(keys::TAG_CONFIDENCE, 0.95);
        assert_eq!(choose_keep(AutoPolicy::KeepHigherConfidence, &[a.clone(), b.clone()]), Some(b.id));

        // Missing confidence ranks lowest; equal confidence falls back to salience
        a.metadata.set(keys::TAG_CONFIDENCE, 0.95);
        assert_eq!(choose_keep(AutoPolicy::KeepHigherConfidence, &[a.clone(), b]), Some(a.id));
    }

    #[test]
    fn test_drop_ref() {
        let mut r = rule(1, 0.5, 0);
        r.metadata.push_unique(keys::CONFLICT_REFS, "c-1");
        r.metadata.push_unique(keys::CONFLICT_REFS, "c-2");
        drop_ref(&mut r, "c-1");
        assert_eq!(r.metadata.string_list(keys::CONFLICT_REFS), vec!["c-2".to_string()]);
        drop_ref(&mut r, "c-2");
        assert!(!r.metadata.contains(keys::CONFLICT_REFS));
    }

    #[test]
    fn test_ceiling() {
        let mut ceiling = Ceiling {
            budget: CostBudget::new(Some(2.0)),
            attempts: 0,
            limit: 5,
        };
        assert!(ceiling.admit(1.0).is_ok());
        assert!(ceiling.admit(1.0).is_ok());
        assert!(ceiling.admit(1.0).is_err());

        let mut capped = Ceiling {
            budget: CostBudget::unlimited(),
            attempts: 0,
            limit: 1,
        };
        assert!(capped.admit(1.0).is_ok());
        assert!(capped.admit(1.0).unwrap_err().contains("cap of 1"));
    }
}
