//! Multi-pass tag optimization driver

use crate::config::{GateFailurePolicy, TaggerConfig};
use crate::gate::{self, GateOutcome};
use crate::report::{ConvergenceReason, LoopReport, PassReport};
use crate::TaggerError;
use lore_domain::metadata::keys;
use lore_domain::salience::compute_salience;
use lore_domain::{
    current_timestamp, CancelToken, CostBudget, Rule, RuleId, RuleQuery, RuleStore, Salience,
    StoreError, TagsState, Vocabulary,
};
use lore_oracle::{OracleError, ProposeTags, TagRequest, TagSuggestion};
use lore_vocab::VocabularyManager;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type PendingCall = (Rule, JoinHandle<Result<TagSuggestion, OracleError>>);

/// Drives `needs_tags` rules to `approved` across bounded passes
///
/// # Examples
///
/// ```
/// use lore_domain::{CancelToken, Provenance, Rule, RuleId, RuleStore, RuleType, Vocabulary};
/// use lore_oracle::{Scripted, ScriptedOracle, TagSuggestion};
/// use lore_store::MemoryStore;
/// use lore_tagger::{ConvergenceReason, TagOptimizer, TaggerConfig};
/// use lore_vocab::VocabularyManager;
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let mut store = MemoryStore::new();
/// let id = RuleId::new(RuleType::Decision, 1);
/// store.insert(Rule::new(id, "Use cursor pagination", "api", Provenance::new("s1", 0))).unwrap();
///
/// let vocab = VocabularyManager::new(
///     Vocabulary::new().with_domain("api", "HTTP API design and conventions", &[]),
/// );
/// let oracle = ScriptedOracle::new()
///     .with_default_tags(Scripted::Reply(TagSuggestion::new(["pagination"], 0.9, None)));
///
/// let optimizer = TagOptimizer::new(TaggerConfig::default()).unwrap();
/// let report = optimizer
///     .run(&mut store, &vocab, Arc::new(oracle), &CancelToken::new())
///     .await
///     .unwrap();
///
/// assert_eq!(report.total_approved(), 1);
/// assert_eq!(report.convergence, ConvergenceReason::AllTagged);
/// assert!(vocab.snapshot().has_tag("api", "pagination"));
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct TagOptimizer {
    config: TaggerConfig,
    call_cost: f64,
}

impl TagOptimizer {
    /// Create an optimizer, validating the configuration
    pub fn new(config: TaggerConfig) -> Result<Self, TaggerError> {
        config.validate().map_err(TaggerError::Config)?;
        Ok(Self {
            config,
            call_cost: 1.0,
        })
    }

    /// Budget cost charged per oracle call (default 1.0)
    pub fn with_call_cost(mut self, cost: f64) -> Self {
        self.call_cost = cost;
        self
    }

    /// Get the configuration
    pub fn config(&self) -> &TaggerConfig {
        &self.config
    }

    /// Run passes until convergence
    ///
    /// Oracle failures and failed writes are counted, never returned.
    /// Only contract violations (invalid transitions, immutable fields) and
    /// unreadable stores abort the run.
    pub async fn run<S, O>(
        &self,
        store: &mut S,
        vocab: &VocabularyManager,
        oracle: Arc<O>,
        cancel: &CancelToken,
    ) -> Result<LoopReport, TaggerError>
    where
        S: RuleStore + ?Sized,
        O: ProposeTags + ?Sized + 'static,
    {
        let pending = RuleQuery::in_state(TagsState::NeedsTags);
        let corpus = store.select_ids(&pending)?.len();
        let ceiling = self.config.cost_ceiling(corpus);
        let mut budget = CostBudget::new(Some(ceiling));
        let version_start = vocab.version();

        info!(
            "Tag optimization: {} rules, cost ceiling {:.1}, max {} passes",
            corpus, ceiling, self.config.max_passes
        );

        let mut passes: Vec<PassReport> = Vec::new();
        let convergence = loop {
            if cancel.is_cancelled() {
                break ConvergenceReason::Cancelled;
            }

            let ids = store.query(&pending)?;
            if ids.is_empty() {
                break ConvergenceReason::AllTagged;
            }
            if passes.len() >= self.config.max_passes {
                break ConvergenceReason::MaxPasses;
            }
            if budget.is_exhausted() {
                break ConvergenceReason::CostCeiling;
            }

            let report = self
                .run_pass(store, vocab, &oracle, &mut budget, cancel, passes.len() + 1, ids.ids())
                .await?;
            let approved = report.approved;
            passes.push(report);

            if cancel.is_cancelled() {
                break ConvergenceReason::Cancelled;
            }
            if budget.is_exhausted() {
                break ConvergenceReason::CostCeiling;
            }
            if approved == 0 {
                break ConvergenceReason::NoProgress;
            }
            if self.config.dry_run {
                break ConvergenceReason::MaxPasses;
            }
        };

        let remaining = store.select_ids(&pending)?.len();
        info!(
            "Tag optimization finished after {} passes: {} ({} remaining)",
            passes.len(),
            convergence,
            remaining
        );

        Ok(LoopReport {
            passes,
            convergence,
            oracle_calls: budget.calls(),
            cost_spent: budget.spent(),
            cost_ceiling: ceiling,
            vocabulary_version_start: version_start,
            vocabulary_version_end: vocab.version(),
            remaining,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_pass<S, O>(
        &self,
        store: &mut S,
        vocab: &VocabularyManager,
        oracle: &Arc<O>,
        budget: &mut CostBudget,
        cancel: &CancelToken,
        pass: usize,
        ids: &[RuleId],
    ) -> Result<PassReport, TaggerError>
    where
        S: RuleStore + ?Sized,
        O: ProposeTags + ?Sized + 'static,
    {
        let snapshot = vocab.snapshot();
        let mut report = PassReport::new(pass);
        report.selected = ids.len();

        debug!("Pass {}: {} rules, vocabulary v{}", pass, ids.len(), snapshot.version);

        let pending = self.dispatch(store, &snapshot, oracle, budget, cancel, ids, &mut report)?;

        // Writes serialize here, in id order
        for (rule, handle) in pending {
            if cancel.is_cancelled() {
                handle.abort();
                continue;
            }

            let result = handle
                .await
                .map_err(|e| TaggerError::Worker(e.to_string()))?;

            let suggestion = match result {
                Ok(suggestion) => suggestion,
                Err(e) => {
                    match e {
                        OracleError::Timeout { .. } => report.timeouts += 1,
                        OracleError::MalformedResponse(_) => report.malformed += 1,
                        OracleError::Transport(_) => report.transport_errors += 1,
                    }
                    warn!("Oracle failed for {}, left unchanged: {}", rule.id, e);
                    continue;
                }
            };
            report.proposed += 1;

            let outcome = gate::evaluate(&suggestion, &rule.domain, &snapshot, &self.config);
            for rejection in &outcome.rejected {
                debug!("{}: {}", rule.id, rejection);
            }

            if outcome.is_admitted() {
                self.approve(store, vocab, &rule, &outcome, &suggestion.rationale, snapshot.version, &mut report)?;
            } else {
                self.hold(store, &rule, &outcome, &suggestion.rationale, snapshot.version, &mut report)?;
            }
        }

        info!(
            "Pass {}: {} approved, {} skipped, {} deferred, {} errored, {} failed writes, +{} tags",
            pass,
            report.approved,
            report.skipped,
            report.deferred,
            report.errored(),
            report.failed_writes,
            report.vocabulary_growth
        );
        Ok(report)
    }

    /// Read each selected rule and start its oracle call
    #[allow(clippy::too_many_arguments)]
    fn dispatch<S, O>(
        &self,
        store: &S,
        snapshot: &Vocabulary,
        oracle: &Arc<O>,
        budget: &mut CostBudget,
        cancel: &CancelToken,
        ids: &[RuleId],
        report: &mut PassReport,
    ) -> Result<Vec<PendingCall>, TaggerError>
    where
        S: RuleStore + ?Sized,
        O: ProposeTags + ?Sized + 'static,
    {
        let permits = Arc::new(Semaphore::new(self.config.max_workers));
        let mut pending = Vec::with_capacity(ids.len());

        for id in ids {
            if cancel.is_cancelled() {
                break;
            }

            let Some(rule) = store.get(id)? else {
                continue;
            };
            if rule.tags_state != TagsState::NeedsTags {
                continue;
            }
            report.record_processed(&rule.domain);

            if rule.metadata.get_u64(keys::GATE_FAILED_VOCAB_VERSION) == Some(snapshot.version) {
                debug!("{} deferred: vocabulary unchanged since last gate failure", id);
                report.deferred += 1;
                continue;
            }

            if let Err(e) = budget.try_charge(self.call_cost) {
                warn!("Oracle budget exhausted: {}", e);
                break;
            }

            let request = TagRequest::from_rule(&rule, snapshot);
            let oracle = Arc::clone(oracle);
            let permits = Arc::clone(&permits);
            let handle = tokio::spawn(async move {
                let _permit = permits.acquire_owned().await;
                oracle.propose_tags(&request).await
            });
            pending.push((rule, handle));
        }

        Ok(pending)
    }

    #[allow(clippy::too_many_arguments)]
    fn approve<S>(
        &self,
        store: &mut S,
        vocab: &VocabularyManager,
        rule: &Rule,
        outcome: &GateOutcome,
        rationale: &str,
        vocabulary_version: u64,
        report: &mut PassReport,
    ) -> Result<(), TaggerError>
    where
        S: RuleStore + ?Sized,
    {
        if self.config.dry_run {
            info!("DRY RUN: would approve {} with {:?}", rule.id, outcome.tags());
            report.record_approved(&rule.domain, outcome.confidence);
            return Ok(());
        }

        let tags = outcome.tags();
        let now = current_timestamp();
        let result = store.update(&rule.id, rule.version, &mut |r: &mut Rule| {
            mark_approved(
                r,
                &tags,
                outcome.confidence,
                Some(outcome.coherence),
                rationale,
                vocabulary_version,
                now,
            )
        });
        if settle(result, &rule.id, report)?.is_none() {
            return Ok(());
        }

        debug!(
            "{} approved: {:?} (confidence {:.2}, coherence {:.2})",
            rule.id, tags, outcome.confidence, outcome.coherence
        );
        report.record_approved(&rule.domain, outcome.confidence);
        report.vocabulary_growth += grow_tags(vocab, &rule.domain, &outcome.novel, &rule.id);
        Ok(())
    }

    /// Apply the gate-failure policy
    fn hold<S>(
        &self,
        store: &mut S,
        rule: &Rule,
        outcome: &GateOutcome,
        rationale: &str,
        vocabulary_version: u64,
        report: &mut PassReport,
    ) -> Result<(), TaggerError>
    where
        S: RuleStore + ?Sized,
    {
        report.skipped += 1;
        if let Some(failure) = &outcome.failure {
            debug!("{} failed the gate: {}", rule.id, failure);
        }
        if self.config.dry_run {
            return Ok(());
        }

        let policy = self.config.on_gate_failure;
        let tags = outcome.tags();
        let result = store.update(&rule.id, rule.version, &mut |r: &mut Rule| {
            r.metadata
                .set(keys::GATE_FAILED_VOCAB_VERSION, vocabulary_version);
            if policy == GateFailurePolicy::Propose {
                r.tags_state = TagsState::Proposed;
                r.metadata.set(keys::PROPOSED_TAGS, tags.clone());
                r.metadata
                    .set(keys::PROPOSED_CONFIDENCE, outcome.confidence);
                r.metadata.set(keys::TAG_COHERENCE, outcome.coherence);
                r.metadata.set(keys::OPTIMIZATION_REASONING, rationale);
            }
        });
        if settle(result, &rule.id, report)?.is_some() && policy == GateFailurePolicy::Propose {
            report.parked += 1;
        }
        Ok(())
    }

    /// Settle a parked proposal by hand
    ///
    /// Accepting approves the proposed tags that still validate and grows the
    /// novel ones. Rejecting moves the rule to `needs_review`.
    pub fn decide_proposal<S>(
        &self,
        store: &mut S,
        vocab: &VocabularyManager,
        id: &RuleId,
        accept: bool,
    ) -> Result<Rule, TaggerError>
    where
        S: RuleStore + ?Sized,
    {
        let rule = store.get(id)?.ok_or(TaggerError::NotFound(*id))?;
        if rule.tags_state != TagsState::Proposed {
            return Err(TaggerError::WrongState {
                id: *id,
                actual: rule.tags_state,
                expected: TagsState::Proposed,
            });
        }

        if !accept {
            let updated = store.update(id, rule.version, &mut |r: &mut Rule| {
                r.tags_state = TagsState::NeedsReview;
                r.metadata.set(keys::REVIEW_REASON, "proposal_rejected");
                r.metadata.remove(keys::PROPOSED_TAGS);
                r.metadata.remove(keys::PROPOSED_CONFIDENCE);
            })?;
            info!("Proposal for {} rejected", id);
            return Ok(updated);
        }

        let validation = vocab.validate(&rule.domain, rule.metadata.string_list(keys::PROPOSED_TAGS));
        let tags = validation.accepted();
        if tags.is_empty() {
            return Err(TaggerError::NoValidTags(*id));
        }

        let confidence = rule
            .metadata
            .get_f64(keys::PROPOSED_CONFIDENCE)
            .unwrap_or(0.5);
        let reasoning = rule
            .metadata
            .get_str(keys::OPTIMIZATION_REASONING)
            .unwrap_or_default()
            .to_string();
        let version = vocab.version();
        let now = current_timestamp();

        let updated = store.update(id, rule.version, &mut |r: &mut Rule| {
            mark_approved(r, &tags, confidence, None, &reasoning, version, now)
        })?;
        let grown = grow_tags(vocab, &rule.domain, &validation.novel, id);
        info!("Proposal for {} accepted ({} tags, +{} grown)", id, tags.len(), grown);
        Ok(updated)
    }
}

/// Approval mutation shared by the loop and manual decisions
fn mark_approved(
    rule: &mut Rule,
    tags: &[String],
    confidence: f64,
    coherence: Option<f64>,
    reasoning: &str,
    vocabulary_version: u64,
    now: u64,
) {
    rule.tags = tags.iter().cloned().collect();
    rule.tags_state = TagsState::Approved;

    let meta = &mut rule.metadata;
    meta.set(keys::TAG_CONFIDENCE, confidence);
    if let Some(coherence) = coherence {
        meta.set(keys::TAG_COHERENCE, coherence);
    }
    meta.set(keys::OPTIMIZATION_REASONING, reasoning);
    meta.set(keys::OPTIMIZED_AT, now);
    meta.set(keys::VOCABULARY_VERSION, vocabulary_version);
    meta.remove(keys::GATE_FAILED_VOCAB_VERSION);
    meta.remove(keys::PROPOSED_TAGS);
    meta.remove(keys::PROPOSED_CONFIDENCE);
    meta.remove(keys::LOW_SALIENCE_PASSES);

    if !rule.salience.is_manual() {
        rule.salience = Salience::computed(compute_salience(rule.rule_type(), Some(confidence)));
    }
}

/// Grow novel tags; returns how many entries were created
fn grow_tags(vocab: &VocabularyManager, domain: &str, novel: &[String], source: &RuleId) -> usize {
    let source = source.to_string();
    novel
        .iter()
        .filter(|tag| match vocab.grow(domain, tag, "", Some(&source)) {
            Ok(outcome) => outcome.created,
            Err(e) => {
                warn!("Could not grow '{}' from {}: {}", tag, source, e);
                false
            }
        })
        .count()
}

/// Turn a per-rule write result into "written" or "counted as failed"
///
/// Contract violations stay fatal.
fn settle(
    result: Result<Rule, StoreError>,
    id: &RuleId,
    report: &mut PassReport,
) -> Result<Option<Rule>, TaggerError> {
    match result {
        Ok(rule) => Ok(Some(rule)),
        Err(e) if e.is_contract_violation() => Err(e.into()),
        Err(e) => {
            if e.is_concurrent_modification() {
                warn!("{} changed during the pass, retrying next pass", id);
            } else {
                warn!("Write to {} failed: {}", id, e);
            }
            report.failed_writes += 1;
            Ok(None)
        }
    }
}
