//! Curator phases: supersession, merge, low-salience archival, migration,
//! scope archival

use crate::config::CuratorConfig;
use crate::report::CuratorReport;
use crate::similarity::{blend, jaccard, normalize_text, tokenize};
use crate::CuratorError;
use lore_domain::metadata::keys;
use lore_domain::{
    current_timestamp, CancelToken, CostBudget, RelationshipType, Rule, RuleId, RuleQuery,
    RuleStore, StoreError, TagsState, Vocabulary,
};
use lore_oracle::{MergeRequest, ReviewMerge, RuleBrief};
use lore_vocab::validate_tags;
use serde_json::json;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// Values written to `metadata.archive_reason`
pub mod archive_reason {
    /// Another rule supersedes this one
    pub const SUPERSEDED: &str = "superseded";
    /// Merged into a near-duplicate
    pub const MERGED: &str = "merged";
    /// Stayed below the salience floor
    pub const LOW_CONFIDENCE: &str = "low_confidence";
    /// Reuse scope is excluded by configuration
    pub const SCOPE_EXCLUDED: &str = "scope_excluded";
}

/// Trigger recorded for configured migrations
pub const MIGRATION_TRIGGER: &str = "config:migration";

/// Duplicate & Domain Curator
///
/// Runs its phases in a fixed order over the live rules of the store:
///
/// 1. Supersession
/// 2. Near-duplicate merge
/// 3. Low-salience archival
/// 4. Domain migrations
/// 5. Scope archival
///
/// Every write is a single-rule update. A merge is a survivor update
/// followed by the loser's archival; if the second write fails the pair is
/// found again on the next run and the merge completes then.
///
/// # Examples
///
/// ```
/// use lore_curator::{Curator, CuratorConfig};
/// use lore_domain::{CancelToken, Provenance, Rule, RuleId, RuleStore, RuleType, TagsState, Vocabulary};
/// use lore_store::MemoryStore;
///
/// # tokio_test::block_on(async {
/// let mut store = MemoryStore::new();
/// let keep = RuleId::new(RuleType::Decision, 1);
/// let copy = RuleId::new(RuleType::Decision, 2);
/// store.insert(Rule::new(keep, "Store timestamps in UTC", "data", Provenance::new("s1", 0))).unwrap();
/// store.insert(Rule::new(copy, "store timestamps in UTC.", "data", Provenance::new("s2", 0))).unwrap();
///
/// let vocab = Vocabulary::new().with_domain("data", "Persistence and schema evolution", &[]);
/// let curator = Curator::new(CuratorConfig::default()).unwrap();
/// let report = curator.run(&mut store, &vocab, &CancelToken::new()).await.unwrap();
///
/// assert_eq!(report.total_merged(), 1);
/// assert_eq!(store.get(&copy).unwrap().unwrap().tags_state, TagsState::Archived);
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct Curator {
    config: CuratorConfig,
    call_cost: f64,
}

impl Curator {
    /// Create a curator, validating the configuration
    pub fn new(config: CuratorConfig) -> Result<Self, CuratorError> {
        config.validate().map_err(CuratorError::Config)?;
        Ok(Self {
            config,
            call_cost: 1.0,
        })
    }

    /// Budget cost charged per merge review (default 1.0)
    pub fn with_call_cost(mut self, cost: f64) -> Self {
        self.call_cost = cost;
        self
    }

    /// Get the configuration
    pub fn config(&self) -> &CuratorConfig {
        &self.config
    }

    /// Run every phase without merge review
    ///
    /// Borderline pairs are left alone.
    pub async fn run<S>(
        &self,
        store: &mut S,
        vocab: &Vocabulary,
        cancel: &CancelToken,
    ) -> Result<CuratorReport, CuratorError>
    where
        S: RuleStore + ?Sized,
    {
        self.run_phases(store, vocab, None, cancel).await
    }

    /// Run every phase, confirming borderline pairs through the oracle
    /// when `merge_review` is enabled
    pub async fn run_with_review<S>(
        &self,
        store: &mut S,
        vocab: &Vocabulary,
        oracle: &dyn ReviewMerge,
        cancel: &CancelToken,
    ) -> Result<CuratorReport, CuratorError>
    where
        S: RuleStore + ?Sized,
    {
        self.run_phases(store, vocab, Some(oracle), cancel).await
    }

    async fn run_phases<S>(
        &self,
        store: &mut S,
        vocab: &Vocabulary,
        oracle: Option<&dyn ReviewMerge>,
        cancel: &CancelToken,
    ) -> Result<CuratorReport, CuratorError>
    where
        S: RuleStore + ?Sized,
    {
        for migration in &self.config.migrations {
            if vocab.resolve_domain(&migration.to).is_none() {
                return Err(CuratorError::UnknownDomain(migration.to.clone()));
            }
        }

        let mut report = CuratorReport::new(self.config.dry_run);
        let mut budget = CostBudget::new(self.config.max_oracle_cost);
        let oracle = oracle.filter(|_| self.config.merge_review);

        info!(
            "Curator run: similarity {:.2}, salience floor {:.2}, {} migrations{}",
            self.config.similarity_threshold,
            self.config.salience_floor,
            self.config.migrations.len(),
            if self.config.dry_run { " (dry run)" } else { "" }
        );

        self.supersede(store, cancel, &mut report)?;
        self.merge_duplicates(store, vocab, oracle, &mut budget, cancel, &mut report)
            .await?;
        self.archive_low_salience(store, cancel, &mut report)?;
        self.apply_migrations(store, vocab, cancel, &mut report)?;
        self.archive_scopes(store, cancel, &mut report)?;

        report.cancelled = cancel.is_cancelled();
        info!(
            "Curator finished: {} superseded, {} merged, {} archived low-salience, {} migrated, {} scope-archived, {} failed writes",
            report.superseded,
            report.total_merged(),
            report.archived_low_salience,
            report.migrated,
            report.scope_archived,
            report.failed_writes
        );
        Ok(report)
    }

    /// Phase 1: archive rules that another rule supersedes
    fn supersede<S>(&self, store: &mut S, cancel: &CancelToken, report: &mut CuratorReport) -> Result<(), CuratorError>
    where
        S: RuleStore + ?Sized,
    {
        let mut targets: BTreeMap<RuleId, RuleId> = BTreeMap::new();
        for rel in store.relationships(RelationshipType::SupersededBy)? {
            targets.entry(rel.from_rule).or_insert(rel.to_rule);
        }

        let live = store.query(&RuleQuery::live())?;
        for rule in live.iter(&*store) {
            let rule = rule?;
            for declared in rule.metadata.declared_relationships() {
                if RelationshipType::parse(&declared.kind) != Some(RelationshipType::SupersededBy) {
                    continue;
                }
                match RuleId::parse(&declared.target) {
                    Ok(target) => {
                        targets.entry(rule.id).or_insert(target);
                    }
                    Err(e) => warn!("{}: ignoring superseded_by relationship: {}", rule.id, e),
                }
            }
        }

        for (id, target) in targets {
            if cancel.is_cancelled() {
                return Ok(());
            }
            if id == target {
                continue;
            }
            let Some(rule) = store.get(&id)? else {
                continue;
            };
            if rule.is_archived() {
                continue;
            }
            if store.get(&target)?.is_none() {
                warn!("{} is superseded by unknown rule {}, skipped", id, target);
                continue;
            }

            if self.config.dry_run {
                info!("DRY RUN: Would archive {} (superseded by {})", id, target);
                report.superseded += 1;
                continue;
            }

            let now = current_timestamp();
            let result = store.update(&id, rule.version, &mut |r: &mut Rule| {
                archive(r, archive_reason::SUPERSEDED, now);
                r.metadata.set(keys::SUPERSEDED_BY, target.to_string());
            });
            if settle(result, &id, report)?.is_some() {
                debug!("{} archived: superseded by {}", id, target);
                report.superseded += 1;
            }
        }
        Ok(())
    }

    /// Phase 2: merge near-duplicates within each domain
    async fn merge_duplicates<S>(
        &self,
        store: &mut S,
        vocab: &Vocabulary,
        oracle: Option<&dyn ReviewMerge>,
        budget: &mut CostBudget,
        cancel: &CancelToken,
        report: &mut CuratorReport,
    ) -> Result<(), CuratorError>
    where
        S: RuleStore + ?Sized,
    {
        let live = store.query(&RuleQuery::live())?;
        let mut groups: BTreeMap<String, Vec<Rule>> = BTreeMap::new();
        for rule in live.iter(&*store) {
            let rule = rule?;
            let domain = vocab
                .resolve_domain(&rule.domain)
                .unwrap_or(&rule.domain)
                .to_string();
            groups.entry(domain).or_default().push(rule);
        }

        for (domain, rules) in groups.iter_mut() {
            if cancel.is_cancelled() {
                break;
            }
            if rules.len() < 2 {
                continue;
            }
            debug!("Comparing {} rules in domain '{}'", rules.len(), domain);
            self.merge_group(store, rules, oracle, budget, cancel, report)
                .await?;
        }
        Ok(())
    }

    async fn merge_group<S>(
        &self,
        store: &mut S,
        rules: &mut [Rule],
        oracle: Option<&dyn ReviewMerge>,
        budget: &mut CostBudget,
        cancel: &CancelToken,
        report: &mut CuratorReport,
    ) -> Result<(), CuratorError>
    where
        S: RuleStore + ?Sized,
    {
        let tokens: Vec<BTreeSet<String>> = rules.iter().map(|r| tokenize(&r.text)).collect();
        let normalized: Vec<String> = rules.iter().map(|r| normalize_text(&r.text)).collect();
        let mut gone: BTreeSet<usize> = BTreeSet::new();

        for i in 0..rules.len() {
            for j in (i + 1)..rules.len() {
                if cancel.is_cancelled() {
                    return Ok(());
                }
                if gone.contains(&i) {
                    break;
                }
                if gone.contains(&j) {
                    continue;
                }

                let exact = !normalized[i].is_empty() && normalized[i] == normalized[j];
                let similarity = if exact {
                    1.0
                } else {
                    blend(
                        jaccard(&tokens[i], &tokens[j]),
                        &rules[i].tags,
                        &rules[j].tags,
                        self.config.tag_weight,
                    )
                };

                let (survivor, loser) = if survives(&rules[i], &rules[j]) { (i, j) } else { (j, i) };

                let reviewed = if exact || similarity >= self.config.similarity_threshold {
                    false
                } else if similarity >= self.config.review_floor {
                    let Some(oracle) = oracle else {
                        continue;
                    };
                    if !self
                        .review(oracle, budget, &rules[survivor], &rules[loser], similarity, report)
                        .await
                    {
                        continue;
                    }
                    true
                } else {
                    continue;
                };

                if self.merge_pair(store, rules, survivor, loser, similarity, reviewed, report)? {
                    gone.insert(loser);
                }
            }
        }
        Ok(())
    }

    /// Ask the oracle whether a borderline pair says the same thing
    async fn review(
        &self,
        oracle: &dyn ReviewMerge,
        budget: &mut CostBudget,
        survivor: &Rule,
        loser: &Rule,
        similarity: f64,
        report: &mut CuratorReport,
    ) -> bool {
        let was_exhausted = budget.is_exhausted();
        if let Err(e) = budget.try_charge(self.call_cost) {
            if !was_exhausted {
                warn!("Merge review budget exhausted: {}", e);
            }
            report.reviews_skipped += 1;
            return false;
        }
        report.reviews += 1;

        let request = MergeRequest {
            first: RuleBrief::from_rule(survivor),
            second: RuleBrief::from_rule(loser),
            similarity,
        };
        match oracle.review_merge(&request).await {
            Ok(verdict) if verdict.equivalent && verdict.confidence >= self.config.merge_review_confidence => true,
            Ok(verdict) => {
                debug!(
                    "{} and {} kept apart (equivalent: {}, confidence {:.2})",
                    survivor.id, loser.id, verdict.equivalent, verdict.confidence
                );
                report.reviews_declined += 1;
                false
            }
            Err(e) => {
                warn!(
                    "Merge review of {} and {} failed, pair left unchanged: {}",
                    survivor.id, loser.id, e
                );
                report.review_errors += 1;
                false
            }
        }
    }

    /// Update the survivor, then archive the loser
    ///
    /// Returns whether the loser is gone.
    #[allow(clippy::too_many_arguments)]
    fn merge_pair<S>(
        &self,
        store: &mut S,
        rules: &mut [Rule],
        survivor: usize,
        loser: usize,
        similarity: f64,
        reviewed: bool,
        report: &mut CuratorReport,
    ) -> Result<bool, CuratorError>
    where
        S: RuleStore + ?Sized,
    {
        let survivor_id = rules[survivor].id;
        let loser_id = rules[loser].id;

        if self.config.dry_run {
            info!(
                "DRY RUN: Would merge {} into {} (similarity {:.2})",
                loser_id, survivor_id, similarity
            );
            report.record_merge(survivor_id, loser_id, similarity, reviewed);
            return Ok(true);
        }

        let mut lineage = vec![loser_id.to_string()];
        lineage.extend(rules[loser].metadata.string_list(keys::MERGED_FROM));
        let now = current_timestamp();

        let result = store.update(&survivor_id, rules[survivor].version, &mut |r: &mut Rule| {
            for id in &lineage {
                r.metadata.push_unique(keys::MERGED_FROM, id);
            }
            r.metadata.set(keys::MERGED_AT, now);
        });
        let Some(updated) = settle(result, &survivor_id, report)? else {
            return Ok(false);
        };
        rules[survivor] = updated;

        let result = store.update(&loser_id, rules[loser].version, &mut |r: &mut Rule| {
            archive(r, archive_reason::MERGED, now);
            r.metadata.set(keys::MERGED_INTO, survivor_id.to_string());
        });
        let Some(archived) = settle(result, &loser_id, report)? else {
            return Ok(false);
        };
        rules[loser] = archived;

        debug!("{} merged into {} (similarity {:.2})", loser_id, survivor_id, similarity);
        report.record_merge(survivor_id, loser_id, similarity, reviewed);
        Ok(true)
    }

    /// Phase 3: archive rules stuck below the salience floor
    ///
    /// Approved rules and manually pinned salience are exempt.
    fn archive_low_salience<S>(
        &self,
        store: &mut S,
        cancel: &CancelToken,
        report: &mut CuratorReport,
    ) -> Result<(), CuratorError>
    where
        S: RuleStore + ?Sized,
    {
        let query = RuleQuery {
            states: vec![TagsState::NeedsTags, TagsState::Proposed, TagsState::NeedsReview],
            ..Default::default()
        };
        let snapshot = store.query(&query)?;

        for id in snapshot.ids() {
            if cancel.is_cancelled() {
                return Ok(());
            }
            let Some(rule) = store.get(id)? else {
                continue;
            };
            if !query.matches(&rule) || rule.salience.is_manual() {
                continue;
            }

            let count = rule.metadata.get_u64(keys::LOW_SALIENCE_PASSES).unwrap_or(0);
            if rule.salience.value >= self.config.salience_floor {
                if count > 0 && !self.config.dry_run {
                    let result = store.update(id, rule.version, &mut |r: &mut Rule| {
                        r.metadata.remove(keys::LOW_SALIENCE_PASSES);
                    });
                    settle(result, id, report)?;
                }
                continue;
            }

            let next = count + 1;
            let expire = next >= self.config.low_salience_passes;
            if self.config.dry_run {
                if expire {
                    info!("DRY RUN: Would archive {} (salience {:.2})", id, rule.salience.value);
                    report.archived_low_salience += 1;
                } else {
                    report.low_salience_marked += 1;
                }
                continue;
            }

            let now = current_timestamp();
            let result = store.update(id, rule.version, &mut |r: &mut Rule| {
                r.metadata.set(keys::LOW_SALIENCE_PASSES, next);
                if expire {
                    archive(r, archive_reason::LOW_CONFIDENCE, now);
                }
            });
            if settle(result, id, report)?.is_some() {
                if expire {
                    debug!("{} archived: salience {:.2} for {} passes", id, rule.salience.value, next);
                    report.archived_low_salience += 1;
                } else {
                    report.low_salience_marked += 1;
                }
            }
        }
        Ok(())
    }

    /// Phase 4: configured domain migrations, in order
    fn apply_migrations<S>(
        &self,
        store: &mut S,
        vocab: &Vocabulary,
        cancel: &CancelToken,
        report: &mut CuratorReport,
    ) -> Result<(), CuratorError>
    where
        S: RuleStore + ?Sized,
    {
        for migration in &self.config.migrations {
            let query = RuleQuery {
                domain: Some(migration.from.clone()),
                ..RuleQuery::live()
            };
            let snapshot = store.query(&query)?;
            let mut moved = 0;

            for id in snapshot.ids() {
                if cancel.is_cancelled() {
                    return Ok(());
                }
                let Some(rule) = store.get(id)? else {
                    continue;
                };
                if !query.matches(&rule) {
                    continue;
                }
                if migration
                    .created_before
                    .is_some_and(|cutoff| rule.provenance.created_at >= cutoff)
                {
                    continue;
                }

                if self.config.dry_run {
                    info!("DRY RUN: Would move {} from '{}' to '{}'", id, migration.from, migration.to);
                    report.migrated += 1;
                    continue;
                }

                let result = write_migration(store, vocab, &rule, &migration.to, MIGRATION_TRIGGER);
                if let Some(updated) = settle(result, id, report)? {
                    moved += 1;
                    report.migrated += 1;
                    if updated.tags_state == TagsState::NeedsReview && rule.tags_state != TagsState::NeedsReview {
                        report.migration_reviews += 1;
                    }
                }
            }

            if moved > 0 {
                info!("Moved {} rules from '{}' to '{}'", moved, migration.from, migration.to);
            }
        }
        Ok(())
    }

    /// Phase 5: archive rules whose reuse scope is excluded
    fn archive_scopes<S>(&self, store: &mut S, cancel: &CancelToken, report: &mut CuratorReport) -> Result<(), CuratorError>
    where
        S: RuleStore + ?Sized,
    {
        if self.config.archive_scopes.is_empty() {
            return Ok(());
        }
        let snapshot = store.query(&RuleQuery::live())?;

        for id in snapshot.ids() {
            if cancel.is_cancelled() {
                return Ok(());
            }
            let Some(rule) = store.get(id)? else {
                continue;
            };
            if rule.is_archived() {
                continue;
            }
            let Some(scope) = rule.metadata.get_str(keys::REUSABILITY_SCOPE) else {
                continue;
            };
            if !self.config.archive_scopes.iter().any(|s| s == scope) {
                continue;
            }

            if self.config.dry_run {
                info!("DRY RUN: Would archive {} (scope '{}')", id, scope);
                report.scope_archived += 1;
                continue;
            }

            let now = current_timestamp();
            let result = store.update(id, rule.version, &mut |r: &mut Rule| {
                archive(r, archive_reason::SCOPE_EXCLUDED, now);
            });
            if settle(result, id, report)?.is_some() {
                report.scope_archived += 1;
            }
        }
        Ok(())
    }
}

/// Move one rule to another domain, logging the move
///
/// `to` may be an alias. Moving a rule to the domain it already has is a
/// no-op. An approved rule whose tags do not validate under the new domain
/// goes to `needs_review`.
pub fn migrate_domain<S>(
    store: &mut S,
    vocab: &Vocabulary,
    id: &RuleId,
    to: &str,
    trigger: &str,
) -> Result<Rule, CuratorError>
where
    S: RuleStore + ?Sized,
{
    let rule = store.get(id)?.ok_or(CuratorError::NotFound(*id))?;
    if rule.is_archived() {
        return Err(CuratorError::Archived(*id));
    }
    let target = vocab
        .resolve_domain(to)
        .ok_or_else(|| CuratorError::UnknownDomain(to.to_string()))?;
    if rule.domain == target {
        return Ok(rule);
    }

    let updated = write_migration(store, vocab, &rule, target, trigger)?;
    info!("Moved {} from '{}' to '{}' ({})", id, rule.domain, updated.domain, trigger);
    Ok(updated)
}

fn write_migration<S>(
    store: &mut S,
    vocab: &Vocabulary,
    rule: &Rule,
    to: &str,
    trigger: &str,
) -> Result<Rule, StoreError>
where
    S: RuleStore + ?Sized,
{
    let target = vocab.resolve_domain(to).unwrap_or(to).to_string();
    let invalid_tags = rule.tags_state == TagsState::Approved
        && !validate_tags(vocab, &target, &rule.tags).is_clean();
    let entry = json!({
        "from_domain": rule.domain,
        "to_domain": target,
        "timestamp": current_timestamp(),
        "trigger": trigger,
    });

    store.update(&rule.id, rule.version, &mut |r: &mut Rule| {
        r.metadata.append(keys::DOMAIN_HISTORY, entry.clone());
        r.domain = target.clone();
        if invalid_tags {
            r.tags_state = TagsState::NeedsReview;
            r.metadata.set(keys::REVIEW_REASON, "domain_migration");
        }
    })
}

/// Whether `a` survives a merge with `b`
///
/// Higher salience wins, then higher tag confidence, then the lower id.
fn survives(a: &Rule, b: &Rule) -> bool {
    let by_salience = a.salience.value.partial_cmp(&b.salience.value);
    let by_confidence = a
        .metadata
        .get_f64(keys::TAG_CONFIDENCE)
        .partial_cmp(&b.metadata.get_f64(keys::TAG_CONFIDENCE));

    match (by_salience, by_confidence) {
        (Some(Ordering::Greater), _) => true,
        (Some(Ordering::Less), _) => false,
        (_, Some(Ordering::Greater)) => true,
        (_, Some(Ordering::Less)) => false,
        _ => a.id < b.id,
    }
}

fn archive(rule: &mut Rule, reason: &str, now: u64) {
    rule.tags_state = TagsState::Archived;
    rule.metadata.set(keys::ARCHIVE_REASON, reason);
    rule.metadata.set(keys::ARCHIVED_AT, now);
}

/// Turn a per-rule write result into "written" or "counted as failed"
///
/// Contract violations stay fatal.
fn settle(
    result: Result<Rule, StoreError>,
    id: &RuleId,
    report: &mut CuratorReport,
) -> Result<Option<Rule>, CuratorError> {
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
