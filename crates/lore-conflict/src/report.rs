//! Conflict resolution summary for one run

use lore_domain::{ConflictId, ConflictRecord, ConflictStatus, RuleId};
use serde::Serialize;

/// Where one conflict ended up after the run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConflictOutcome {
    /// Conflict record id
    pub conflict: ConflictId,
    /// Rules involved
    pub rules: Vec<RuleId>,
    /// Status after the run
    pub status: ConflictStatus,
    /// Rule kept, when resolved
    pub kept: Option<RuleId>,
}

/// Report of one conflict engine run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConflictReport {
    /// Strategy in force
    pub strategy: String,

    /// New conflicts recorded (or found, in dry-run mode)
    pub detected: usize,

    /// Conflicts resolved this run
    pub resolved: usize,

    /// Conflicts handed to a human
    pub escalated: usize,

    /// Conflicts left for manual action by the manual strategy
    pub manual: usize,

    /// Conflicts left unresolved after a failed write, retried next run
    pub deferred: usize,

    /// Deferred conflicts from earlier runs picked up again
    pub retried: usize,

    /// Records closed because a rule moved on since detection
    pub stale: usize,

    /// Pairs restored to approved after the second review write failed
    pub compensated: usize,

    /// Rule writes that failed (concurrent modification or backend error)
    pub failed_writes: usize,

    /// Adjudication calls made
    pub oracle_calls: usize,

    /// The cost budget or conflict cap stopped adjudication
    pub budget_exhausted: bool,

    /// The run stopped at a cancellation checkpoint
    pub cancelled: bool,

    /// Nothing was written
    pub dry_run: bool,

    /// Per-conflict outcomes, in processing order
    pub outcomes: Vec<ConflictOutcome>,
}

impl ConflictReport {
    pub(crate) fn new(strategy: &str, dry_run: bool) -> Self {
        Self {
            strategy: strategy.to_string(),
            dry_run,
            ..Self::default()
        }
    }

    /// Record where a conflict ended up
    pub fn record_outcome(&mut self, record: &ConflictRecord) {
        self.outcomes.push(ConflictOutcome {
            conflict: record.id,
            rules: record.rules.clone(),
            status: record.status,
            kept: record.kept.filter(|_| record.status == ConflictStatus::Resolved),
        });
    }

    /// Conflicts still needing a human after the run
    pub fn open(&self) -> usize {
        self.escalated + self.manual + self.deferred
    }

    /// Generate a summary report
    pub fn summary(&self) -> String {
        let mut lines = vec![
            "Conflict Summary".to_string(),
            "================".to_string(),
            format!("Strategy: {}", self.strategy),
        ];
        if self.dry_run {
            lines.push("DRY RUN: nothing was written".to_string());
        }
        lines.push(format!("Detected: {}", self.detected));
        lines.push(format!("Resolved: {}", self.resolved));
        lines.push(format!("Escalated: {}", self.escalated));
        lines.push(format!("Manual: {}", self.manual));
        if self.retried > 0 || self.deferred > 0 {
            lines.push(format!("Deferred: {} ({} retried from earlier runs)", self.deferred, self.retried));
        }
        if self.stale > 0 {
            lines.push(format!("Stale: {} (rules released for re-detection)", self.stale));
        }
        if self.oracle_calls > 0 {
            lines.push(format!("Adjudications: {}", self.oracle_calls));
        }
        if self.budget_exhausted {
            lines.push("Adjudication ceiling reached; remaining conflicts escalated".to_string());
        }
        if self.compensated > 0 || self.failed_writes > 0 {
            lines.push(format!(
                "Failed writes: {} ({} pairs restored)",
                self.failed_writes, self.compensated
            ));
        }
        if self.cancelled {
            lines.push("Cancelled before completion".to_string());
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lore_domain::{ContradictionKind, ResolutionStrategy, RuleType};

    #[test]
    fn test_outcome_hides_pending_choice() {
        let a = RuleId::new(RuleType::Invariant, 1);
        let b = RuleId::new(RuleType::Invariant, 2);
        let mut record = ConflictRecord::new(vec![a, b], ContradictionKind::Declared, ResolutionStrategy::Manual, 0);
        record.kept = Some(a);

        let mut report = ConflictReport::new("auto", false);
        report.record_outcome(&record);
        assert_eq!(report.outcomes[0].kept, None);

        record.resolve(a, vec![b], 1);
        report.record_outcome(&record);
        assert_eq!(report.outcomes[1].kept, Some(a));
    }

    #[test]
    fn test_summary() {
        let mut report = ConflictReport::new("llm_assisted", false);
        report.detected = 3;
        report.resolved = 1;
        report.escalated = 2;
        report.oracle_calls = 1;
        report.budget_exhausted = true;

        let summary = report.summary();
        assert!(summary.starts_with("Conflict Summary"));
        assert!(summary.contains("Strategy: llm_assisted"));
        assert!(summary.contains("Escalated: 2"));
        assert!(summary.contains("ceiling reached"));
        assert_eq!(report.open(), 2);
    }
}
