//! Counts collected during a curator run

use lore_domain::RuleId;
use serde::Serialize;

/// One merge performed (or planned, in dry-run mode)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergeRecord {
    /// Rule that stays
    pub survivor: RuleId,
    /// Rule archived into the survivor
    pub archived: RuleId,
    /// Similarity of the pair
    pub similarity: f64,
    /// Whether the merge was confirmed by merge review
    pub reviewed: bool,
}

/// Report of one curator run, per phase
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CuratorReport {
    /// Rules archived because another rule supersedes them
    pub superseded: usize,

    /// Merges performed
    pub merges: Vec<MergeRecord>,

    /// Borderline pairs sent to merge review
    pub reviews: usize,

    /// Reviewed pairs judged distinct or below the confidence bar
    pub reviews_declined: usize,

    /// Merge reviews that timed out or came back malformed
    pub review_errors: usize,

    /// Borderline pairs left alone because the review budget ran out
    pub reviews_skipped: usize,

    /// Rules whose low-salience counter advanced
    pub low_salience_marked: usize,

    /// Rules archived for staying below the salience floor
    pub archived_low_salience: usize,

    /// Rules moved to another domain
    pub migrated: usize,

    /// Migrated rules sent to review because their tags no longer validate
    pub migration_reviews: usize,

    /// Rules archived because of their reuse scope
    pub scope_archived: usize,

    /// Writes that failed (concurrent modification or backend error)
    pub failed_writes: usize,

    /// The run stopped at a cancellation checkpoint
    pub cancelled: bool,

    /// Nothing was written
    pub dry_run: bool,
}

impl CuratorReport {
    pub(crate) fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            ..Self::default()
        }
    }

    /// Record a merge
    pub fn record_merge(&mut self, survivor: RuleId, archived: RuleId, similarity: f64, reviewed: bool) {
        self.merges.push(MergeRecord {
            survivor,
            archived,
            similarity,
            reviewed,
        });
    }

    /// Number of merges
    pub fn total_merged(&self) -> usize {
        self.merges.len()
    }

    /// Rules archived by any phase
    pub fn total_archived(&self) -> usize {
        self.superseded + self.merges.len() + self.archived_low_salience + self.scope_archived
    }

    /// Generate a summary report
    pub fn summary(&self) -> String {
        let mut lines = vec![
            "Curator Summary".to_string(),
            "===============".to_string(),
        ];
        if self.dry_run {
            lines.push("DRY RUN: nothing was written".to_string());
        }
        lines.push(format!("Superseded: {}", self.superseded));
        lines.push(format!(
            "Merged: {} ({} reviewed, {} declined, {} review errors, {} skipped)",
            self.merges.len(),
            self.reviews,
            self.reviews_declined,
            self.review_errors,
            self.reviews_skipped
        ));
        for merge in &self.merges {
            lines.push(format!(
                "  {} <- {} ({:.2}{})",
                merge.survivor,
                merge.archived,
                merge.similarity,
                if merge.reviewed { ", reviewed" } else { "" }
            ));
        }
        lines.push(format!(
            "Low salience: {} archived, {} counting down",
            self.archived_low_salience, self.low_salience_marked
        ));
        lines.push(format!(
            "Migrated: {} ({} sent to review)",
            self.migrated, self.migration_reviews
        ));
        lines.push(format!("Scope archived: {}", self.scope_archived));
        lines.push(format!("Failed writes: {}", self.failed_writes));
        if self.cancelled {
            lines.push("Cancelled before completion".to_string());
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lore_domain::RuleType;

    #[test]
    fn test_totals() {
        let mut report = CuratorReport::new(false);
        report.superseded = 1;
        report.scope_archived = 2;
        report.record_merge(RuleId::new(RuleType::Decision, 1), RuleId::new(RuleType::Decision, 2), 0.9, false);
        assert_eq!(report.total_merged(), 1);
        assert_eq!(report.total_archived(), 4);
    }

    #[test]
    fn test_summary() {
        let mut report = CuratorReport::new(true);
        report.record_merge(RuleId::new(RuleType::Pattern, 3), RuleId::new(RuleType::Pattern, 4), 0.75, true);
        report.migrated = 2;

        let summary = report.summary();
        assert!(summary.contains("DRY RUN"));
        assert!(summary.contains("pattern-3 <- pattern-4 (0.75, reviewed)"));
        assert!(summary.contains("Migrated: 2 (0 sent to review)"));
    }
}
