//! Pass and run reports

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Why the loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvergenceReason {
    /// A pass approved zero rules
    NoProgress,
    /// No rule is left in `needs_tags`
    AllTagged,
    /// The configured pass count was reached
    MaxPasses,
    /// The cumulative cost ceiling was hit
    CostCeiling,
    /// The run was cancelled between rule operations
    Cancelled,
}

impl ConvergenceReason {
    /// Get the reason name
    pub fn as_str(&self) -> &'static str {
        match self {
            ConvergenceReason::NoProgress => "no_progress",
            ConvergenceReason::AllTagged => "all_tagged",
            ConvergenceReason::MaxPasses => "max_passes",
            ConvergenceReason::CostCeiling => "cost_ceiling",
            ConvergenceReason::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ConvergenceReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-domain counts within a pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DomainProgress {
    /// Rules of the domain considered
    pub processed: usize,
    /// Rules of the domain approved
    pub approved: usize,
}

impl DomainProgress {
    /// Share of processed rules approved
    pub fn improvement_rate(&self) -> f64 {
        if self.processed == 0 {
            0.0
        } else {
            self.approved as f64 / self.processed as f64
        }
    }
}

/// Counts for one pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PassReport {
    /// 1-based pass number
    pub pass: usize,
    /// Rules selected at pass start
    pub selected: usize,
    /// Suggestions received from the oracle
    pub proposed: usize,
    /// Rules moved to `approved`
    pub approved: usize,
    /// Suggestions that failed the gate
    pub skipped: usize,
    /// Rules held back because the vocabulary has not changed since they failed
    pub deferred: usize,
    /// Rules moved to `proposed` for a human decision
    pub parked: usize,
    /// Oracle timeouts
    pub timeouts: usize,
    /// Malformed oracle responses
    pub malformed: usize,
    /// Oracle transport failures
    pub transport_errors: usize,
    /// Writes that failed (concurrent modification or backend error)
    pub failed_writes: usize,
    /// Tier-2 tags grown into the vocabulary
    pub vocabulary_growth: usize,
    /// Mean confidence of approved suggestions
    pub avg_confidence: Option<f64>,
    /// Per-domain breakdown
    pub domains: BTreeMap<String, DomainProgress>,
}

impl PassReport {
    pub(crate) fn new(pass: usize) -> Self {
        Self {
            pass,
            ..Self::default()
        }
    }

    /// Oracle failures of any kind
    pub fn errored(&self) -> usize {
        self.timeouts + self.malformed + self.transport_errors
    }

    /// Share of selected rules approved
    pub fn improvement_rate(&self) -> f64 {
        if self.selected == 0 {
            0.0
        } else {
            self.approved as f64 / self.selected as f64
        }
    }

    /// Fewer than 3 new tags and less than 10% improvement
    pub fn vocabulary_saturated(&self) -> bool {
        self.vocabulary_growth < 3 && self.improvement_rate() < 0.10
    }

    /// Average approved confidence below 0.65
    pub fn quality_floor_reached(&self) -> bool {
        self.avg_confidence.is_some_and(|c| c < 0.65)
    }

    pub(crate) fn record_processed(&mut self, domain: &str) {
        self.domains.entry(domain.to_string()).or_default().processed += 1;
    }

    pub(crate) fn record_approved(&mut self, domain: &str, confidence: f64) {
        let previous = self.avg_confidence.unwrap_or(0.0) * self.approved as f64;
        self.approved += 1;
        self.avg_confidence = Some((previous + confidence) / self.approved as f64);
        self.domains.entry(domain.to_string()).or_default().approved += 1;
    }
}

/// Outcome of a full run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoopReport {
    /// Reports of the passes that ran
    pub passes: Vec<PassReport>,
    /// Why the loop stopped
    pub convergence: ConvergenceReason,
    /// Oracle calls issued
    pub oracle_calls: u64,
    /// Budget spent
    pub cost_spent: f64,
    /// Budget ceiling in effect
    pub cost_ceiling: f64,
    /// Vocabulary version at run start
    pub vocabulary_version_start: u64,
    /// Vocabulary version at run end
    pub vocabulary_version_end: u64,
    /// Rules still in `needs_tags` at run end
    pub remaining: usize,
}

impl LoopReport {
    /// Total approvals across passes
    pub fn total_approved(&self) -> usize {
        self.passes.iter().map(|p| p.approved).sum()
    }

    /// Total tags grown across passes
    pub fn vocabulary_growth(&self) -> usize {
        self.passes.iter().map(|p| p.vocabulary_growth).sum()
    }

    /// Total oracle failures across passes
    pub fn total_errored(&self) -> usize {
        self.passes.iter().map(PassReport::errored).sum()
    }

    /// Generate a summary report
    pub fn summary(&self) -> String {
        let mut lines = vec![
            "Tag Optimization Summary".to_string(),
            "========================".to_string(),
            format!("Passes: {}", self.passes.len()),
            format!("Convergence: {}", self.convergence),
            format!("Oracle calls: {} (cost {:.1} of {:.1})", self.oracle_calls, self.cost_spent, self.cost_ceiling),
            format!(
                "Vocabulary: v{} -> v{} (+{} tags)",
                self.vocabulary_version_start,
                self.vocabulary_version_end,
                self.vocabulary_growth()
            ),
            format!("Remaining needs_tags: {}", self.remaining),
            String::new(),
        ];

        for pass in &self.passes {
            lines.push(format!(
                "Pass {}: {} selected, {} proposed, {} approved, {} skipped, {} deferred, {} errored, {} failed writes",
                pass.pass,
                pass.selected,
                pass.proposed,
                pass.approved,
                pass.skipped,
                pass.deferred,
                pass.errored(),
                pass.failed_writes
            ));
            for (domain, progress) in &pass.domains {
                lines.push(format!(
                    "  {}: {} processed, {} approved ({:.0}%)",
                    domain,
                    progress.processed,
                    progress.approved,
                    progress.improvement_rate() * 100.0
                ));
            }
            if pass.vocabulary_saturated() {
                lines.push("  vocabulary saturated".to_string());
            }
            if pass.quality_floor_reached() {
                lines.push("  quality floor reached (avg confidence < 0.65)".to_string());
            }
        }

        lines.join("\n")
    }
}
