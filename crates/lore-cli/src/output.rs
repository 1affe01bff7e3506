//! Output formatting for the CLI.
//!
//! Reports go to stdout as tables or pretty JSON; logs stay on stderr.

use crate::config::OutputFormat;
use crate::error::Result;
use colored::*;
use lore_conflict::ConflictReport;
use lore_curator::CuratorReport;
use lore_domain::{ConflictRecord, Rule, StoreStats};
use lore_tagger::LoopReport;
use lore_vocab::{HealthReport, Severity};
use serde::Serialize;
use serde_json::json;
use tabled::{
    builder::Builder,
    settings::{object::Rows, Alignment, Modify, Style},
};

/// Output formatter.
pub struct Formatter {
    format: OutputFormat,
    color_enabled: bool,
}

impl Formatter {
    /// Create a new formatter.
    pub fn new(format: OutputFormat, color_enabled: bool) -> Self {
        Self {
            format,
            color_enabled,
        }
    }

    /// Whether JSON output was requested.
    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    /// Format a tag optimization report.
    pub fn tagging(&self, report: &LoopReport) -> Result<String> {
        if self.is_json() {
            return to_json(report);
        }

        let mut out = report.summary();
        if !report.passes.is_empty() {
            let mut builder = Builder::default();
            builder.push_record([
                "Pass", "Selected", "Proposed", "Approved", "Skipped", "Errored", "Growth", "Avg conf",
            ]);
            for pass in &report.passes {
                builder.push_record([
                    pass.pass.to_string(),
                    pass.selected.to_string(),
                    pass.proposed.to_string(),
                    pass.approved.to_string(),
                    pass.skipped.to_string(),
                    pass.errored().to_string(),
                    pass.vocabulary_growth.to_string(),
                    pass.avg_confidence.map(|c| format!("{:.2}", c)).unwrap_or_else(|| "-".to_string()),
                ]);
            }
            out.push_str("\n\n");
            out.push_str(&self.table(builder));
        }
        Ok(out)
    }

    /// Format a curator report.
    pub fn curation(&self, report: &CuratorReport) -> Result<String> {
        if self.is_json() {
            return to_json(report);
        }
        Ok(report.summary())
    }

    /// Format a conflict engine report.
    pub fn conflicts(&self, report: &ConflictReport) -> Result<String> {
        if self.is_json() {
            return to_json(report);
        }

        let mut out = report.summary();
        if !report.outcomes.is_empty() {
            let mut builder = Builder::default();
            builder.push_record(["Conflict", "Rules", "Status", "Kept"]);
            for outcome in &report.outcomes {
                builder.push_record([
                    outcome.conflict.to_string(),
                    join_ids(&outcome.rules),
                    self.status(outcome.status.as_str()),
                    outcome.kept.map(|k| k.to_string()).unwrap_or_else(|| "-".to_string()),
                ]);
            }
            out.push_str("\n\n");
            out.push_str(&self.table(builder));
        }
        Ok(out)
    }

    /// Format stored conflict records.
    pub fn conflict_records(&self, records: &[ConflictRecord]) -> Result<String> {
        if self.is_json() {
            return to_json(&records);
        }
        if records.is_empty() {
            return Ok(self.colorize("No conflicts found.", "yellow"));
        }

        let mut builder = Builder::default();
        builder.push_record(["Conflict", "Rules", "Kind", "Strategy", "Status", "Evidence"]);
        for record in records {
            builder.push_record([
                record.id.to_string(),
                join_ids(&record.rules),
                record.kind.as_str().to_string(),
                record.strategy.name().to_string(),
                self.status(record.status.as_str()),
                record.evidence.last().cloned().unwrap_or_default(),
            ]);
        }
        Ok(self.table(builder))
    }

    /// Format a single rule.
    pub fn rule(&self, rule: &Rule) -> Result<String> {
        if self.is_json() {
            return to_json(rule);
        }

        let mut builder = Builder::default();
        builder.push_record(["Field", "Value"]);
        builder.push_record(["id".to_string(), rule.id.to_string()]);
        builder.push_record(["domain".to_string(), rule.domain.clone()]);
        builder.push_record(["state".to_string(), self.status(rule.tags_state.as_str())]);
        builder.push_record([
            "tags".to_string(),
            rule.tags.iter().cloned().collect::<Vec<_>>().join(", "),
        ]);
        builder.push_record([
            "salience".to_string(),
            format!(
                "{:.2} ({})",
                rule.salience.value,
                if rule.salience.is_manual() { "manual" } else { "computed" }
            ),
        ]);
        builder.push_record(["text".to_string(), rule.text.clone()]);
        Ok(self.table(builder))
    }

    /// Format store statistics.
    pub fn stats(&self, stats: &StoreStats, vocabulary_version: u64, tag_count: usize) -> Result<String> {
        if self.is_json() {
            return to_json(&json!({
                "rules": stats,
                "vocabulary": { "version": vocabulary_version, "tags": tag_count },
            }));
        }

        let mut builder = Builder::default();
        builder.push_record(["Metric", "Count"]);
        builder.push_record(["rules".to_string(), stats.total.to_string()]);
        for (state, count) in &stats.by_state {
            builder.push_record([format!("  {}", state), count.to_string()]);
        }
        for (domain, count) in &stats.by_domain {
            builder.push_record([format!("  domain {}", domain), count.to_string()]);
        }
        builder.push_record(["open conflicts".to_string(), stats.open_conflicts.to_string()]);
        builder.push_record(["vocabulary version".to_string(), vocabulary_version.to_string()]);
        builder.push_record(["vocabulary tags".to_string(), tag_count.to_string()]);
        Ok(self.table(builder))
    }

    /// Format a vocabulary health report.
    pub fn health(&self, report: &HealthReport) -> Result<String> {
        if self.is_json() {
            let issues: Vec<_> = report
                .issues
                .iter()
                .map(|issue| json!({ "severity": issue.severity().to_string(), "message": issue.to_string() }))
                .collect();
            return to_json(&json!({ "healthy": report.is_healthy(), "issues": issues }));
        }
        if report.is_healthy() {
            return Ok(self.success("Vocabulary is healthy"));
        }

        let mut lines = Vec::with_capacity(report.issues.len() + 1);
        for issue in &report.issues {
            let line = format!("{}: {}", issue.severity(), issue);
            lines.push(match issue.severity() {
                Severity::Error => self.colorize(&line, "red"),
                Severity::Warning => self.colorize(&line, "yellow"),
                Severity::Info => line,
            });
        }
        lines.push(format!(
            "{} error(s), {} warning(s), {} note(s)",
            report.count(Severity::Error),
            report.count(Severity::Warning),
            report.count(Severity::Info)
        ));
        Ok(lines.join("\n"))
    }

    /// Format a success message.
    pub fn success(&self, message: &str) -> String {
        self.colorize(&format!("✓ {}", message), "green")
    }

    /// Format an error message.
    pub fn error(&self, message: &str) -> String {
        self.colorize(&format!("✗ {}", message), "red")
    }

    /// Format an info message.
    pub fn info(&self, message: &str) -> String {
        self.colorize(&format!("ℹ {}", message), "blue")
    }

    /// Format a warning message.
    pub fn warning(&self, message: &str) -> String {
        self.colorize(&format!("⚠ {}", message), "yellow")
    }

    fn status(&self, status: &str) -> String {
        let color = match status {
            "approved" | "resolved" => "green",
            "needs_review" | "escalated" | "proposed" => "yellow",
            "archived" | "stale" => "magenta",
            "unresolved" => "red",
            _ => "",
        };
        self.colorize(status, color)
    }

    fn table(&self, builder: Builder) -> String {
        let mut table = builder.build();
        table
            .with(Style::rounded())
            .with(Modify::new(Rows::first()).with(Alignment::center()));
        table.to_string()
    }

    /// Colorize text if color is enabled.
    fn colorize(&self, text: &str, color: &str) -> String {
        if !self.color_enabled {
            return text.to_string();
        }

        match color {
            "red" => text.red().to_string(),
            "green" => text.green().to_string(),
            "blue" => text.blue().to_string(),
            "yellow" => text.yellow().to_string(),
            "magenta" => text.magenta().to_string(),
            _ => text.to_string(),
        }
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

fn join_ids(ids: &[lore_domain::RuleId]) -> String {
    ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(", ")
}
