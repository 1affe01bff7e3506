//! Import command implementation.
//!
//! Stands in for the capture collaborator: reads a JSON array of rules and
//! inserts them as `needs_tags` with computed salience.

use crate::cli::ImportArgs;
use crate::error::{CliError, Result};
use crate::output::Formatter;
use crate::project::Project;
use lore_domain::{
    current_timestamp, Metadata, Provenance, Relationship, RelationshipType, Rule, RuleId,
    RuleStore, RuleType, StoreError,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::fs;

/// One captured rule in the import file.
#[derive(Debug, Deserialize)]
pub struct CapturedRule {
    /// Explicit id; allocated from `type` when absent
    #[serde(default)]
    pub id: Option<String>,

    /// Rule type, required when `id` is absent
    #[serde(default, rename = "type")]
    pub rule_type: Option<String>,

    /// Rule statement
    pub text: String,

    /// Tier-1 domain or alias
    pub domain: String,

    /// Capture session
    #[serde(default)]
    pub session: Option<String>,

    /// Capture time (seconds since the epoch)
    #[serde(default)]
    pub created_at: Option<u64>,

    /// Free-form metadata
    #[serde(default)]
    pub metadata: Map<String, Value>,

    /// Relationships to record in the relationships table
    #[serde(default)]
    pub relationships: Vec<CapturedRelationship>,
}

/// A relationship declared at capture time.
#[derive(Debug, Deserialize)]
pub struct CapturedRelationship {
    /// `conflicts_with` or `superseded_by`
    #[serde(rename = "type")]
    pub kind: String,

    /// Target rule id
    pub target: String,
}

/// Counts from one import.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// Rules inserted
    pub imported: usize,
    /// Rules whose id was already taken
    pub duplicates: usize,
    /// Relationships recorded
    pub relationships: usize,
}

/// A captured rule that passed validation
struct Prepared {
    id: Option<RuleId>,
    rule_type: RuleType,
    text: String,
    domain: String,
    provenance: Provenance,
    metadata: Map<String, Value>,
    relationships: Vec<(RelationshipType, RuleId)>,
}

/// Execute the import command.
pub fn execute_import(args: ImportArgs, project: &mut Project, formatter: &Formatter) -> Result<()> {
    let contents = fs::read_to_string(&args.file)?;
    let captured: Vec<CapturedRule> = serde_json::from_str(&contents)?;
    if captured.is_empty() {
        return Err(CliError::InvalidInput("No rules in import file".to_string()));
    }

    let summary = import_rules(project, captured, &args.session)?;

    if formatter.is_json() {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "imported": summary.imported,
                "duplicates": summary.duplicates,
                "relationships": summary.relationships,
            }))?
        );
        return Ok(());
    }
    println!("{}", formatter.success(&format!("Imported {} rule(s)", summary.imported)));
    if summary.duplicates > 0 {
        println!(
            "{}",
            formatter.warning(&format!("Skipped {} rule(s) with existing ids", summary.duplicates))
        );
    }
    if summary.relationships > 0 {
        println!("{}", formatter.info(&format!("Recorded {} relationship(s)", summary.relationships)));
    }
    Ok(())
}

/// Insert captured rules, then their relationships.
///
/// Every rule is checked before anything is written, so a malformed file
/// leaves the store untouched.
pub fn import_rules(project: &mut Project, captured: Vec<CapturedRule>, session: &str) -> Result<ImportSummary> {
    let vocab = project.vocabulary();
    let mut prepared = Vec::with_capacity(captured.len());
    let mut pending_relationships = Vec::new();

    for entry in captured {
        let explicit = entry
            .id
            .as_deref()
            .map(RuleId::parse)
            .transpose()
            .map_err(CliError::InvalidInput)?;
        let rule_type = match (&explicit, entry.rule_type.as_deref()) {
            (Some(id), _) => id.rule_type(),
            (None, Some(name)) => RuleType::parse(name)
                .ok_or_else(|| CliError::InvalidInput(format!("Unknown rule type '{}'", name)))?,
            (None, None) => {
                return Err(CliError::InvalidInput(format!(
                    "Rule \"{}\" needs an id or a type",
                    entry.text
                )))
            }
        };
        if entry.text.trim().is_empty() {
            return Err(CliError::InvalidInput("Rule text must not be empty".to_string()));
        }
        if vocab.resolve_domain(&entry.domain).is_none() {
            tracing::warn!("Domain '{}' is not in the vocabulary", entry.domain);
        }

        let mut relationships = Vec::with_capacity(entry.relationships.len());
        for rel in &entry.relationships {
            let kind = RelationshipType::parse(&rel.kind)
                .ok_or_else(|| CliError::InvalidInput(format!("Unknown relationship '{}'", rel.kind)))?;
            let target = RuleId::parse(&rel.target).map_err(CliError::InvalidInput)?;
            relationships.push((kind, target));
        }

        let provenance = Provenance::new(
            entry.session.unwrap_or_else(|| session.to_string()),
            entry.created_at.unwrap_or_else(current_timestamp),
        );
        prepared.push(Prepared {
            id: explicit,
            rule_type,
            text: entry.text,
            domain: entry.domain,
            provenance,
            metadata: entry.metadata,
            relationships,
        });
    }

    let mut summary = ImportSummary::default();
    for entry in prepared {
        let id = match entry.id {
            Some(id) => id,
            None => project.store.next_id(entry.rule_type)?,
        };
        let mut rule = Rule::new(id, entry.text, entry.domain, entry.provenance);
        rule.metadata = Metadata::from_map(entry.metadata);

        match project.store.insert(rule) {
            Ok(()) => {
                tracing::debug!("Imported {}", id);
                summary.imported += 1;
            }
            Err(StoreError::Duplicate(_)) => {
                tracing::warn!("{} already exists, skipping", id);
                summary.duplicates += 1;
                continue;
            }
            Err(e) => return Err(e.into()),
        }
        pending_relationships.extend(entry.relationships.into_iter().map(|(kind, target)| (id, kind, target)));
    }

    let now = current_timestamp();
    for (from, kind, to) in pending_relationships {
        project.store.add_relationship(Relationship::new(from, to, kind, now))?;
        summary.relationships += 1;
    }

    tracing::info!(
        "Import finished: {} imported, {} duplicates, {} relationships",
        summary.imported,
        summary.duplicates,
        summary.relationships
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_captured_rule_parsing() {
        let json = r#"
        {
            "type": "decision",
            "text": "Use cursor pagination for list endpoints",
            "domain": "api",
            "relationships": [{"type": "superseded_by", "target": "decision-9"}]
        }
        "#;

        let rule: CapturedRule = serde_json::from_str(json).unwrap();
        assert_eq!(rule.rule_type.as_deref(), Some("decision"));
        assert!(rule.id.is_none());
        assert!(rule.metadata.is_empty());
        assert_eq!(rule.relationships[0].kind, "superseded_by");
    }
}
