//! Manual review commands: salience, proposal, resolve and retag.

use crate::cli::{ProposalArgs, ProposalDecision, ResolveArgs, RetagArgs, SalienceAction, SalienceArgs};
use crate::error::{CliError, Result};
use crate::output::Formatter;
use crate::project::Project;
use lore_domain::{set_salience, ConflictId, RuleId};
use lore_tagger::TagOptimizer;

fn parse_rule_id(id: &str) -> Result<RuleId> {
    RuleId::parse(id).map_err(CliError::InvalidInput)
}

/// Execute the salience command.
pub fn execute_salience(args: SalienceArgs, project: &mut Project, formatter: &Formatter) -> Result<()> {
    match args.action {
        SalienceAction::Set { id, value } => {
            let id = parse_rule_id(&id)?;
            let rule = set_salience(&mut project.store, &id, value)?;
            if !formatter.is_json() {
                println!("{}", formatter.success(&format!("Salience of {} pinned at {:.2}", id, value)));
            }
            println!("{}", formatter.rule(&rule)?);
        }
    }
    Ok(())
}

/// Execute the proposal command.
pub fn execute_proposal(args: ProposalArgs, project: &mut Project, formatter: &Formatter) -> Result<()> {
    let id = parse_rule_id(&args.id)?;
    let accept = args.decision == ProposalDecision::Accept;
    let optimizer = TagOptimizer::new(project.config.tagger.clone())?;
    let start = project.vocab.version();

    let rule = optimizer.decide_proposal(&mut project.store, &project.vocab, &id, accept)?;
    project.persist_vocabulary(start)?;

    if !formatter.is_json() {
        let verdict = if accept { "approved" } else { "sent to review" };
        println!("{}", formatter.success(&format!("Proposal for {} {}", id, verdict)));
    }
    println!("{}", formatter.rule(&rule)?);
    Ok(())
}

/// Execute the resolve command.
pub fn execute_resolve(args: ResolveArgs, project: &mut Project, formatter: &Formatter) -> Result<()> {
    let conflict = ConflictId::from_string(&args.conflict).map_err(CliError::InvalidInput)?;
    let keep = parse_rule_id(&args.keep)?;

    let record = lore_conflict::resolve_manually(&mut project.store, &conflict, &keep)?;

    if formatter.is_json() {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }
    let archived: Vec<String> = record.archived.iter().map(|id| id.to_string()).collect();
    println!(
        "{}",
        formatter.success(&format!(
            "Conflict {} resolved: kept {}, archived {}",
            conflict,
            keep,
            archived.join(", ")
        ))
    );
    Ok(())
}

/// Execute the retag command.
pub fn execute_retag(args: RetagArgs, project: &mut Project, formatter: &Formatter) -> Result<()> {
    let id = parse_rule_id(&args.id)?;
    let rule = lore_conflict::request_retag(&mut project.store, &id)?;
    if !formatter.is_json() {
        println!("{}", formatter.success(&format!("{} queued for tagging", id)));
    }
    println!("{}", formatter.rule(&rule)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rule_id() {
        assert_eq!(parse_rule_id("pattern-7").unwrap().to_string(), "pattern-7");
        let err = parse_rule_id("not-an-id").unwrap_err();
        assert!(err.to_string().contains("not-an-id"));
    }
}
