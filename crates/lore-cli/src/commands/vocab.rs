//! Vocabulary command implementation.

use crate::cli::{VocabAction, VocabArgs};
use crate::error::{CliError, Result};
use crate::output::Formatter;
use crate::project::Project;
use lore_domain::{RuleQuery, RuleStore};
use lore_vocab::{check_health, Severity};
use std::collections::BTreeMap;

/// Execute the vocab command.
pub fn execute_vocab(args: VocabArgs, project: &Project, formatter: &Formatter) -> Result<()> {
    match args.action {
        VocabAction::Check { strict } => {
            let usage = tag_usage(project)?;
            let report = check_health(&project.vocabulary(), Some(&usage));
            println!("{}", formatter.health(&report)?);

            let failing = if strict {
                report.count(Severity::Error) + report.count(Severity::Warning)
            } else {
                report.count(Severity::Error)
            };
            if failing > 0 {
                return Err(CliError::Unhealthy(failing));
            }
        }
    }
    Ok(())
}

/// Number of live rules carrying each tag.
pub fn tag_usage(project: &Project) -> Result<BTreeMap<String, usize>> {
    let snapshot = project.store.query(&RuleQuery::live())?;
    let mut usage = BTreeMap::new();
    for rule in snapshot.iter(&project.store) {
        for tag in rule?.tags {
            *usage.entry(tag).or_insert(0) += 1;
        }
    }
    Ok(usage)
}
