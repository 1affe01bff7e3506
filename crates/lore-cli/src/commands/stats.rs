//! Stats command implementation.

use crate::error::Result;
use crate::output::Formatter;
use crate::project::Project;
use lore_domain::RuleStore;

/// Execute the stats command.
pub fn execute_stats(project: &Project, formatter: &Formatter) -> Result<()> {
    let stats = project.store.stats()?;
    let vocab = project.vocabulary();
    println!("{}", formatter.stats(&stats, vocab.version, vocab.tag_count())?);
    Ok(())
}
