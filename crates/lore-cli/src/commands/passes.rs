//! Curation pass commands: optimize, curate, conflicts and run.

use crate::cli::ConflictsArgs;
use crate::error::{CliError, Result};
use crate::output::Formatter;
use crate::project::Project;
use lore_conflict::{ConflictEngine, ConflictReport};
use lore_curator::{Curator, CuratorReport};
use lore_domain::{CancelToken, RuleStore};
use lore_tagger::{LoopReport, TagOptimizer};
use serde_json::json;
use tracing::warn;

/// Run the tag optimization loop and save any vocabulary growth.
pub async fn optimize(project: &mut Project, cancel: &CancelToken) -> Result<LoopReport> {
    let optimizer = TagOptimizer::new(project.config.tagger.clone())?
        .with_call_cost(project.config.oracle.cost_per_call);
    let oracle = project.oracle()?;
    let start = project.vocab.version();

    let result = optimizer
        .run(&mut project.store, &project.vocab, oracle, cancel)
        .await
        .map_err(CliError::from);
    keep_growth(project, start, result)
}

/// Save vocabulary grown since `start`, whether or not the pass succeeded.
///
/// Tags already written to rules must stay resolvable, so growth is kept
/// even when the pass fails midway. The pass error wins over a save error.
pub fn keep_growth<T>(project: &mut Project, start: u64, result: Result<T>) -> Result<T> {
    if project.config.tagger.dry_run {
        return result;
    }
    let saved = project.persist_vocabulary(start);
    match (result, saved) {
        (Ok(value), Ok(_)) => Ok(value),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(_)) => Err(e),
        (Err(e), Err(save_error)) => {
            warn!("Could not save vocabulary growth after a failed pass: {}", save_error);
            Err(e)
        }
    }
}

/// Run the curator phases.
pub async fn curate(project: &mut Project, cancel: &CancelToken) -> Result<CuratorReport> {
    let curator = Curator::new(project.config.curator.clone())?
        .with_call_cost(project.config.oracle.cost_per_call);
    let oracle = project.oracle()?;
    let vocab = project.vocabulary();

    Ok(curator
        .run_with_review(&mut project.store, &vocab, oracle.as_ref(), cancel)
        .await?)
}

/// Run the conflict engine.
pub async fn resolve_conflicts(project: &mut Project, cancel: &CancelToken) -> Result<ConflictReport> {
    let engine = ConflictEngine::new(project.config.conflicts.clone())?
        .with_call_cost(project.config.oracle.cost_per_call);
    let oracle = project.oracle()?;
    let vocab = project.vocabulary();

    Ok(engine
        .run(&mut project.store, &vocab, Some(oracle.as_ref()), cancel)
        .await?)
}

/// Execute the optimize command.
pub async fn execute_optimize(project: &mut Project, cancel: &CancelToken, formatter: &Formatter) -> Result<()> {
    let report = optimize(project, cancel).await?;
    println!("{}", formatter.tagging(&report)?);
    Ok(())
}

/// Execute the curate command.
pub async fn execute_curate(project: &mut Project, cancel: &CancelToken, formatter: &Formatter) -> Result<()> {
    let report = curate(project, cancel).await?;
    println!("{}", formatter.curation(&report)?);
    Ok(())
}

/// Execute the conflicts command.
pub async fn execute_conflicts(
    args: ConflictsArgs,
    project: &mut Project,
    cancel: &CancelToken,
    formatter: &Formatter,
) -> Result<()> {
    if args.list {
        let records: Vec<_> = project
            .store
            .conflicts(None)?
            .into_iter()
            .filter(|record| args.all || record.status.is_open())
            .collect();
        println!("{}", formatter.conflict_records(&records)?);
        return Ok(());
    }

    let report = resolve_conflicts(project, cancel).await?;
    println!("{}", formatter.conflicts(&report)?);
    Ok(())
}

/// Execute the run command: optimize, then curate, then resolve conflicts.
///
/// A cancelled stage stops the sequence; finished stages are still reported.
pub async fn execute_run(project: &mut Project, cancel: &CancelToken, formatter: &Formatter) -> Result<()> {
    let tagging = optimize(project, cancel).await?;
    let curation = if cancel.is_cancelled() {
        None
    } else {
        Some(curate(project, cancel).await?)
    };
    let conflicts = if cancel.is_cancelled() {
        None
    } else {
        Some(resolve_conflicts(project, cancel).await?)
    };

    if formatter.is_json() {
        let combined = json!({
            "tagging": tagging,
            "curation": curation,
            "conflicts": conflicts,
        });
        println!("{}", serde_json::to_string_pretty(&combined)?);
        return Ok(());
    }

    println!("{}", formatter.tagging(&tagging)?);
    if let Some(report) = &curation {
        println!("\n{}", formatter.curation(report)?);
    }
    if let Some(report) = &conflicts {
        println!("\n{}", formatter.conflicts(report)?);
    }
    if cancel.is_cancelled() {
        println!("{}", formatter.warning("Run cancelled; remaining stages skipped"));
    }
    Ok(())
}
