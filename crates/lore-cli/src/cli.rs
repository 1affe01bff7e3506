//! CLI command definitions and argument parsing.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Lore - curate a store of atomic engineering rules.
#[derive(Debug, Parser)]
#[command(name = "lore")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "LORE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Rule database path (overrides [store] path)
    #[arg(long, global = true, env = "LORE_DB")]
    pub db: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, global = true)]
    pub format: Option<CliFormat>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Report what would change without writing
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Log per-rule decisions
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Output format options.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum CliFormat {
    /// Table format (default)
    Table,
    /// JSON format
    Json,
}

/// CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create a configuration file, a starter vocabulary and the database
    Init(InitArgs),

    /// Import captured rules from a JSON file
    Import(ImportArgs),

    /// Run the tag optimization loop
    Optimize,

    /// Run the duplicate and domain curator
    Curate,

    /// Detect and resolve conflicting rules
    Conflicts(ConflictsArgs),

    /// Optimize, curate and resolve conflicts in one go
    Run,

    /// Pin rule salience by hand
    Salience(SalienceArgs),

    /// Accept or reject a parked tag proposal
    Proposal(ProposalArgs),

    /// Resolve a conflict by keeping one rule
    Resolve(ResolveArgs),

    /// Send a rule under review back for tagging
    Retag(RetagArgs),

    /// Inspect the vocabulary
    Vocab(VocabArgs),

    /// Show rule and conflict counts
    Stats,
}

/// Arguments for the init command.
#[derive(Debug, Parser)]
pub struct InitArgs {
    /// Overwrite an existing configuration file
    #[arg(long)]
    pub force: bool,
}

/// Arguments for the import command.
#[derive(Debug, Parser)]
pub struct ImportArgs {
    /// JSON file holding an array of captured rules
    pub file: PathBuf,

    /// Session name recorded in provenance when a rule carries none
    #[arg(short, long, default_value = "import")]
    pub session: String,
}

/// Arguments for the conflicts command.
#[derive(Debug, Parser)]
pub struct ConflictsArgs {
    /// List conflict records instead of running detection
    #[arg(short, long)]
    pub list: bool,

    /// With --list, include resolved records
    #[arg(short, long, requires = "list")]
    pub all: bool,
}

/// Arguments for salience management.
#[derive(Debug, Parser)]
pub struct SalienceArgs {
    #[command(subcommand)]
    pub action: SalienceAction,
}

/// Salience actions.
#[derive(Debug, Subcommand)]
pub enum SalienceAction {
    /// Set a manual salience in [0, 1]
    Set {
        /// Rule id (e.g. decision-12)
        id: String,
        /// Salience value
        value: f64,
    },
}

/// Arguments for the proposal command.
#[derive(Debug, Parser)]
pub struct ProposalArgs {
    /// Rule id of the parked proposal
    pub id: String,

    /// What to do with it
    #[arg(value_enum)]
    pub decision: ProposalDecision,
}

/// Decision on a parked proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ProposalDecision {
    /// Approve the proposed tags
    Accept,
    /// Send the rule to review
    Reject,
}

/// Arguments for the resolve command.
#[derive(Debug, Parser)]
pub struct ResolveArgs {
    /// Conflict id
    pub conflict: String,

    /// Rule to keep; the others are archived
    #[arg(short, long)]
    pub keep: String,
}

/// Arguments for the retag command.
#[derive(Debug, Parser)]
pub struct RetagArgs {
    /// Rule id
    pub id: String,
}

/// Arguments for vocabulary inspection.
#[derive(Debug, Parser)]
pub struct VocabArgs {
    #[command(subcommand)]
    pub action: VocabAction,
}

/// Vocabulary actions.
#[derive(Debug, Subcommand)]
pub enum VocabAction {
    /// Run the vocabulary health check
    Check {
        /// Exit with an error when warnings are found too
        #[arg(long)]
        strict: bool,
    },
}

impl From<CliFormat> for crate::config::OutputFormat {
    fn from(format: CliFormat) -> Self {
        match format {
            CliFormat::Table => crate::config::OutputFormat::Table,
            CliFormat::Json => crate::config::OutputFormat::Json,
        }
    }
}
