//! Lore CLI - curate a store of atomic engineering rules.

use clap::Parser;
use lore_cli::commands;
use lore_cli::{Cli, Command, Config, Formatter, Project};
use lore_domain::CancelToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Log to stderr; `RUST_LOG` wins over the verbosity flags.
fn init_tracing(cli: &Cli) {
    let default_level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> lore_cli::Result<()> {
    // init may be pointed at a configuration file it is about to create
    let mut config = match (&cli.command, cli.config.as_deref()) {
        (Command::Init(_), Some(path)) if !path.exists() => Config::default(),
        (_, explicit) => Config::load(explicit)?,
    };
    config.apply_overrides(cli.db.clone(), cli.dry_run);

    let format = cli.format.map(Into::into).unwrap_or(config.output.format);
    let color_enabled = !cli.no_color && config.output.color;
    let formatter = Formatter::new(format, color_enabled);

    // Only init runs without an existing project
    match cli.command {
        Command::Init(args) => commands::execute_init(args, cli.config.as_deref(), &config, &formatter),
        Command::Import(args) => {
            let mut project = Project::open(config)?;
            commands::execute_import(args, &mut project, &formatter)
        }
        Command::Optimize => {
            let mut project = Project::open(config)?;
            commands::execute_optimize(&mut project, &interrupt_token(), &formatter).await
        }
        Command::Curate => {
            let mut project = Project::open(config)?;
            commands::execute_curate(&mut project, &interrupt_token(), &formatter).await
        }
        Command::Conflicts(args) => {
            let mut project = Project::open(config)?;
            commands::execute_conflicts(args, &mut project, &interrupt_token(), &formatter).await
        }
        Command::Run => {
            let mut project = Project::open(config)?;
            commands::execute_run(&mut project, &interrupt_token(), &formatter).await
        }
        Command::Salience(args) => {
            let mut project = Project::open(config)?;
            commands::execute_salience(args, &mut project, &formatter)
        }
        Command::Proposal(args) => {
            let mut project = Project::open(config)?;
            commands::execute_proposal(args, &mut project, &formatter)
        }
        Command::Resolve(args) => {
            let mut project = Project::open(config)?;
            commands::execute_resolve(args, &mut project, &formatter)
        }
        Command::Retag(args) => {
            let mut project = Project::open(config)?;
            commands::execute_retag(args, &mut project, &formatter)
        }
        Command::Vocab(args) => commands::execute_vocab(args, &Project::open(config)?, &formatter),
        Command::Stats => commands::execute_stats(&Project::open(config)?, &formatter),
    }
}

/// Cancellation token tripped by Ctrl-C
fn interrupt_token() -> CancelToken {
    let cancel = CancelToken::new();
    let watcher = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping at the next rule boundary");
            watcher.cancel();
        }
    });
    cancel
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_init_then_project_commands() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lore.toml");
        let mut config = Config::default();
        config.store.path = dir.path().join("lore.db");
        config.vocabulary.path = dir.path().join("vocabulary.toml");
        config.save(&path).unwrap();

        let cli = |command: &[&str]| {
            let mut argv = vec!["lore", "--no-color", "--config", path.to_str().unwrap()];
            argv.extend_from_slice(command);
            Cli::parse_from(argv)
        };

        run(cli(&["init"])).await.unwrap();
        assert!(dir.path().join("vocabulary.toml").exists());
        run(cli(&["stats"])).await.unwrap();
        run(cli(&["vocab", "check"])).await.unwrap();
    }
}
