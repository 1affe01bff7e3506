//! Lore CLI library.
//!
//! Configuration loading, command execution and report rendering for the
//! `lore` binary. Every command opens the rule database and vocabulary
//! named in the configuration, runs one operation and prints its report to
//! stdout; logs go to stderr.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod output;
pub mod project;

pub use cli::{Cli, Command};
pub use config::Config;
pub use error::{CliError, Result};
pub use output::Formatter;
pub use project::Project;
