//! Satchel CLI - build, watch and serve web assets.
//!
//! - [`cli`] - argument definitions
//! - [`config`] - layered configuration loading
//! - [`commands`] - the `build`, `watch` and `serve` commands
//! - [`logger`] - tracing subscriber setup
//! - [`ui`] - build report output

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod logger;
pub mod ui;

pub use error::{CliError, Result};

use crate::cli::{Cli, Command};
use crate::config::Project;
use crate::logger::LoggerOptions;

/// Load configuration, set up logging and run the selected command.
pub async fn run(cli: Cli) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let project = Project::load(&cli, &cwd)?;

    logger::init_logger(&LoggerOptions {
        verbose: cli.verbose,
        quiet: cli.quiet,
        no_color: cli.no_color || project.config.settings.no_color,
        level: project.config.settings.log_level.clone(),
    })?;

    match cli.command {
        Command::Build(_) => commands::build_execute(project).await,
        Command::Watch(_) => commands::watch_execute(project).await,
        Command::Serve(_) => commands::serve_execute(project).await,
    }
}
