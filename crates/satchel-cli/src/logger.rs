//! Logging setup for the CLI.
//!
//! Log lines go to stderr so stdout only carries build reports.

use satchel_bundler::logging::LogLevel;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::{CliError, Result};

const CRATES: &[&str] = &["satchel_bundler", "satchel_config", "satchel_cli"];

/// Logger options gathered from flags and the config's settings.
#[derive(Debug, Clone, Default)]
pub struct LoggerOptions {
    pub verbose: bool,
    pub quiet: bool,
    pub no_color: bool,
    /// Level from `settings.log_level`, used when no flag or `RUST_LOG` is set.
    pub level: Option<String>,
}

/// Build the filter for `options`.
///
/// The level is determined in this order:
/// 1. `--verbose`: debug for satchel crates
/// 2. `--quiet`: errors only
/// 3. `RUST_LOG`
/// 4. `settings.log_level`, then info
pub fn filter_for(options: &LoggerOptions) -> Result<EnvFilter> {
    if options.verbose {
        return Ok(EnvFilter::new(directives(LogLevel::Debug)));
    }
    if options.quiet {
        return Ok(EnvFilter::new(directives(LogLevel::Error)));
    }
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let level = match &options.level {
        Some(level) => level.parse::<LogLevel>().map_err(CliError::InvalidArgument)?,
        None => LogLevel::Info,
    };
    Ok(EnvFilter::new(directives(level)))
}

/// Initialize the global subscriber. Only the first call has any effect.
pub fn init_logger(options: &LoggerOptions) -> Result<()> {
    let filter = filter_for(options)?;
    let ansi = !options.no_color && std::env::var_os("NO_COLOR").is_none();

    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_level(true)
        .with_ansi(ansi)
        .without_time()
        .with_writer(std::io::stderr)
        .compact();

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
    Ok(())
}

fn directives(level: LogLevel) -> String {
    CRATES
        .iter()
        .map(|krate| format!("{krate}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}
