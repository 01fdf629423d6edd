//! CLI error types and their conversion to diagnostics.

use thiserror::Error;

use satchel_config::ConfigError;

/// Top-level CLI error type.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration could not be loaded or failed validation.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A build pass or the bundler session failed.
    #[error(transparent)]
    Bundler(#[from] satchel_bundler::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Server error: {0}")]
    Server(String),
}

pub type Result<T> = std::result::Result<T, CliError>;

/// Convert a CLI error into a report for printing.
///
/// Bundler errors keep their own diagnostic, including the code frame of
/// the failing source.
pub fn cli_error_to_miette(err: CliError) -> miette::Report {
    match err {
        CliError::Bundler(err) => miette::Report::new(err),
        CliError::Config(err) => match err.hint().map(str::to_string) {
            Some(hint) => miette::miette!(help = hint, "Configuration error: {}", err),
            None => miette::miette!("Configuration error: {}", err),
        },
        other => miette::miette!("{}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_carry_their_hint() {
        let report = cli_error_to_miette(CliError::Config(ConfigError::NoEntries));
        assert_eq!(report.to_string(), "Configuration error: no entries specified");
        assert!(report.help().unwrap().to_string().contains("bundle.entries"));
    }

    #[test]
    fn bundler_errors_keep_their_code() {
        let err = satchel_bundler::Error::Resolution {
            specifier: "./missing".into(),
            from: "/app/index.js".into(),
            code_frame: None,
        };
        let report = cli_error_to_miette(err.into());
        assert_eq!(report.code().unwrap().to_string(), "RESOLUTION_ERROR");
    }
}
