//! Settings that do not affect the build output.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalSettings {
    /// Default log level (`silent`, `error`, `warn`, `info`, `debug`, `trace`).
    /// `--verbose`, `--quiet` and `RUST_LOG` take precedence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Disable colored output.
    #[serde(default)]
    pub no_color: bool,
}
