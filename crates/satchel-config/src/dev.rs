//! Development server and live-update configuration.

use serde::{Deserialize, Serialize};

use satchel_bundler::options::DEFAULT_HMR_PATH;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DevConfig {
    #[serde(default = "default_host")]
    pub host: String,

    /// Port of the static file server started by `satchel serve`.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Host the browser runtime connects to for updates. Defaults to the page's host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hmr_hostname: Option<String>,

    /// Port of the update stream. `satchel watch` picks a free one when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hmr_port: Option<u16>,

    #[serde(default = "default_hmr_path")]
    pub hmr_path: String,
}

impl Default for DevConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            hmr_hostname: None,
            hmr_port: None,
            hmr_path: default_hmr_path(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    1234
}

fn default_hmr_path() -> String {
    DEFAULT_HMR_PATH.into()
}
