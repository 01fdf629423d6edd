//! Command implementations.
//!
//! Each command takes the loaded [`Project`](crate::config::Project) and runs
//! until its work is done or, for the watching commands, until Ctrl+C.

pub mod build;
pub mod serve;
pub mod watch;

use std::net::SocketAddr;

use crate::error::{CliError, Result};

pub use build::execute as build_execute;
pub use serve::execute as serve_execute;
pub use watch::execute as watch_execute;

/// Resolve `host:port` to the first matching socket address.
pub(crate) async fn resolve_addr(host: &str, port: u16) -> Result<SocketAddr> {
    tokio::net::lookup_host((host, port))
        .await?
        .next()
        .ok_or_else(|| CliError::InvalidArgument(format!("cannot resolve host '{}'", host)))
}

/// Resolves once Ctrl+C is pressed.
pub(crate) async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Stopping");
}
