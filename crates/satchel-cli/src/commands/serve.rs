//! `satchel serve`: watch plus a static file server for the output.

use axum::Router;
use tower_http::services::ServeDir;

use satchel_bundler::{Bundler, HmrServer};

use crate::commands::{resolve_addr, shutdown_signal};
use crate::config::Project;
use crate::error::{CliError, Result};
use crate::ui;

pub async fn execute(project: Project) -> Result<()> {
    let dev = project.config.dev();
    let options = project.bundler_options();

    let server = HmrServer::new(options.hmr_path.clone());
    let mut bundler = Bundler::builder(options).hmr_server(server.clone()).build()?;
    let out_dir = bundler.options().out_dir.clone();

    let app = router(&server, &out_dir);
    let addr = resolve_addr(&dev.host, dev.port).await?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| CliError::Server(format!("Failed to bind to {}: {}", addr, e)))?;
    let local = listener.local_addr()?;

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Server error: {}", e);
        }
    });
    tracing::info!("Server running at http://{}", local);

    tokio::select! {
        result = bundler.watch_with(ui::print_pass) => result?,
        _ = shutdown_signal() => {}
    }
    Ok(())
}

/// The update stream on its path, everything else from `out_dir`.
pub fn router(server: &HmrServer, out_dir: &std::path::Path) -> Router {
    server
        .router()
        .fallback_service(ServeDir::new(out_dir).append_index_html_on_directories(true))
}
