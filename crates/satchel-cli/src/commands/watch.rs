//! `satchel watch`: rebuild on change and stream updates to browsers.
//!
//! The event stream listens on its own port. Script bundles are built with
//! that port baked into the runtime, so the page itself can be served by
//! anything.

use satchel_bundler::{Bundler, HmrServer};

use crate::commands::{resolve_addr, shutdown_signal};
use crate::config::Project;
use crate::error::Result;
use crate::ui;

pub async fn execute(project: Project) -> Result<()> {
    let dev = project.config.dev();
    let mut options = project.bundler_options();

    let server = HmrServer::new(options.hmr_path.clone());
    let addr = resolve_addr(&dev.host, dev.hmr_port.unwrap_or(0)).await?;
    let bound = server.listen(addr).await?;
    options.hmr_port = Some(bound.port());
    if options.hmr_hostname.is_none() && bound.is_ipv4() && !bound.ip().is_unspecified() {
        options.hmr_hostname = Some(bound.ip().to_string());
    }

    let mut bundler = Bundler::builder(options).hmr_server(server).build()?;
    tracing::info!("Watching for changes. Press Ctrl+C to stop");

    tokio::select! {
        result = bundler.watch_with(ui::print_pass) => result?,
        _ = shutdown_signal() => {}
    }
    Ok(())
}
