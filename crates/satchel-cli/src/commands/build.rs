//! `satchel build`: one production pass.

use satchel_bundler::Bundler;

use crate::config::Project;
use crate::error::Result;
use crate::ui;

pub async fn execute(project: Project) -> Result<()> {
    let mut bundler = Bundler::new(project.bundler_options())?;
    let report = bundler.bundle().await?;
    ui::print_report(&report);
    Ok(())
}
