use clap::Parser;
use miette::Result;
use satchel_cli::{cli, error};

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    satchel_cli::run(args)
        .await
        .map_err(error::cli_error_to_miette)
}
