//! Command-line interface definition.
//!
//! - `satchel build` - one production pass
//! - `satchel watch` - build, rebuild on change and stream live updates
//! - `satchel serve` - `watch` plus a static file server for the output

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Satchel - an incremental asset bundler with live updates
#[derive(Parser, Debug)]
#[command(
    name = "satchel",
    version,
    about = "An incremental asset bundler with live updates",
    long_about = "Satchel bundles scripts, stylesheets, markup and static files starting\n\
                  from one or more entry files. Processed assets are cached between runs,\n\
                  and watch mode pushes changed modules to connected browsers."
)]
pub struct Cli {
    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Config file to use instead of satchel.toml or package.json
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Config profile to apply
    #[arg(short, long, global = true, value_name = "NAME")]
    pub profile: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Bundle for production
    ///
    /// Minifies output and inlines process.env.NODE_ENV as "production".
    Build(BuildArgs),

    /// Build, then rebuild whenever a source file changes
    ///
    /// Script bundles include the live-update runtime, which connects to an
    /// event stream served on its own port.
    Watch(WatchArgs),

    /// Watch and serve the output directory over HTTP
    ///
    /// The live-update stream is served on the same port as the files.
    Serve(ServeArgs),
}

/// Options shared by every command.
#[derive(Args, Debug, Clone, Default)]
pub struct BundleArgs {
    /// Entry files. Falls back to bundle.entries from the config.
    #[arg(value_name = "ENTRY")]
    pub entries: Vec<PathBuf>,

    /// Output directory
    #[arg(short = 'd', long, value_name = "DIR")]
    pub out_dir: Option<PathBuf>,

    /// URL prefix the output directory is served under
    #[arg(long, value_name = "URL")]
    pub public_url: Option<String>,

    /// Do not read or write the asset cache
    #[arg(long)]
    pub no_cache: bool,

    /// Directory of the asset cache
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Number of worker threads
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct BuildArgs {
    #[command(flatten)]
    pub bundle: BundleArgs,

    /// Keep output readable
    #[arg(long)]
    pub no_minify: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct WatchArgs {
    #[command(flatten)]
    pub bundle: BundleArgs,

    /// Port of the live-update stream. A free port is picked when unset.
    #[arg(long, value_name = "PORT")]
    pub hmr_port: Option<u16>,

    /// Host the browser connects to for live updates
    #[arg(long, value_name = "HOST")]
    pub hmr_hostname: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ServeArgs {
    #[command(flatten)]
    pub bundle: BundleArgs,

    /// Port to listen on
    #[arg(long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Address to listen on
    #[arg(long, value_name = "HOST")]
    pub host: Option<String>,
}

impl Command {
    pub fn bundle_args(&self) -> &BundleArgs {
        match self {
            Command::Build(args) => &args.bundle,
            Command::Watch(args) => &args.bundle,
            Command::Serve(args) => &args.bundle,
        }
    }
}
