#![cfg_attr(docsrs, feature(doc_cfg))]

//! # satchel-bundler
//!
//! Incremental module bundler core: resolution, the asset lifecycle, the
//! persistent asset cache, the worker pool, graph building, the bundle tree,
//! packagers and the live-update (HMR) server.
//!
//! ## Quick Start
//!
//! ```no_run
//! use satchel_bundler::{Bundler, BundlerOptions};
//!
//! # #[tokio::main]
//! # async fn main() -> satchel_bundler::Result<()> {
//! let options = BundlerOptions::new(["src/index.html"])
//!     .root_dir(".")
//!     .out_dir("dist")
//!     .public_url("/");
//!
//! let mut bundler = Bundler::new(options)?;
//! let report = bundler.bundle().await?;
//! for bundle in &report.bundles {
//!     println!("{} ({} bytes)", bundle.name, bundle.size);
//! }
//! # Ok(()) }
//! ```
//!
//! ## Architecture
//!
//! - **Coordinator**: [`Bundler`] owns the session state (resolver memo table,
//!   cache, asset graph, module ids, previous bundle hashes). Graph mutation
//!   only happens on the coordinating task.
//! - **Workers**: [`worker::WorkerPool`] runs the per-file [`asset::Asset`]
//!   lifecycle on dedicated threads and returns a serializable
//!   [`asset::ProcessedAsset`].
//! - **Output**: [`bundle::BundleTree`] groups assets into bundles, which the
//!   [`packager`] module serializes, skipping bundles whose hash is unchanged.

pub mod asset;
pub mod bundle;
pub mod bundler;
pub mod cache;
pub mod diagnostics;
pub mod graph;
pub mod hmr;
pub mod naming;
pub mod options;
pub mod packager;
pub mod resolver;
pub mod runtime;
pub mod watcher;
pub mod worker;

mod builtins;

// Logging utilities (optional, enabled with "logging" feature)
#[cfg(feature = "logging")]
#[cfg_attr(docsrs, doc(cfg(feature = "logging")))]
pub mod logging;

#[cfg(feature = "logging")]
#[cfg_attr(docsrs, doc(cfg(feature = "logging")))]
pub use logging::{LogLevel, init_logging, init_logging_from_env};

pub use asset::{
    Asset, AssetContext, AssetError, AssetRegistry, AssetType, Dependency, DependencyMeta,
    Generated, ProcessedAsset, SourceTransform,
};
pub use bundle::{Bundle, BundleId, BundleTree};
pub use bundler::{BuildReport, BundleReport, Bundler, BundlerBuilder};
pub use cache::{CacheError, FsCache};
pub use graph::{AssetGraph, ModuleId, ModuleIds, NodeIdx};
pub use hmr::{HmrAsset, HmrMessage, HmrServer};
pub use options::BundlerOptions;
pub use packager::{Packager, PackagerRegistry};
pub use resolver::{PackageDescriptor, Resolution, Resolver};
pub use runtime::{MemoryRuntime, NativeRuntime, Runtime, RuntimeError};
pub use worker::{WorkerPool, WorkerRequest};

use std::path::PathBuf;

/// Error types for satchel-bundler operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A dependency specifier could not be resolved against any candidate path.
    #[error("Cannot resolve '{specifier}' from {}", from.display())]
    Resolution {
        specifier: String,
        from: PathBuf,
        code_frame: Option<String>,
    },

    /// A lifecycle step failed while processing an asset.
    #[error("{0}")]
    AssetProcessing(Box<AssetError>),

    /// Writing or serializing a bundle failed.
    #[error("Failed to package {bundle}: {message}")]
    Packaging { bundle: String, message: String },

    /// Asset cache failure. Degrades to a cache miss and is never returned from a build.
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A worker thread went away before replying.
    #[error("Worker pool error: {0}")]
    Worker(String),

    /// File watching error.
    #[error("File watcher error: {0}")]
    Watch(#[from] notify::Error),

    /// Live-update server error.
    #[error("HMR server error: {0}")]
    Server(String),
}

/// Result type alias for satchel-bundler operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<AssetError> for Error {
    fn from(err: AssetError) -> Self {
        Error::AssetProcessing(Box::new(err))
    }
}

impl Error {
    /// The formatted source excerpt attached to this error, if any.
    pub fn code_frame(&self) -> Option<&str> {
        match self {
            Error::Resolution { code_frame, .. } => code_frame.as_deref(),
            Error::AssetProcessing(err) => err.code_frame.as_deref(),
            _ => None,
        }
    }

    /// The file this error originated from, if known.
    pub fn file_name(&self) -> Option<&std::path::Path> {
        match self {
            Error::Resolution { from, .. } => Some(from),
            Error::AssetProcessing(err) => Some(&err.path),
            _ => None,
        }
    }
}

impl miette::Diagnostic for Error {
    fn code(&self) -> Option<Box<dyn std::fmt::Display + '_>> {
        Some(Box::new(match self {
            Error::Resolution { .. } => "RESOLUTION_ERROR",
            Error::AssetProcessing(_) => "ASSET_PROCESSING_ERROR",
            Error::Packaging { .. } => "PACKAGING_ERROR",
            Error::Cache(_) => "CACHE_IO_ERROR",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::Io(_) => "IO_ERROR",
            Error::Worker(_) => "WORKER_ERROR",
            Error::Watch(_) => "WATCH_ERROR",
            Error::Server(_) => "SERVER_ERROR",
        }))
    }

    fn severity(&self) -> Option<miette::Severity> {
        match self {
            Error::Cache(_) => Some(miette::Severity::Warning),
            _ => Some(miette::Severity::Error),
        }
    }

    fn help(&self) -> Option<Box<dyn std::fmt::Display + '_>> {
        match self {
            Error::Resolution {
                specifier,
                code_frame,
                ..
            } => {
                let mut help = format!(
                    "Check that '{}' exists, or that the package is installed in node_modules.",
                    specifier
                );
                if let Some(frame) = code_frame {
                    help.push('\n');
                    help.push_str(frame);
                }
                Some(Box::new(help))
            }
            Error::AssetProcessing(err) => err
                .code_frame
                .as_ref()
                .map(|frame| Box::new(frame.clone()) as Box<dyn std::fmt::Display>),
            Error::Packaging { .. } => Some(Box::new(
                "Failed to write bundle output. Check disk space and permissions of the output directory.",
            )),
            Error::InvalidConfig(msg) => Some(Box::new(format!(
                "Check your configuration file for invalid values.\nError: {}",
                msg
            ))),
            _ => None,
        }
    }
}
