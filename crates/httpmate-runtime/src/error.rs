//! Runtime error types.

use std::io;
use std::path::PathBuf;

use httpmate_core::ChainError;
use httpmate_path::PathTemplateError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur while assembling or driving an [`HttpMate`](crate::HttpMate).
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Building or running the chain graph failed.
    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    /// The configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A route template did not compile.
    #[error("Invalid route: {0}")]
    Route(#[from] PathTemplateError),

    /// The chain graph could not be written.
    #[error("Failed to write topology to '{path}': {source}")]
    TopologyExport {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
