//! Error types for the HttpMate chain engine.
//!
//! Configuration mistakes (duplicate chains, unknown jump targets, broken
//! module graphs) surface as [`ChainError`]. Reads of absent metadata surface
//! as [`MetaDataError`]. Failures raised by processors at request time are
//! plain [`BoxError`]s; the engine catches them per chain and never turns them
//! into a [`ChainError`].

use thiserror::Error;

use crate::chain::ChainName;

/// Type-erased error returned by processors and module hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

// =============================================================================
// MetaData Errors
// =============================================================================

/// Errors raised by [`MetaData`](crate::MetaData) reads.
#[derive(Debug, Clone, Error)]
pub enum MetaDataError {
    /// The key was never set on this metadata instance.
    #[error("missing metadatum '{key}' (present: [{}])", .present.join(", "))]
    Missing {
        /// Name of the requested key.
        key: String,
        /// Names of all keys present at the time of the read.
        present: Vec<String>,
    },

    /// A value is stored under the key name but with a different type.
    #[error("metadatum '{key}' holds a value of another type (expected '{expected}')")]
    TypeMismatch {
        /// Name of the requested key.
        key: String,
        /// Type name the key declares.
        expected: &'static str,
    },
}

// =============================================================================
// Chain Errors
// =============================================================================

/// Errors raised while building or driving the chain graph.
#[derive(Debug, Error)]
pub enum ChainError {
    /// A chain with this name was already created in the registry.
    #[error("chain '{0}' already exists")]
    DuplicateChain(ChainName),

    /// No chain is registered under this name.
    #[error("no chain registered for name '{0}'")]
    NoChainForName(ChainName),

    /// A chain name was empty.
    #[error("chain names must not be empty")]
    InvalidChainName,

    /// The module dependency graph contains a cycle.
    #[error("module dependency cycle detected among: {}", .0.join(", "))]
    DependencyCycle(Vec<String>),

    /// A module asked for a dependency that was not resolved.
    #[error("module '{requested}' is not available as a dependency")]
    MissingDependency {
        /// Type name of the requested module.
        requested: &'static str,
    },

    /// A module's `configure` or `register` hook failed.
    #[error("module '{module}' failed: {source}")]
    Module {
        /// Identifier of the failing module.
        module: String,
        /// The underlying failure.
        #[source]
        source: BoxError,
    },
}

impl ChainError {
    /// Wraps a module hook failure.
    pub fn module(module: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Module {
            module: module.into(),
            source: source.into(),
        }
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for metadata reads.
pub type MetaDataResult<T> = Result<T, MetaDataError>;

/// Result type for chain graph operations.
pub type ChainResult<T> = Result<T, ChainError>;
