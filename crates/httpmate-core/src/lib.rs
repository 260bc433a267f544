//! # HttpMate Core
//!
//! The chain engine underneath HttpMate.
//!
//! A request is represented by a [`MetaData`] store and flows through a
//! directed graph of named [`Chain`]s held by a [`ChainRegistry`]. Each chain
//! runs its processors, then picks the next step from its rules:
//! jump to another chain, consume (complete the request) or drop it.
//!
//! This layer provides:
//! - The typed per-request store ([`MetaData`], [`MetaDataKey`])
//! - Chains, rules and actions ([`Chain`], [`Rule`], [`Action`])
//! - The registry and its run loop ([`ChainRegistry::put_into_chain`])
//! - Asynchronous completion of a run from another thread ([`Completion`])
//! - Build-time wiring of independent modules ([`ChainModule`],
//!   [`ChainRegistryBuilder`], [`ChainExtender`], [`DependencyRegistry`])
//! - A diagnostic graph export ([`PipelineGraph`])
//!
//! Everything here is transport-agnostic; HTTP-specific keys and chains live
//! in `httpmate-runtime`.

pub mod builder;
pub mod chain;
pub mod completion;
pub mod error;
pub mod extender;
pub mod metadata;
pub mod module;
pub mod registry;
pub mod topology;

pub use builder::ChainRegistryBuilder;
pub use chain::{
    Action, BoxedProcessor, Chain, ChainException, ChainName, EXCEPTION, ModuleIdentifier,
    NamedProcessor, PredicateFn, Processor, Rule, named,
};
pub use completion::{COMPLETION, Completion, CompletionCallback};
pub use error::{BoxError, ChainError, ChainResult, MetaDataError, MetaDataResult};
pub use extender::ChainExtender;
pub use metadata::{MetaData, MetaDataKey};
pub use module::{ChainModule, Configurator, DependencyRegistry, ModuleDescriptor};
pub use registry::{ChainRegistry, ClosingAction, ProcessingContext};
pub use topology::{EdgeKind, GraphEdge, GraphNode, NodeKind, PipelineGraph};
