//! # HttpMate
//!
//! A request pipeline built from named chains of processors, with a path
//! template engine for routing.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐     ┌──────────────────────────── ChainRegistry ───────────────────────────┐
//! │ transport │────▶│ INIT ─▶ PRE_PROCESS ─▶ DETERMINE_HANDLER ─▶ INVOKE_HANDLER ─▶ ...     │──▶ consume / drop
//! └───────────┘     └───────────────────────────────────────────────────────────────────────┘
//!                         ▲ chains, processors and rules contributed by modules
//! ```
//!
//! - **MetaData**: typed key/value store carried by each request
//! - **Chains**: ordered processors plus rules deciding where a request goes next
//! - **Modules**: declare dependencies, get configured, then extend chains
//! - **Path templates**: `/users/<id>`, `/files/|[a-z]+\.txt|`, `/static/*`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use httpmate::prelude::*;
//!
//! fn greet(meta: &mut MetaData) -> Result<(), BoxError> {
//!     let name = meta.get(&PATH_PARAMETERS)?["name"].clone();
//!     meta.set(&STRING_RESPONSE, format!("hello {name}"));
//!     Ok(())
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let httpmate = HttpMate::builder().get("/hello/<name>", greet).build()?;
//!
//!     if let Outcome::Consumed(meta) = httpmate.handle(HttpMate::request("GET", "/hello/world"))? {
//!         info!(status = meta.get(&RESPONSE_STATUS)?, "Handled");
//!     }
//!     httpmate.close();
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: Load `httpmate.toml` (default)
//! - `yaml-config`: Load `httpmate.yaml`
//! - `json-log`: JSON log output

pub use httpmate_core as core;
pub use httpmate_path as path;
pub use httpmate_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use httpmate::prelude::*;
/// ```
pub mod prelude {
    // Pipeline - main entry point
    pub use httpmate_runtime::{HttpMate, HttpMateBuilder, Outcome};

    // Standard modules, chains and keys
    pub use httpmate_runtime::chains;
    pub use httpmate_runtime::keys::*;
    pub use httpmate_runtime::{CoreModule, Handler, HandlerRef, RoutingModule};

    // Chain engine - for writing modules
    pub use httpmate_core::{
        Action, BoxError, ChainExtender, ChainModule, ChainName, Completion, DependencyRegistry,
        MetaData, MetaDataKey, ModuleDescriptor, named,
    };

    // Path templates
    pub use httpmate_path::{PathRouter, PathTemplate};

    // Logging macros
    pub use httpmate_runtime::tracing::{debug, error, info, trace, warn};
}
