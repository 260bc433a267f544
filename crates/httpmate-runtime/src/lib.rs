//! HttpMate Runtime - the standard HTTP pipeline on top of the chain engine.
//!
//! This crate provides:
//! - Standard chains and metadata keys (`chains`, `keys`)
//! - The modules that wire them (`CoreModule`, `RoutingModule`)
//! - The assembled pipeline (`HttpMate`, `HttpMateBuilder`)
//! - Configuration loading and logging setup
//!
//! ```rust,ignore
//! use httpmate_runtime::prelude::*;
//!
//! let httpmate = HttpMate::builder()
//!     .get("/users/<id>", show_user)
//!     .post("/users", create_user)
//!     .build()?;
//!
//! match httpmate.handle(HttpMate::request("GET", "/users/7"))? {
//!     Outcome::Consumed(meta) => respond(meta),
//!     Outcome::Dropped => close_connection(),
//! }
//! ```
//!
//! Transport integrations are not part of this crate; they turn a request into
//! [`MetaData`](httpmate_core::MetaData) with the keys in [`keys`] and read the
//! response keys back.

pub mod chains;
pub mod config;
pub mod core_module;
pub mod error;
pub mod handler;
pub mod keys;
pub mod logging;
pub mod routing;
pub mod runtime;

// Re-exports
pub use config::{
    ConfigError, ConfigLoader, ConfigResult, EngineConfig, HttpMateConfig, LoggingConfig, Profile,
};
pub use core_module::CoreModule;
pub use error::{RuntimeError, RuntimeResult};
pub use handler::{Handler, HandlerRef};
pub use logging::{LoggingBuilder, SpanEvents};
pub use routing::RoutingModule;
pub use runtime::{HttpMate, HttpMateBuilder, Outcome};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
///
/// Brings in the pipeline types, the standard keys and the logging macros.
pub mod prelude {
    pub use crate::keys::*;
    pub use crate::{CoreModule, Handler, HttpMate, HttpMateBuilder, Outcome, RoutingModule};
    pub use httpmate_core::{BoxError, ChainModule, Completion, MetaData};
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
