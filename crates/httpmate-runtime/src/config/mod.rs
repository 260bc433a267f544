//! Configuration module for the HttpMate runtime.
//!
//! Layered loading (defaults, files, environment, code) and validation of
//! logging and engine settings.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    EngineConfig, HttpMateConfig, LogFormat, LogLevel, LogOutput, LoggingConfig, SpanEventConfig,
};
pub use validation::validate_config;
