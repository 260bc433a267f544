//! Error types for path template compilation.
//!
//! Matching never fails: a path that does not fit a template is a plain
//! non-match. Only malformed templates produce a [`PathTemplateError`].

use thiserror::Error;

/// Errors raised while compiling a path template.
#[derive(Debug, Error)]
pub enum PathTemplateError {
    /// A `|regex|` segment did not compile.
    #[error("invalid regex in segment '{segment}': {source}")]
    InvalidRegex {
        /// The offending template segment, delimiters included.
        segment: String,
        /// The regex compiler's diagnostic.
        #[source]
        source: regex::Error,
    },

    /// A segment opened a regex with `|` but did not close it.
    #[error("unterminated regex segment '{0}'")]
    UnterminatedRegex(String),

    /// A `<name>` capture used characters outside `[A-Za-z0-9_-]`.
    #[error("invalid capture name in segment '{0}'")]
    InvalidCaptureName(String),
}

/// Result type for template compilation.
pub type PathTemplateResult<T> = Result<T, PathTemplateError>;
