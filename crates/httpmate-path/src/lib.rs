//! # HttpMate Path
//!
//! Route templates compiled into small automata.
//!
//! Template syntax, one element per `/`-separated segment:
//!
//! | Segment        | Matches                                              |
//! |----------------|------------------------------------------------------|
//! | `users`        | exactly `users`                                      |
//! | `<id>`         | any one segment, captured as `id`                    |
//! | `<>`           | any one segment, not captured                        |
//! | `\|[0-9]+\|`   | a segment the regex matches in full; named groups `(?<n>...)` are captured |
//! | `*`            | every remaining segment, including none              |
//!
//! Empty segments are dropped on both sides, so leading, trailing and
//! doubled slashes never matter. A path that does not fit a template is a
//! non-match, never an error.

pub mod automaton;
pub mod element;
pub mod error;
pub mod router;
pub mod template;

pub use automaton::{Automaton, StateId, Transition};
pub use element::{ElementSpec, SegmentPattern};
pub use error::{PathTemplateError, PathTemplateResult};
pub use router::{PathRouter, RouteMatch};
pub use template::{PathTemplate, segments};
