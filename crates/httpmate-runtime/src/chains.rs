//! Standard chains created by [`CoreModule`](crate::CoreModule).
//!
//! ```text
//! INIT ─▶ PRE_PROCESS ─▶ DETERMINE_HANDLER ─▶ INVOKE_HANDLER ─▶ POST_INVOKE ─▶ POST_PROCESS ─▶ consume
//!                              │                                                  ▲
//!                              └──────────────▶ NOT_FOUND ────────────────────────┤
//! any failure ──────────────────────────────▶ EXCEPTION_OCCURRED ─────────────────┘
//! failure in POST_PROCESS / NOT_FOUND / EXCEPTION_OCCURRED ─▶ ERROR ─▶ consume
//! ```

use httpmate_core::ChainName;

pub const INIT: ChainName = ChainName::from_static("INIT");
pub const PRE_PROCESS: ChainName = ChainName::from_static("PRE_PROCESS");
pub const DETERMINE_HANDLER: ChainName = ChainName::from_static("DETERMINE_HANDLER");
pub const INVOKE_HANDLER: ChainName = ChainName::from_static("INVOKE_HANDLER");
pub const POST_INVOKE: ChainName = ChainName::from_static("POST_INVOKE");
pub const POST_PROCESS: ChainName = ChainName::from_static("POST_PROCESS");
pub const NOT_FOUND: ChainName = ChainName::from_static("NOT_FOUND");
pub const EXCEPTION_OCCURRED: ChainName = ChainName::from_static("EXCEPTION_OCCURRED");
/// Last resort; its own failures drop the request.
pub const ERROR: ChainName = ChainName::from_static("ERROR");
