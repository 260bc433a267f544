//! Standard metadata keys of the HTTP pipeline.
//!
//! Transport integrations fill the request keys before handing a request to
//! [`HttpMate`](crate::HttpMate); modules read them and fill the response
//! keys, which the transport turns back into a response.

use std::collections::HashMap;

use httpmate_core::MetaDataKey;

use crate::handler::HandlerRef;

/// Header, query and parameter maps.
pub type StringMap = HashMap<String, String>;

// ─── Request ────────────────────────────────────────────────────────────────

/// Request path without the query string, e.g. `/users/7`.
pub const PATH: MetaDataKey<String> = MetaDataKey::new("PATH");

/// Upper-case request method, e.g. `GET`.
pub const METHOD: MetaDataKey<String> = MetaDataKey::new("METHOD");

/// Request headers; names are lower-case.
pub const HEADERS: MetaDataKey<StringMap> = MetaDataKey::new("HEADERS");

pub const QUERY_PARAMETERS: MetaDataKey<StringMap> = MetaDataKey::new("QUERY_PARAMETERS");

/// Captures of the matched route template.
pub const PATH_PARAMETERS: MetaDataKey<StringMap> = MetaDataKey::new("PATH_PARAMETERS");

pub const BODY_STRING: MetaDataKey<String> = MetaDataKey::new("BODY_STRING");

/// The handler chosen for the request.
pub const HANDLER: MetaDataKey<HandlerRef> = MetaDataKey::new("HANDLER");

// ─── Response ───────────────────────────────────────────────────────────────

pub const STRING_RESPONSE: MetaDataKey<String> = MetaDataKey::new("STRING_RESPONSE");

pub const RESPONSE_STATUS: MetaDataKey<u16> = MetaDataKey::new("RESPONSE_STATUS");

/// Response headers; names are lower-case.
pub const RESPONSE_HEADERS: MetaDataKey<StringMap> = MetaDataKey::new("RESPONSE_HEADERS");

/// Splits `a=1&b=2` into a map. Pairs without `=` map to an empty value;
/// repeated names keep the last value.
pub fn parse_query(query: &str) -> StringMap {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((name, value)) => (name.to_string(), value.to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect()
}
