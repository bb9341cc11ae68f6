//! Cache key definitions.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use axum::http::{HeaderMap, header::COOKIE};

/// Response cache key.
///
/// `cookie_hash` covers every `Cookie` header of the request, so responses
/// rendered for one session are never served to another.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum L1Key {
    Response {
        prefix: &'static str,
        path: String,
        query_hash: u64,
        cookie_hash: u64,
    },
}

pub fn hash_query(query: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    query.hash(&mut hasher);
    hasher.finish()
}

/// Hash the raw `Cookie` headers in order; no cookie at all hashes like an empty list.
pub fn hash_cookie(headers: &HeaderMap) -> u64 {
    let mut hasher = DefaultHasher::new();
    for value in headers.get_all(COOKIE) {
        value.as_bytes().hash(&mut hasher);
    }
    hasher.finish()
}
