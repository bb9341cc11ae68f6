//! Page-level response cache.
//!
//! Rendered responses are kept for a fixed time window and looked up by
//! request path, query string and cookie state, so two visitors with
//! different sessions never share an entry. Entries expire by age only;
//! writes do not invalidate them.
//!
//! ```toml
//! [cache]
//! enable_index_cache = true
//! index_ttl_seconds = 20
//! response_limit = 256
//! ```

mod config;
mod keys;
mod middleware;
mod store;

pub use config::CacheConfig;
pub use keys::{L1Key, hash_cookie, hash_query};
pub use middleware::{CacheState, INDEX_KEY_PREFIX, response_cache_layer};
pub use store::{CachedResponse, L1Store};
