//! Response cache middleware.
//!
//! Serves GET requests from the cache while an entry is fresh; otherwise runs
//! the handler and stores `200 OK` responses. Concurrent misses may render
//! the same page more than once.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::counter;
use tracing::{debug, instrument, warn};

use super::{
    CacheConfig, L1Store,
    keys::{L1Key, hash_cookie, hash_query},
    store::CachedResponse,
};

/// Key prefix for cached index pages.
pub const INDEX_KEY_PREFIX: &str = "index_page";

const MAX_CACHED_BODY_BYTES: usize = 1024 * 1024;

#[derive(Clone)]
pub struct CacheState {
    pub config: CacheConfig,
    pub l1: Arc<L1Store>,
    pub prefix: &'static str,
}

impl CacheState {
    pub fn new(config: CacheConfig, prefix: &'static str) -> Self {
        let l1 = Arc::new(L1Store::new(&config));
        Self { config, l1, prefix }
    }
}

#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn response_cache_layer(
    State(cache): State<CacheState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !cache.config.enable_index_cache || request.method() != Method::GET {
        return next.run(request).await;
    }

    let key = L1Key::Response {
        prefix: cache.prefix,
        path: request.uri().path().to_string(),
        query_hash: hash_query(request.uri().query().unwrap_or("")),
        cookie_hash: hash_cookie(request.headers()),
    };

    if let Some(cached) = cache.l1.get(&key, Instant::now()) {
        counter!("yatube_cache_l1_hit_total").increment(1);
        debug!(cache = "l1", outcome = "hit", "serving cached response");
        return build_response(cached);
    }

    counter!("yatube_cache_l1_miss_total").increment(1);
    debug!(cache = "l1", outcome = "miss", "executing handler");

    let response = next.run(request).await;
    if response.status() != StatusCode::OK {
        return response;
    }

    let (parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_CACHED_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(cache = "l1", error = %err, "failed to collect response body");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let cached = CachedResponse {
        status: parts.status.as_u16(),
        headers: parts
            .headers
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|s| (k.to_string(), s.to_string())))
            .collect(),
        body: bytes.clone(),
        stored_at: Instant::now(),
    };

    counter!("yatube_cache_l1_store_total").increment(1);
    if cache.l1.set(key, cached).is_some() {
        counter!("yatube_cache_l1_evict_total").increment(1);
    }

    Response::from_parts(parts, Body::from(bytes))
}

fn build_response(cached: CachedResponse) -> Response {
    let mut builder = Response::builder().status(cached.status);

    for (name, value) in cached.headers {
        if let Ok(header_value) = HeaderValue::from_str(&value) {
            builder = builder.header(name, header_value);
        }
    }

    builder
        .body(Body::from(cached.body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
