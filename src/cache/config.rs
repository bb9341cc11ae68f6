//! Cache configuration.

use std::num::NonZeroUsize;
use std::time::Duration;

const DEFAULT_RESPONSE_LIMIT: usize = 256;
const DEFAULT_INDEX_TTL: Duration = Duration::from_secs(20);

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Cache rendered index pages.
    pub enable_index_cache: bool,
    /// How long a stored response may be served.
    pub index_ttl: Duration,
    /// Maximum number of stored responses.
    pub response_limit: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enable_index_cache: true,
            index_ttl: DEFAULT_INDEX_TTL,
            response_limit: DEFAULT_RESPONSE_LIMIT,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enable_index_cache: settings.enable_index_cache,
            index_ttl: settings.index_ttl,
            response_limit: settings.response_limit.get(),
        }
    }
}

impl CacheConfig {
    /// Returns the response limit as NonZeroUsize, clamping to 1 if zero.
    pub fn response_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.response_limit).unwrap_or(NonZeroUsize::MIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_keeps_index_pages_for_twenty_seconds() {
        let config = CacheConfig::default();
        assert!(config.enable_index_cache);
        assert_eq!(config.index_ttl, Duration::from_secs(20));
    }

    #[test]
    fn zero_limit_clamps_to_one() {
        let config = CacheConfig {
            response_limit: 0,
            ..Default::default()
        };
        assert_eq!(config.response_limit_non_zero().get(), 1);
    }
}
