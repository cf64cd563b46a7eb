//! Cache configuration options

use std::time::Duration;

/// Default time-to-live for cached query results
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Configuration for the query cache
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Time-to-live applied to every entry at insertion
    pub ttl: Duration,
    /// Whether caching is enabled
    pub enabled: bool,
    /// How often a background sweeper purges expired entries, if at all
    pub sweep_interval: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            enabled: true,
            sweep_interval: None,
        }
    }
}

impl CacheConfig {
    /// Create a new cache configuration with the given TTL in seconds
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            ttl: Duration::from_secs(ttl_secs),
            ..Default::default()
        }
    }

    /// Create a disabled cache configuration
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Set the TTL duration
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Enable or disable the cache
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Run a background sweeper at this interval
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.ttl, Duration::from_secs(300));
        assert!(config.enabled);
        assert!(config.sweep_interval.is_none());
    }

    #[test]
    fn test_disabled_config() {
        let config = CacheConfig::disabled();
        assert!(!config.enabled);
    }

    #[test]
    fn test_builder_pattern() {
        let config = CacheConfig::new(30)
            .with_ttl(Duration::from_secs(60))
            .with_sweep_interval(Duration::from_secs(10))
            .with_enabled(true);

        assert_eq!(config.ttl, Duration::from_secs(60));
        assert_eq!(config.sweep_interval, Some(Duration::from_secs(10)));
        assert!(config.enabled);
    }
}
