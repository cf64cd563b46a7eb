use anyhow::Result;
use playback_cache::CacheConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ttl_secs: u64,
    pub enabled: bool,
    pub sweep_interval_secs: Option<u64>,
    pub single_flight: bool,
    /// Whether the demo backend reports the spatial extension as loaded
    pub spatial_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ttl_secs: playback_cache::config::DEFAULT_TTL.as_secs(),
            enabled: true,
            sweep_interval_secs: None,
            single_flight: false,
            spatial_enabled: true,
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&contents)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn cache_config(&self) -> CacheConfig {
        let config = CacheConfig::new(self.ttl_secs).with_enabled(self.enabled);
        match self.sweep_interval_secs {
            Some(secs) if secs > 0 => config.with_sweep_interval(Duration::from_secs(secs)),
            _ => config,
        }
    }
}
