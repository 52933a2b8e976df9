//! Configuration for tiled coverage access.

use serde::{Deserialize, Serialize};

use coverage_common::{CoverageError, Result};

/// Configuration for a tiled grid resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverageConfig {
    /// Memory budget for the resource-wide shared tile cache in megabytes.
    pub shared_cache_size_mb: usize,

    /// Memory budget for each private (per-subset) tile cache in megabytes.
    pub private_cache_size_mb: usize,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            shared_cache_size_mb: 1024,
            private_cache_size_mb: 64,
        }
    }
}

impl CoverageConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("TILE_CACHE_SIZE_MB") {
            if let Ok(size) = val.parse() {
                config.shared_cache_size_mb = size;
            }
        }

        if let Ok(val) = std::env::var("PRIVATE_TILE_CACHE_SIZE_MB") {
            if let Ok(size) = val.parse() {
                config.private_cache_size_mb = size;
            }
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.shared_cache_size_mb == 0 {
            return Err(CoverageError::config("shared_cache_size_mb must be > 0"));
        }
        if self.private_cache_size_mb == 0 {
            return Err(CoverageError::config("private_cache_size_mb must be > 0"));
        }
        Ok(())
    }

    /// Shared cache budget in bytes.
    pub fn shared_cache_bytes(&self) -> usize {
        self.shared_cache_size_mb * 1024 * 1024
    }

    /// Private cache budget in bytes.
    pub fn private_cache_bytes(&self) -> usize {
        self.private_cache_size_mb * 1024 * 1024
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CoverageConfig::default();
        assert_eq!(config.shared_cache_size_mb, 1024);
        assert_eq!(config.private_cache_size_mb, 64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = CoverageConfig::default();
        config.shared_cache_size_mb = 0;
        assert!(config.validate().is_err());

        config = CoverageConfig::default();
        config.private_cache_size_mb = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_json_round_trip() {
        let config = CoverageConfig {
            shared_cache_size_mb: 256,
            private_cache_size_mb: 16,
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: CoverageConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.shared_cache_size_mb, 256);
        assert_eq!(back.private_cache_size_mb, 16);
    }

    #[test]
    fn test_cache_bytes() {
        let config = CoverageConfig {
            shared_cache_size_mb: 2,
            private_cache_size_mb: 1,
        };
        assert_eq!(config.shared_cache_bytes(), 2 * 1024 * 1024);
        assert_eq!(config.private_cache_bytes(), 1024 * 1024);
    }
}
