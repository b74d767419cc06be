//! Server configuration
//!
//! Loaded from a YAML file (`configs/default.yaml` by default). Every
//! section has working defaults so a missing file or empty section still
//! yields a runnable server.

use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::protocol::constants::MAX_CHUNK_SIZE;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub rtmp: RtmpConfig,
    pub stream: StreamConfig,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RtmpConfig {
    /// TCP port to bind
    pub port: u16,
    /// Chunk size announced to peers after `connect`
    pub outbound_chunk_size: u32,
}

impl Default for RtmpConfig {
    fn default() -> Self {
        Self {
            port: 1935,
            outbound_chunk_size: 4096,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Upper bound on frames retained per path for late joiners
    pub gop_cache_max_frames: usize,
    /// `play` rejection threshold per path
    pub max_players_per_path: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            gop_cache_max_frames: 64,
            max_players_per_path: 32,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Idle transports are closed after this many seconds
    pub idle_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum severity: trace, debug, info, warn, error
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load and validate a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rtmp.port == 0 {
            return Err(ConfigError::Invalid("rtmp.port must be non-zero".into()));
        }
        if self.rtmp.outbound_chunk_size == 0 || self.rtmp.outbound_chunk_size > MAX_CHUNK_SIZE {
            return Err(ConfigError::Invalid(format!(
                "rtmp.outbound_chunk_size must be in 1..={MAX_CHUNK_SIZE}"
            )));
        }
        if self.stream.gop_cache_max_frames == 0 {
            return Err(ConfigError::Invalid(
                "stream.gop_cache_max_frames must be non-zero".into(),
            ));
        }
        if self.session.idle_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "session.idle_timeout_secs must be non-zero".into(),
            ));
        }

        let level = self.logging.level.to_lowercase();
        if !matches!(level.as_str(), "trace" | "debug" | "info" | "warn" | "error") {
            return Err(ConfigError::Invalid(format!(
                "logging.level '{}' is not one of trace/debug/info/warn/error",
                self.logging.level
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.rtmp.port, 1935);
        assert_eq!(config.rtmp.outbound_chunk_size, 4096);
        assert_eq!(config.stream.gop_cache_max_frames, 64);
        assert_eq!(config.stream.max_players_per_path, 32);
        assert_eq!(config.session.idle_timeout_secs, 60);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_partial_yaml() {
        let yaml = "rtmp:\n  port: 2935\nlogging:\n  level: debug\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_ok());

        assert_eq!(config.rtmp.port, 2935);
        assert_eq!(config.logging.level, "debug");
        // Untouched sections keep their defaults
        assert_eq!(config.rtmp.outbound_chunk_size, 4096);
        assert_eq!(config.stream.max_players_per_path, 32);
    }

    #[test]
    fn test_rejects_zero_port() {
        let yaml = "rtmp:\n  port: 0\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_oversized_chunk_size() {
        let yaml = "rtmp:\n  outbound_chunk_size: 16777216\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_unknown_log_level() {
        let yaml = "logging:\n  level: verbose\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }
}
