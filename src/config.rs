//! Bridge configuration
//!
//! Loaded with figment: a YAML file merged with `VEBUS_`-prefixed
//! environment overrides. Every field has a serde default so a missing or
//! partial file yields a working configuration.

use std::path::Path;
use std::time::Duration;

use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VeBusError};

/// Bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Serial device path
    pub device: String,
    /// Serial baud rate
    pub baud_rate: u32,
    /// Outbound command queue capacity
    pub queue_capacity: usize,
    /// Maximum retries per command (send failure or response timeout)
    pub max_retries: u8,
    /// Response timeout for awaited commands and facade requests, in ms
    pub response_timeout_ms: u64,
    /// Device-state staleness threshold, in ms
    pub staleness_timeout_ms: u64,
    /// Partial-frame discard timeout in the assembler, in ms
    pub frame_timeout_ms: u64,
    /// Driver loop tick period, in ms
    pub tick_interval_ms: u64,
    /// Log filter directive (e.g. "info", "vebus_bridge=debug")
    pub log_level: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            device: "/dev/ttyUSB0".to_string(),
            baud_rate: 256_000,
            queue_capacity: 10,
            max_retries: 3,
            response_timeout_ms: 1000,
            staleness_timeout_ms: 5000,
            frame_timeout_ms: 100,
            tick_interval_ms: 10,
            log_level: "info".to_string(),
        }
    }
}

impl BridgeConfig {
    /// Load configuration from a YAML file plus `VEBUS_` environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let config: BridgeConfig = Figment::new()
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("VEBUS_"))
            .extract()
            .map_err(|e| VeBusError::config(format!("failed to load configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an optional file path, falling back to defaults plus
    /// environment overrides when no file is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => {
                let config: BridgeConfig = Figment::new()
                    .merge(Env::prefixed("VEBUS_"))
                    .extract()
                    .map_err(|e| VeBusError::config(format!("failed to load configuration: {e}")))?;
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// Validate field ranges
    pub fn validate(&self) -> Result<()> {
        if self.device.is_empty() {
            return Err(VeBusError::config("serial device path is empty"));
        }
        if self.baud_rate == 0 {
            return Err(VeBusError::config("baud_rate must be non-zero"));
        }
        if self.queue_capacity == 0 {
            return Err(VeBusError::config("queue_capacity must be non-zero"));
        }
        if self.response_timeout_ms == 0
            || self.staleness_timeout_ms == 0
            || self.frame_timeout_ms == 0
            || self.tick_interval_ms == 0
        {
            return Err(VeBusError::config("timeouts must be non-zero"));
        }
        Ok(())
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn staleness_timeout(&self) -> Duration {
        Duration::from_millis(self.staleness_timeout_ms)
    }

    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.baud_rate, 256_000);
        assert_eq!(config.queue_capacity, 10);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.response_timeout_ms, 1000);
        assert_eq!(config.staleness_timeout_ms, 5000);
        assert_eq!(config.frame_timeout_ms, 100);
        assert_eq!(config.tick_interval_ms, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "device: /dev/ttyAMA0").unwrap();
        writeln!(file, "baud_rate: 115200").unwrap();

        let config = BridgeConfig::from_file(file.path()).unwrap();
        assert_eq!(config.device, "/dev/ttyAMA0");
        assert_eq!(config.baud_rate, 115200);
        // Unspecified fields keep their defaults
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn test_validate_rejects_zero_timeouts() {
        let config = BridgeConfig {
            response_timeout_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = BridgeConfig {
            queue_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
