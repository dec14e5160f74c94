//! Limits - 上書き可能な設定値
//!
//! すべての値にデフォルトがあり、TOML（`Limits::from_toml_str`）や
//! CLI / 環境変数から部分的に上書きできます。

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_MAX_TASK_ID_LENGTH: usize = 128;
pub const DEFAULT_MAX_PAYLOAD_SIZE_BYTES: usize = 50 * 1024;
pub const DEFAULT_BASE_BACKOFF_SECONDS: u64 = 5;
pub const DEFAULT_MAX_BACKOFF_SECONDS: u64 = 900;
pub const DEFAULT_MAX_LOG_BODY_BYTES: usize = 4000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("base backoff ({base}s) exceeds max backoff ({max}s)")]
    BackoffInverted { base: u64, max: u64 },

    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub max_task_id_length: usize,
    pub max_payload_size_bytes: usize,
    pub base_backoff_seconds: u64,
    pub max_backoff_seconds: u64,
    /// Byte budget for the body preview in dead-letter records.
    pub max_log_body_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_task_id_length: DEFAULT_MAX_TASK_ID_LENGTH,
            max_payload_size_bytes: DEFAULT_MAX_PAYLOAD_SIZE_BYTES,
            base_backoff_seconds: DEFAULT_BASE_BACKOFF_SECONDS,
            max_backoff_seconds: DEFAULT_MAX_BACKOFF_SECONDS,
            max_log_body_bytes: DEFAULT_MAX_LOG_BODY_BYTES,
        }
    }
}

impl Limits {
    /// Parse a (possibly partial) TOML document; missing keys keep their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let limits: Limits = toml::from_str(s)?;
        limits.validate()?;
        Ok(limits)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_task_id_length == 0 {
            return Err(ConfigError::Zero("max_task_id_length"));
        }
        if self.max_payload_size_bytes == 0 {
            return Err(ConfigError::Zero("max_payload_size_bytes"));
        }
        if self.max_log_body_bytes == 0 {
            return Err(ConfigError::Zero("max_log_body_bytes"));
        }
        if self.base_backoff_seconds > self.max_backoff_seconds {
            return Err(ConfigError::BackoffInverted {
                base: self.base_backoff_seconds,
                max: self.max_backoff_seconds,
            });
        }
        Ok(())
    }

    pub fn with_max_task_id_length(mut self, n: usize) -> Self {
        self.max_task_id_length = n;
        self
    }

    pub fn with_max_payload_size_bytes(mut self, n: usize) -> Self {
        self.max_payload_size_bytes = n;
        self
    }

    pub fn with_backoff_seconds(mut self, base: u64, max: u64) -> Self {
        self.base_backoff_seconds = base;
        self.max_backoff_seconds = max;
        self
    }

    pub fn with_max_log_body_bytes(mut self, n: usize) -> Self {
        self.max_log_body_bytes = n;
        self
    }

    pub fn base_backoff(&self) -> Duration {
        Duration::from_secs(self.base_backoff_seconds)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let limits = Limits::default();
        assert_eq!(limits.max_task_id_length, 128);
        assert_eq!(limits.max_payload_size_bytes, 51200);
        assert_eq!(limits.base_backoff_seconds, 5);
        assert_eq!(limits.max_backoff_seconds, 900);
        assert_eq!(limits.max_log_body_bytes, 4000);
        assert!(limits.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let limits = Limits::from_toml_str("max_backoff_seconds = 60\n").unwrap();
        assert_eq!(limits.max_backoff_seconds, 60);
        assert_eq!(limits.base_backoff_seconds, 5);
        assert_eq!(limits.max_task_id_length, 128);
    }

    #[test]
    fn invalid_limits_are_rejected() {
        assert!(matches!(
            Limits::default().with_max_task_id_length(0).validate(),
            Err(ConfigError::Zero("max_task_id_length"))
        ));
        assert!(matches!(
            Limits::default().with_backoff_seconds(10, 5).validate(),
            Err(ConfigError::BackoffInverted { base: 10, max: 5 })
        ));
        assert!(matches!(
            Limits::from_toml_str("max_task_id_length = \"long\""),
            Err(ConfigError::Parse(_))
        ));
    }
}
