//! Client configuration
//!
//! Construction-time options with presets and TOML loading. Per-call
//! overrides go through [`CallOptions`].

use crate::errors::{ClientError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Construction-time options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Deadline applied to calls without their own; `None` waits forever
    pub default_timeout_ms: Option<u64>,

    /// Maximum number of in-flight calls
    pub max_pending_calls: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: Some(30_000),
            max_pending_calls: 4096,
        }
    }
}

impl ClientConfig {
    /// Create configuration for testing with short deadlines
    pub fn testing() -> Self {
        Self {
            default_timeout_ms: Some(5_000),
            max_pending_calls: 128,
        }
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(source).map_err(|err| ClientError::config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<()> {
        if self.max_pending_calls == 0 {
            return Err(ClientError::config(
                "max_pending_calls must be greater than 0",
            ));
        }
        if self.default_timeout_ms == Some(0) {
            return Err(ClientError::config(
                "default_timeout_ms must be greater than 0 (omit it to disable)",
            ));
        }
        Ok(())
    }

    /// Default deadline as a duration
    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_ms.map(Duration::from_millis)
    }
}

/// Deadline policy of one call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Deadline {
    /// Use [`ClientConfig::default_timeout_ms`]
    #[default]
    Default,
    /// Expire after this long
    After(Duration),
    /// Wait until answered, cancelled or disconnected
    Never,
}

/// Per-call options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallOptions {
    /// Deadline policy
    pub deadline: Deadline,
}

impl CallOptions {
    /// Expire after `after`
    pub fn timeout(after: Duration) -> Self {
        Self {
            deadline: Deadline::After(after),
        }
    }

    /// Never expire
    pub fn no_timeout() -> Self {
        Self {
            deadline: Deadline::Never,
        }
    }

    /// Effective deadline under `config`
    pub fn resolve(&self, config: &ClientConfig) -> Option<Duration> {
        match self.deadline {
            Deadline::Default => config.default_timeout(),
            Deadline::After(after) => Some(after),
            Deadline::Never => None,
        }
    }
}
