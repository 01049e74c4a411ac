///
/// # Configuration
///
/// This module parses `strand.toml` files. Every section and every key is
/// optional; missing values fall back to the defaults below.
///
/// ## Example strand.toml
///
/// ```toml
/// [logging]
/// level = "info"
/// ansi = false
///
/// [queue]
/// name = "work"
/// capacity = 100
///
/// [thread]
/// termination_timeout_ms = 1000
/// drop_retries = 10
/// drop_retry_interval_ms = 20
/// ```
///
/// `validate()` is applied by `from_path` and `parse_config_str`, so a
/// loaded config never carries a zero queue capacity or an unknown log level.
///

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::CoreError;

pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct StrandConfig {
    pub logging: LoggingConfig,
    pub queue: QueueConfig,
    pub thread: ThreadConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            ansi: false,
        }
    }
}

impl LoggingConfig {
    pub fn max_level(&self) -> Result<tracing::Level, CoreError> {
        tracing::Level::from_str(&self.level).map_err(|_| {
            CoreError::InvalidConfig(format!("unknown log level '{}'", self.level))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct QueueConfig {
    pub name: String,
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: "queue".to_string(),
            capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ThreadConfig {
    /// Bound used when a handle is dropped before its thread terminated.
    pub termination_timeout_ms: u64,
    pub drop_retries: u32,
    pub drop_retry_interval_ms: u64,
}

impl Default for ThreadConfig {
    fn default() -> Self {
        Self {
            termination_timeout_ms: 1000,
            drop_retries: 10,
            drop_retry_interval_ms: 20,
        }
    }
}

impl ThreadConfig {
    pub fn termination_timeout(&self) -> Duration {
        Duration::from_millis(self.termination_timeout_ms)
    }

    pub fn drop_retry_interval(&self) -> Duration {
        Duration::from_millis(self.drop_retry_interval_ms)
    }
}

impl StrandConfig {
    pub fn from_path(path: &Path) -> Result<Self, CoreError> {
        if !path.exists() {
            return Err(CoreError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        parse_config_str(&content)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        self.logging.max_level()?;

        if self.queue.capacity == 0 {
            return Err(CoreError::InvalidConfig(format!(
                "queue '{}' must have a positive capacity",
                self.queue.name
            )));
        }
        if self.queue.name.is_empty() {
            return Err(CoreError::InvalidConfig(
                "queue name must not be empty".to_string(),
            ));
        }
        if self.thread.drop_retry_interval_ms == 0 && self.thread.drop_retries > 0 {
            return Err(CoreError::InvalidConfig(
                "thread drop_retry_interval_ms must be positive when drop_retries is set"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

pub fn parse_config_str(content: &str) -> Result<StrandConfig, CoreError> {
    let config: StrandConfig = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
}
