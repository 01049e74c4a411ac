///
/// Core error types.
///
/// Failures that can occur before any primitive is running: reading and
/// validating configuration, allocating queue storage, and installing the
/// logging subscriber.
///

use std::path::PathBuf;
use thiserror::Error;

use crate::alloc::AllocError;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Config not found at {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Storage allocation failed: {0}")]
    Alloc(#[from] AllocError),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}
