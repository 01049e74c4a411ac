///
/// Logging setup.
///
/// Installs a `tracing-subscriber` fmt subscriber on stderr. Library code in
/// the other strand crates only emits `tracing` events; nothing is printed
/// until a binary or test calls `init`.
///

use crate::config::LoggingConfig;
use crate::errors::CoreError;

pub fn init(config: &LoggingConfig) -> Result<(), CoreError> {
    let level = config.max_level()?;
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(config.ansi)
        .with_max_level(level)
        .with_thread_names(true)
        .try_init()
        .map_err(|e| CoreError::Logging(e.to_string()))
}
