///
/// strand Runtime Facade
///
/// One dependency for applications built on the strand core. Re-exports the
/// primitives, the thread lifecycle and the bounded queue, and wires the
/// configuration file to the logging subscriber.
///
/// Contains:
/// - `bootstrap(path)` - load strand.toml and install logging
/// - `prelude` - the types most programs need
/// - The four strand crates, re-exported whole
///

use std::path::Path;

pub use strand_core;
pub use strand_queue;
pub use strand_sync;
pub use strand_thread;

pub use strand_core::{CoreError, StrandConfig};

pub mod prelude {
    pub use strand_core::{CoreError, QueueConfig, StrandConfig, ThreadConfig};
    pub use strand_queue::{BoundedQueue, PutError, QueueError, QueueStats, Side};
    pub use strand_sync::{
        Condition, LockEntry, LockError, Lockable, Mutex, ReentrantMutex, Semaphore,
    };
    pub use strand_thread::{
        Runnable, RunningState, ThreadContext, ThreadError, ThreadHandle, ThreadState,
    };
}

/// Loads and validates the configuration at `path`, then installs the
/// tracing subscriber it describes.
///
/// Fails with `CoreError::Logging` if a subscriber is already installed;
/// use `StrandConfig::from_path` directly to only read the file.
pub fn bootstrap(path: &Path) -> Result<StrandConfig, CoreError> {
    let config = StrandConfig::from_path(path)?;
    strand_core::logging::init(&config.logging)?;
    tracing::info!(
        config = %path.display(),
        queue = %config.queue.name,
        capacity = config.queue.capacity,
        "strand runtime initialised"
    );
    Ok(config)
}
