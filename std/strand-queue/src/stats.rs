use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Point-in-time snapshot of a queue, for monitoring consumers.
///
/// The counters are read together under the container lock; the timestamps
/// are taken outside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub name: String,
    pub capacity: usize,
    pub current_size: usize,
    /// High-water mark since creation.
    pub max_load: usize,
    pub put_count: u64,
    pub get_count: u64,
    pub created_at: DateTime<Utc>,
    pub sampled_at: DateTime<Utc>,
    pub age: Duration,
}

impl QueueStats {
    /// Fraction of the capacity in use when the snapshot was taken.
    pub fn load_factor(&self) -> f64 {
        self.current_size as f64 / self.capacity as f64
    }
}
