//!
//! BoundedQueue - fixed-capacity blocking FIFO
//!
//! Two semaphores gate the container: `empty_slots` (starts at capacity) is
//! taken by producers and returned by consumers, `full_slots` (starts at 0)
//! the other way round. They are independent counters, not a shared budget;
//! the container itself sits behind one std mutex together with the
//! put/get counters. No caller ever holds the container lock while blocking
//! on a semaphore.
//!
//! Shutdown is administrative: `block(side)` closes a side and releases every
//! caller currently inside it (see `gate`), `shutdown` marks the queue dead,
//! blocks both sides and salvages whatever is left.
//!

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{MutexGuard, PoisonError, RwLock};
use std::time::Instant;

use chrono::{DateTime, Utc};
use strand_core::{CoreError, QueueConfig, StorageAllocator, SystemStorage};
use strand_sync::{Mutex, Semaphore, TryAcquireError};

use crate::error::{PutError, QueueError};
use crate::gate::{Lane, Pending, PendingGate, Side};
use crate::ring::SlotRing;
use crate::stats::QueueStats;

struct Container<T, A: StorageAllocator> {
    ring: SlotRing<T, A>,
    put_count: u64,
    get_count: u64,
    max_load: usize,
}

#[derive(Debug, Default, Clone, Copy)]
struct BlockedSides {
    put: bool,
    get: bool,
}

impl BlockedSides {
    fn lane(&self, lane: Lane) -> bool {
        match lane {
            Lane::Put => self.put,
            Lane::Get => self.get,
        }
    }

    fn set(&mut self, side: Side, blocked: bool) {
        for lane in side.lanes() {
            match lane {
                Lane::Put => self.put = blocked,
                Lane::Get => self.get = blocked,
            }
        }
    }
}

pub struct BoundedQueue<T, A: StorageAllocator = SystemStorage> {
    name: String,
    capacity: usize,
    container: std::sync::Mutex<Container<T, A>>,
    empty_slots: Semaphore,
    full_slots: Semaphore,
    blocked: RwLock<BlockedSides>,
    alive: AtomicBool,
    put_gate: PendingGate,
    get_gate: PendingGate,
    // serialises block / unblock
    admin: Mutex,
    created_at: DateTime<Utc>,
    created: Instant,
}

impl<T> BoundedQueue<T, SystemStorage> {
    pub fn new(name: impl Into<String>, capacity: usize) -> Result<Self, CoreError> {
        Self::with_allocator(name, capacity, SystemStorage)
    }

    pub fn from_config(config: &QueueConfig) -> Result<Self, CoreError> {
        Self::new(config.name.clone(), config.capacity)
    }
}

impl<T, A: StorageAllocator> BoundedQueue<T, A> {
    /// Creates a queue whose slot storage is taken from `allocator`, once.
    pub fn with_allocator(
        name: impl Into<String>,
        capacity: usize,
        allocator: A,
    ) -> Result<Self, CoreError> {
        let name = name.into();
        if capacity == 0 {
            return Err(CoreError::InvalidConfig(format!(
                "queue '{}' must have a positive capacity",
                name
            )));
        }
        let ring = SlotRing::new(capacity, allocator)?;

        tracing::debug!(queue = %name, capacity, "queue created");
        Ok(Self {
            capacity,
            container: std::sync::Mutex::new(Container {
                ring,
                put_count: 0,
                get_count: 0,
                max_load: 0,
            }),
            empty_slots: Semaphore::new(format!("{}.empty-slots", name), capacity),
            full_slots: Semaphore::new(format!("{}.full-slots", name), 0),
            blocked: RwLock::new(BlockedSides::default()),
            alive: AtomicBool::new(true),
            put_gate: PendingGate::new(format!("{}.put-pending", name)),
            get_gate: PendingGate::new(format!("{}.get-pending", name)),
            admin: Mutex::new(format!("{}.admin", name)),
            created_at: Utc::now(),
            created: Instant::now(),
            name,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn container(&self) -> MutexGuard<'_, Container<T, A>> {
        // push / pop leave the container consistent even if a caller panicked
        self.container.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn blocked_sides(&self) -> BlockedSides {
        *self.blocked.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// `true` if every lane of `side` is blocked.
    pub fn is_blocked(&self, side: Side) -> bool {
        let blocked = self.blocked_sides();
        side.lanes().iter().all(|lane| blocked.lane(*lane))
    }

    fn admit(&self, lane: Lane) -> Result<(), QueueError> {
        if !self.is_alive() {
            return Err(QueueError::Dead);
        }
        if self.blocked_sides().lane(lane) {
            return Err(QueueError::Blocked);
        }
        Ok(())
    }

    fn gate(&self, lane: Lane) -> &PendingGate {
        match lane {
            Lane::Put => &self.put_gate,
            Lane::Get => &self.get_gate,
        }
    }

    /// The semaphore a caller of `lane` waits on.
    fn credits(&self, lane: Lane) -> &Semaphore {
        match lane {
            Lane::Put => &self.empty_slots,
            Lane::Get => &self.full_slots,
        }
    }

    fn take_credit(&self, lane: Lane, wait: bool) -> Result<(), QueueError> {
        let credits = self.credits(lane);
        if wait {
            return credits.acquire().map_err(|err| {
                tracing::error!(queue = %self.name, %err, "slot acquire failed");
                QueueError::AcquireFailed
            });
        }
        credits.try_acquire().map_err(|err| match err {
            TryAcquireError::NoPermits => match lane {
                Lane::Put => QueueError::Full,
                Lane::Get => QueueError::Empty,
            },
            TryAcquireError::Poisoned { .. } => {
                tracing::error!(queue = %self.name, %err, "slot try-acquire failed");
                QueueError::TryAcquireFailed
            }
        })
    }

    /// Gatekeeping shared by every put and get: check the side, register as
    /// pending, check the side again, take a credit, and check once more in
    /// case the queue was blocked or killed while waiting. A credit taken by
    /// a caller that is then turned away is given back.
    ///
    /// Callers that already see the side closed never register, so a running
    /// `block` only waits for callers that were inside when it set the flag.
    fn enter_lane(&self, lane: Lane, wait: bool) -> Result<Pending<'_>, QueueError> {
        self.admit(lane)?;
        let pending = self.gate(lane).enter()?;
        self.admit(lane)?;
        self.take_credit(lane, wait)?;
        if let Err(err) = self.admit(lane) {
            self.credits(lane).release();
            return Err(err);
        }
        Ok(pending)
    }

    /// Blocks while the queue is full.
    pub fn put(&self, value: T) -> Result<(), PutError<T>> {
        self.put_inner(value, true)
    }

    /// Fails with `QueueError::Full` instead of waiting.
    pub fn try_put(&self, value: T) -> Result<(), PutError<T>> {
        self.put_inner(value, false)
    }

    fn put_inner(&self, value: T, wait: bool) -> Result<(), PutError<T>> {
        let _pending = match self.enter_lane(Lane::Put, wait) {
            Ok(pending) => pending,
            Err(err) => return Err(PutError::new(err, value)),
        };

        {
            let mut container = self.container();
            if let Err(value) = container.ring.push(value) {
                drop(container);
                tracing::error!(queue = %self.name, "free slot credit taken but the container is full");
                self.empty_slots.release();
                return Err(PutError::new(QueueError::InternalError, value));
            }
            container.put_count = container.put_count.wrapping_add(1);
            container.max_load = container.max_load.max(container.ring.len());
        }
        self.full_slots.release();
        Ok(())
    }

    /// Blocks while the queue is empty.
    pub fn get(&self) -> Result<T, QueueError> {
        self.get_inner(true)
    }

    /// Fails with `QueueError::Empty` instead of waiting.
    pub fn try_get(&self) -> Result<T, QueueError> {
        self.get_inner(false)
    }

    fn get_inner(&self, wait: bool) -> Result<T, QueueError> {
        let _pending = self.enter_lane(Lane::Get, wait)?;

        let value = {
            let mut container = self.container();
            let value = container.ring.pop();
            if value.is_some() {
                container.get_count = container.get_count.wrapping_add(1);
            }
            value
        };
        match value {
            Some(value) => {
                self.empty_slots.release();
                Ok(value)
            }
            None => {
                tracing::error!(queue = %self.name, "full slot credit taken but the container is empty");
                Err(QueueError::InternalError)
            }
        }
    }

    /// Moves every queued element into `sink`, oldest first, and returns how
    /// many were moved. Does nothing while the queue is shutting down.
    pub fn drain_into<E: Extend<T>>(&self, sink: &mut E) -> usize {
        if !self.is_alive() || self.is_blocked(Side::Both) {
            return 0;
        }
        let mut container = self.container();
        let mut moved = 0;
        while !container.ring.is_empty() {
            // a getter may already own the credit for the last elements
            if self.full_slots.try_acquire().is_err() {
                break;
            }
            let Some(value) = container.ring.pop() else {
                self.full_slots.release();
                break;
            };
            container.get_count = container.get_count.wrapping_add(1);
            sink.extend(Some(value));
            self.empty_slots.release();
            moved += 1;
        }
        moved
    }

    /// Current number of queued elements, or `None` while shutting down
    /// (both sides blocked, or the queue is dead).
    pub fn size(&self) -> Option<usize> {
        if !self.is_alive() || self.is_blocked(Side::Both) {
            return None;
        }
        Some(self.container().ring.len())
    }

    /// Closes `side`: new callers fail with `Blocked`, and every caller
    /// already inside is woken and turned away before this returns.
    pub fn block(&self, side: Side) {
        let _admin = match self.admin.entry() {
            Ok(entry) => entry,
            Err(err) => {
                tracing::error!(queue = %self.name, %err, "block failed to take the admin lock");
                return;
            }
        };
        self.blocked
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .set(side, true);

        for lane in side.lanes() {
            self.release_lane(*lane);
        }
    }

    fn release_lane(&self, lane: Lane) {
        let gate = self.gate(lane);
        let credits = self.credits(lane);
        let pending = gate.pending();
        if pending > 0 {
            match lane {
                Lane::Put => {
                    tracing::warn!(queue = %self.name, pending, "releasing blocked putters")
                }
                Lane::Get => {
                    tracing::info!(queue = %self.name, pending, "releasing blocked getters")
                }
            }
        }

        let injected = match gate.release_pending(credits) {
            Ok(injected) => injected,
            Err(err) => {
                tracing::error!(queue = %self.name, lane = lane.as_str(), %err, "rendezvous failed");
                return;
            }
        };
        for _ in 0..injected {
            if credits.try_acquire().is_err() {
                tracing::error!(
                    queue = %self.name,
                    lane = lane.as_str(),
                    "could not reclaim a released credit"
                );
                break;
            }
        }
    }

    /// Reopens `side`.
    pub fn unblock(&self, side: Side) {
        let _admin = match self.admin.entry() {
            Ok(entry) => entry,
            Err(err) => {
                tracing::error!(queue = %self.name, %err, "unblock failed to take the admin lock");
                return;
            }
        };
        self.blocked
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .set(side, false);
        tracing::debug!(queue = %self.name, ?side, "side unblocked");
    }

    /// Kills the queue: every current and future call fails, and the
    /// elements still queued are handed back. Calling it again returns an
    /// empty vector.
    pub fn shutdown(&self) -> Vec<T> {
        if self.alive.swap(false, Ordering::SeqCst) {
            tracing::debug!(queue = %self.name, "shutting down");
        }
        self.block(Side::Both);

        let mut container = self.container();
        let mut salvaged = Vec::with_capacity(container.ring.len());
        while let Some(value) = container.ring.pop() {
            container.get_count = container.get_count.wrapping_add(1);
            salvaged.push(value);
        }
        if !salvaged.is_empty() {
            tracing::warn!(
                queue = %self.name,
                remaining = salvaged.len(),
                "queue shut down with elements still queued"
            );
        }
        salvaged
    }

    /// `None` once the queue is dead.
    pub fn stats(&self) -> Option<QueueStats> {
        if !self.is_alive() {
            return None;
        }
        let (current_size, max_load, put_count, get_count) = {
            let container = self.container();
            (
                container.ring.len(),
                container.max_load,
                container.put_count,
                container.get_count,
            )
        };
        Some(QueueStats {
            name: self.name.clone(),
            capacity: self.capacity,
            current_size,
            max_load,
            put_count,
            get_count,
            created_at: self.created_at,
            sampled_at: Utc::now(),
            age: self.created.elapsed(),
        })
    }
}

impl<T, A: StorageAllocator> std::fmt::Debug for BoundedQueue<T, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedQueue")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("alive", &self.is_alive())
            .field("blocked", &self.blocked_sides())
            .finish_non_exhaustive()
    }
}

impl<T, A: StorageAllocator> Drop for BoundedQueue<T, A> {
    fn drop(&mut self) {
        if self.is_alive() {
            drop(self.shutdown());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strand_core::TrackingStorage;

    #[test]
    fn test_capacity_one_scenario() {
        let queue = BoundedQueue::new("single", 1).unwrap();
        queue.put("A").unwrap();

        let rejected = queue.try_put("B").unwrap_err();
        assert_eq!(rejected.error, QueueError::Full);
        assert_eq!(rejected.into_inner(), "B");

        assert_eq!(queue.get(), Ok("A"));
        assert_eq!(queue.try_get(), Err(QueueError::Empty));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let err = BoundedQueue::<u8>::new("none", 0).unwrap_err();
        assert!(matches!(err, CoreError::InvalidConfig(_)));
    }

    #[test]
    fn test_counters_and_high_water_mark() {
        let queue = BoundedQueue::new("counters", 4).unwrap();
        for i in 0..3 {
            queue.put(i).unwrap();
        }
        assert_eq!(queue.get(), Ok(0));
        queue.put(3).unwrap();

        let stats = queue.stats().unwrap();
        assert_eq!(stats.put_count, 4);
        assert_eq!(stats.get_count, 1);
        assert_eq!(stats.current_size, 3);
        assert_eq!(stats.max_load, 3);
        assert_eq!(stats.put_count - stats.get_count, queue.size().unwrap() as u64);
    }

    #[test]
    fn test_blocked_sides_reject() {
        let queue = BoundedQueue::new("closed", 2).unwrap();
        queue.put(1).unwrap();

        queue.block(Side::Put);
        assert!(queue.is_blocked(Side::Put));
        assert!(!queue.is_blocked(Side::Both));
        assert_eq!(queue.try_put(2).unwrap_err().error, QueueError::Blocked);
        assert_eq!(queue.put(2).unwrap_err().error, QueueError::Blocked);
        assert_eq!(queue.size(), Some(1));

        queue.block(Side::Get);
        assert!(queue.is_blocked(Side::Both));
        assert_eq!(queue.get(), Err(QueueError::Blocked));
        assert_eq!(queue.size(), None);

        queue.unblock(Side::Both);
        assert_eq!(queue.get(), Ok(1));
        queue.put(2).unwrap();
        queue.put(3).unwrap();
        assert_eq!(queue.try_put(4).unwrap_err().error, QueueError::Full);
    }

    #[test]
    fn test_drain_into_keeps_credits_in_step() {
        let queue = BoundedQueue::new("drain", 3).unwrap();
        for i in 0..3 {
            queue.put(i).unwrap();
        }
        let mut sink = Vec::new();
        assert_eq!(queue.drain_into(&mut sink), 3);
        assert_eq!(sink, vec![0, 1, 2]);
        assert_eq!(queue.size(), Some(0));
        assert_eq!(queue.try_get(), Err(QueueError::Empty));

        for i in 0..3 {
            queue.try_put(i).unwrap();
        }
        assert_eq!(queue.try_put(9).unwrap_err().error, QueueError::Full);

        queue.block(Side::Both);
        assert_eq!(queue.drain_into(&mut sink), 0);
    }

    #[test]
    fn test_shutdown_salvages_and_kills() {
        let queue = BoundedQueue::new("salvage", 4).unwrap();
        queue.put("x".to_string()).unwrap();
        queue.put("y".to_string()).unwrap();

        assert_eq!(queue.shutdown(), vec!["x".to_string(), "y".to_string()]);
        assert!(!queue.is_alive());
        assert_eq!(queue.put("z".to_string()).unwrap_err().error, QueueError::Dead);
        assert_eq!(queue.try_get(), Err(QueueError::Dead));
        assert_eq!(queue.size(), None);
        assert!(queue.stats().is_none());
        assert!(queue.shutdown().is_empty());
    }

    #[test]
    fn test_storage_comes_from_allocator() {
        let storage = TrackingStorage::new();
        {
            let queue = BoundedQueue::with_allocator("tracked", 8, &storage).unwrap();
            assert_eq!(storage.live_allocations(), 1);
            assert_eq!(storage.currently_allocated(), 8 * std::mem::size_of::<u64>());
            queue.put(7u64).unwrap();
        }
        assert_eq!(storage.currently_allocated(), 0);
        assert_eq!(storage.live_allocations(), 0);
    }

    #[test]
    fn test_from_config() {
        let config = QueueConfig {
            name: "configured".to_string(),
            capacity: 5,
        };
        let queue = BoundedQueue::<i32>::from_config(&config).unwrap();
        assert_eq!(queue.name(), "configured");
        assert_eq!(queue.capacity(), 5);
    }
}
