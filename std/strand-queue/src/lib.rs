//!
//! strand-queue - Bounded Blocking Queue
//!
//! A fixed-capacity FIFO for handing values between OS threads, with
//! backpressure on both ends and an administrative shutdown.
//!
//! ## Operations
//!
//! - `BoundedQueue::new(name, capacity)` / `with_allocator(..)` / `from_config(..)`
//! - `put(value)` / `try_put(value)` - enqueue, rejected values come back in `PutError`
//! - `get()` / `try_get()` - dequeue
//! - `drain_into(&mut sink)` - move everything queued into a collection
//! - `size()` - `None` while shutting down
//! - `stats()` - serializable `QueueStats` snapshot
//!
//! ## Shutdown
//!
//! - `block(side)` - close a side and wait until every caller inside it left
//! - `unblock(side)` - reopen it
//! - `shutdown()` - kill the queue and salvage the remaining elements
//!
//! Dropping a queue runs `shutdown` and drops whatever was salvaged.
//!

mod gate;
mod ring;

pub mod error;
pub mod queue;
pub mod stats;

pub use error::{PutError, QueueError};
pub use gate::Side;
pub use queue::BoundedQueue;
pub use stats::QueueStats;
