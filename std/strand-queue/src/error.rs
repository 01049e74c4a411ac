use std::fmt;

use thiserror::Error;

/// Why a queue operation did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum QueueError {
    /// `try_get` found nothing to take.
    #[error("queue is empty")]
    Empty,

    /// `try_put` found no free slot.
    #[error("queue is full")]
    Full,

    /// The requested side has been closed with `block`.
    #[error("queue side is blocked")]
    Blocked,

    /// The queue is shutting down.
    #[error("queue is dead")]
    Dead,

    #[error("acquiring a queue slot failed")]
    AcquireFailed,

    #[error("trying to acquire a queue slot failed")]
    TryAcquireFailed,

    /// A slot credit was taken but the container disagreed. Logged when it
    /// happens; indicates a broken invariant.
    #[error("queue invariant violated")]
    InternalError,
}

/// A rejected `put`, handing the value back to the caller.
#[derive(Clone, PartialEq, Eq)]
pub struct PutError<T> {
    pub error: QueueError,
    pub value: T,
}

impl<T> PutError<T> {
    pub(crate) fn new(error: QueueError, value: T) -> Self {
        Self { error, value }
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T> fmt::Debug for PutError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PutError")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl<T> fmt::Display for PutError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "put rejected: {}", self.error)
    }
}

impl<T> std::error::Error for PutError<T> {}

impl<T> From<PutError<T>> for QueueError {
    fn from(err: PutError<T>) -> Self {
        err.error
    }
}
