///
/// Storage Allocators
///
/// Queue storage is requested once, at construction, through an injected
/// `StorageAllocator`. The queue never reaches for the global allocator on
/// its own, so callers can place storage in a pool or count it.
///
/// - `SystemStorage` forwards to `std::alloc`
/// - `TrackingStorage<A>` wraps another allocator and keeps live byte and
///   allocation counts for leak diagnostics
///
/// Zero-sized layouts never reach the underlying allocator; they are served
/// with a dangling, well-aligned pointer.
///

use std::alloc::{alloc, dealloc, Layout};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("failed to allocate {size} bytes (align {align})")]
pub struct AllocError {
    pub size: usize,
    pub align: usize,
}

impl AllocError {
    pub fn for_layout(layout: Layout) -> Self {
        Self {
            size: layout.size(),
            align: layout.align(),
        }
    }
}

/// Allocate/free contract for queue storage.
pub trait StorageAllocator: Send + Sync {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError>;

    /// # Safety
    ///
    /// `ptr` must have been returned by `allocate` on this allocator with the
    /// same `layout`, and must not be used afterwards.
    unsafe fn free(&self, ptr: NonNull<u8>, layout: Layout);
}

#[inline(always)]
fn dangling_for(layout: Layout) -> NonNull<u8> {
    // align is a non-zero power of two, so this is never null
    NonNull::new(layout.align() as *mut u8).unwrap_or(NonNull::dangling())
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemStorage;

impl StorageAllocator for SystemStorage {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        if layout.size() == 0 {
            return Ok(dangling_for(layout));
        }
        let ptr = unsafe { alloc(layout) };
        NonNull::new(ptr).ok_or(AllocError::for_layout(layout))
    }

    unsafe fn free(&self, ptr: NonNull<u8>, layout: Layout) {
        if layout.size() == 0 {
            return;
        }
        unsafe { dealloc(ptr.as_ptr(), layout) }
    }
}

impl<A: StorageAllocator + ?Sized> StorageAllocator for &A {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        (**self).allocate(layout)
    }

    unsafe fn free(&self, ptr: NonNull<u8>, layout: Layout) {
        unsafe { (**self).free(ptr, layout) }
    }
}

impl<A: StorageAllocator + ?Sized> StorageAllocator for std::sync::Arc<A> {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        (**self).allocate(layout)
    }

    unsafe fn free(&self, ptr: NonNull<u8>, layout: Layout) {
        unsafe { (**self).free(ptr, layout) }
    }
}

/// Counting wrapper around another allocator.
///
/// An optional byte limit makes allocations fail once the live byte count
/// would exceed it, which is how tests provoke allocation failures.
#[derive(Debug, Default)]
pub struct TrackingStorage<A = SystemStorage> {
    inner: A,
    limit: Option<usize>,
    live_bytes: AtomicUsize,
    live_blocks: AtomicUsize,
    peak_bytes: AtomicUsize,
}

impl TrackingStorage<SystemStorage> {
    pub fn new() -> Self {
        Self::wrap(SystemStorage)
    }

    pub fn with_limit(limit: usize) -> Self {
        let mut storage = Self::wrap(SystemStorage);
        storage.limit = Some(limit);
        storage
    }
}

impl<A: StorageAllocator> TrackingStorage<A> {
    pub fn wrap(inner: A) -> Self {
        Self {
            inner,
            limit: None,
            live_bytes: AtomicUsize::new(0),
            live_blocks: AtomicUsize::new(0),
            peak_bytes: AtomicUsize::new(0),
        }
    }

    /// Bytes handed out and not yet freed.
    pub fn currently_allocated(&self) -> usize {
        self.live_bytes.load(Ordering::SeqCst)
    }

    pub fn live_allocations(&self) -> usize {
        self.live_blocks.load(Ordering::SeqCst)
    }

    pub fn peak_allocated(&self) -> usize {
        self.peak_bytes.load(Ordering::SeqCst)
    }
}

impl<A: StorageAllocator> StorageAllocator for TrackingStorage<A> {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        let size = layout.size();
        let previous = self.live_bytes.fetch_add(size, Ordering::SeqCst);
        if let Some(limit) = self.limit {
            if previous + size > limit {
                self.live_bytes.fetch_sub(size, Ordering::SeqCst);
                return Err(AllocError::for_layout(layout));
            }
        }

        match self.inner.allocate(layout) {
            Ok(ptr) => {
                self.live_blocks.fetch_add(1, Ordering::SeqCst);
                self.peak_bytes.fetch_max(previous + size, Ordering::SeqCst);
                Ok(ptr)
            }
            Err(err) => {
                self.live_bytes.fetch_sub(size, Ordering::SeqCst);
                Err(err)
            }
        }
    }

    unsafe fn free(&self, ptr: NonNull<u8>, layout: Layout) {
        unsafe { self.inner.free(ptr, layout) };
        self.live_bytes.fetch_sub(layout.size(), Ordering::SeqCst);
        self.live_blocks.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_storage_roundtrip() {
        let layout = Layout::array::<u64>(16).unwrap();
        let ptr = SystemStorage.allocate(layout).unwrap();
        unsafe {
            ptr.as_ptr().cast::<u64>().write(7);
            assert_eq!(ptr.as_ptr().cast::<u64>().read(), 7);
            SystemStorage.free(ptr, layout);
        }
    }

    #[test]
    fn test_zero_sized_layout_is_aligned() {
        let layout = Layout::from_size_align(0, 16).unwrap();
        let ptr = SystemStorage.allocate(layout).unwrap();
        assert_eq!(ptr.as_ptr() as usize % 16, 0);
        unsafe { SystemStorage.free(ptr, layout) };
    }

    #[test]
    fn test_tracking_counts_live_bytes() {
        let storage = TrackingStorage::new();
        let layout = Layout::array::<u32>(8).unwrap();

        let a = storage.allocate(layout).unwrap();
        let b = storage.allocate(layout).unwrap();
        assert_eq!(storage.currently_allocated(), 64);
        assert_eq!(storage.live_allocations(), 2);

        unsafe {
            storage.free(a, layout);
            storage.free(b, layout);
        }
        assert_eq!(storage.currently_allocated(), 0);
        assert_eq!(storage.live_allocations(), 0);
        assert_eq!(storage.peak_allocated(), 64);
    }

    #[test]
    fn test_tracking_limit_rejects() {
        let storage = TrackingStorage::with_limit(32);
        let layout = Layout::array::<u64>(8).unwrap();

        let err = storage.allocate(layout).unwrap_err();
        assert_eq!(err.size, 64);
        assert_eq!(storage.currently_allocated(), 0);
        assert!(err.to_string().contains("64 bytes"));
    }
}
