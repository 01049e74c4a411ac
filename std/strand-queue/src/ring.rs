//!
//! Fixed-capacity ring storage.
//!
//! The slot array is allocated once through the queue's `StorageAllocator`
//! and never grows. Slots `[head, head + len)` (modulo capacity) hold live
//! values; everything else is uninitialised.
//!

use std::alloc::Layout;
use std::marker::PhantomData;
use std::ptr::NonNull;

use strand_core::{CoreError, StorageAllocator};

pub(crate) struct SlotRing<T, A: StorageAllocator> {
    slots: NonNull<T>,
    layout: Layout,
    capacity: usize,
    head: usize,
    len: usize,
    allocator: A,
    _owns: PhantomData<T>,
}

// SAFETY: the ring owns its values exclusively; moving it moves them.
unsafe impl<T: Send, A: StorageAllocator> Send for SlotRing<T, A> {}

impl<T, A: StorageAllocator> SlotRing<T, A> {
    pub(crate) fn new(capacity: usize, allocator: A) -> Result<Self, CoreError> {
        let layout = Layout::array::<T>(capacity).map_err(|_| {
            CoreError::InvalidConfig(format!(
                "capacity {} overflows the addressable size",
                capacity
            ))
        })?;
        let slots = allocator.allocate(layout)?.cast::<T>();
        Ok(Self {
            slots,
            layout,
            capacity,
            head: 0,
            len: 0,
            allocator,
            _owns: PhantomData,
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline(always)]
    fn slot(&self, index: usize) -> *mut T {
        // index < capacity, inside the allocation
        unsafe { self.slots.as_ptr().add(index % self.capacity) }
    }

    /// Appends at the tail, handing the value back when every slot is taken.
    pub(crate) fn push(&mut self, value: T) -> Result<(), T> {
        if self.len == self.capacity {
            return Err(value);
        }
        let tail = self.slot(self.head + self.len);
        unsafe { tail.write(value) };
        self.len += 1;
        Ok(())
    }

    pub(crate) fn pop(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        let value = unsafe { self.slot(self.head).read() };
        self.head = (self.head + 1) % self.capacity;
        self.len -= 1;
        Some(value)
    }
}

impl<T, A: StorageAllocator> Drop for SlotRing<T, A> {
    fn drop(&mut self) {
        while self.pop().is_some() {}
        unsafe { self.allocator.free(self.slots.cast::<u8>(), self.layout) };
    }
}
