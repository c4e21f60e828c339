use core::cell::Cell;
use core::ptr::NonNull;

use allocator_api2::alloc::{AllocError, Allocator, Layout};

/// An allocator that forwards to `A` until a budget of requests runs out,
/// then refuses every allocation and growth.
///
/// Shrinking and deallocation are always forwarded. Useful for exercising
/// out-of-memory paths deterministically.
#[derive(Debug)]
pub struct LimitedAllocator<A: Allocator> {
    inner: A,
    remaining: Cell<usize>,
}

impl<A: Allocator> LimitedAllocator<A> {
    /// Allows `budget` successful allocations or growths.
    pub fn new(inner: A, budget: usize) -> Self {
        Self {
            inner,
            remaining: Cell::new(budget),
        }
    }

    /// Requests still allowed.
    pub fn remaining(&self) -> usize {
        self.remaining.get()
    }

    /// Resets the budget.
    pub fn set_remaining(&self, budget: usize) {
        self.remaining.set(budget);
    }

    fn take_one(&self) -> Result<(), AllocError> {
        match self.remaining.get() {
            0 => Err(AllocError),
            n => {
                self.remaining.set(n - 1);
                Ok(())
            }
        }
    }
}

// SAFETY: requests are either refused or forwarded unchanged to `inner`.
unsafe impl<A: Allocator> Allocator for LimitedAllocator<A> {
    fn allocate(&self, layout: Layout) -> Result<NonNull<[u8]>, AllocError> {
        self.take_one()?;
        self.inner.allocate(layout)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: `ptr` was allocated by `inner`.
        unsafe { self.inner.deallocate(ptr, layout) }
    }

    unsafe fn grow(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> Result<NonNull<[u8]>, AllocError> {
        self.take_one()?;
        // SAFETY: requirements match function requirements
        unsafe { self.inner.grow(ptr, old_layout, new_layout) }
    }

    unsafe fn shrink(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> Result<NonNull<[u8]>, AllocError> {
        // SAFETY: requirements match function requirements
        unsafe { self.inner.shrink(ptr, old_layout, new_layout) }
    }
}
