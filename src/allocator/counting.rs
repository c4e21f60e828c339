use core::cell::Cell;
use core::ptr::NonNull;

use allocator_api2::alloc::{AllocError, Allocator, Global, Layout};

/// An allocator that forwards to `A` and keeps a tally of what went through it.
///
/// Counters use [`Cell`], so the allocator is usable through a shared
/// reference but is not `Sync`.
///
/// ```
/// use allocated_rbtree::{Bytewise, CountingAllocator, Layout, RawMap};
///
/// let alloc = CountingAllocator::default();
/// {
///     let mut map = RawMap::new_in(Layout::of::<u32>(), Layout::of::<u32>(), Bytewise, &alloc)?;
///     map.put(&1u32.to_ne_bytes(), &2u32.to_ne_bytes())?;
///     assert_eq!(alloc.net_allocations(), 1);
/// }
/// assert_eq!(alloc.net_allocations(), 0);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct CountingAllocator<A: Allocator = Global> {
    inner: A,
    n_allocations: Cell<usize>,
    n_deallocations: Cell<usize>,
    n_reallocations: Cell<usize>,
    n_bytes_allocated: Cell<usize>,
    n_bytes_deallocated: Cell<usize>,
}

impl Default for CountingAllocator<Global> {
    fn default() -> Self {
        Self::new(Global)
    }
}

impl<A: Allocator> CountingAllocator<A> {
    /// Wraps `inner` with every counter at zero.
    pub fn new(inner: A) -> Self {
        Self {
            inner,
            n_allocations: Cell::new(0),
            n_deallocations: Cell::new(0),
            n_reallocations: Cell::new(0),
            n_bytes_allocated: Cell::new(0),
            n_bytes_deallocated: Cell::new(0),
        }
    }

    /// Number of successful allocations.
    pub fn n_allocations(&self) -> usize {
        self.n_allocations.get()
    }

    /// Number of deallocations.
    pub fn n_deallocations(&self) -> usize {
        self.n_deallocations.get()
    }

    /// Number of successful in-place or moving resizes.
    pub fn n_reallocations(&self) -> usize {
        self.n_reallocations.get()
    }

    /// Bytes handed out, including the new size of every resize.
    pub fn n_bytes_allocated(&self) -> usize {
        self.n_bytes_allocated.get()
    }

    /// Bytes returned, including the old size of every resize.
    pub fn n_bytes_deallocated(&self) -> usize {
        self.n_bytes_deallocated.get()
    }

    /// Blocks currently outstanding.
    pub fn net_allocations(&self) -> isize {
        self.n_allocations() as isize - self.n_deallocations() as isize
    }

    /// Bytes currently outstanding.
    pub fn net_bytes_allocated(&self) -> isize {
        self.n_bytes_allocated() as isize - self.n_bytes_deallocated() as isize
    }

    /// The allocator requests are forwarded to.
    pub fn inner(&self) -> &A {
        &self.inner
    }

    fn record_resize(&self, old_layout: Layout, new_layout: Layout) {
        bump(&self.n_reallocations, 1);
        bump(&self.n_bytes_deallocated, old_layout.size());
        bump(&self.n_bytes_allocated, new_layout.size());
    }
}

fn bump(counter: &Cell<usize>, by: usize) {
    counter.set(counter.get() + by);
}

// SAFETY: every request is forwarded unchanged to `inner`.
unsafe impl<A: Allocator> Allocator for CountingAllocator<A> {
    fn allocate(&self, layout: Layout) -> Result<NonNull<[u8]>, AllocError> {
        let ptr = self.inner.allocate(layout)?;
        bump(&self.n_allocations, 1);
        bump(&self.n_bytes_allocated, layout.size());
        Ok(ptr)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        bump(&self.n_deallocations, 1);
        bump(&self.n_bytes_deallocated, layout.size());
        // SAFETY: `ptr` was allocated by `inner` through `allocate`.
        unsafe { self.inner.deallocate(ptr, layout) }
    }

    unsafe fn grow(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> Result<NonNull<[u8]>, AllocError> {
        // SAFETY: requirements match function requirements
        let ptr = unsafe { self.inner.grow(ptr, old_layout, new_layout) }?;
        self.record_resize(old_layout, new_layout);
        Ok(ptr)
    }

    unsafe fn shrink(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> Result<NonNull<[u8]>, AllocError> {
        // SAFETY: requirements match function requirements
        let ptr = unsafe { self.inner.shrink(ptr, old_layout, new_layout) }?;
        self.record_resize(old_layout, new_layout);
        Ok(ptr)
    }
}
