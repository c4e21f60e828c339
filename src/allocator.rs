//! The allocator capability.
//!
//! Anything implementing [`allocator_api2::alloc::Allocator`] can back a map
//! or an array, including references to allocators and the process heap
//! ([`Global`](allocator_api2::alloc::Global)). [`AllocatorExt`] adds the three
//! raw operations the containers are written against: allocate, reallocate
//! and free.

use core::ptr::NonNull;

use allocator_api2::alloc::{Allocator, Layout as AllocLayout};

use crate::error::{AllocErrorWithLayout, AllocResult};

mod counting;
mod limited;

pub use counting::CountingAllocator;
pub use limited::LimitedAllocator;

/// Raw memory operations expressed over any [`Allocator`].
pub trait AllocatorExt: Allocator {
    /// Allocates a block fitting `layout`.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the allocation fails.
    fn allocate_layout(&self, layout: AllocLayout) -> AllocResult<NonNull<u8>> {
        self.allocate(layout)
            .map(NonNull::cast)
            .map_err(|_| AllocErrorWithLayout::new(layout))
    }

    /// Resizes the block at `ptr` from `old_layout` to `new_layout`.
    ///
    /// With `ptr == None` this is an allocation of `new_layout`. On failure
    /// the original block, if any, is left valid and unchanged.
    ///
    /// # Safety
    ///
    /// If `ptr` is `Some`, it must denote a block currently allocated by this
    /// allocator with `old_layout`, and `new_layout` must have the same
    /// alignment as `old_layout`.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the allocation fails.
    unsafe fn reallocate(
        &self,
        ptr: Option<NonNull<u8>>,
        old_layout: AllocLayout,
        new_layout: AllocLayout,
    ) -> AllocResult<NonNull<u8>> {
        let Some(ptr) = ptr else {
            return self.allocate_layout(new_layout);
        };

        let result = if new_layout.size() > old_layout.size() {
            // SAFETY: the caller guarantees `ptr` is live with `old_layout`.
            unsafe { self.grow(ptr, old_layout, new_layout) }
        } else if new_layout.size() < old_layout.size() {
            // SAFETY: the caller guarantees `ptr` is live with `old_layout`.
            unsafe { self.shrink(ptr, old_layout, new_layout) }
        } else {
            return Ok(ptr);
        };

        result
            .map(NonNull::cast)
            .map_err(|_| AllocErrorWithLayout::new(new_layout))
    }

    /// Releases the block at `ptr`. `None` is a no-op.
    ///
    /// # Safety
    ///
    /// If `ptr` is `Some`, it must denote a block currently allocated by this
    /// allocator with `layout`.
    unsafe fn free(&self, ptr: Option<NonNull<u8>>, layout: AllocLayout) {
        if let Some(ptr) = ptr {
            // SAFETY: requirements match function requirements
            unsafe { self.deallocate(ptr, layout) };
        }
    }
}

impl<A: Allocator + ?Sized> AllocatorExt for A {}

/// Types that own allocations made by an allocator they do not store.
pub trait DropIn {
    /// Releases everything `self` owns.
    ///
    /// # Safety
    ///
    /// `alloc` must be the allocator used to allocate this object.
    unsafe fn drop_in<A: Allocator>(&mut self, alloc: &A);
}
