//! Ergonomic wrapper for [`AllocatedRawMap`].
//!
//! [`RawMap<C, A>`] owns its allocator, so none of its methods need `unsafe`
//! or an allocator argument, and it frees its nodes when dropped. To share an
//! allocator between several maps, give each map a reference to it.

use core::fmt;

use allocator_api2::alloc::{Allocator, Global};

use crate::allocator::DropIn;
use crate::comparator::Comparator;
use crate::error::{AllocResult, LayoutError};
use crate::layout::Layout;

use super::AllocatedRawMap;

/// An ordered map over runtime-shaped keys and values that owns its
/// allocator.
///
/// # Example
///
/// ```
/// use allocated_rbtree::{Layout, NativeOrder, RawMap};
///
/// let mut map = RawMap::new(Layout::of::<u32>(), Layout::of::<u32>(), NativeOrder::<u32>::new())?;
/// map.put(&1u32.to_ne_bytes(), &10u32.to_ne_bytes())?;
/// map.put(&2u32.to_ne_bytes(), &20u32.to_ne_bytes())?;
///
/// assert_eq!(map.get(&1u32.to_ne_bytes()), Some(&10u32.to_ne_bytes()[..]));
/// assert!(map.remove(&2u32.to_ne_bytes()));
/// assert_eq!(map.len(), 1);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct RawMap<C, A: Allocator = Global> {
    alloc: A,
    pub(super) raw: AllocatedRawMap<C>,
}

impl<C: Comparator> RawMap<C> {
    /// Creates an empty map backed by the global allocator.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the key and value layouts cannot be combined into a
    /// node allocation.
    pub fn new(key_layout: Layout, value_layout: Layout, comparator: C) -> Result<Self, LayoutError> {
        Self::new_in(key_layout, value_layout, comparator, Global)
    }
}

impl<C, A: Allocator> Drop for RawMap<C, A> {
    fn drop(&mut self) {
        // SAFETY: `self.raw`'s nodes were allocated by `self.alloc`
        unsafe { self.raw.drop_in(&self.alloc) }
    }
}

impl<C, A: Allocator> RawMap<C, A> {
    /// Creates an empty map that allocates its nodes from `alloc`.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the key and value layouts cannot be combined into a
    /// node allocation.
    pub fn new_in(
        key_layout: Layout,
        value_layout: Layout,
        comparator: C,
        alloc: A,
    ) -> Result<Self, LayoutError> {
        let raw = AllocatedRawMap::new(key_layout, value_layout, comparator)?;
        Ok(Self { alloc, raw })
    }

    /// Returns the number of entries in the map.
    #[inline]
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    /// Returns `true` if the map contains no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// The layout every key region has.
    pub fn key_layout(&self) -> Layout {
        self.raw.key_layout()
    }

    /// The layout every value region has.
    pub fn value_layout(&self) -> Layout {
        self.raw.value_layout()
    }

    /// The layout of one node allocation.
    pub fn node_layout(&self) -> Layout {
        self.raw.node_layout()
    }

    /// The allocator the nodes come from.
    pub fn allocator(&self) -> &A {
        &self.alloc
    }

    /// The comparator that orders the keys.
    pub fn comparator(&self) -> &C {
        self.raw.comparator()
    }

    /// Removes every entry, freeing all nodes.
    pub fn clear(&mut self) {
        // SAFETY: `self.alloc` was used to allocate `self.raw`'s nodes
        unsafe { self.raw.clear_in(&self.alloc) }
    }
}

impl<C: Comparator, A: Allocator> RawMap<C, A> {
    /// Returns `true` if the map contains an entry for `key`.
    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.raw.contains_key(key)
    }

    /// Returns the value region stored for `key`.
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.raw.get(key)
    }

    /// Returns the value region stored for `key`, for in-place modification.
    pub fn get_mut(&mut self, key: &[u8]) -> Option<&mut [u8]> {
        self.raw.get_mut(key)
    }

    /// Inserts `value` under `key`, overwriting the value of an existing
    /// entry in place.
    ///
    /// # Errors
    ///
    /// Returns an error if a new node cannot be allocated; the map is left
    /// unchanged.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> AllocResult<()> {
        // SAFETY: `self.alloc` was used to allocate `self.raw`'s nodes
        unsafe { self.raw.put_in(&self.alloc, key, value) }
    }

    /// Removes the entry for `key`, returning whether it was present.
    pub fn remove(&mut self, key: &[u8]) -> bool {
        // SAFETY: `self.alloc` was used to allocate `self.raw`'s nodes
        unsafe { self.raw.remove_in(&self.alloc, key) }
    }

    /// Verifies the red-black invariants. See [`AllocatedRawMap::check`].
    pub fn check(&self) {
        self.raw.check()
    }
}

impl<C, A: Allocator> fmt::Debug for RawMap<C, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.raw, f)
    }
}
