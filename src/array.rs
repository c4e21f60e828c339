//! A growable array of runtime-shaped items.
//!
//! [`RawArray`] stores items whose [`Layout`] is only known at runtime, one
//! after another at a stride of the item size padded to its alignment. The
//! buffer grows by doubling and shrinks by halving, always through the
//! allocator's reallocate operation.

use core::fmt;
use core::iter::FusedIterator;
use core::ptr::{self, NonNull};
use core::slice;

use allocator_api2::alloc::{Allocator, Global, Layout as AllocLayout};
use tracing::{debug, trace};

use crate::allocator::AllocatorExt;
use crate::error::{Error, LayoutError};
use crate::layout::Layout;

/// A growable array of opaque items that owns its allocator.
///
/// # Example
///
/// ```
/// use allocated_rbtree::{Layout, RawArray};
///
/// let mut array = RawArray::new(Layout::of::<u16>())?;
/// array.push(&1u16.to_ne_bytes())?;
/// array.push(&3u16.to_ne_bytes())?;
/// array.insert(1, &2u16.to_ne_bytes())?;
///
/// let items: Vec<u16> = array
///     .iter()
///     .map(|item| u16::from_ne_bytes(item.try_into().unwrap()))
///     .collect();
/// assert_eq!(items, [1, 2, 3]);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct RawArray<A: Allocator = Global> {
    items: Option<NonNull<u8>>,
    len: usize,
    capacity: usize,
    item: Layout,
    stride: usize,
    alloc: A,
}

impl RawArray {
    /// Creates an empty array backed by the global allocator.
    ///
    /// # Errors
    ///
    /// Returns `Err` if `item` cannot describe an allocation.
    pub fn new(item: Layout) -> Result<Self, LayoutError> {
        Self::new_in(item, Global)
    }
}

impl<A: Allocator> RawArray<A> {
    /// Creates an empty array that allocates from `alloc`. Nothing is
    /// allocated until the first item is added.
    ///
    /// # Errors
    ///
    /// Returns `Err` if `item` cannot describe an allocation.
    pub fn new_in(item: Layout, alloc: A) -> Result<Self, LayoutError> {
        item.to_alloc_layout()?;
        let stride = item.pad_to_align()?.size();
        Ok(Self {
            items: None,
            len: 0,
            capacity: 0,
            item,
            stride,
            alloc,
        })
    }

    /// Returns the number of items.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the array holds no items.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of items the current buffer can hold.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The layout every item has.
    pub fn item_layout(&self) -> Layout {
        self.item
    }

    /// The allocator the buffer comes from.
    pub fn allocator(&self) -> &A {
        &self.alloc
    }

    fn buffer_layout(&self, capacity: usize) -> Result<AllocLayout, Error> {
        let size = self
            .stride
            .checked_mul(capacity)
            .ok_or(Error::CapacityOverflow)?;
        AllocLayout::from_size_align(size, self.item.effective_align())
            .map_err(|_| Error::CapacityOverflow)
    }

    fn item_ptr(&self, index: usize) -> *mut u8 {
        match self.items {
            // SAFETY: callers only pass indices within capacity.
            Some(items) => unsafe { items.as_ptr().add(index * self.stride) },
            None => NonNull::dangling().as_ptr(),
        }
    }

    /// Moves the items into a buffer of exactly `capacity` slots.
    fn resize(&mut self, capacity: usize) -> Result<(), Error> {
        debug_assert!(capacity >= self.len);

        if self.stride == 0 {
            self.capacity = capacity;
            return Ok(());
        }

        let old_layout = self.buffer_layout(self.capacity)?;
        if capacity == 0 {
            // SAFETY: `self.items` was allocated by `self.alloc` with `old_layout`.
            unsafe { self.alloc.free(self.items.take(), old_layout) };
            self.capacity = 0;
            return Ok(());
        }

        let new_layout = self.buffer_layout(capacity)?;
        // SAFETY: `self.items` was allocated by `self.alloc` with
        // `old_layout`, which has the same alignment as `new_layout`.
        let items = unsafe { self.alloc.reallocate(self.items, old_layout, new_layout) }?;

        trace!(from = self.capacity, to = capacity, "resized array buffer");
        self.items = Some(items);
        self.capacity = capacity;
        Ok(())
    }

    /// Makes room for at least `additional` more items, doubling the
    /// capacity until it fits.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the capacity would overflow or the allocation fails;
    /// the array is unchanged in both cases.
    pub fn reserve(&mut self, additional: usize) -> Result<(), Error> {
        let needed = self
            .len
            .checked_add(additional)
            .ok_or(Error::CapacityOverflow)?;
        if needed <= self.capacity {
            return Ok(());
        }

        let mut capacity = self.capacity.max(1);
        while capacity < needed {
            capacity = capacity.checked_mul(2).ok_or(Error::CapacityOverflow)?;
        }

        self.resize(capacity).inspect_err(|err| {
            debug!(error = %err, len = self.len, capacity, "failed to grow array");
        })
    }

    /// Halves the capacity while at most half of it is in use, releasing the
    /// buffer entirely once empty. If the allocator cannot shrink the buffer
    /// the old one is kept.
    pub fn shrink_to_fit(&mut self) {
        let mut capacity = self.capacity;
        while capacity != 0 && self.len <= capacity / 2 {
            capacity /= 2;
        }

        if capacity < self.capacity {
            if let Err(err) = self.resize(capacity) {
                debug!(error = %err, capacity, "keeping array buffer after failed shrink");
            }
        }
    }

    /// Inserts one item at `index`, shifting later items up.
    ///
    /// # Errors
    ///
    /// Returns `Err` if `index > len` or the buffer cannot grow.
    ///
    /// # Panics
    ///
    /// Panics if `item` is not exactly as long as the item layout's size.
    pub fn insert(&mut self, index: usize, item: &[u8]) -> Result<(), Error> {
        assert_eq!(
            item.len(),
            self.item.size(),
            "item does not match the item layout"
        );
        self.open_gap(index, 1)?;
        // SAFETY: `open_gap` made slot `index` available; `item` cannot alias
        // the buffer while `&mut self` is held.
        unsafe { ptr::copy_nonoverlapping(item.as_ptr(), self.item_ptr(index), item.len()) };
        self.len += 1;
        Ok(())
    }

    /// Inserts `count` items at `index`. `items` holds them back to back at
    /// the array's stride (the item size padded to its alignment).
    ///
    /// # Errors
    ///
    /// Returns `Err` if `index > len` or the buffer cannot grow.
    ///
    /// # Panics
    ///
    /// Panics if `items` is not exactly `count` strides long.
    pub fn insert_many(&mut self, index: usize, items: &[u8], count: usize) -> Result<(), Error> {
        assert_eq!(
            Some(items.len()),
            self.stride.checked_mul(count),
            "items do not match the item stride"
        );
        self.open_gap(index, count)?;
        // SAFETY: `open_gap` made `count` slots available at `index`.
        unsafe { ptr::copy_nonoverlapping(items.as_ptr(), self.item_ptr(index), items.len()) };
        self.len += count;
        Ok(())
    }

    /// Reserves room for `count` items and shifts the items at and after
    /// `index` up by `count` slots. `len` is left unchanged.
    fn open_gap(&mut self, index: usize, count: usize) -> Result<(), Error> {
        if index > self.len {
            return Err(Error::IndexOutOfBounds {
                index,
                len: self.len,
            });
        }
        self.reserve(count)?;

        if self.stride != 0 && count != 0 {
            // SAFETY: both ranges lie within the reserved capacity.
            unsafe {
                ptr::copy(
                    self.item_ptr(index),
                    self.item_ptr(index + count),
                    (self.len - index) * self.stride,
                );
            }
        }
        Ok(())
    }

    /// Appends one item.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the buffer cannot grow.
    pub fn push(&mut self, item: &[u8]) -> Result<(), Error> {
        self.insert(self.len, item)
    }

    /// Removes the item at `index`. Out of range indices are ignored.
    pub fn remove(&mut self, index: usize) {
        self.remove_many(index, 1);
    }

    /// Removes up to `count` items starting at `index`, then shrinks the
    /// buffer. Out of range indices are ignored and `count` is clamped to the
    /// items available.
    pub fn remove_many(&mut self, index: usize, count: usize) {
        if index >= self.len {
            return;
        }
        let count = count.min(self.len - index);

        if self.stride != 0 {
            // SAFETY: both ranges lie within the initialised items.
            unsafe {
                ptr::copy(
                    self.item_ptr(index + count),
                    self.item_ptr(index),
                    (self.len - index - count) * self.stride,
                );
            }
        }
        self.len -= count;
        self.shrink_to_fit();
    }

    /// Removes the last item, copying it into `out` if given. Returns `false`
    /// if the array was empty.
    ///
    /// # Panics
    ///
    /// Panics if `out` is not exactly as long as the item layout's size.
    pub fn pop(&mut self, out: Option<&mut [u8]>) -> bool {
        let Some(last) = self.len.checked_sub(1) else {
            return false;
        };

        if let Some(out) = out {
            if let Some(item) = self.get(last) {
                out.copy_from_slice(item);
            }
        }
        self.remove(last);
        true
    }

    /// The first item.
    pub fn first(&self) -> Option<&[u8]> {
        self.get(0)
    }

    /// The item at `index`.
    pub fn get(&self, index: usize) -> Option<&[u8]> {
        if index >= self.len {
            return None;
        }
        // SAFETY: `index < len`, so the slot is allocated and initialised.
        Some(unsafe { slice::from_raw_parts(self.item_ptr(index), self.item.size()) })
    }

    /// The item at `index`, for in-place modification.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut [u8]> {
        if index >= self.len {
            return None;
        }
        // SAFETY: `index < len`, and `&mut self` guarantees exclusivity.
        Some(unsafe { slice::from_raw_parts_mut(self.item_ptr(index), self.item.size()) })
    }

    /// Iterates over the items in order.
    pub fn iter(&self) -> Iter<'_, A> {
        Iter {
            array: self,
            index: 0,
        }
    }
}

impl<A: Allocator> Drop for RawArray<A> {
    fn drop(&mut self) {
        if let Ok(layout) = self.buffer_layout(self.capacity) {
            // SAFETY: `self.items` was allocated by `self.alloc` with `layout`.
            unsafe { self.alloc.free(self.items.take(), layout) };
        }
    }
}

impl<A: Allocator> fmt::Debug for RawArray<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// Iterator over the items of a [`RawArray`].
pub struct Iter<'a, A: Allocator> {
    array: &'a RawArray<A>,
    index: usize,
}

impl<'a, A: Allocator> Iterator for Iter<'a, A> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.array.get(self.index)?;
        self.index += 1;
        Some(item)
    }

    fn nth(&mut self, n: usize) -> Option<Self::Item> {
        self.index = self.index.saturating_add(n).min(self.array.len());
        self.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.array.len() - self.index;
        (remaining, Some(remaining))
    }
}

impl<A: Allocator> ExactSizeIterator for Iter<'_, A> {}

impl<A: Allocator> FusedIterator for Iter<'_, A> {}

impl<'a, A: Allocator> IntoIterator for &'a RawArray<A> {
    type Item = &'a [u8];
    type IntoIter = Iter<'a, A>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
