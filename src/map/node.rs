use core::ptr::{self, NonNull};
use core::slice;

use allocator_api2::alloc::{Allocator, Layout as AllocLayout};
use tracing::debug;

use crate::allocator::AllocatorExt;
use crate::error::{AllocResult, LayoutError};
use crate::layout::{Layout, LayoutBuilder};

pub(crate) type Link = Option<NodePtr>;

/// Tree linkage stored at offset zero of every node allocation. The key and
/// value regions follow at the offsets recorded in [`NodeLayout`].
#[repr(C)]
pub(crate) struct NodeHeader {
    red: bool,
    parent: Link,
    left: Link,
    right: Link,
}

/// Where the parts of a node live inside its allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct NodeLayout {
    composite: Layout,
    alloc_layout: AllocLayout,
    key: Layout,
    value: Layout,
    key_offset: usize,
    value_offset: usize,
}

impl NodeLayout {
    pub(crate) fn new(key: Layout, value: Layout) -> Result<Self, LayoutError> {
        let mut builder = LayoutBuilder::new(0);
        let header_offset = builder.add(Layout::of::<NodeHeader>());
        debug_assert_eq!(header_offset, 0);
        let key_offset = builder.try_add(key)?;
        let value_offset = builder.try_add(value)?;

        let composite = builder.try_build()?;
        let alloc_layout = composite.to_alloc_layout()?;

        debug!(
            size = composite.size(),
            align = composite.align(),
            key_offset,
            value_offset,
            "computed node layout"
        );

        Ok(Self {
            composite,
            alloc_layout,
            key,
            value,
            key_offset,
            value_offset,
        })
    }

    pub(crate) fn composite(&self) -> Layout {
        self.composite
    }

    pub(crate) fn key(&self) -> Layout {
        self.key
    }

    pub(crate) fn value(&self) -> Layout {
        self.value
    }

    #[cfg(test)]
    pub(crate) fn key_offset(&self) -> usize {
        self.key_offset
    }

    #[cfg(test)]
    pub(crate) fn value_offset(&self) -> usize {
        self.value_offset
    }
}

/// A pointer to a live node.
///
/// `NodePtr`s are only produced by [`NodePtr::allocate_in`] and by reading
/// the links of other live nodes. A node stops being referenced the moment it
/// is unlinked and passed to [`NodePtr::deallocate_in`], which is what makes
/// the safe accessors below sound.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct NodePtr(NonNull<NodeHeader>);

impl NodePtr {
    /// Allocates a red, childless node hanging off `parent`. The key and value
    /// regions are left uninitialised.
    pub(crate) fn allocate_in<A: Allocator>(
        alloc: &A,
        layout: &NodeLayout,
        parent: Link,
    ) -> AllocResult<Self> {
        let header = alloc.allocate_layout(layout.alloc_layout)?.cast::<NodeHeader>();
        // SAFETY: the block is fresh, at least as large as the composite,
        // whose first member is the header, and aligned for it.
        unsafe {
            header.as_ptr().write(NodeHeader {
                red: true,
                parent,
                left: None,
                right: None,
            });
        }
        Ok(Self(header))
    }

    /// # Safety
    ///
    /// `alloc` and `layout` MUST be the ones used to allocate this node, and
    /// the node must no longer be reachable from any link.
    pub(crate) unsafe fn deallocate_in<A: Allocator>(self, alloc: &A, layout: &NodeLayout) {
        // SAFETY: requirements match function requirements
        unsafe { alloc.deallocate(self.0.cast(), layout.alloc_layout) }
    }

    #[inline]
    fn header(self) -> *mut NodeHeader {
        self.0.as_ptr()
    }

    #[inline]
    pub(crate) fn is_red(self) -> bool {
        // SAFETY: `self` points to a live node.
        unsafe { (*self.header()).red }
    }

    #[inline]
    pub(crate) fn set_red(self, red: bool) {
        // SAFETY: `self` points to a live node.
        unsafe { (*self.header()).red = red }
    }

    #[inline]
    pub(crate) fn parent(self) -> Link {
        // SAFETY: `self` points to a live node.
        unsafe { (*self.header()).parent }
    }

    #[inline]
    pub(crate) fn set_parent(self, parent: Link) {
        // SAFETY: `self` points to a live node.
        unsafe { (*self.header()).parent = parent }
    }

    #[inline]
    pub(crate) fn left(self) -> Link {
        // SAFETY: `self` points to a live node.
        unsafe { (*self.header()).left }
    }

    #[inline]
    pub(crate) fn set_left(self, left: Link) {
        // SAFETY: `self` points to a live node.
        unsafe { (*self.header()).left = left }
    }

    #[inline]
    pub(crate) fn right(self) -> Link {
        // SAFETY: `self` points to a live node.
        unsafe { (*self.header()).right }
    }

    #[inline]
    pub(crate) fn set_right(self, right: Link) {
        // SAFETY: `self` points to a live node.
        unsafe { (*self.header()).right = right }
    }

    /// The node with the smallest key in this subtree.
    pub(crate) fn leftmost(self) -> Self {
        let mut node = self;
        while let Some(left) = node.left() {
            node = left;
        }
        node
    }

    /// The node with the largest key in this subtree.
    pub(crate) fn rightmost(self) -> Self {
        let mut node = self;
        while let Some(right) = node.right() {
            node = right;
        }
        node
    }

    /// The next node in key order, climbing through parent links if needed.
    pub(crate) fn successor(self) -> Link {
        if let Some(right) = self.right() {
            return Some(right.leftmost());
        }

        let mut child = self;
        let mut parent = self.parent();
        while let Some(node) = parent {
            if node.left() == Some(child) {
                return Some(node);
            }
            child = node;
            parent = node.parent();
        }
        None
    }

    #[inline]
    fn region(self, offset: usize) -> *mut u8 {
        // SAFETY: `offset` comes from the node's own layout and stays inside
        // the allocation.
        unsafe { self.0.as_ptr().cast::<u8>().add(offset) }
    }

    /// # Safety
    ///
    /// `layout` MUST be the layout the node was allocated with, its key must
    /// have been written, and the node must outlive `'a` without being
    /// mutated.
    pub(crate) unsafe fn key<'a>(self, layout: &NodeLayout) -> &'a [u8] {
        // SAFETY: requirements match function requirements
        unsafe { slice::from_raw_parts(self.region(layout.key_offset), layout.key.size()) }
    }

    /// # Safety
    ///
    /// As for [`NodePtr::key`], for the value region.
    pub(crate) unsafe fn value<'a>(self, layout: &NodeLayout) -> &'a [u8] {
        // SAFETY: requirements match function requirements
        unsafe { slice::from_raw_parts(self.region(layout.value_offset), layout.value.size()) }
    }

    /// # Safety
    ///
    /// As for [`NodePtr::value`], and no other reference to the value region
    /// may exist during `'a`.
    pub(crate) unsafe fn value_mut<'a>(self, layout: &NodeLayout) -> &'a mut [u8] {
        // SAFETY: requirements match function requirements
        unsafe { slice::from_raw_parts_mut(self.region(layout.value_offset), layout.value.size()) }
    }

    /// # Safety
    ///
    /// `layout` MUST be the layout the node was allocated with, and `key`
    /// must not alias the node.
    pub(crate) unsafe fn write_key(self, layout: &NodeLayout, key: &[u8]) {
        debug_assert_eq!(key.len(), layout.key.size());
        // SAFETY: requirements match function requirements
        unsafe { ptr::copy_nonoverlapping(key.as_ptr(), self.region(layout.key_offset), key.len()) }
    }

    /// # Safety
    ///
    /// `layout` MUST be the layout the node was allocated with, and `value`
    /// must not alias the node.
    pub(crate) unsafe fn write_value(self, layout: &NodeLayout, value: &[u8]) {
        debug_assert_eq!(value.len(), layout.value.size());
        // SAFETY: requirements match function requirements
        unsafe {
            ptr::copy_nonoverlapping(value.as_ptr(), self.region(layout.value_offset), value.len())
        }
    }

    /// Overwrites this node's key and value with `other`'s.
    ///
    /// # Safety
    ///
    /// Both nodes MUST have been allocated with `layout`, be initialised and
    /// be distinct.
    pub(crate) unsafe fn copy_entry_from(self, other: Self, layout: &NodeLayout) {
        debug_assert_ne!(self, other);
        // SAFETY: requirements match function requirements
        unsafe {
            ptr::copy_nonoverlapping(
                other.region(layout.key_offset),
                self.region(layout.key_offset),
                layout.key.size(),
            );
            ptr::copy_nonoverlapping(
                other.region(layout.value_offset),
                self.region(layout.value_offset),
                layout.value.size(),
            );
        }
    }
}

/// Absent links count as black.
#[inline]
pub(crate) fn is_red(link: Link) -> bool {
    link.is_some_and(NodePtr::is_red)
}
