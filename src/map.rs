use core::cmp::Ordering;
use core::fmt;

use allocator_api2::alloc::Allocator;
use tracing::debug;

use crate::allocator::DropIn;
use crate::comparator::Comparator;
use crate::error::{AllocResult, LayoutError};
use crate::layout::Layout;

mod node;
mod wrapper;

#[cfg(test)]
mod tests;

use node::{is_red, Link, NodeLayout, NodePtr};
pub use wrapper::RawMap;

/// A red-black tree map over opaque keys and values whose layouts are chosen
/// at runtime.
///
/// This is the low-level "allocated" type: it does not own an allocator, and
/// every call that creates or destroys nodes takes one. For most uses prefer
/// the [`RawMap`] wrapper, which owns its allocator and frees its nodes on
/// drop. An `AllocatedRawMap` that still holds entries when it goes out of
/// scope leaks them; call [`DropIn::drop_in`] first.
///
/// Each entry lives in a single allocation holding the tree linkage, the key
/// bytes and the value bytes. Keys are ordered by the comparator `C`.
///
/// # Examples
///
/// ```
/// use allocated_rbtree::{AllocatedRawMap, CountingAllocator, DropIn, Layout, NativeOrder};
///
/// let alloc = CountingAllocator::default();
/// let mut map = AllocatedRawMap::new(
///     Layout::of::<u32>(),
///     Layout::of::<u64>(),
///     NativeOrder::<u32>::new(),
/// )?;
///
/// unsafe {
///     map.put_in(&alloc, &7u32.to_ne_bytes(), &49u64.to_ne_bytes())?;
/// }
/// assert_eq!(map.get(&7u32.to_ne_bytes()), Some(&49u64.to_ne_bytes()[..]));
///
/// unsafe { map.drop_in(&alloc) };
/// assert_eq!(alloc.net_allocations(), 0);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct AllocatedRawMap<C> {
    root: Link,
    n: usize,
    layout: NodeLayout,
    comparator: C,
}

impl<C> AllocatedRawMap<C> {
    /// Creates an empty map, computing the node layout once for the given key
    /// and value layouts. No memory is allocated.
    ///
    /// # Errors
    ///
    /// Returns `Err` if a node combining the header, key and value cannot be
    /// described as an allocation (non power-of-two alignment, or overflow).
    pub fn new(key_layout: Layout, value_layout: Layout, comparator: C) -> Result<Self, LayoutError> {
        Ok(Self {
            root: None,
            n: 0,
            layout: NodeLayout::new(key_layout, value_layout)?,
            comparator,
        })
    }

    /// Returns the number of entries in the map.
    #[inline]
    pub fn len(&self) -> usize {
        self.n
    }

    /// Returns `true` if the map contains no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// The layout every key region has.
    pub fn key_layout(&self) -> Layout {
        self.layout.key()
    }

    /// The layout every value region has.
    pub fn value_layout(&self) -> Layout {
        self.layout.value()
    }

    /// The layout of one node allocation: header, key and value.
    pub fn node_layout(&self) -> Layout {
        self.layout.composite()
    }

    /// The comparator that orders the keys.
    pub fn comparator(&self) -> &C {
        &self.comparator
    }

    /// Removes every entry. The map stays usable with the same layouts.
    ///
    /// # Safety
    ///
    /// `alloc` MUST be the allocator used to allocate this map's nodes.
    pub unsafe fn clear_in<A: Allocator>(&mut self, alloc: &A) {
        // Post-order walk that unhooks each child before descending into it,
        // so a node is freed only once both of its links are empty.
        let mut cursor = self.root.take();
        while let Some(node) = cursor {
            if let Some(left) = node.left() {
                node.set_left(None);
                cursor = Some(left);
            } else if let Some(right) = node.right() {
                node.set_right(None);
                cursor = Some(right);
            } else {
                cursor = node.parent();
                // SAFETY: `node` is no longer linked from its parent, and the
                // caller guarantees `alloc` allocated it.
                unsafe { node.deallocate_in(alloc, &self.layout) };
            }
        }
        self.n = 0;
    }

    /// Visits every entry in key order.
    fn walk_in_order<'s>(&'s self, mut f: impl FnMut(&'s [u8], &'s [u8])) {
        let mut cursor = self.root.map(NodePtr::leftmost);
        while let Some(node) = cursor {
            // SAFETY: nodes reachable from the root are live and initialised,
            // and `&self` keeps them unmodified for `'s`.
            unsafe { f(node.key(&self.layout), node.value(&self.layout)) };
            cursor = node.successor();
        }
    }

    fn replace_child(&mut self, parent: Link, old: NodePtr, new: Link) {
        match parent {
            None => self.root = new,
            Some(parent) if parent.left() == Some(old) => parent.set_left(new),
            Some(parent) => parent.set_right(new),
        }
    }

    //   x              y
    //  / \            / \
    // a   y    =>    x   c
    //    / \        / \
    //   b   c      a   b
    fn rotate_left(&mut self, x: NodePtr) {
        let Some(y) = x.right() else {
            unreachable!("left rotation without a right child");
        };

        let b = y.left();
        x.set_right(b);
        if let Some(b) = b {
            b.set_parent(Some(x));
        }

        let parent = x.parent();
        y.set_parent(parent);
        self.replace_child(parent, x, Some(y));

        y.set_left(Some(x));
        x.set_parent(Some(y));
    }

    //     x          y
    //    / \        / \
    //   y   c  =>  a   x
    //  / \            / \
    // a   b          b   c
    fn rotate_right(&mut self, x: NodePtr) {
        let Some(y) = x.left() else {
            unreachable!("right rotation without a left child");
        };

        let b = y.right();
        x.set_left(b);
        if let Some(b) = b {
            b.set_parent(Some(x));
        }

        let parent = x.parent();
        y.set_parent(parent);
        self.replace_child(parent, x, Some(y));

        y.set_right(Some(x));
        x.set_parent(Some(y));
    }

    /// Restores the red-black invariants after `node` was linked in red.
    fn insert_fixup(&mut self, mut node: NodePtr) {
        while let Some(mut parent) = node.parent() {
            if !parent.is_red() {
                break;
            }
            // The root is black, so a red parent always has a parent.
            let Some(grandparent) = parent.parent() else {
                break;
            };

            let parent_is_left = grandparent.left() == Some(parent);
            let uncle = if parent_is_left {
                grandparent.right()
            } else {
                grandparent.left()
            };

            if let Some(uncle) = uncle.filter(|uncle| uncle.is_red()) {
                parent.set_red(false);
                uncle.set_red(false);
                grandparent.set_red(true);
                node = grandparent;
                continue;
            }

            if parent_is_left {
                if parent.right() == Some(node) {
                    self.rotate_left(parent);
                    core::mem::swap(&mut node, &mut parent);
                }
                parent.set_red(false);
                grandparent.set_red(true);
                self.rotate_right(grandparent);
            } else {
                if parent.left() == Some(node) {
                    self.rotate_right(parent);
                    core::mem::swap(&mut node, &mut parent);
                }
                parent.set_red(false);
                grandparent.set_red(true);
                self.rotate_left(grandparent);
            }
            break;
        }

        if let Some(root) = self.root {
            root.set_red(false);
        }
    }

    /// Restores the red-black invariants after a black leaf was removed from
    /// below `parent`, leaving `node` (initially the empty slot) one black
    /// node short.
    fn remove_fixup(&mut self, mut node: Link, mut parent: Link) {
        while let Some(p) = parent {
            if is_red(node) {
                break;
            }

            if p.left() == node {
                let mut sibling = expect_sibling(p.right());

                if sibling.is_red() {
                    sibling.set_red(false);
                    p.set_red(true);
                    self.rotate_left(p);
                    sibling = expect_sibling(p.right());
                }

                if !is_red(sibling.left()) && !is_red(sibling.right()) {
                    sibling.set_red(true);
                    node = Some(p);
                    parent = p.parent();
                    continue;
                }

                if !is_red(sibling.right()) {
                    if let Some(inner) = sibling.left() {
                        inner.set_red(false);
                    }
                    sibling.set_red(true);
                    self.rotate_right(sibling);
                    sibling = expect_sibling(p.right());
                }

                sibling.set_red(p.is_red());
                p.set_red(false);
                if let Some(outer) = sibling.right() {
                    outer.set_red(false);
                }
                self.rotate_left(p);
            } else {
                let mut sibling = expect_sibling(p.left());

                if sibling.is_red() {
                    sibling.set_red(false);
                    p.set_red(true);
                    self.rotate_right(p);
                    sibling = expect_sibling(p.left());
                }

                if !is_red(sibling.left()) && !is_red(sibling.right()) {
                    sibling.set_red(true);
                    node = Some(p);
                    parent = p.parent();
                    continue;
                }

                if !is_red(sibling.left()) {
                    if let Some(inner) = sibling.right() {
                        inner.set_red(false);
                    }
                    sibling.set_red(true);
                    self.rotate_left(sibling);
                    sibling = expect_sibling(p.left());
                }

                sibling.set_red(p.is_red());
                p.set_red(false);
                if let Some(outer) = sibling.left() {
                    outer.set_red(false);
                }
                self.rotate_right(p);
            }

            node = None;
            break;
        }

        if let Some(node) = node {
            node.set_red(false);
        }
    }

    /// Counts the nodes below `link` and returns the count together with the
    /// subtree's black height (absent children count as one black node).
    fn check_subtree(link: Link) -> (usize, usize) {
        let Some(node) = link else {
            return (0, 1);
        };

        if node.is_red() {
            assert!(!is_red(node.parent()), "red node with a red parent");
        }
        for child in [node.left(), node.right()].into_iter().flatten() {
            assert_eq!(child.parent(), Some(node), "child does not link back to its parent");
        }

        let (n_left, left_height) = Self::check_subtree(node.left());
        let (n_right, right_height) = Self::check_subtree(node.right());
        assert_eq!(left_height, right_height, "unequal black heights");

        (
            n_left + n_right + 1,
            left_height + usize::from(!node.is_red()),
        )
    }
}

impl<C: Comparator> AllocatedRawMap<C> {
    fn assert_key(&self, key: &[u8]) {
        assert_eq!(
            key.len(),
            self.layout.key().size(),
            "key region does not match the key layout"
        );
    }

    fn find(&self, key: &[u8]) -> Link {
        self.assert_key(key);

        let mut cursor = self.root;
        while let Some(node) = cursor {
            // SAFETY: nodes reachable from the root are live and initialised.
            let order = self.comparator.compare(key, unsafe { node.key(&self.layout) });
            cursor = match order {
                Ordering::Equal => return Some(node),
                Ordering::Less => node.left(),
                Ordering::Greater => node.right(),
            };
        }
        None
    }

    /// Returns `true` if the map contains an entry for `key`.
    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.find(key).is_some()
    }

    /// Returns the value region stored for `key`.
    ///
    /// # Panics
    ///
    /// Panics if `key` is not exactly as long as the key layout's size.
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        let node = self.find(key)?;
        // SAFETY: `node` is reachable from the root and `&self` keeps it alive.
        Some(unsafe { node.value(&self.layout) })
    }

    /// Returns the value region stored for `key`, for in-place modification.
    ///
    /// # Panics
    ///
    /// Panics if `key` is not exactly as long as the key layout's size.
    pub fn get_mut(&mut self, key: &[u8]) -> Option<&mut [u8]> {
        let node = self.find(key)?;
        // SAFETY: `&mut self` guarantees no other reference into the node.
        Some(unsafe { node.value_mut(&self.layout) })
    }

    /// Inserts `value` under `key`.
    ///
    /// If the key is already present only its value bytes are overwritten;
    /// the stored key bytes are left as they are and no node is allocated.
    ///
    /// # Safety
    ///
    /// `alloc` MUST be the allocator used to allocate this map's nodes.
    ///
    /// # Errors
    ///
    /// Will return `Err` if a new node cannot be allocated, in which case the
    /// map is unchanged.
    ///
    /// # Panics
    ///
    /// Panics if `key` or `value` do not match the layouts' sizes.
    pub unsafe fn put_in<A: Allocator>(
        &mut self,
        alloc: &A,
        key: &[u8],
        value: &[u8],
    ) -> AllocResult<()> {
        self.assert_key(key);
        assert_eq!(
            value.len(),
            self.layout.value().size(),
            "value region does not match the value layout"
        );

        let mut parent = None;
        let mut goes_left = false;
        let mut cursor = self.root;
        while let Some(node) = cursor {
            // SAFETY: nodes reachable from the root are live and initialised.
            match self.comparator.compare(key, unsafe { node.key(&self.layout) }) {
                Ordering::Equal => {
                    // SAFETY: `&mut self` rules out any borrow of the node,
                    // so `value` cannot alias it.
                    unsafe { node.write_value(&self.layout, value) };
                    return Ok(());
                }
                Ordering::Less => {
                    goes_left = true;
                    cursor = node.left();
                }
                Ordering::Greater => {
                    goes_left = false;
                    cursor = node.right();
                }
            }
            parent = Some(node);
        }

        let node = NodePtr::allocate_in(alloc, &self.layout, parent).inspect_err(|err| {
            debug!(
                size = err.layout().size(),
                align = err.layout().align(),
                len = self.n,
                "failed to allocate map node"
            );
        })?;

        // SAFETY: `node` was just allocated with `self.layout`.
        unsafe {
            node.write_key(&self.layout, key);
            node.write_value(&self.layout, value);
        }

        match parent {
            None => self.root = Some(node),
            Some(parent) if goes_left => parent.set_left(Some(node)),
            Some(parent) => parent.set_right(Some(node)),
        }
        self.n += 1;

        self.insert_fixup(node);
        Ok(())
    }

    /// Removes the entry for `key`, returning whether it was present.
    ///
    /// # Safety
    ///
    /// `alloc` MUST be the allocator used to allocate this map's nodes.
    ///
    /// # Panics
    ///
    /// Panics if `key` is not exactly as long as the key layout's size.
    pub unsafe fn remove_in<A: Allocator>(&mut self, alloc: &A, key: &[u8]) -> bool {
        let Some(mut target) = self.find(key) else {
            return false;
        };

        if let (Some(left), Some(_)) = (target.left(), target.right()) {
            let predecessor = left.rightmost();
            // SAFETY: both nodes are live, initialised and distinct.
            unsafe { target.copy_entry_from(predecessor, &self.layout) };
            target = predecessor;
        }

        let child = target.left().or(target.right());
        let parent = target.parent();
        let was_red = target.is_red();

        self.replace_child(parent, target, child);
        if let Some(child) = child {
            child.set_parent(parent);
            child.set_red(was_red);
        }

        // SAFETY: `target` has been unlinked, and the caller guarantees
        // `alloc` allocated it.
        unsafe { target.deallocate_in(alloc, &self.layout) };
        self.n -= 1;

        if child.is_none() && !was_red {
            self.remove_fixup(None, parent);
        }

        true
    }

    /// Verifies the tree's structure, panicking on the first violation.
    ///
    /// Checks that the root is black, that no red node has a red parent,
    /// that parent links mirror child links, that every path has the same
    /// number of black nodes, that the stored length matches the tree and
    /// that keys are in strictly increasing order. Intended for tests and
    /// debugging; it visits every node.
    ///
    /// # Panics
    ///
    /// Panics if the tree is corrupt.
    pub fn check(&self) {
        if let Some(root) = self.root {
            assert!(!root.is_red(), "red root");
            assert!(root.parent().is_none(), "root has a parent");
        }

        let (n, _) = Self::check_subtree(self.root);
        assert_eq!(n, self.n, "stored length does not match the tree");

        let mut previous: Option<&[u8]> = None;
        self.walk_in_order(|key, _| {
            if let Some(previous) = previous {
                assert_eq!(
                    self.comparator.compare(previous, key),
                    Ordering::Less,
                    "keys out of order"
                );
            }
            previous = Some(key);
        });
    }
}

impl<C> DropIn for AllocatedRawMap<C> {
    /// Frees every node.
    ///
    /// # Safety
    ///
    /// `alloc` MUST be the allocator used to allocate this map's nodes.
    unsafe fn drop_in<A: Allocator>(&mut self, alloc: &A) {
        // SAFETY: requirements match function requirements
        unsafe { self.clear_in(alloc) }
    }
}

impl<C> fmt::Debug for AllocatedRawMap<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        self.walk_in_order(|key, value| {
            map.entry(&key, &value);
        });
        map.finish()
    }
}

fn expect_sibling(link: Link) -> NodePtr {
    let Some(sibling) = link else {
        unreachable!("black-height deficit without a sibling");
    };
    sibling
}
