//! Type-erased containers with runtime layouts and explicit allocator control.
//!
//! The shapes of the keys, values and items stored here are chosen when a
//! container is created, not when the program is compiled. Each container is
//! told the [`Layout`] of what it stores and works on opaque byte regions of
//! that size.
//!
//! - [`RawMap`] - An ordered map implemented as a red-black tree. Every entry
//!   is a single allocation whose header, key and value are placed by the
//!   [`LayoutBuilder`].
//! - [`RawArray`] - A growable array of runtime-sized items.
//!
//! # Quick Start
//!
//! ```
//! use allocated_rbtree::{Layout, NativeOrder, RawMap};
//!
//! let mut map = RawMap::new(Layout::of::<u64>(), Layout::of::<[u8; 3]>(), NativeOrder::<u64>::new())?;
//! map.put(&2u64.to_ne_bytes(), b"two")?;
//! map.put(&1u64.to_ne_bytes(), b"one")?;
//!
//! assert_eq!(map.get(&2u64.to_ne_bytes()), Some(&b"two"[..]));
//! assert_eq!(map.len(), 2);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # The Allocated Pattern
//!
//! Memory comes from any [`allocator_api2::alloc::Allocator`]. The map is
//! available in two forms:
//!
//! - [`RawMap<C, A>`] owns its allocator (which may be a reference to a
//!   shared one) and offers a safe API.
//! - [`AllocatedRawMap<C>`] holds no allocator; the caller passes the same
//!   one to every call that allocates or frees, which is why those calls are
//!   `unsafe`. Useful when embedding the map in another structure that
//!   already carries an allocator.
//!
//! ```
//! use allocated_rbtree::{AllocatedRawMap, Bytewise, CountingAllocator, DropIn, Layout};
//!
//! let alloc = CountingAllocator::default();
//! let mut map = AllocatedRawMap::new(Layout::of::<[u8; 4]>(), Layout::of::<()>(), Bytewise)?;
//!
//! unsafe {
//!     map.put_in(&alloc, b"rust", &[])?;
//! }
//! println!("Allocations: {}", alloc.n_allocations());
//!
//! unsafe { map.drop_in(&alloc) };
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! None of the containers are thread-safe.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

#[cfg(any(feature = "std", test))]
extern crate std;

extern crate alloc;

/// Allocator extension trait and instrumented allocators.
pub mod allocator;
/// Growable array of runtime-shaped items.
pub mod array;
pub mod comparator;
mod error;
pub mod layout;
/// Red-black tree map over runtime-shaped keys and values.
pub mod map;

pub use allocator::{AllocatorExt, CountingAllocator, DropIn, LimitedAllocator};
pub use array::RawArray;
pub use comparator::{Bytewise, Comparator, NativeKey, NativeOrder};
pub use error::{AllocErrorWithLayout, AllocResult, Error, LayoutError};
pub use layout::{Layout, LayoutBuilder, MAX_FUNDAMENTAL_ALIGN};
pub use map::{AllocatedRawMap, RawMap};
