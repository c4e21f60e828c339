//! Runtime layout engine.
//!
//! Keys and values stored by this crate are only known by their footprint at
//! runtime. [`LayoutBuilder`] places such footprints one after another inside
//! a single composite record, in the order they are given, and reports where
//! each one landed.
//!
//! ```
//! use allocated_rbtree::{Layout, LayoutBuilder};
//!
//! let mut builder = LayoutBuilder::new(8);
//! assert_eq!(builder.add(Layout::new(4, 4)), 0);
//! assert_eq!(builder.add(Layout::new(8, 8)), 8);
//!
//! let layout = builder.build();
//! assert_eq!(layout.size(), 16);
//! assert_eq!(layout.align(), 8);
//! ```

use core::mem::{align_of, size_of};

use allocator_api2::alloc::Layout as AllocLayout;

use crate::error::LayoutError;

/// The largest alignment any fundamental type may require on this platform.
pub const MAX_FUNDAMENTAL_ALIGN: usize = max(
    max(align_of::<u128>(), align_of::<u64>()),
    max(align_of::<f64>(), align_of::<usize>()),
);

const fn max(a: usize, b: usize) -> usize {
    if a > b {
        a
    } else {
        b
    }
}

/// Size and alignment of a type that is only known at runtime.
///
/// Unlike [`core::alloc::Layout`] no constraint is placed on the values: an
/// alignment of `0` is accepted and treated as `1` wherever it matters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Layout {
    size: usize,
    align: usize,
}

impl Layout {
    /// Creates a layout from its raw parts.
    pub const fn new(size: usize, align: usize) -> Self {
        Self { size, align }
    }

    /// The layout of `T`.
    pub const fn of<T>() -> Self {
        Self::new(size_of::<T>(), align_of::<T>())
    }

    /// Size in bytes.
    #[inline]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Alignment in bytes, as given (possibly `0`).
    #[inline]
    pub const fn align(&self) -> usize {
        self.align
    }

    /// Alignment with `0` read as `1`.
    #[inline]
    pub(crate) const fn effective_align(&self) -> usize {
        if self.align == 0 {
            1
        } else {
            self.align
        }
    }

    /// Rounds the size up to a multiple of the alignment, giving the stride
    /// between consecutive items of this layout.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the padded size overflows `usize`.
    pub fn pad_to_align(&self) -> Result<Self, LayoutError> {
        self.size
            .checked_next_multiple_of(self.effective_align())
            .map(|size| Self::new(size, self.align))
            .ok_or(LayoutError {
                size: self.size,
                align: self.align,
            })
    }

    /// Converts to the layout type understood by allocators.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the alignment is not a power of two or the size,
    /// rounded up to the alignment, overflows `isize`.
    pub fn to_alloc_layout(&self) -> Result<AllocLayout, LayoutError> {
        AllocLayout::from_size_align(self.size, self.effective_align()).map_err(|_| LayoutError {
            size: self.size,
            align: self.align,
        })
    }
}

/// Accumulates member layouts into one composite layout.
///
/// Members are placed strictly in the order they are added; no reordering is
/// done to reduce padding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayoutBuilder {
    current_offset: usize,
    current_alignment: usize,
    max_alignment: usize,
}

impl LayoutBuilder {
    /// Starts an empty composite.
    ///
    /// `max_alignment` caps the alignment the composite will report, and the
    /// final size is always a multiple of it. `0` selects
    /// [`MAX_FUNDAMENTAL_ALIGN`].
    pub const fn new(max_alignment: usize) -> Self {
        Self {
            current_offset: 0,
            current_alignment: 1,
            max_alignment: if max_alignment == 0 {
                MAX_FUNDAMENTAL_ALIGN
            } else {
                max_alignment
            },
        }
    }

    /// Places `member` after everything added so far and returns its offset.
    ///
    /// # Panics
    ///
    /// Panics if the composite no longer fits in `usize` bytes.
    pub fn add(&mut self, member: Layout) -> usize {
        self.try_add(member)
            .unwrap_or_else(|err| panic!("layout size overflows usize: {err}"))
    }

    /// Like [`LayoutBuilder::add`], but reports overflow instead of panicking.
    /// The builder is left untouched when it fails.
    ///
    /// # Errors
    ///
    /// Returns `Err` carrying `member` if its offset or end does not fit in
    /// `usize`.
    pub fn try_add(&mut self, member: Layout) -> Result<usize, LayoutError> {
        let member_alignment = member.effective_align();
        let overflow = LayoutError {
            size: member.size(),
            align: member.align(),
        };

        let offset = self
            .current_offset
            .checked_next_multiple_of(member_alignment)
            .ok_or(overflow)?;
        let end = offset.checked_add(member.size()).ok_or(overflow)?;

        self.current_offset = end;
        if member_alignment > self.current_alignment {
            self.current_alignment = member_alignment.min(self.max_alignment);
        }

        Ok(offset)
    }

    /// The composite of every member added so far.
    ///
    /// This does not consume the builder: adding more members afterwards
    /// extends the same composite.
    ///
    /// # Panics
    ///
    /// Panics if rounding the size up to `max_alignment` overflows `usize`.
    pub fn build(&self) -> Layout {
        self.try_build()
            .unwrap_or_else(|err| panic!("layout size overflows usize: {err}"))
    }

    /// Like [`LayoutBuilder::build`], but reports overflow instead of
    /// panicking.
    ///
    /// # Errors
    ///
    /// Returns `Err` if rounding the size up to `max_alignment` overflows.
    pub fn try_build(&self) -> Result<Layout, LayoutError> {
        let align = self.current_alignment.max(1);
        let size = self
            .current_offset
            .checked_next_multiple_of(self.max_alignment)
            .ok_or(LayoutError {
                size: self.current_offset,
                align,
            })?;

        Ok(Layout::new(size, align))
    }

    /// Offset one past the last member added.
    #[inline]
    pub fn offset(&self) -> usize {
        self.current_offset
    }

    /// The alignment cap in effect.
    #[inline]
    pub fn max_alignment(&self) -> usize {
        self.max_alignment
    }
}

impl Default for LayoutBuilder {
    fn default() -> Self {
        Self::new(0)
    }
}
