//! Error types shared by the map, the array and the allocator helpers.

use core::fmt;

use allocator_api2::alloc::Layout as AllocLayout;

/// Result of an operation whose only failure mode is running out of memory.
pub type AllocResult<T> = Result<T, AllocErrorWithLayout>;

/// An allocator refused to hand out memory for `layout`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AllocErrorWithLayout {
    layout: AllocLayout,
}

impl AllocErrorWithLayout {
    pub(crate) fn new(layout: AllocLayout) -> Self {
        Self { layout }
    }

    /// The layout of the request that failed.
    pub fn layout(&self) -> AllocLayout {
        self.layout
    }
}

impl fmt::Display for AllocErrorWithLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "memory allocation of {} bytes (align {}) failed",
            self.layout.size(),
            self.layout.align()
        )
    }
}

impl core::error::Error for AllocErrorWithLayout {}

/// A runtime [`Layout`](crate::Layout) that cannot describe an allocation:
/// its alignment is not a power of two, or its size overflows once padded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayoutError {
    /// Requested size in bytes.
    pub size: usize,
    /// Requested alignment in bytes.
    pub align: usize,
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid layout: size {} with alignment {}",
            self.size, self.align
        )
    }
}

impl core::error::Error for LayoutError {}

/// Errors reported by [`RawArray`](crate::RawArray).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
    /// The allocator could not satisfy a growth request.
    Alloc(AllocErrorWithLayout),
    /// The requested capacity does not fit in `usize` bytes.
    CapacityOverflow,
    /// An insertion position past the end of the array.
    IndexOutOfBounds {
        /// The offending index.
        index: usize,
        /// Number of items at the time of the call.
        len: usize,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Alloc(err) => write!(f, "{err}"),
            Self::CapacityOverflow => write!(f, "capacity overflow"),
            Self::IndexOutOfBounds { index, len } => {
                write!(f, "index {index} out of bounds for length {len}")
            }
        }
    }
}

impl core::error::Error for Error {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Alloc(err) => Some(err),
            _ => None,
        }
    }
}

impl From<AllocErrorWithLayout> for Error {
    fn from(err: AllocErrorWithLayout) -> Self {
        Self::Alloc(err)
    }
}
