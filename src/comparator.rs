//! Ordering of opaque keys.

use core::cmp::Ordering;
use core::fmt;
use core::marker::PhantomData;

/// A strict total order over key byte regions.
///
/// The order must stay the same for as long as a map uses it; a map built
/// with an inconsistent comparator will still be memory safe but may lose or
/// duplicate keys.
pub trait Comparator {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;
}

impl<F> Comparator for F
where
    F: Fn(&[u8], &[u8]) -> Ordering,
{
    #[inline]
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        self(a, b)
    }
}

/// Lexicographic order of the raw bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Bytewise;

impl Comparator for Bytewise {
    #[inline]
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }
}

/// Primitive integers that can be read back from their native-endian bytes.
pub trait NativeKey: Ord + Copy {
    /// Decodes a key region.
    ///
    /// # Panics
    ///
    /// Panics if `bytes` is not exactly `size_of::<Self>()` long.
    fn from_ne_slice(bytes: &[u8]) -> Self;
}

macro_rules! native_key {
    ($($t:ty),*) => {
        $(
            impl NativeKey for $t {
                #[inline]
                fn from_ne_slice(bytes: &[u8]) -> Self {
                    let Ok(array) = bytes.try_into() else {
                        panic!(
                            "key region of {} bytes cannot hold a {}",
                            bytes.len(),
                            stringify!($t)
                        );
                    };
                    <$t>::from_ne_bytes(array)
                }
            }
        )*
    };
}

native_key!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize);

/// Orders keys holding a native-endian `T` by `T`'s own [`Ord`].
///
/// ```
/// use core::cmp::Ordering;
/// use allocated_rbtree::{Comparator, NativeOrder};
///
/// let cmp = NativeOrder::<i32>::new();
/// assert_eq!(cmp.compare(&(-1i32).to_ne_bytes(), &1i32.to_ne_bytes()), Ordering::Less);
/// ```
pub struct NativeOrder<T>(PhantomData<fn() -> T>);

impl<T> NativeOrder<T> {
    pub const fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for NativeOrder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for NativeOrder<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for NativeOrder<T> {}

impl<T> fmt::Debug for NativeOrder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeOrder<{}>", core::any::type_name::<T>())
    }
}

impl<T: NativeKey> Comparator for NativeOrder<T> {
    #[inline]
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        T::from_ne_slice(a).cmp(&T::from_ne_slice(b))
    }
}
