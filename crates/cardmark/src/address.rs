//! Heap addresses and reserved address ranges.

use std::fmt;
use std::ops::Sub;

use crate::error::BarrierError;

/// A byte address inside the managed heap.
///
/// Deliberately not a general integer: addresses can be ordered, subtracted
/// to get a byte distance, and offset by a byte count. Adding two addresses
/// is not expressible.
///
/// Null is never represented by a `HeapAddress`; a slot that may be null
/// holds an `Option<HeapAddress>`. Address zero is an ordinary address.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct HeapAddress(usize);

impl HeapAddress {
    /// Wrap a raw address.
    #[inline]
    #[must_use]
    pub const fn new(addr: usize) -> Self {
        Self(addr)
    }

    /// The raw address value.
    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// Offset this address by `bytes`.
    ///
    /// # Panics
    ///
    /// Panics on address-space overflow.
    #[inline]
    #[must_use]
    pub const fn add_bytes(self, bytes: usize) -> Self {
        match self.0.checked_add(bytes) {
            Some(addr) => Self(addr),
            None => panic!("heap address overflow"),
        }
    }
}

/// Byte distance between two addresses.
///
/// The left-hand side must not be below the right-hand side.
impl Sub for HeapAddress {
    type Output = usize;

    #[inline]
    fn sub(self, rhs: Self) -> usize {
        debug_assert!(self >= rhs, "address {self} is below {rhs}");
        self.0 - rhs.0
    }
}

impl fmt::Debug for HeapAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HeapAddress({:#x})", self.0)
    }
}

impl fmt::Display for HeapAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// The half-open span `[low, high)` of reserved heap memory.
///
/// Reserved memory may exceed what is currently in use. A range is fixed for
/// the duration of a collection pass.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddressRange {
    low: HeapAddress,
    high: HeapAddress,
}

impl AddressRange {
    /// Create a range, rejecting `low > high`.
    ///
    /// # Errors
    ///
    /// Returns [`BarrierError::InvertedRange`] if `low > high`.
    pub fn new(low: HeapAddress, high: HeapAddress) -> Result<Self, BarrierError> {
        if low > high {
            return Err(BarrierError::InvertedRange { low, high });
        }
        Ok(Self { low, high })
    }

    /// Create a range of `len` bytes starting at `low`.
    ///
    /// # Panics
    ///
    /// Panics on address-space overflow.
    #[must_use]
    pub const fn with_len(low: HeapAddress, len: usize) -> Self {
        Self {
            low,
            high: low.add_bytes(len),
        }
    }

    /// First address in the range.
    #[inline]
    #[must_use]
    pub const fn low(&self) -> HeapAddress {
        self.low
    }

    /// First address past the end of the range.
    #[inline]
    #[must_use]
    pub const fn high(&self) -> HeapAddress {
        self.high
    }

    /// Size of the range in bytes.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.high.0 - self.low.0
    }

    /// Whether the range spans no addresses.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.low.0 == self.high.0
    }

    /// `low <= addr < high`.
    #[inline]
    #[must_use]
    pub const fn contains(&self, addr: HeapAddress) -> bool {
        self.low.0 <= addr.0 && addr.0 < self.high.0
    }

    /// Whether every address of `other` is also in `self`.
    ///
    /// An empty `other` is covered by any range.
    #[inline]
    #[must_use]
    pub const fn covers(&self, other: &Self) -> bool {
        other.is_empty() || (self.low.0 <= other.low.0 && other.high.0 <= self.high.0)
    }
}

impl fmt::Debug for AddressRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.low, self.high)
    }
}
