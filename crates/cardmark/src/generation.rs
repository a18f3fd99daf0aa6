//! Generation layout and the young/old boundary.

use crate::address::{AddressRange, HeapAddress};

/// The first old-generation address.
///
/// Every young object lives strictly below the boundary; old objects (and
/// anything else outside the nursery) live at or above it. A boundary is
/// fixed for a whole collection pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GenerationBoundary(HeapAddress);

impl GenerationBoundary {
    /// Boundary at `addr`.
    #[inline]
    #[must_use]
    pub const fn new(addr: HeapAddress) -> Self {
        Self(addr)
    }

    /// Boundary just past a young generation occupying `young`.
    #[inline]
    #[must_use]
    pub const fn from_young_range(young: &AddressRange) -> Self {
        Self(young.high())
    }

    /// The boundary address itself.
    #[inline]
    #[must_use]
    pub const fn address(self) -> HeapAddress {
        self.0
    }

    /// `addr < boundary`. The boundary address itself is old.
    #[inline]
    #[must_use]
    pub fn is_young(self, addr: HeapAddress) -> bool {
        addr < self.0
    }
}

/// The generation subsystem's description of the heap for one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapLayout {
    /// Whole reserved heap.
    pub reserved: AddressRange,
    /// Young generation, when the heap has exactly one at its bottom.
    pub young: Option<AddressRange>,
}

impl HeapLayout {
    /// Layout without a single identifiable young generation.
    #[must_use]
    pub const fn new(reserved: AddressRange) -> Self {
        Self {
            reserved,
            young: None,
        }
    }

    /// Layout with a young generation occupying `young`.
    #[must_use]
    pub const fn with_young(reserved: AddressRange, young: AddressRange) -> Self {
        Self {
            reserved,
            young: Some(young),
        }
    }

    /// The boundary usable by the fast keep-alive path.
    ///
    /// Only available when the young generation starts the reserved range,
    /// so that "below the boundary" means "young" for every heap address.
    #[must_use]
    pub fn boundary(&self) -> Option<GenerationBoundary> {
        let young = self.young?;
        if young.low() != self.reserved.low() || !self.reserved.covers(&young) {
            return None;
        }
        Some(GenerationBoundary::from_young_range(&young))
    }
}
