//! Construction errors.
//!
//! Only setup can fail recoverably. A null or malformed referent reaching a
//! keep-alive traversal is an upstream bug and panics instead (see
//! [`crate::keep_alive`]).

use std::io;

use thiserror::Error;

use crate::address::{AddressRange, HeapAddress};

/// Errors raised while building card tables, barriers, and traversals.
#[derive(Debug, Error)]
pub enum BarrierError {
    /// `low` is above `high`.
    #[error("address range is inverted: low {low} > high {high}")]
    InvertedRange {
        /// Requested low bound.
        low: HeapAddress,
        /// Requested high bound.
        high: HeapAddress,
    },

    /// A card table cannot cover an empty range.
    #[error("card table cannot cover an empty range")]
    EmptyRange,

    /// Card size is not a power of two within the supported bounds.
    #[error("invalid card size {0}: must be a power of two in [{min}, {max}]", min = crate::config::CardSize::MIN_BYTES, max = crate::config::CardSize::MAX_BYTES)]
    InvalidCardSize(usize),

    /// The card table does not span the reserved heap.
    #[error("card table covering {table:?} does not span reserved range {reserved:?}")]
    RangeNotCovered {
        /// Range covered by the card table.
        table: AddressRange,
        /// Reserved heap range.
        reserved: AddressRange,
    },

    /// The generation boundary lies outside the reserved heap.
    #[error("generation boundary {boundary} lies outside reserved range {reserved:?}")]
    BoundaryOutsideReserved {
        /// Offending boundary.
        boundary: HeapAddress,
        /// Reserved heap range.
        reserved: AddressRange,
    },

    /// Card byte storage could not be mapped.
    #[error("failed to allocate card table storage")]
    Allocation(#[source] io::Error),
}
