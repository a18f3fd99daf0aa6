//! Card-marking barrier set.
//!
//! [`CardTableBarrier`] is the shared handle through which both the mutator's
//! store barrier and the collector's keep-alive barrier reach the card
//! table. Clones share one table.

use std::sync::Arc;

use crate::address::{AddressRange, HeapAddress};
use crate::card_table::CardTable;
use crate::error::BarrierError;

/// A card table paired with the reserved heap range it guards.
#[derive(Debug, Clone)]
pub struct CardTableBarrier {
    table: Arc<CardTable>,
    reserved: AddressRange,
}

impl CardTableBarrier {
    /// Pair `table` with `reserved`.
    ///
    /// # Errors
    ///
    /// Returns [`BarrierError::RangeNotCovered`] if the table does not span
    /// the whole reserved range.
    pub fn new(table: Arc<CardTable>, reserved: AddressRange) -> Result<Self, BarrierError> {
        if !table.covered().covers(&reserved) {
            return Err(BarrierError::RangeNotCovered {
                table: table.covered(),
                reserved,
            });
        }
        Ok(Self { table, reserved })
    }

    /// Allocate a fresh table spanning exactly `reserved`, using the
    /// process-wide configuration.
    ///
    /// # Errors
    ///
    /// Fails if the table cannot be created.
    pub fn for_reserved(reserved: AddressRange) -> Result<Self, BarrierError> {
        let config = crate::config::config();
        let table = CardTable::with_config(reserved, &config)?;
        Ok(Self {
            table: Arc::new(table),
            reserved,
        })
    }

    /// The shared card table.
    #[inline]
    #[must_use]
    pub fn card_table(&self) -> &CardTable {
        &self.table
    }

    /// The reserved heap range.
    #[inline]
    #[must_use]
    pub const fn reserved(&self) -> AddressRange {
        self.reserved
    }

    /// Whether `addr` lies in reserved heap memory.
    #[inline]
    #[must_use]
    pub const fn is_in_reserved(&self, addr: HeapAddress) -> bool {
        self.reserved.contains(addr)
    }

    /// Collector-side barrier: dirty the card holding `field`.
    ///
    /// `field` must be in the reserved range.
    #[inline]
    pub fn write_ref_field_gc(&self, field: HeapAddress) {
        self.table.mark_dirty(field);
    }

    /// Mutator post-store barrier for `*field = new_value`.
    ///
    /// Null stores and stores into memory outside the heap need no card.
    #[inline]
    pub fn write_ref_field_post(&self, field: HeapAddress, new_value: Option<HeapAddress>) {
        if new_value.is_some() && self.reserved.contains(field) {
            self.table.mark_dirty(field);
        }
    }
}
