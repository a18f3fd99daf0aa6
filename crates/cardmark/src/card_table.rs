//! Card table remembered set.
//!
//! The covered range is divided into fixed-size cards, each tracked by one
//! byte. A dirty card may hold a pointer into the young generation stored
//! since the card was last cleaned; the scavenger rescans only dirty cards
//! instead of the whole old generation.
//!
//! Card bytes are atomic and written with plain relaxed stores. Dirty is a
//! monotone state, so racing writers can only produce a redundant mark, never
//! lose one.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use sys_alloc::{Mmap, MmapOptions};

use crate::address::{AddressRange, HeapAddress};
use crate::config::{BarrierConfig, CardSize};
use crate::error::BarrierError;

/// State of a single card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CardState {
    /// No young pointer recorded. Zero, so fresh mappings are clean.
    Clean = 0,
    /// May hold a pointer into the young generation.
    Dirty = 1,
}

impl CardState {
    #[inline]
    const fn from_byte(byte: u8) -> Self {
        if byte == Self::Clean as u8 {
            Self::Clean
        } else {
            Self::Dirty
        }
    }
}

/// One state byte per card of the covered range.
pub struct CardTable {
    /// Backing storage, one byte per card, zero-filled by the OS.
    storage: Mmap,
    covered: AddressRange,
    card_size: CardSize,
    num_cards: usize,
}

impl CardTable {
    /// Create a clean table covering `covered` with `card_size` cards.
    ///
    /// # Errors
    ///
    /// Fails for an empty range or if storage cannot be mapped.
    pub fn new(covered: AddressRange, card_size: CardSize) -> Result<Self, BarrierError> {
        let defaults = crate::config::config();
        Self::with_config(
            covered,
            &BarrierConfig {
                card_size,
                ..defaults
            },
        )
    }

    /// Create a clean table using the card size and mapping options of
    /// `config`.
    ///
    /// # Errors
    ///
    /// Fails for an empty range or if storage cannot be mapped.
    pub fn with_config(covered: AddressRange, config: &BarrierConfig) -> Result<Self, BarrierError> {
        if covered.is_empty() {
            return Err(BarrierError::EmptyRange);
        }
        let card_size = config.card_size;
        let num_cards = covered.len().div_ceil(card_size.bytes());

        let storage = MmapOptions::new()
            .len(num_cards)
            .no_reserve(config.no_reserve)
            .map_zeroed()
            .map_err(BarrierError::Allocation)?;

        Ok(Self {
            storage,
            covered,
            card_size,
            num_cards,
        })
    }

    #[inline]
    fn cards(&self) -> &[AtomicU8] {
        // SAFETY: `storage` holds at least `num_cards` zero-initialized bytes
        // that live as long as `self`, and `AtomicU8` has the layout of `u8`.
        // All access goes through the atomics.
        unsafe { std::slice::from_raw_parts(self.storage.as_ptr().cast::<AtomicU8>(), self.num_cards) }
    }

    /// The address range this table spans.
    #[inline]
    #[must_use]
    pub const fn covered(&self) -> AddressRange {
        self.covered
    }

    /// Granularity of the table.
    #[inline]
    #[must_use]
    pub const fn card_size(&self) -> CardSize {
        self.card_size
    }

    /// Number of cards.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.num_cards
    }

    /// Always `false`: empty ranges are rejected at construction.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.num_cards == 0
    }

    /// Index of the card containing `addr`, or `None` outside the covered
    /// range.
    #[inline]
    #[must_use]
    pub fn card_index(&self, addr: HeapAddress) -> Option<usize> {
        if !self.covered.contains(addr) {
            return None;
        }
        Some((addr - self.covered.low()) >> self.card_size.shift())
    }

    /// Address range of card `index`. The last card is clipped to the
    /// covered range.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[must_use]
    pub fn card_range(&self, index: usize) -> AddressRange {
        assert!(index < self.num_cards, "card index {index} out of bounds");
        let start = self.covered.low().add_bytes(index << self.card_size.shift());
        let len = self
            .card_size
            .bytes()
            .min(self.covered.high() - start);
        AddressRange::with_len(start, len)
    }

    /// Dirty the card containing `addr`.
    ///
    /// Idempotent. Safe to call concurrently with other markers. `addr` must
    /// lie in the covered range; marking anything else is a caller bug,
    /// asserted in debug builds and ignored otherwise.
    #[inline]
    pub fn mark_dirty(&self, addr: HeapAddress) {
        let Some(index) = self.card_index(addr) else {
            debug_assert!(
                self.covered.contains(addr),
                "mark_dirty({addr}) outside card table range {:?}",
                self.covered
            );
            return;
        };
        self.cards()[index].store(CardState::Dirty as u8, Ordering::Relaxed);
    }

    /// State of the card containing `addr`, or `None` outside the covered
    /// range.
    #[inline]
    #[must_use]
    pub fn state(&self, addr: HeapAddress) -> Option<CardState> {
        self.card_index(addr)
            .map(|i| CardState::from_byte(self.cards()[i].load(Ordering::Relaxed)))
    }

    /// Whether the card containing `addr` is dirty. `false` outside the
    /// covered range.
    #[inline]
    #[must_use]
    pub fn is_dirty(&self, addr: HeapAddress) -> bool {
        self.state(addr) == Some(CardState::Dirty)
    }

    /// Count dirty cards.
    #[must_use]
    pub fn dirty_count(&self) -> usize {
        self.cards()
            .iter()
            .filter(|c| c.load(Ordering::Relaxed) != CardState::Clean as u8)
            .count()
    }

    /// Iterate over the address ranges of dirty cards, lowest first.
    pub fn dirty_cards(&self) -> impl Iterator<Item = AddressRange> + '_ {
        self.cards()
            .iter()
            .enumerate()
            .filter(|(_, c)| c.load(Ordering::Relaxed) != CardState::Clean as u8)
            .map(|(i, _)| self.card_range(i))
    }

    /// Clean the card containing `addr`. No-op outside the covered range.
    ///
    /// Only the scavenger does this, after rescanning the card.
    pub fn clear_card(&self, addr: HeapAddress) {
        if let Some(index) = self.card_index(addr) {
            self.cards()[index].store(CardState::Clean as u8, Ordering::Relaxed);
        }
    }

    /// Clean every card overlapping `range`, clipped to the covered range.
    pub fn clear_range(&self, range: &AddressRange) {
        if range.is_empty() {
            return;
        }
        let low = range.low().max(self.covered.low());
        let high = range.high().min(self.covered.high());
        if low >= high {
            return;
        }
        let shift = self.card_size.shift();
        let first = (low - self.covered.low()) >> shift;
        let last = ((high - self.covered.low()) - 1) >> shift;
        for card in &self.cards()[first..=last] {
            card.store(CardState::Clean as u8, Ordering::Relaxed);
        }
    }

    /// Clean every card.
    pub fn clear_all(&self) {
        for card in self.cards() {
            card.store(CardState::Clean as u8, Ordering::Relaxed);
        }
    }
}

impl fmt::Debug for CardTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardTable")
            .field("covered", &self.covered)
            .field("card_size", &self.card_size.bytes())
            .field("cards", &self.num_cards)
            .field("dirty", &self.dirty_count())
            .finish()
    }
}
