//! Barrier configuration.
//!
//! A process-wide default is kept behind a lock so embedders can tune it once
//! at startup; card tables and traversals copy what they need at construction
//! and never consult the global again mid-pass.

use std::sync::LazyLock;

use parking_lot::Mutex;

use crate::error::BarrierError;

/// Conventional card size in bytes.
pub const DEFAULT_CARD_SIZE: usize = 512;

/// Size of one card, a power of two between [`CardSize::MIN_BYTES`] and
/// [`CardSize::MAX_BYTES`].
///
/// Smaller cards mean less rescanning per dirty card but a larger table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CardSize {
    shift: u32,
}

impl CardSize {
    /// Smallest supported card.
    pub const MIN_BYTES: usize = 128;
    /// Largest supported card.
    pub const MAX_BYTES: usize = 4096;

    /// Validate a card size in bytes.
    ///
    /// # Errors
    ///
    /// Returns [`BarrierError::InvalidCardSize`] unless `bytes` is a power of
    /// two within bounds.
    pub fn new(bytes: usize) -> Result<Self, BarrierError> {
        if !bytes.is_power_of_two() || bytes < Self::MIN_BYTES || bytes > Self::MAX_BYTES {
            return Err(BarrierError::InvalidCardSize(bytes));
        }
        Ok(Self {
            shift: bytes.trailing_zeros(),
        })
    }

    /// Card size in bytes.
    #[inline]
    #[must_use]
    pub const fn bytes(self) -> usize {
        1 << self.shift
    }

    /// `log2` of the card size, for index computation by shifting.
    #[inline]
    #[must_use]
    pub const fn shift(self) -> u32 {
        self.shift
    }
}

impl Default for CardSize {
    fn default() -> Self {
        Self {
            shift: DEFAULT_CARD_SIZE.trailing_zeros(),
        }
    }
}

/// Tunables shared by card tables and keep-alive traversals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarrierConfig {
    /// Granularity of the card table.
    pub card_size: CardSize,
    /// Check that every kept-alive slot holds a valid object before it is
    /// processed. Failing the check aborts the pass with a panic.
    pub verify: bool,
    /// Map card storage without reserving swap. Worth enabling when the
    /// reserved heap is much larger than the heap in use.
    pub no_reserve: bool,
}

impl BarrierConfig {
    /// Whether verification is on when not configured explicitly: always in
    /// debug builds, and in release builds with the `verify` feature.
    pub const VERIFY_BY_DEFAULT: bool = cfg!(debug_assertions) || cfg!(feature = "verify");
}

impl Default for BarrierConfig {
    fn default() -> Self {
        Self {
            card_size: CardSize::default(),
            verify: Self::VERIFY_BY_DEFAULT,
            no_reserve: false,
        }
    }
}

static GLOBAL_CONFIG: LazyLock<Mutex<BarrierConfig>> =
    LazyLock::new(|| Mutex::new(BarrierConfig::default()));

/// A copy of the process-wide default configuration.
///
/// The lock is released before returning, so the copy can be held across
/// calls that read the configuration themselves.
pub fn config() -> BarrierConfig {
    *GLOBAL_CONFIG.lock()
}

/// Replace the process-wide default configuration.
///
/// Affects card tables and traversals created afterwards.
pub fn set_config(config: BarrierConfig) {
    *GLOBAL_CONFIG.lock() = config;
}
