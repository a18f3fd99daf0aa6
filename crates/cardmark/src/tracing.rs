//! Keep-alive tracing support.
//!
//! When the `tracing` feature is enabled, this module provides structured
//! spans and events for keep-alive passes and card marks. Without the
//! feature every hook compiles to nothing.

#[cfg(feature = "tracing")]
pub mod internal {
    use std::sync::atomic::{AtomicU64, Ordering};
    use tracing::{span, Level};

    use crate::address::HeapAddress;
    use crate::metrics::{KeepAliveStats, TraversalKind};

    /// Identifier correlating every event of one keep-alive pass.
    ///
    /// Monotonically increasing from 1.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PassId(pub u64);

    static NEXT_PASS_ID: AtomicU64 = AtomicU64::new(1);

    /// Generate the next pass ID.
    pub fn next_pass_id() -> PassId {
        PassId(NEXT_PASS_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Span covering a whole keep-alive pass.
    pub fn trace_keep_alive_pass(kind: TraversalKind, pass_id: PassId) -> span::EnteredSpan {
        span!(
            Level::DEBUG,
            "keep_alive_pass",
            traversal = ?kind,
            pass_id = pass_id.0
        )
        .entered()
    }

    /// A card was dirtied for `field`.
    pub fn log_card_dirtied(field: HeapAddress) {
        tracing::trace!(field = %field, "card_dirtied");
    }

    /// The fast path skipped `field` because its referent is old.
    pub fn log_old_referent(field: HeapAddress, referent: HeapAddress) {
        tracing::trace!(field = %field, referent = %referent, "old_referent_skipped");
    }

    /// End-of-pass summary.
    pub fn log_pass_end(stats: &KeepAliveStats) {
        tracing::debug!(
            fields_visited = stats.fields_visited,
            cards_dirtied = stats.cards_dirtied,
            skipped_outside_reserved = stats.skipped_outside_reserved,
            skipped_old_referent = stats.skipped_old_referent,
            "pass_end"
        );
    }
}

#[cfg(not(feature = "tracing"))]
pub mod internal {
    use crate::address::HeapAddress;
    use crate::metrics::{KeepAliveStats, TraversalKind};

    /// Stub type when tracing is disabled.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PassId(pub u64);

    /// Stub guard when tracing is disabled.
    pub struct EnteredSpan;

    /// Stub function when tracing is disabled.
    pub const fn next_pass_id() -> PassId {
        PassId(0)
    }

    /// Stub function when tracing is disabled.
    pub const fn trace_keep_alive_pass(_kind: TraversalKind, _pass_id: PassId) -> EnteredSpan {
        EnteredSpan
    }

    /// Stub function when tracing is disabled.
    #[inline(always)]
    pub const fn log_card_dirtied(_field: HeapAddress) {}

    /// Stub function when tracing is disabled.
    #[inline(always)]
    pub const fn log_old_referent(_field: HeapAddress, _referent: HeapAddress) {}

    /// Stub function when tracing is disabled.
    #[inline(always)]
    pub const fn log_pass_end(_stats: &KeepAliveStats) {}
}
