//! Keep-alive barrier metrics.

use std::cell::Cell;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Which keep-alive traversal produced a set of counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum TraversalKind {
    /// No pass has run yet.
    #[default]
    None = 0,
    /// Dirties every reserved field regardless of referent.
    General = 1,
    /// Dirties only fields whose referent is below the generation boundary.
    Fast = 2,
}

/// Counters kept by a single traversal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeepAliveStats {
    /// Fields forwarded to the inner visitor.
    pub fields_visited: usize,
    /// Card marks issued. Marks of an already dirty card are counted too.
    pub cards_dirtied: usize,
    /// Fields outside the reserved heap, never marked.
    pub skipped_outside_reserved: usize,
    /// Reserved fields left unmarked because the referent is old (fast path
    /// only).
    pub skipped_old_referent: usize,
}

/// Summary of the most recent keep-alive pass on this thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeepAliveMetrics {
    /// Traversal used by the pass.
    pub traversal: TraversalKind,
    /// Counters accumulated during the pass.
    pub stats: KeepAliveStats,
    /// Wall time of the pass.
    pub duration: Duration,
    /// Passes recorded on this thread, including this one.
    pub total_passes: usize,
}

impl KeepAliveMetrics {
    /// Zeroed metrics.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            traversal: TraversalKind::None,
            stats: KeepAliveStats {
                fields_visited: 0,
                cards_dirtied: 0,
                skipped_outside_reserved: 0,
                skipped_old_referent: 0,
            },
            duration: Duration::ZERO,
            total_passes: 0,
        }
    }
}

/// Process-level cumulative keep-alive statistics.
#[derive(Debug)]
pub struct GlobalMetrics {
    passes: AtomicUsize,
    fast_passes: AtomicUsize,
    fields_visited: AtomicUsize,
    cards_dirtied: AtomicUsize,
    pass_ns: AtomicU64,
}

impl Default for GlobalMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl GlobalMetrics {
    /// All counters at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            passes: AtomicUsize::new(0),
            fast_passes: AtomicUsize::new(0),
            fields_visited: AtomicUsize::new(0),
            cards_dirtied: AtomicUsize::new(0),
            pass_ns: AtomicU64::new(0),
        }
    }

    /// Keep-alive passes run since process start.
    #[inline]
    #[must_use]
    pub fn total_passes(&self) -> usize {
        self.passes.load(Ordering::Relaxed)
    }

    /// Passes that used the fast traversal.
    #[inline]
    #[must_use]
    pub fn total_fast_passes(&self) -> usize {
        self.fast_passes.load(Ordering::Relaxed)
    }

    /// Fields visited across all passes.
    #[inline]
    #[must_use]
    pub fn total_fields_visited(&self) -> usize {
        self.fields_visited.load(Ordering::Relaxed)
    }

    /// Card marks issued across all passes.
    #[inline]
    #[must_use]
    pub fn total_cards_dirtied(&self) -> usize {
        self.cards_dirtied.load(Ordering::Relaxed)
    }

    /// Total time spent in passes, in nanoseconds.
    #[inline]
    #[must_use]
    pub fn total_pass_ns(&self) -> u64 {
        self.pass_ns.load(Ordering::Relaxed)
    }
}

static GLOBAL_METRICS: GlobalMetrics = GlobalMetrics::new();

/// The process-wide cumulative counters.
#[must_use]
pub fn global_metrics() -> &'static GlobalMetrics {
    &GLOBAL_METRICS
}

thread_local! {
    static LAST_METRICS: Cell<KeepAliveMetrics> = const { Cell::new(KeepAliveMetrics::new()) };
    static TOTAL_PASSES: Cell<usize> = const { Cell::new(0) };
}

/// Metrics of the last keep-alive pass run on this thread.
#[must_use]
pub fn last_keep_alive_metrics() -> KeepAliveMetrics {
    LAST_METRICS.with(Cell::get)
}

/// Record the outcome of a pass.
pub(crate) fn record_metrics(metrics: KeepAliveMetrics) {
    TOTAL_PASSES.with(|c| c.set(c.get() + 1));
    LAST_METRICS.with(|m| {
        let mut metrics = metrics;
        metrics.total_passes = TOTAL_PASSES.with(Cell::get);
        m.set(metrics);
    });

    let g = global_metrics();
    g.passes.fetch_add(1, Ordering::Relaxed);
    if metrics.traversal == TraversalKind::Fast {
        g.fast_passes.fetch_add(1, Ordering::Relaxed);
    }
    g.fields_visited
        .fetch_add(metrics.stats.fields_visited, Ordering::Relaxed);
    g.cards_dirtied
        .fetch_add(metrics.stats.cards_dirtied, Ordering::Relaxed);
    #[allow(clippy::cast_possible_truncation)]
    g.pass_ns
        .fetch_add(metrics.duration.as_nanos() as u64, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_updates_thread_local() {
        let before = last_keep_alive_metrics().total_passes;
        record_metrics(KeepAliveMetrics {
            traversal: TraversalKind::Fast,
            stats: KeepAliveStats {
                fields_visited: 5,
                ..KeepAliveStats::default()
            },
            ..KeepAliveMetrics::new()
        });
        let last = last_keep_alive_metrics();
        assert_eq!(last.traversal, TraversalKind::Fast);
        assert_eq!(last.stats.fields_visited, 5);
        assert_eq!(last.total_passes, before + 1);
        assert!(global_metrics().total_fast_passes() >= 1);
    }
}
