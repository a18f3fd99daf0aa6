//! Draining discovered fields through a keep-alive traversal.
//!
//! Reference discovery pushes the location of every field whose referent
//! must be kept alive; once reachability is final and forwarding has run,
//! the collector drains the queue through a [`KeepAliveVisitor`]. Fields are
//! independent, so drain order is unspecified.

use std::time::Instant;

use crossbeam::queue::SegQueue;

use crate::address::HeapAddress;
use crate::heap::SlotAccess;
use crate::keep_alive::KeepAliveVisitor;
use crate::metrics::{record_metrics, KeepAliveMetrics, KeepAliveStats};
use crate::tracing::internal::{log_pass_end, next_pass_id, trace_keep_alive_pass};

/// Field locations awaiting keep-alive processing.
///
/// Discovery may push from several threads; draining happens on the
/// collector thread.
#[derive(Debug, Default)]
pub struct DiscoveredFields {
    queue: SegQueue<HeapAddress>,
}

impl DiscoveredFields {
    /// An empty list.
    #[must_use]
    pub fn new() -> Self {
        Self {
            queue: SegQueue::new(),
        }
    }

    /// Queue `field` for keep-alive processing.
    pub fn push(&self, field: HeapAddress) {
        self.queue.push(field);
    }

    /// Take the next pending field.
    pub fn pop(&self) -> Option<HeapAddress> {
        self.queue.pop()
    }

    /// Number of pending fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether no fields are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl Extend<HeapAddress> for DiscoveredFields {
    fn extend<I: IntoIterator<Item = HeapAddress>>(&mut self, iter: I) {
        for field in iter {
            self.queue.push(field);
        }
    }
}

impl FromIterator<HeapAddress> for DiscoveredFields {
    fn from_iter<I: IntoIterator<Item = HeapAddress>>(iter: I) -> Self {
        let mut fields = Self::new();
        fields.extend(iter);
        fields
    }
}

fn stats_since(now: KeepAliveStats, before: KeepAliveStats) -> KeepAliveStats {
    KeepAliveStats {
        fields_visited: now.fields_visited - before.fields_visited,
        cards_dirtied: now.cards_dirtied - before.cards_dirtied,
        skipped_outside_reserved: now.skipped_outside_reserved - before.skipped_outside_reserved,
        skipped_old_referent: now.skipped_old_referent - before.skipped_old_referent,
    }
}

/// Visit every discovered field once with `keep_alive`, leaving the list
/// empty.
///
/// Returns the metrics of this pass, which are also published through
/// [`last_keep_alive_metrics`](crate::last_keep_alive_metrics) and the global
/// counters.
pub fn run_keep_alive_pass<H, K>(
    heap: &mut H,
    discovered: &DiscoveredFields,
    keep_alive: &mut K,
) -> KeepAliveMetrics
where
    H: SlotAccess + ?Sized,
    K: KeepAliveVisitor<H> + ?Sized,
{
    let traversal = keep_alive.kind();
    let _span = trace_keep_alive_pass(traversal, next_pass_id());
    let start = Instant::now();
    let before = keep_alive.stats();

    while let Some(field) = discovered.pop() {
        keep_alive.visit(heap, field);
    }

    let stats = stats_since(keep_alive.stats(), before);
    log_pass_end(&stats);

    let metrics = KeepAliveMetrics {
        traversal,
        stats,
        duration: start.elapsed(),
        total_passes: 0,
    };
    record_metrics(metrics);
    crate::metrics::last_keep_alive_metrics()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::AddressRange;
    use crate::barrier::CardTableBarrier;
    use crate::generation::GenerationBoundary;
    use crate::keep_alive::{FastKeepAliveTraversal, KeepAliveTraversal};
    use crate::metrics::TraversalKind;
    use crate::test_util::{Forwarder, SimHeap};

    fn addr(a: usize) -> HeapAddress {
        HeapAddress::new(a)
    }

    #[test]
    fn test_discovered_fields_queue() {
        let fields: DiscoveredFields = [addr(0x100), addr(0x200)].into_iter().collect();
        assert_eq!(fields.len(), 2);
        fields.push(addr(0x300));
        let mut drained = Vec::new();
        while let Some(f) = fields.pop() {
            drained.push(f);
        }
        assert_eq!(drained, vec![addr(0x100), addr(0x200), addr(0x300)]);
        assert!(fields.is_empty());
    }

    #[test]
    fn test_pass_drains_and_records() {
        let barrier = CardTableBarrier::for_reserved(AddressRange::with_len(addr(0), 0x2000)).unwrap();
        let mut heap = SimHeap::new();
        heap.store_object_ref(addr(0x0500), addr(0x0a00));
        heap.store_object_ref(addr(0x1500), addr(0x1a00));
        heap.store_object_ref(addr(0x3000), addr(0x0100));
        let discovered: DiscoveredFields =
            [addr(0x0500), addr(0x1500), addr(0x3000)].into_iter().collect();
        let mut fwd = Forwarder::new();

        let mut keep_alive = FastKeepAliveTraversal::new(
            &mut fwd,
            &barrier,
            GenerationBoundary::new(addr(0x1000)),
        )
        .unwrap();
        let metrics = run_keep_alive_pass(&mut heap, &discovered, &mut keep_alive);

        assert!(discovered.is_empty());
        assert_eq!(metrics.traversal, TraversalKind::Fast);
        assert_eq!(metrics.stats.fields_visited, 3);
        assert_eq!(metrics.stats.cards_dirtied, 1);
        assert_eq!(metrics.stats.skipped_old_referent, 1);
        assert_eq!(metrics.stats.skipped_outside_reserved, 1);
        assert_eq!(crate::last_keep_alive_metrics(), metrics);
    }

    #[test]
    fn test_reused_traversal_reports_per_pass_counts() {
        let barrier = CardTableBarrier::for_reserved(AddressRange::with_len(addr(0), 0x2000)).unwrap();
        let mut heap = SimHeap::new();
        heap.store_object_ref(addr(0x0100), addr(0x0200));
        let mut fwd = Forwarder::new();
        let mut keep_alive = KeepAliveTraversal::new(&mut fwd, &barrier);

        let first: DiscoveredFields = std::iter::once(addr(0x0100)).collect();
        run_keep_alive_pass(&mut heap, &first, &mut keep_alive);
        let second: DiscoveredFields = std::iter::once(addr(0x0100)).collect();
        let metrics = run_keep_alive_pass(&mut heap, &second, &mut keep_alive);

        assert_eq!(metrics.stats.fields_visited, 1);
        assert_eq!(KeepAliveVisitor::<SimHeap>::stats(&keep_alive).fields_visited, 2);
    }
}
