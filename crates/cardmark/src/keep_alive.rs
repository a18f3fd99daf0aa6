//! Keep-alive barriers for reference processing.
//!
//! When reference processing decides that the referent of a weak, soft or
//! final reference must stay alive, it hands the field holding that pointer
//! to one of the traversals here. Each traversal forwards the field to the
//! scavenger's fix-up visitor and then records the field in the card table so
//! that the next dirty-card scan finds any old-to-young pointer it now holds.
//!
//! - [`KeepAliveTraversal`] makes no assumption about generations and dirties
//!   every field inside the reserved heap. Over-marking only costs rescanning.
//! - [`FastKeepAliveTraversal`] is scoped to the youngest generation and only
//!   dirties a field whose (post-forwarding) referent lies below the
//!   [`GenerationBoundary`].
//!
//! # Verification
//!
//! A field reaching these traversals must hold a valid object: a null or
//! malformed referent means reference discovery should have cleared the
//! reference instead. With verification enabled (see
//! [`BarrierConfig::verify`](crate::BarrierConfig::verify)) this is checked
//! before forwarding and a violation panics.

use crate::address::HeapAddress;
use crate::barrier::CardTableBarrier;
use crate::error::BarrierError;
use crate::generation::{GenerationBoundary, HeapLayout};
use crate::heap::{OopVisitor, SlotAccess};
use crate::metrics::{KeepAliveStats, TraversalKind};
use crate::tracing::internal::{log_card_dirtied, log_old_referent};

/// Visit one kept-alive reference field.
pub trait KeepAliveVisitor<H: SlotAccess + ?Sized> {
    /// Forward `field` to the fix-up visitor and record it in the card table
    /// if needed. Called once per kept-alive field, after the referent's
    /// reachability is final.
    fn visit(&mut self, heap: &mut H, field: HeapAddress);

    /// Which traversal this is.
    fn kind(&self) -> TraversalKind;

    /// Counters accumulated so far.
    fn stats(&self) -> KeepAliveStats;
}

#[track_caller]
fn verify_referent<H: SlotAccess + ?Sized>(heap: &H, field: HeapAddress) {
    match heap.load(field) {
        Some(obj) => assert!(
            heap.is_object(obj),
            "expected an object while scanning weak refs: field {field} holds {obj}"
        ),
        None => panic!("expected an object while scanning weak refs: field {field} is null"),
    }
}

/// Keep-alive traversal usable with any generation layout.
pub struct KeepAliveTraversal<'a, V> {
    inner: &'a mut V,
    barrier: &'a CardTableBarrier,
    verify: bool,
    stats: KeepAliveStats,
}

impl<'a, V> KeepAliveTraversal<'a, V> {
    /// Traversal forwarding to `inner` and marking through `barrier`.
    ///
    /// Verification follows the process-wide configuration.
    pub fn new(inner: &'a mut V, barrier: &'a CardTableBarrier) -> Self {
        Self {
            inner,
            barrier,
            verify: crate::config::config().verify,
            stats: KeepAliveStats::default(),
        }
    }

    /// Override referent verification for this traversal.
    #[must_use]
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }
}

impl<H, V> KeepAliveVisitor<H> for KeepAliveTraversal<'_, V>
where
    H: SlotAccess + ?Sized,
    V: OopVisitor<H>,
{
    fn visit(&mut self, heap: &mut H, field: HeapAddress) {
        if self.verify {
            verify_referent(&*heap, field);
        }

        OopVisitor::<H>::do_oop(&mut *self.inner, &mut *heap, field);
        self.stats.fields_visited += 1;

        // Discovery rewrote this field; it needs a card whichever generation
        // holds it.
        if self.barrier.is_in_reserved(field) {
            self.barrier.write_ref_field_gc(field);
            self.stats.cards_dirtied += 1;
            log_card_dirtied(field);
        } else {
            self.stats.skipped_outside_reserved += 1;
        }
    }

    fn kind(&self) -> TraversalKind {
        TraversalKind::General
    }

    fn stats(&self) -> KeepAliveStats {
        self.stats
    }
}

/// Keep-alive traversal for a collection of exactly the youngest generation.
pub struct FastKeepAliveTraversal<'a, V> {
    inner: &'a mut V,
    barrier: &'a CardTableBarrier,
    boundary: GenerationBoundary,
    verify: bool,
    stats: KeepAliveStats,
}

impl<'a, V> FastKeepAliveTraversal<'a, V> {
    /// Traversal forwarding to `inner`, marking through `barrier` only for
    /// referents below `boundary`.
    ///
    /// # Errors
    ///
    /// Returns [`BarrierError::BoundaryOutsideReserved`] if `boundary` is not
    /// within `[reserved.low, reserved.high]`.
    pub fn new(
        inner: &'a mut V,
        barrier: &'a CardTableBarrier,
        boundary: GenerationBoundary,
    ) -> Result<Self, BarrierError> {
        let reserved = barrier.reserved();
        let at = boundary.address();
        if at < reserved.low() || at > reserved.high() {
            return Err(BarrierError::BoundaryOutsideReserved {
                boundary: at,
                reserved,
            });
        }
        Ok(Self {
            inner,
            barrier,
            boundary,
            verify: crate::config::config().verify,
            stats: KeepAliveStats::default(),
        })
    }

    /// Override referent verification for this traversal.
    #[must_use]
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// The boundary this traversal was built with.
    #[must_use]
    pub const fn boundary(&self) -> GenerationBoundary {
        self.boundary
    }
}

impl<H, V> KeepAliveVisitor<H> for FastKeepAliveTraversal<'_, V>
where
    H: SlotAccess + ?Sized,
    V: OopVisitor<H>,
{
    fn visit(&mut self, heap: &mut H, field: HeapAddress) {
        if self.verify {
            verify_referent(&*heap, field);
        }

        OopVisitor::<H>::do_oop(&mut *self.inner, &mut *heap, field);
        self.stats.fields_visited += 1;

        // Forwarding may have moved the referent; decide on where it is now.
        let Some(obj) = heap.load(field) else {
            return;
        };

        // Off-heap fields are counted the same way as in the general path,
        // whatever their referent.
        if !self.barrier.is_in_reserved(field) {
            self.stats.skipped_outside_reserved += 1;
        } else if self.boundary.is_young(obj) {
            self.barrier.write_ref_field_gc(field);
            self.stats.cards_dirtied += 1;
            log_card_dirtied(field);
        } else {
            self.stats.skipped_old_referent += 1;
            log_old_referent(field, obj);
        }
    }

    fn kind(&self) -> TraversalKind {
        TraversalKind::Fast
    }

    fn stats(&self) -> KeepAliveStats {
        self.stats
    }
}

/// The keep-alive traversal chosen for a pass.
pub enum KeepAlive<'a, V> {
    /// No fixed young generation; mark every reserved field.
    General(KeepAliveTraversal<'a, V>),
    /// Collecting exactly the youngest generation below a known boundary.
    Fast(FastKeepAliveTraversal<'a, V>),
}

impl<'a, V> KeepAlive<'a, V> {
    /// Use the fast traversal when a boundary is known, otherwise the
    /// general one.
    ///
    /// # Errors
    ///
    /// Fails if `boundary` lies outside the reserved heap.
    pub fn select(
        inner: &'a mut V,
        barrier: &'a CardTableBarrier,
        boundary: Option<GenerationBoundary>,
    ) -> Result<Self, BarrierError> {
        match boundary {
            Some(boundary) => Ok(Self::Fast(FastKeepAliveTraversal::new(
                inner, barrier, boundary,
            )?)),
            None => Ok(Self::General(KeepAliveTraversal::new(inner, barrier))),
        }
    }

    /// Select based on the generation layout of the heap.
    ///
    /// # Errors
    ///
    /// Fails if the layout's boundary lies outside the barrier's reserved
    /// range.
    pub fn for_layout(
        inner: &'a mut V,
        barrier: &'a CardTableBarrier,
        layout: &HeapLayout,
    ) -> Result<Self, BarrierError> {
        Self::select(inner, barrier, layout.boundary())
    }

    /// Override referent verification.
    #[must_use]
    pub fn with_verify(self, verify: bool) -> Self {
        match self {
            Self::General(t) => Self::General(t.with_verify(verify)),
            Self::Fast(t) => Self::Fast(t.with_verify(verify)),
        }
    }
}

impl<H, V> KeepAliveVisitor<H> for KeepAlive<'_, V>
where
    H: SlotAccess + ?Sized,
    V: OopVisitor<H>,
{
    #[inline]
    fn visit(&mut self, heap: &mut H, field: HeapAddress) {
        match self {
            Self::General(t) => t.visit(heap, field),
            Self::Fast(t) => t.visit(heap, field),
        }
    }

    fn kind(&self) -> TraversalKind {
        match self {
            Self::General(_) => TraversalKind::General,
            Self::Fast(_) => TraversalKind::Fast,
        }
    }

    fn stats(&self) -> KeepAliveStats {
        match self {
            Self::General(t) => t.stats,
            Self::Fast(t) => t.stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::AddressRange;
    use crate::test_util::{Forwarder, SimHeap};

    fn addr(a: usize) -> HeapAddress {
        HeapAddress::new(a)
    }

    fn barrier() -> CardTableBarrier {
        CardTableBarrier::for_reserved(AddressRange::with_len(addr(0), 0x2000)).unwrap()
    }

    fn boundary() -> GenerationBoundary {
        GenerationBoundary::new(addr(0x1000))
    }

    #[test]
    fn test_general_marks_regardless_of_referent() {
        let barrier = barrier();
        let mut heap = SimHeap::new();
        heap.store_object_ref(addr(0x1500), addr(0x1a00));
        let mut fwd = Forwarder::new();

        let mut keep_alive = KeepAliveTraversal::new(&mut fwd, &barrier);
        keep_alive.visit(&mut heap, addr(0x1500));

        assert!(barrier.card_table().is_dirty(addr(0x1500)));
        assert_eq!(keep_alive.stats().cards_dirtied, 1);
        assert_eq!(fwd.visited(), &[addr(0x1500)]);
    }

    #[test]
    fn test_fast_marks_only_young_referents() {
        let barrier = barrier();
        let mut heap = SimHeap::new();
        heap.store_object_ref(addr(0x0500), addr(0x0a00));
        heap.store_object_ref(addr(0x1500), addr(0x1a00));
        let mut fwd = Forwarder::new();

        let mut keep_alive = FastKeepAliveTraversal::new(&mut fwd, &barrier, boundary()).unwrap();
        keep_alive.visit(&mut heap, addr(0x0500));
        keep_alive.visit(&mut heap, addr(0x1500));

        let table = barrier.card_table();
        assert!(table.is_dirty(addr(0x0500)));
        assert!(!table.is_dirty(addr(0x1500)));
        let stats = keep_alive.stats();
        assert_eq!(stats.fields_visited, 2);
        assert_eq!(stats.cards_dirtied, 1);
        assert_eq!(stats.skipped_old_referent, 1);
    }

    #[test]
    fn test_fast_referent_at_boundary_is_old() {
        let barrier = barrier();
        let mut heap = SimHeap::new();
        heap.store_object_ref(addr(0x1800), addr(0x1000));
        let mut fwd = Forwarder::new();

        let mut keep_alive = FastKeepAliveTraversal::new(&mut fwd, &barrier, boundary()).unwrap();
        keep_alive.visit(&mut heap, addr(0x1800));

        assert_eq!(barrier.card_table().dirty_count(), 0);
    }

    #[test]
    fn test_fast_uses_forwarded_address() {
        let barrier = barrier();
        let mut heap = SimHeap::new();
        // Referent starts young and is promoted above the boundary.
        heap.store_object_ref(addr(0x1500), addr(0x0400));
        // And this one is old, copied down into the nursery.
        heap.store_object_ref(addr(0x1900), addr(0x1c00));
        let mut fwd = Forwarder::new()
            .forwarding(addr(0x0400), addr(0x1e00))
            .forwarding(addr(0x1c00), addr(0x0600));

        let mut keep_alive = FastKeepAliveTraversal::new(&mut fwd, &barrier, boundary()).unwrap();
        keep_alive.visit(&mut heap, addr(0x1500));
        keep_alive.visit(&mut heap, addr(0x1900));

        assert_eq!(heap.load(addr(0x1500)), Some(addr(0x1e00)));
        assert!(!barrier.card_table().is_dirty(addr(0x1500)));
        assert!(barrier.card_table().is_dirty(addr(0x1900)));
    }

    #[test]
    fn test_out_of_range_field_never_marked() {
        let barrier = barrier();
        let mut heap = SimHeap::new();
        heap.store_object_ref(addr(0x3000), addr(0x0100));
        let mut fwd = Forwarder::new();

        let mut general = KeepAliveTraversal::new(&mut fwd, &barrier);
        general.visit(&mut heap, addr(0x3000));
        assert_eq!(general.stats().skipped_outside_reserved, 1);

        let mut fast = FastKeepAliveTraversal::new(&mut fwd, &barrier, boundary()).unwrap();
        fast.visit(&mut heap, addr(0x3000));
        assert_eq!(fast.stats().skipped_outside_reserved, 1);

        assert_eq!(barrier.card_table().dirty_count(), 0);
        assert_eq!(fwd.visited().len(), 2);
    }

    #[test]
    fn test_out_of_range_field_with_old_referent_counted_as_outside() {
        let barrier = barrier();
        let mut heap = SimHeap::new();
        heap.store_object_ref(addr(0x3000), addr(0x1a00));
        let mut fwd = Forwarder::new();

        let mut fast = FastKeepAliveTraversal::new(&mut fwd, &barrier, boundary()).unwrap();
        fast.visit(&mut heap, addr(0x3000));

        let stats = fast.stats();
        assert_eq!(stats.skipped_outside_reserved, 1);
        assert_eq!(stats.skipped_old_referent, 0);
        assert_eq!(stats.cards_dirtied, 0);
        assert_eq!(barrier.card_table().dirty_count(), 0);
    }

    #[test]
    fn test_constructors_while_holding_config() {
        let config = crate::config::config();
        let barrier = barrier();
        let mut fwd = Forwarder::new();

        let general = KeepAliveTraversal::new(&mut fwd, &barrier);
        assert_eq!(general.verify, config.verify);
        let fast = FastKeepAliveTraversal::new(&mut fwd, &barrier, boundary()).unwrap();
        assert_eq!(fast.verify, config.verify);
        assert_eq!(barrier.card_table().card_size(), config.card_size);
    }

    #[test]
    fn test_boundary_outside_reserved_rejected() {
        let barrier = barrier();
        let mut fwd = Forwarder::new();
        let err = FastKeepAliveTraversal::new(
            &mut fwd,
            &barrier,
            GenerationBoundary::new(addr(0x2001)),
        )
        .err()
        .unwrap();
        assert!(matches!(err, BarrierError::BoundaryOutsideReserved { .. }));
    }

    #[test]
    fn test_boundary_at_reserved_end_accepted() {
        let barrier = barrier();
        let mut fwd = Forwarder::new();
        let fast =
            FastKeepAliveTraversal::new(&mut fwd, &barrier, GenerationBoundary::new(addr(0x2000)));
        assert!(fast.is_ok());
    }

    #[test]
    fn test_select() {
        let barrier = barrier();
        let mut fwd = Forwarder::new();
        let keep_alive = KeepAlive::select(&mut fwd, &barrier, None).unwrap();
        assert_eq!(KeepAliveVisitor::<SimHeap>::kind(&keep_alive), TraversalKind::General);

        let keep_alive = KeepAlive::select(&mut fwd, &barrier, Some(boundary())).unwrap();
        assert_eq!(KeepAliveVisitor::<SimHeap>::kind(&keep_alive), TraversalKind::Fast);
    }

    #[test]
    fn test_closure_as_inner_visitor() {
        let barrier = barrier();
        let mut heap = SimHeap::new();
        heap.store_object_ref(addr(0x0200), addr(0x0300));
        let mut seen = Vec::new();
        let mut record = |_: &mut SimHeap, slot: HeapAddress| seen.push(slot);

        let mut keep_alive = KeepAliveTraversal::new(&mut record, &barrier);
        keep_alive.visit(&mut heap, addr(0x0200));

        assert_eq!(seen, vec![addr(0x0200)]);
    }

    #[test]
    #[should_panic(expected = "expected an object while scanning weak refs")]
    fn test_verify_rejects_null_referent() {
        let barrier = barrier();
        let mut heap = SimHeap::new();
        heap.store(addr(0x0500), None);
        let mut fwd = Forwarder::new();

        let mut keep_alive = KeepAliveTraversal::new(&mut fwd, &barrier).with_verify(true);
        keep_alive.visit(&mut heap, addr(0x0500));
    }

    #[test]
    #[should_panic(expected = "expected an object while scanning weak refs")]
    fn test_verify_rejects_non_object() {
        let barrier = barrier();
        let mut heap = SimHeap::new();
        heap.store(addr(0x0500), Some(addr(0x0a08)));
        let mut fwd = Forwarder::new();

        let mut keep_alive = FastKeepAliveTraversal::new(&mut fwd, &barrier, boundary())
            .unwrap()
            .with_verify(true);
        keep_alive.visit(&mut heap, addr(0x0500));
    }

    #[test]
    fn test_unverified_null_is_not_marked_by_fast_path() {
        let barrier = barrier();
        let mut heap = SimHeap::new();
        heap.store(addr(0x0500), None);
        let mut fwd = Forwarder::new();

        let mut keep_alive = FastKeepAliveTraversal::new(&mut fwd, &barrier, boundary())
            .unwrap()
            .with_verify(false);
        keep_alive.visit(&mut heap, addr(0x0500));

        assert_eq!(barrier.card_table().dirty_count(), 0);
        assert_eq!(keep_alive.stats().fields_visited, 1);
    }
}
