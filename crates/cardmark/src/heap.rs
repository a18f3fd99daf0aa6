//! What the keep-alive barriers need from the rest of the collector.

use crate::address::HeapAddress;

/// Read access to reference slots.
pub trait SlotAccess {
    /// Current value of the reference slot at `slot`, `None` for null.
    fn load(&self, slot: HeapAddress) -> Option<HeapAddress>;

    /// Whether `addr` is the start of a live, correctly tagged object.
    ///
    /// Only consulted when verification is enabled.
    fn is_object(&self, addr: HeapAddress) -> bool;
}

/// The scavenger's per-slot fix-up step (copying, forwarding, promotion
/// bookkeeping). May rewrite the slot.
pub trait OopVisitor<H: ?Sized> {
    /// Process the reference stored at `slot`.
    fn do_oop(&mut self, heap: &mut H, slot: HeapAddress);
}

impl<H: ?Sized, F> OopVisitor<H> for F
where
    F: FnMut(&mut H, HeapAddress),
{
    #[inline]
    fn do_oop(&mut self, heap: &mut H, slot: HeapAddress) {
        self(heap, slot);
    }
}
