//! A simulated heap for exercising the barriers without a real collector.

use std::collections::{HashMap, HashSet};

use crate::address::HeapAddress;
use crate::heap::{OopVisitor, SlotAccess};

/// Reference slots and object starts, keyed by address.
///
/// Slots are independent words; nothing checks that a slot lies inside an
/// object, which lets tests place fields anywhere, including outside the
/// reserved heap.
#[derive(Debug, Default, Clone)]
pub struct SimHeap {
    slots: HashMap<HeapAddress, Option<HeapAddress>>,
    objects: HashSet<HeapAddress>,
}

impl SimHeap {
    /// An empty heap.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a live object starting at `addr`.
    pub fn add_object(&mut self, addr: HeapAddress) {
        self.objects.insert(addr);
    }

    /// Write `value` into `slot` without touching the object set.
    pub fn store(&mut self, slot: HeapAddress, value: Option<HeapAddress>) {
        self.slots.insert(slot, value);
    }

    /// Register an object at `referent` and point `slot` at it.
    pub fn store_object_ref(&mut self, slot: HeapAddress, referent: HeapAddress) {
        self.add_object(referent);
        self.store(slot, Some(referent));
    }
}

impl SlotAccess for SimHeap {
    fn load(&self, slot: HeapAddress) -> Option<HeapAddress> {
        self.slots.get(&slot).copied().flatten()
    }

    fn is_object(&self, addr: HeapAddress) -> bool {
        self.objects.contains(&addr)
    }
}

/// A fix-up visitor that relocates referents according to a fixed
/// forwarding table, the way a copying scavenge would.
#[derive(Debug, Default, Clone)]
pub struct Forwarder {
    forwarding: HashMap<HeapAddress, HeapAddress>,
    visited: Vec<HeapAddress>,
}

impl Forwarder {
    /// A visitor that moves nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Relocate the object at `from` to `to` when a slot pointing at it is
    /// visited.
    #[must_use]
    pub fn forwarding(mut self, from: HeapAddress, to: HeapAddress) -> Self {
        self.forwarding.insert(from, to);
        self
    }

    /// Slots visited so far, in order.
    #[must_use]
    pub fn visited(&self) -> &[HeapAddress] {
        &self.visited
    }
}

impl OopVisitor<SimHeap> for Forwarder {
    fn do_oop(&mut self, heap: &mut SimHeap, slot: HeapAddress) {
        self.visited.push(slot);
        let Some(obj) = heap.load(slot) else {
            return;
        };
        if let Some(&to) = self.forwarding.get(&obj) {
            heap.add_object(to);
            heap.store(slot, Some(to));
        }
    }
}
