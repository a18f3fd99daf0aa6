//! Card-table remembered set and keep-alive barriers for generational
//! garbage collectors.
//!
//! `cardmark` maintains the card table that lets a young-generation
//! collection rescan only the parts of the old generation that may point
//! into the nursery. Besides the mutator's post-store barrier it provides
//! the collector-side barriers used while reference processing keeps the
//! referents of weak, soft and final references alive.
//!
//! # Overview
//!
//! - [`CardTable`]: one atomic byte per fixed-size card of the covered range.
//! - [`CardTableBarrier`]: the shared table plus the reserved heap range.
//! - [`KeepAliveTraversal`]: dirties every reserved field it visits.
//! - [`FastKeepAliveTraversal`]: dirties a field only if its referent ends up
//!   below the [`GenerationBoundary`].
//! - [`run_keep_alive_pass`]: drains [`DiscoveredFields`] through either.
//!
//! # Example
//!
//! ```
//! use cardmark::{
//!     AddressRange, CardTableBarrier, GenerationBoundary, HeapAddress, KeepAlive,
//!     KeepAliveVisitor, SlotAccess,
//! };
//! use std::collections::HashMap;
//!
//! struct Slots(HashMap<HeapAddress, HeapAddress>);
//!
//! impl SlotAccess for Slots {
//!     fn load(&self, slot: HeapAddress) -> Option<HeapAddress> {
//!         self.0.get(&slot).copied()
//!     }
//!     fn is_object(&self, _addr: HeapAddress) -> bool {
//!         true
//!     }
//! }
//!
//! let reserved = AddressRange::with_len(HeapAddress::new(0), 0x2000);
//! let barrier = CardTableBarrier::for_reserved(reserved).unwrap();
//! let field = HeapAddress::new(0x1500);
//! let mut heap = Slots(HashMap::from([(field, HeapAddress::new(0x0a00))]));
//!
//! let mut scavenge = |_: &mut Slots, _: HeapAddress| {};
//! let boundary = Some(GenerationBoundary::new(HeapAddress::new(0x1000)));
//! let mut keep_alive = KeepAlive::select(&mut scavenge, &barrier, boundary).unwrap();
//! keep_alive.visit(&mut heap, field);
//!
//! assert!(barrier.card_table().is_dirty(field));
//! ```

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod address;
mod barrier;
mod card_table;
mod config;
mod error;
mod generation;
mod heap;
mod keep_alive;
mod metrics;
mod pass;
mod tracing;

pub use address::{AddressRange, HeapAddress};
pub use barrier::CardTableBarrier;
pub use card_table::{CardState, CardTable};
pub use config::{config, set_config, BarrierConfig, CardSize, DEFAULT_CARD_SIZE};
pub use error::BarrierError;
pub use generation::{GenerationBoundary, HeapLayout};
pub use heap::{OopVisitor, SlotAccess};
pub use keep_alive::{FastKeepAliveTraversal, KeepAlive, KeepAliveTraversal, KeepAliveVisitor};
pub use metrics::{
    global_metrics, last_keep_alive_metrics, GlobalMetrics, KeepAliveMetrics, KeepAliveStats,
    TraversalKind,
};
pub use pass::{run_keep_alive_pass, DiscoveredFields};

#[cfg(any(test, feature = "test-util"))]
#[doc(hidden)]
pub mod test_util;
