//! Modulation routing between nodes.
//!
//! A node that produces a modulation value (see
//! [`NodeObject::handle_modulation`](snex_core::NodeObject::handle_modulation))
//! writes it into a slot of the network's [`ModulationBus`]. Nodes targeted
//! by that source read the slot before their next callback and convert the
//! normalised value into their parameter range.
//!
//! Slots are plain atomics with a write counter, so every target sees each
//! change once without the bus being cleared between blocks.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

#[derive(Debug, Default)]
struct Slot {
    value: AtomicU64,
    generation: AtomicU32,
}

/// Modulation values of one network, one slot per source node.
#[derive(Debug, Default)]
pub struct ModulationBus {
    slots: Vec<Slot>,
}

impl ModulationBus {
    /// A bus with `num_sources` slots.
    pub fn new(num_sources: usize) -> Arc<Self> {
        Arc::new(Self {
            slots: (0..num_sources).map(|_| Slot::default()).collect(),
        })
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the bus has no slots.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Publishes a value. Out-of-range slots are ignored.
    #[inline]
    pub fn write(&self, slot: usize, value: f64) {
        if let Some(s) = self.slots.get(slot) {
            s.value.store(value.to_bits(), Ordering::Relaxed);
            s.generation.fetch_add(1, Ordering::Release);
        }
    }

    /// Last published value.
    #[inline]
    pub fn read(&self, slot: usize) -> Option<f64> {
        self.slots
            .get(slot)
            .map(|s| f64::from_bits(s.value.load(Ordering::Relaxed)))
    }

    /// Number of writes to `slot` so far, wrapping.
    #[inline]
    pub fn generation(&self, slot: usize) -> u32 {
        self.slots
            .get(slot)
            .map_or(0, |s| s.generation.load(Ordering::Acquire))
    }
}

/// Where a node publishes its modulation value.
#[derive(Debug, Clone)]
pub struct ModulationOutput {
    /// Shared bus.
    pub bus: Arc<ModulationBus>,
    /// Slot of the source node.
    pub slot: usize,
}

/// A parameter of a node driven by a modulation slot.
#[derive(Debug, Clone)]
pub struct ModulationInput {
    /// Shared bus.
    pub bus: Arc<ModulationBus>,
    /// Slot of the source node.
    pub slot: usize,
    /// Parameter index on the target node.
    pub parameter: usize,
    seen: u32,
}

impl ModulationInput {
    /// Input for `parameter` fed by `slot`.
    pub fn new(bus: Arc<ModulationBus>, slot: usize, parameter: usize) -> Self {
        let seen = bus.generation(slot);
        Self {
            bus,
            slot,
            parameter,
            seen,
        }
    }

    /// The normalised value if the source wrote since the last poll.
    #[inline]
    pub fn poll(&mut self) -> Option<f64> {
        let generation = self.bus.generation(self.slot);
        if generation == self.seen {
            return None;
        }
        self.seen = generation;
        self.bus.read(self.slot)
    }
}
