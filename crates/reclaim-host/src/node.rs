//! Scene node handles.
//!
//! A [`NodeId`] names a slot in the scene table together with the slot's
//! generation at allocation time. Destroying a node bumps the generation, so
//! a pooled handle kept across a reset is seen as dead even once its slot
//! holds a new node.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Handle to one scene node. Orders by slot, then generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId {
    slot: u32,
    generation: u32,
}

impl NodeId {
    pub fn slot(self) -> u32 {
        self.slot
    }

    /// How many times the slot was freed before this node took it.
    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.slot)?;
        if self.generation > 0 {
            write!(f, "@{}", self.generation)?;
        }
        Ok(())
    }
}

/// Per-slot bookkeeping: the current generation, and whether a live node
/// holds the slot.
#[derive(Debug, Clone, Copy, Default)]
struct SlotState {
    generation: u32,
    occupied: bool,
}

/// Hands out [`NodeId`]s and recycles freed slots oldest-first.
#[derive(Debug, Default)]
pub struct NodeAllocator {
    slots: Vec<SlotState>,
    vacant: VecDeque<u32>,
    occupied: usize,
}

impl NodeAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self) -> NodeId {
        let slot = match self.vacant.pop_front() {
            Some(slot) => slot,
            None => {
                self.slots.push(SlotState::default());
                (self.slots.len() - 1) as u32
            }
        };
        let state = &mut self.slots[slot as usize];
        state.occupied = true;
        self.occupied += 1;
        NodeId {
            slot,
            generation: state.generation,
        }
    }

    /// Free `id`. Returns `false` if it was already dead or stale.
    pub fn free(&mut self, id: NodeId) -> bool {
        if !self.is_alive(id) {
            return false;
        }
        let state = &mut self.slots[id.slot as usize];
        state.occupied = false;
        state.generation = state.generation.wrapping_add(1);
        self.vacant.push_back(id.slot);
        self.occupied -= 1;
        true
    }

    pub fn is_alive(&self, id: NodeId) -> bool {
        self.slots
            .get(id.slot as usize)
            .is_some_and(|s| s.occupied && s.generation == id.generation)
    }

    /// Nodes currently allocated.
    pub fn live_count(&self) -> usize {
        self.occupied
    }
}
