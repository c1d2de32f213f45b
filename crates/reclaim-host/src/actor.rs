//! A capability entity for the in-memory host.

use reclaim_pool::backend::Poolable;

use crate::node::NodeId;

/// Scene node with lifecycle hooks. Counts how often the pool notified it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    node: NodeId,
    prefab: String,
    spawned: u32,
    despawned: u32,
}

impl Actor {
    pub(crate) fn new(node: NodeId, prefab: &str) -> Self {
        Self {
            node,
            prefab: prefab.to_owned(),
            spawned: 0,
            despawned: 0,
        }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Display name of the prefab this actor was created from.
    pub fn prefab(&self) -> &str {
        &self.prefab
    }

    pub fn spawn_count(&self) -> u32 {
        self.spawned
    }

    pub fn despawn_count(&self) -> u32 {
        self.despawned
    }

    /// Whether the pool currently considers this actor handed out.
    pub fn is_spawned(&self) -> bool {
        self.spawned > self.despawned
    }
}

impl Poolable for Actor {
    type Handle = NodeId;

    fn on_spawn(&mut self) {
        self.spawned += 1;
    }

    fn on_despawn(&mut self) {
        self.despawned += 1;
    }

    fn handle(&self) -> &NodeId {
        &self.node
    }
}
