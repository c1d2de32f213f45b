//! In-memory instantiation backend.
//!
//! [`MemoryBackend`] stands in for a real engine's scene graph. It keeps a
//! table of prefabs (each registration gets its own identity, even when two
//! prefabs share a name), a resource table mapping load paths to prefabs, and
//! a flat set of scene nodes. Asynchronous loads complete after a fixed number
//! of [`poll_loads`](Backend::poll_loads) calls, optionally jittered by a
//! seeded generator so runs stay reproducible.

use std::collections::HashMap;

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;
use reclaim_pool::backend::{Backend, BackendError, LoadCompletion, LoadTicket};
use reclaim_pool::key::{Pose, PrototypeInfo, PrototypeKey};
use serde::Serialize;
use tracing::{debug, trace};

use crate::actor::Actor;
use crate::node::{NodeAllocator, NodeId};

// ---------------------------------------------------------------------------
// Prefabs
// ---------------------------------------------------------------------------

/// Reference to a registered prefab. Becomes invalid once the prefab is
/// unloaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PrefabRef(u64);

impl PrefabRef {
    pub fn to_raw(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone)]
struct PrefabDef {
    name: String,
    source_path: String,
    capable: bool,
    loaded: bool,
    fail_instantiation: bool,
}

// ---------------------------------------------------------------------------
// Scene nodes
// ---------------------------------------------------------------------------

/// State of one live scene node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneNode {
    pub prefab: String,
    pub active: bool,
    /// Parented under the pool's holding container.
    pub parked: bool,
    pub capable: bool,
    pub pose: Pose,
}

/// Serializable view of the whole scene, ordered by node id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneSnapshot {
    pub nodes: Vec<(NodeId, SceneNode)>,
    pub instantiate_count: u64,
    pub destroyed_count: u64,
}

#[derive(Debug)]
struct PendingLoad {
    ticket: LoadTicket,
    path: String,
    polls_left: u32,
}

// ---------------------------------------------------------------------------
// MemoryBackend
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct MemoryBackend {
    prefabs: Vec<PrefabDef>,
    resources: HashMap<String, PrefabRef>,
    allocator: NodeAllocator,
    nodes: HashMap<NodeId, SceneNode>,
    pending: Vec<PendingLoad>,
    load_latency: u32,
    jitter: Option<Pcg64Mcg>,
    instantiate_count: u64,
    destroyed_count: u64,
}

impl MemoryBackend {
    /// A backend whose async loads complete on the first poll.
    pub fn new() -> Self {
        Self::with_latency(0, None)
    }

    /// Async loads complete after `polls` polls, plus up to `polls` extra
    /// when a jitter seed is given.
    pub fn with_latency(polls: u32, jitter_seed: Option<u64>) -> Self {
        Self {
            prefabs: Vec::new(),
            resources: HashMap::new(),
            allocator: NodeAllocator::new(),
            nodes: HashMap::new(),
            pending: Vec::new(),
            load_latency: polls,
            jitter: jitter_seed.map(Pcg64Mcg::seed_from_u64),
            instantiate_count: 0,
            destroyed_count: 0,
        }
    }

    // -- setup --------------------------------------------------------------

    /// Register a prefab. Every call yields a distinct identity.
    pub fn register_prefab(&mut self, name: &str, source_path: &str, capable: bool) -> PrefabRef {
        let prefab = PrefabRef(self.prefabs.len() as u64 + 1);
        self.prefabs.push(PrefabDef {
            name: name.to_owned(),
            source_path: source_path.to_owned(),
            capable,
            loaded: true,
            fail_instantiation: false,
        });
        prefab
    }

    /// Register a prefab loadable from `path`, with source path
    /// `Assets/Resources/<path>.prefab`.
    pub fn add_resource(&mut self, path: &str, capable: bool) -> PrefabRef {
        let name = path.rsplit('/').next().unwrap_or(path);
        let prefab = self.register_prefab(name, &format!("Assets/Resources/{path}.prefab"), capable);
        self.resources.insert(path.to_owned(), prefab);
        prefab
    }

    /// Unload a prefab; references to it become invalid.
    pub fn unload_prefab(&mut self, prefab: PrefabRef) {
        if let Some(def) = self.def_mut(prefab) {
            def.loaded = false;
        }
        self.resources.retain(|_, p| *p != prefab);
    }

    /// Make instantiation of `prefab` fail (or succeed again).
    pub fn set_instantiation_failure(&mut self, prefab: PrefabRef, fail: bool) {
        if let Some(def) = self.def_mut(prefab) {
            def.fail_instantiation = fail;
        }
    }

    /// Destroy a node behind the pool's back.
    pub fn destroy_node(&mut self, node: NodeId) -> bool {
        if self.allocator.free(node) {
            self.nodes.remove(&node);
            self.destroyed_count += 1;
            true
        } else {
            false
        }
    }

    // -- inspection ---------------------------------------------------------

    pub fn node(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(&id)
    }

    pub fn is_active(&self, id: NodeId) -> bool {
        self.nodes.get(&id).is_some_and(|n| n.active)
    }

    pub fn live_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn active_nodes(&self) -> usize {
        self.nodes.values().filter(|n| n.active).count()
    }

    /// Fresh instantiations so far.
    pub fn instantiate_count(&self) -> u64 {
        self.instantiate_count
    }

    pub fn destroyed_count(&self) -> u64 {
        self.destroyed_count
    }

    /// Async loads still waiting to complete.
    pub fn loads_in_flight(&self) -> usize {
        self.pending.len()
    }

    pub fn snapshot(&self) -> SceneSnapshot {
        let mut nodes: Vec<_> = self
            .nodes
            .iter()
            .map(|(id, node)| (*id, node.clone()))
            .collect();
        nodes.sort_by_key(|(id, _)| *id);
        SceneSnapshot {
            nodes,
            instantiate_count: self.instantiate_count,
            destroyed_count: self.destroyed_count,
        }
    }

    // -- internals ----------------------------------------------------------

    fn def(&self, prefab: &PrefabRef) -> Option<&PrefabDef> {
        let index = usize::try_from(prefab.0).ok()?.checked_sub(1)?;
        self.prefabs.get(index).filter(|d| d.loaded)
    }

    fn def_mut(&mut self, prefab: PrefabRef) -> Option<&mut PrefabDef> {
        let index = usize::try_from(prefab.0).ok()?.checked_sub(1)?;
        self.prefabs.get_mut(index)
    }

    fn spawn_node(&mut self, prefab: &PrefabRef, pose: Pose) -> Result<(NodeId, String), BackendError> {
        let def = self.def(prefab).ok_or_else(|| BackendError {
            prototype: format!("prefab#{}", prefab.0),
            reason: "prefab is not loaded".into(),
        })?;
        if def.fail_instantiation {
            return Err(BackendError {
                prototype: def.name.clone(),
                reason: "instantiation disabled".into(),
            });
        }
        let node = SceneNode {
            prefab: def.name.clone(),
            active: true,
            parked: false,
            capable: def.capable,
            pose,
        };
        let name = def.name.clone();
        let id = self.allocator.allocate();
        self.nodes.insert(id, node);
        self.instantiate_count += 1;
        trace!(node = %id, prefab = %name, "node instantiated");
        Ok((id, name))
    }

    fn latency(&mut self) -> u32 {
        match self.jitter.as_mut() {
            Some(rng) => self.load_latency + rng.gen_range(0..=self.load_latency),
            None => self.load_latency,
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for MemoryBackend {
    type Prototype = PrefabRef;
    type Instance = NodeId;
    type Capable = Actor;

    fn prototype_key(&self, prototype: &PrefabRef) -> Option<PrototypeKey> {
        self.def(prototype).map(|_| PrototypeKey::new(prototype.0))
    }

    fn describe(&self, prototype: &PrefabRef) -> PrototypeInfo {
        self.def(prototype)
            .map(|d| PrototypeInfo {
                display_name: d.name.clone(),
                source_path: d.source_path.clone(),
            })
            .unwrap_or_default()
    }

    fn has_capability(&self, prototype: &PrefabRef) -> bool {
        self.def(prototype).is_some_and(|d| d.capable)
    }

    fn instance_has_capability(&self, instance: &NodeId) -> bool {
        self.nodes.get(instance).is_some_and(|n| n.capable)
    }

    fn instantiate(&mut self, prototype: &PrefabRef, pose: Pose) -> Result<NodeId, BackendError> {
        self.spawn_node(prototype, pose).map(|(id, _)| id)
    }

    fn instantiate_capable(&mut self, prototype: &PrefabRef, pose: Pose) -> Result<Actor, BackendError> {
        let (id, name) = self.spawn_node(prototype, pose)?;
        Ok(Actor::new(id, &name))
    }

    fn load(&mut self, path: &str) -> Option<PrefabRef> {
        self.resources.get(path).copied()
    }

    fn load_async(&mut self, path: &str, ticket: LoadTicket) {
        let polls_left = self.latency();
        debug!(%ticket, %path, polls_left, "async load queued");
        self.pending.push(PendingLoad {
            ticket,
            path: path.to_owned(),
            polls_left,
        });
    }

    fn poll_loads(&mut self) -> Vec<LoadCompletion<PrefabRef>> {
        let mut done = Vec::new();
        let mut i = 0;
        while i < self.pending.len() {
            if self.pending[i].polls_left == 0 {
                let load = self.pending.remove(i);
                done.push(LoadCompletion {
                    ticket: load.ticket,
                    prototype: self.resources.get(&load.path).copied(),
                });
            } else {
                self.pending[i].polls_left -= 1;
                i += 1;
            }
        }
        done
    }

    fn is_alive(&self, instance: &NodeId) -> bool {
        self.allocator.is_alive(*instance)
    }

    fn set_active(&mut self, instance: &NodeId, active: bool) {
        if let Some(node) = self.nodes.get_mut(instance) {
            node.active = active;
        }
    }

    fn set_pose(&mut self, instance: &NodeId, pose: Pose) {
        if let Some(node) = self.nodes.get_mut(instance) {
            node.pose = pose;
        }
    }

    fn park(&mut self, instance: &NodeId) {
        if let Some(node) = self.nodes.get_mut(instance) {
            node.parked = true;
        }
    }

    fn destroy_all_children(&mut self) {
        let mut parked: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|(_, n)| n.parked)
            .map(|(id, _)| *id)
            .collect();
        parked.sort();
        let count = parked.len();
        for id in parked {
            self.destroy_node(id);
        }
        debug!(count, "holding container cleared");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
