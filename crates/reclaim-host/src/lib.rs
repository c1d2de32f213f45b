//! Reclaim Host -- an in-memory host for the pool.
//!
//! Provides everything needed to run a [`PoolContext`](reclaim_pool::context::PoolContext)
//! without a real engine: a scene backend with generational node ids and
//! simulated load latency ([`MemoryBackend`](backend::MemoryBackend)), a
//! capability entity ([`Actor`](actor::Actor)) and a fixed-interval driver
//! ([`HostLoop`](host::HostLoop)). The integration tests, benchmarks and the
//! `bullet_storm` demo are built on it.

#![deny(unsafe_code)]

pub mod actor;
pub mod backend;
pub mod host;
pub mod node;

/// Pool prelude plus the host types.
pub mod prelude {
    pub use crate::actor::Actor;
    pub use crate::backend::{MemoryBackend, PrefabRef, SceneNode, SceneSnapshot};
    pub use crate::host::{HostConfig, HostDiagnostics, HostLoop};
    pub use crate::node::NodeId;
    pub use reclaim_pool::prelude::*;
}
