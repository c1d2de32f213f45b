//! Interfaces to the host engine.
//!
//! The pool never creates or destroys entities itself. Everything that touches
//! the host scene goes through a [`Backend`]: instantiating a prototype,
//! loading one by resource path (synchronously or asynchronously), toggling an
//! instance's active state, and parking idle instances under the pool's
//! holding container.
//!
//! Entities that want lifecycle notifications implement [`Poolable`]; the
//! backend produces them through [`Backend::instantiate_capable`].

use std::fmt;

use crate::key::{Pose, PrototypeInfo, PrototypeKey};

// ---------------------------------------------------------------------------
// Poolable
// ---------------------------------------------------------------------------

/// The spawn/despawn capability.
///
/// `on_spawn` runs every time the instance is handed out (fresh or reused),
/// after it has been positioned and activated. `on_despawn` runs right after
/// it is deactivated, before it is queued.
pub trait Poolable {
    /// The positional handle the backend uses to address this entity.
    type Handle;

    fn on_spawn(&mut self);

    fn on_despawn(&mut self);

    fn handle(&self) -> &Self::Handle;
}

// ---------------------------------------------------------------------------
// LoadTicket
// ---------------------------------------------------------------------------

/// Correlates an asynchronous load request with its completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoadTicket(pub u64);

impl fmt::Display for LoadTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "load#{}", self.0)
    }
}

/// A finished asynchronous load. `prototype` is `None` when the resource
/// could not be found.
#[derive(Debug)]
pub struct LoadCompletion<P> {
    pub ticket: LoadTicket,
    pub prototype: Option<P>,
}

// ---------------------------------------------------------------------------
// BackendError
// ---------------------------------------------------------------------------

/// Failure reported by the host while creating an instance.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("backend failed to instantiate '{prototype}': {reason}")]
pub struct BackendError {
    /// Display name of the prototype that failed.
    pub prototype: String,
    /// Host-provided reason.
    pub reason: String,
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// The entity instantiation backend.
///
/// All methods are called from the single thread that owns the
/// [`PoolContext`](crate::context::PoolContext). Asynchronous loads are
/// started with [`load_async`](Self::load_async) and reported back, in any
/// order, from [`poll_loads`](Self::poll_loads), which the pool calls once per
/// tick.
pub trait Backend {
    /// A loaded prototype reference.
    type Prototype;
    /// Positional handle of a live instance.
    type Instance: fmt::Debug;
    /// An instance carrying the spawn/despawn capability.
    type Capable: Poolable<Handle = Self::Instance>;

    /// Identity of `prototype`, or `None` if the reference is null or no
    /// longer valid. Two distinct loaded objects must yield distinct keys even
    /// if they are structurally identical.
    fn prototype_key(&self, prototype: &Self::Prototype) -> Option<PrototypeKey>;

    /// Descriptive metadata for statistics.
    fn describe(&self, prototype: &Self::Prototype) -> PrototypeInfo;

    /// Whether instances of `prototype` implement [`Poolable`].
    fn has_capability(&self, prototype: &Self::Prototype) -> bool;

    /// Whether a live instance implements [`Poolable`].
    fn instance_has_capability(&self, instance: &Self::Instance) -> bool;

    /// Create a fresh, active instance at `pose`.
    fn instantiate(
        &mut self,
        prototype: &Self::Prototype,
        pose: Pose,
    ) -> Result<Self::Instance, BackendError>;

    /// Create a fresh, active capability instance at `pose`. Only called when
    /// [`has_capability`](Self::has_capability) returned `true`.
    fn instantiate_capable(
        &mut self,
        prototype: &Self::Prototype,
        pose: Pose,
    ) -> Result<Self::Capable, BackendError>;

    /// Load a prototype by resource path, blocking.
    fn load(&mut self, path: &str) -> Option<Self::Prototype>;

    /// Start loading a prototype by resource path. The result must eventually
    /// be returned exactly once from [`poll_loads`](Self::poll_loads) under
    /// the same `ticket`.
    fn load_async(&mut self, path: &str, ticket: LoadTicket);

    /// Drain loads that finished since the last call.
    fn poll_loads(&mut self) -> Vec<LoadCompletion<Self::Prototype>>;

    /// Whether `instance` still refers to a live entity.
    fn is_alive(&self, instance: &Self::Instance) -> bool;

    fn set_active(&mut self, instance: &Self::Instance, active: bool);

    fn set_pose(&mut self, instance: &Self::Instance, pose: Pose);

    /// Reparent `instance` under the pool's holding container.
    fn park(&mut self, instance: &Self::Instance);

    /// Destroy every entity under the pool's holding container.
    fn destroy_all_children(&mut self);
}
