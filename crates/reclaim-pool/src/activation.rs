//! Activation strategies: what "hand out" and "take back" mean per kind.
//!
//! Both pools share one generic implementation; the differences between
//! bare and capability entities live entirely in these two strategies.

use crate::backend::{Backend, Poolable};
use crate::key::{EntityKind, Pose};
use crate::PoolError;

/// Per-kind hooks used by the generic pool.
pub trait Activation<B: Backend> {
    /// What the idle queue stores.
    type Item;

    const KIND: EntityKind;

    /// Create a fresh item from `prototype`.
    fn instantiate(
        backend: &mut B,
        prototype: &B::Prototype,
        pose: Pose,
    ) -> Result<Self::Item, PoolError>;

    /// The positional handle of an item.
    fn handle(item: &Self::Item) -> &B::Instance;

    /// Runs after the item has been positioned and activated.
    fn on_acquire(_item: &mut Self::Item) {}

    /// Runs after the item has been deactivated, before it is queued.
    fn on_release(_item: &mut Self::Item) {}
}

/// Plain positional entities. No hooks.
#[derive(Debug)]
pub enum Bare {}

/// Entities implementing [`Poolable`].
#[derive(Debug)]
pub enum Capability {}

impl<B: Backend> Activation<B> for Bare {
    type Item = B::Instance;

    const KIND: EntityKind = EntityKind::Bare;

    fn instantiate(
        backend: &mut B,
        prototype: &B::Prototype,
        pose: Pose,
    ) -> Result<Self::Item, PoolError> {
        Ok(backend.instantiate(prototype, pose)?)
    }

    fn handle(item: &Self::Item) -> &B::Instance {
        item
    }
}

impl<B: Backend> Activation<B> for Capability {
    type Item = B::Capable;

    const KIND: EntityKind = EntityKind::Capability;

    fn instantiate(
        backend: &mut B,
        prototype: &B::Prototype,
        pose: Pose,
    ) -> Result<Self::Item, PoolError> {
        if !backend.has_capability(prototype) {
            return Err(PoolError::MissingCapability {
                prototype: backend.describe(prototype).display_name,
            });
        }
        Ok(backend.instantiate_capable(prototype, pose)?)
    }

    fn handle(item: &Self::Item) -> &B::Instance {
        item.handle()
    }

    fn on_acquire(item: &mut Self::Item) {
        item.on_spawn();
    }

    fn on_release(item: &mut Self::Item) {
        item.on_despawn();
    }
}
