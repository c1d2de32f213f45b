//! The per-kind pool engine.
//!
//! A [`KindPool`] owns one idle store, one name table and one reclamation
//! timer. Everything kind-specific is delegated to its [`Activation`]
//! strategy, so bare and capability entities run through exactly the same
//! queueing, naming, statistics and timing code.
//!
//! Spawned instances are handed out wrapped in [`Pooled`]. A `Pooled` is not
//! `Clone` and despawning consumes it, so an instance can never be queued
//! and active at the same time.

use std::marker::PhantomData;
use std::time::Duration;

use tracing::trace;

use crate::activation::Activation;
use crate::backend::Backend;
use crate::key::{Pose, PrototypeKey};
use crate::ledger::Ledger;
use crate::names::NameTable;
use crate::store::IdleStore;
use crate::timer::ReclamationTimer;
use crate::PoolError;

// ---------------------------------------------------------------------------
// Pooled
// ---------------------------------------------------------------------------

/// An active instance handed out by the pool.
///
/// Carries the prototype key it is queued under and the pool epoch it was
/// spawned in. Give it back with one of the `despawn` operations.
#[derive(Debug)]
pub struct Pooled<T> {
    item: T,
    key: PrototypeKey,
    epoch: u64,
}

impl<T> Pooled<T> {
    pub(crate) fn new(item: T, key: PrototypeKey, epoch: u64) -> Self {
        Self { item, key, epoch }
    }

    /// Key of the idle queue this instance returns to.
    pub fn key(&self) -> PrototypeKey {
        self.key
    }

    /// Pool epoch at spawn time.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// The pooled instance.
    pub fn instance(&self) -> &T {
        &self.item
    }

    /// Mutable access to the pooled instance.
    pub fn instance_mut(&mut self) -> &mut T {
        &mut self.item
    }

    /// Give up pool management of this instance.
    pub fn into_inner(self) -> T {
        self.item
    }
}

// ---------------------------------------------------------------------------
// KindPool
// ---------------------------------------------------------------------------

pub(crate) struct KindPool<B: Backend, A: Activation<B>> {
    pub(crate) store: IdleStore<A::Item>,
    pub(crate) names: NameTable,
    pub(crate) timer: ReclamationTimer<Pooled<A::Item>>,
    _marker: PhantomData<fn() -> (B, A)>,
}

impl<B: Backend, A: Activation<B>> KindPool<B, A> {
    pub(crate) fn new(reclaim_interval: Duration) -> Self {
        Self {
            store: IdleStore::new(),
            names: NameTable::new(),
            timer: ReclamationTimer::new(reclaim_interval),
            _marker: PhantomData,
        }
    }

    /// Dequeue-or-instantiate.
    pub(crate) fn spawn(
        &mut self,
        backend: &mut B,
        mut ledger: Option<&mut Ledger>,
        prototype: &B::Prototype,
        pose: Pose,
        epoch: u64,
    ) -> Result<Pooled<A::Item>, PoolError> {
        let key = backend
            .prototype_key(prototype)
            .ok_or(PoolError::InvalidPrototype)?;
        if let Some(pooled) = self.acquire(backend, ledger.as_deref_mut(), key, pose, epoch)? {
            return Ok(pooled);
        }
        Self::create(backend, ledger, key, prototype, pose, epoch)
    }

    /// Name-based dequeue-or-load-and-instantiate.
    pub(crate) fn spawn_named(
        &mut self,
        backend: &mut B,
        mut ledger: Option<&mut Ledger>,
        name: &str,
        path: &str,
        pose: Pose,
        epoch: u64,
    ) -> Result<Pooled<A::Item>, PoolError> {
        if let Some(pooled) = self.acquire_named(backend, ledger.as_deref_mut(), name, pose, epoch)? {
            return Ok(pooled);
        }
        if path.is_empty() {
            return Err(PoolError::EmptyPath);
        }
        let prototype = backend
            .load(path)
            .ok_or_else(|| PoolError::ResourceNotFound {
                path: path.to_owned(),
            })?;
        self.create_named(backend, ledger, name, &prototype, pose, epoch)
    }

    /// Hand out the oldest idle instance bound to `name`, if there is one.
    pub(crate) fn acquire_named(
        &mut self,
        backend: &mut B,
        ledger: Option<&mut Ledger>,
        name: &str,
        pose: Pose,
        epoch: u64,
    ) -> Result<Option<Pooled<A::Item>>, PoolError> {
        if name.is_empty() {
            return Err(PoolError::EmptyName);
        }
        match self.names.resolve(name) {
            Some(key) => self.acquire(backend, ledger, key, pose, epoch),
            None => Ok(None),
        }
    }

    /// Hand out the oldest idle instance under `key`, if there is one.
    pub(crate) fn acquire(
        &mut self,
        backend: &mut B,
        ledger: Option<&mut Ledger>,
        key: PrototypeKey,
        pose: Pose,
        epoch: u64,
    ) -> Result<Option<Pooled<A::Item>>, PoolError> {
        if self.store.idle_count(key) == 0 {
            return Ok(None);
        }
        // Checked before dequeueing so a failure leaves the queue intact.
        if let Some(ledger) = ledger {
            ledger.on_spawn_from_pool(A::KIND, key)?;
        }
        let Some(mut item) = self.store.dequeue(key) else {
            return Ok(None);
        };
        let handle = A::handle(&item);
        backend.set_pose(handle, pose);
        backend.set_active(handle, true);
        A::on_acquire(&mut item);
        trace!(kind = %A::KIND, %key, "spawned from idle queue");
        Ok(Some(Pooled::new(item, key, epoch)))
    }

    /// Bind `name` to the prototype (first binding wins) and instantiate
    /// under the bound key.
    pub(crate) fn create_named(
        &mut self,
        backend: &mut B,
        ledger: Option<&mut Ledger>,
        name: &str,
        prototype: &B::Prototype,
        pose: Pose,
        epoch: u64,
    ) -> Result<Pooled<A::Item>, PoolError> {
        let loaded = backend
            .prototype_key(prototype)
            .ok_or(PoolError::InvalidPrototype)?;
        let key = self.names.bind(name, loaded);
        Self::create(backend, ledger, key, prototype, pose, epoch)
    }

    /// Instantiate a fresh instance. Never touches the idle queue.
    pub(crate) fn create(
        backend: &mut B,
        ledger: Option<&mut Ledger>,
        key: PrototypeKey,
        prototype: &B::Prototype,
        pose: Pose,
        epoch: u64,
    ) -> Result<Pooled<A::Item>, PoolError> {
        let mut item = A::instantiate(backend, prototype, pose)?;
        if let Some(ledger) = ledger {
            let info = backend.describe(prototype);
            ledger.on_first_instantiate(A::KIND, key, &info, backend.has_capability(prototype));
        }
        backend.park(A::handle(&item));
        A::on_acquire(&mut item);
        trace!(kind = %A::KIND, %key, "instantiated");
        Ok(Pooled::new(item, key, epoch))
    }

    /// Instantiate `count` instances and queue each one straight away.
    pub(crate) fn pre_spawn(
        &mut self,
        backend: &mut B,
        mut ledger: Option<&mut Ledger>,
        key: PrototypeKey,
        prototype: &B::Prototype,
        count: usize,
        epoch: u64,
    ) -> Result<(), PoolError> {
        for _ in 0..count {
            let pooled = Self::create(
                backend,
                ledger.as_deref_mut(),
                key,
                prototype,
                Pose::IDENTITY,
                epoch,
            )?;
            self.release(backend, ledger.as_deref_mut(), pooled, epoch)?;
        }
        Ok(())
    }

    /// Return an instance to its idle queue.
    ///
    /// When the ledger rejects the update the instance stays queued: the
    /// queue is the source of truth, the error is reported to the caller.
    pub(crate) fn release(
        &mut self,
        backend: &mut B,
        ledger: Option<&mut Ledger>,
        pooled: Pooled<A::Item>,
        epoch: u64,
    ) -> Result<(), PoolError> {
        Self::check_returnable(backend, &pooled, epoch)?;
        let Pooled { mut item, key, .. } = pooled;

        let handle = A::handle(&item);
        backend.set_active(handle, false);
        let has_capability = backend.instance_has_capability(handle);
        A::on_release(&mut item);
        backend.park(A::handle(&item));

        let first = self.store.enqueue(key, item);
        trace!(kind = %A::KIND, %key, idle = self.store.idle_count(key), "despawned");
        if let Some(ledger) = ledger {
            if first {
                ledger.check_despawn_kind(A::KIND, key, has_capability);
            }
            ledger.on_despawn(A::KIND, key)?;
        }
        Ok(())
    }

    /// Return an instance after `lifetime`. A zero lifetime releases now.
    pub(crate) fn release_after(
        &mut self,
        backend: &mut B,
        ledger: Option<&mut Ledger>,
        pooled: Pooled<A::Item>,
        lifetime: Duration,
        epoch: u64,
    ) -> Result<(), PoolError> {
        if lifetime.is_zero() {
            return self.release(backend, ledger, pooled, epoch);
        }
        Self::check_returnable(backend, &pooled, epoch)?;
        trace!(kind = %A::KIND, key = %pooled.key, ?lifetime, "despawn scheduled");
        self.timer.schedule(pooled, lifetime);
        Ok(())
    }

    /// Advance the reclamation timer and release whatever expired.
    ///
    /// Returns the number of expired entries. Failures are logged and do not
    /// stop the remaining releases.
    pub(crate) fn reclaim(
        &mut self,
        backend: &mut B,
        mut ledger: Option<&mut Ledger>,
        elapsed: Duration,
        epoch: u64,
    ) -> usize {
        let expired = self.timer.advance(elapsed);
        let count = expired.len();
        for pooled in expired {
            if let Err(err) = self.release(backend, ledger.as_deref_mut(), pooled, epoch) {
                err.log("reclaim");
            }
        }
        count
    }

    /// Drop every idle instance reference, binding and pending timer.
    pub(crate) fn clear(&mut self) {
        self.timer.clear();
        self.store.clear();
        self.names.clear();
    }

    fn check_returnable(
        backend: &B,
        pooled: &Pooled<A::Item>,
        epoch: u64,
    ) -> Result<(), PoolError> {
        if pooled.epoch != epoch {
            return Err(PoolError::StaleInstance {
                key: pooled.key,
                spawned_in: pooled.epoch,
                current: epoch,
            });
        }
        let handle = A::handle(&pooled.item);
        if !backend.is_alive(handle) {
            return Err(PoolError::InvalidInstance {
                instance: format!("{handle:?}"),
            });
        }
        Ok(())
    }
}
