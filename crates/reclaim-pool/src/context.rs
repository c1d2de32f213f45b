//! The pool facade.
//!
//! [`PoolContext`] is the only entry point callers need. It owns the backend,
//! the configuration and, while initialized, one pool per entity kind
//! plus the optional statistics ledger.
//!
//! # Lifecycle
//!
//! A context starts uninitialized: every spawn/despawn fails with
//! [`PoolError::NotInitialized`]. [`reset`](PoolContext::reset) builds fresh
//! state, destroying whatever the backend still parks under the holding
//! container, and runs the configured preloads. [`destroy`](PoolContext::destroy)
//! tears the state down again.
//!
//! Every reset and destroy bumps the pool *epoch*. Instances remember the
//! epoch they were spawned in; handing back an instance from an older epoch
//! is rejected with [`PoolError::StaleInstance`].
//!
//! # Ticking
//!
//! The host calls [`tick`](PoolContext::tick) once per frame with the elapsed
//! time. A tick first delivers pending async spawns, then collects finished
//! async loads, then advances both reclamation timers.
//!
//! # Example
//!
//! ```ignore
//! let mut pool = PoolContext::new(backend, PoolConfig::default());
//! pool.reset();
//!
//! let bullet = pool.spawn(&prefab, Pose::at([0.0, 1.0, 0.0]))?;
//! pool.despawn_after(bullet, Duration::from_secs(2))?;
//!
//! let report = pool.tick(Duration::from_millis(16));
//! ```

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::activation::{Activation, Bare, Capability};
use crate::backend::{Backend, LoadCompletion, LoadTicket};
use crate::config::{PoolConfig, PoolSettings};
use crate::key::{EntityKind, Pose, PrototypeKey};
use crate::ledger::Ledger;
use crate::pool::{KindPool, Pooled};
use crate::PoolError;

/// Callback receiving the instance produced by an asynchronous spawn.
pub type SpawnCallback<B, T> = Box<dyn FnOnce(&mut PoolContext<B>, Pooled<T>)>;

/// Callback for asynchronous bare spawns.
pub type BareCallback<B> = SpawnCallback<B, <B as Backend>::Instance>;

/// Callback for asynchronous capability spawns.
pub type CapableCallback<B> = SpawnCallback<B, <B as Backend>::Capable>;

// ---------------------------------------------------------------------------
// TickReport
// ---------------------------------------------------------------------------

/// What one [`PoolContext::tick`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Async spawn callbacks invoked.
    pub delivered: usize,
    /// Async loads that finished with a prototype.
    pub loads_completed: usize,
    /// Async loads that finished without one.
    pub loads_failed: usize,
    /// Deferred despawns whose lifetime ran out.
    pub reclaimed: usize,
}

// ---------------------------------------------------------------------------
// Internal state
// ---------------------------------------------------------------------------

/// Live state between a reset and the next destroy.
pub(crate) struct PoolState<B: Backend> {
    bare: KindPool<B, Bare>,
    capability: KindPool<B, Capability>,
    ledger: Option<Ledger>,
}

impl<B: Backend> PoolState<B> {
    fn new(settings: &PoolSettings) -> Self {
        let interval = settings.reclaim_interval();
        Self {
            bare: KindPool::new(interval),
            capability: KindPool::new(interval),
            ledger: settings.stats_enabled().then(Ledger::new),
        }
    }

    fn clear(&mut self) {
        self.bare.clear();
        self.capability.clear();
    }

    fn idle_count(&self, kind: EntityKind, key: PrototypeKey) -> usize {
        match kind {
            EntityKind::Bare => self.bare.store.idle_count(key),
            EntityKind::Capability => self.capability.store.idle_count(key),
        }
    }
}

/// An async load waiting for its completion.
struct InFlight<B: Backend> {
    path: String,
    job: LoadJob<B>,
}

pub(crate) enum LoadJob<B: Backend> {
    Bare {
        name: String,
        pose: Pose,
        callback: BareCallback<B>,
    },
    Capable {
        name: String,
        pose: Pose,
        callback: CapableCallback<B>,
    },
    PreSpawn {
        count: usize,
    },
}

/// An instance ready to be handed to its callback at the next tick.
pub(crate) enum Delivery<B: Backend> {
    Bare(Pooled<B::Instance>, BareCallback<B>),
    Capable(Pooled<B::Capable>, CapableCallback<B>),
}

impl<B: Backend> Delivery<B> {
    fn deliver(self, context: &mut PoolContext<B>) {
        match self {
            Delivery::Bare(pooled, callback) => callback(context, pooled),
            Delivery::Capable(pooled, callback) => callback(context, pooled),
        }
    }
}

/// Kind-directed access to [`PoolState`], so the facade can be written once
/// for both kinds.
pub(crate) trait Route<B: Backend>: Activation<B> + Sized {
    fn parts(state: &mut PoolState<B>) -> (&mut KindPool<B, Self>, Option<&mut Ledger>);

    fn pool(state: &PoolState<B>) -> &KindPool<B, Self>;

    fn job(name: String, pose: Pose, callback: SpawnCallback<B, Self::Item>) -> LoadJob<B>;

    fn delivery(pooled: Pooled<Self::Item>, callback: SpawnCallback<B, Self::Item>)
        -> Delivery<B>;
}

impl<B: Backend> Route<B> for Bare {
    fn parts(state: &mut PoolState<B>) -> (&mut KindPool<B, Self>, Option<&mut Ledger>) {
        (&mut state.bare, state.ledger.as_mut())
    }

    fn pool(state: &PoolState<B>) -> &KindPool<B, Self> {
        &state.bare
    }

    fn job(name: String, pose: Pose, callback: BareCallback<B>) -> LoadJob<B> {
        LoadJob::Bare {
            name,
            pose,
            callback,
        }
    }

    fn delivery(pooled: Pooled<B::Instance>, callback: BareCallback<B>) -> Delivery<B> {
        Delivery::Bare(pooled, callback)
    }
}

impl<B: Backend> Route<B> for Capability {
    fn parts(state: &mut PoolState<B>) -> (&mut KindPool<B, Self>, Option<&mut Ledger>) {
        (&mut state.capability, state.ledger.as_mut())
    }

    fn pool(state: &PoolState<B>) -> &KindPool<B, Self> {
        &state.capability
    }

    fn job(name: String, pose: Pose, callback: CapableCallback<B>) -> LoadJob<B> {
        LoadJob::Capable {
            name,
            pose,
            callback,
        }
    }

    fn delivery(pooled: Pooled<B::Capable>, callback: CapableCallback<B>) -> Delivery<B> {
        Delivery::Capable(pooled, callback)
    }
}

// ---------------------------------------------------------------------------
// PoolContext
// ---------------------------------------------------------------------------

/// Runtime object-recycling pool over a [`Backend`].
pub struct PoolContext<B: Backend> {
    backend: B,
    config: PoolConfig<B::Prototype>,
    state: Option<PoolState<B>>,
    epoch: u64,
    next_ticket: u64,
    in_flight: HashMap<LoadTicket, InFlight<B>>,
    ready: VecDeque<Delivery<B>>,
}

impl<B: Backend + 'static> PoolContext<B> {
    /// Create an uninitialized context. Call [`reset`](Self::reset) before
    /// spawning.
    ///
    /// # Panics
    ///
    /// Panics if the configured reclaim interval is zero.
    pub fn new(backend: B, config: PoolConfig<B::Prototype>) -> Self {
        assert!(
            config.settings.reclaim_interval_ms > 0,
            "reclaim interval must be positive"
        );
        Self {
            backend,
            config,
            state: None,
            epoch: 0,
            next_ticket: 0,
            in_flight: HashMap::new(),
            ready: VecDeque::new(),
        }
    }

    // -- lifecycle ---------------------------------------------------------

    /// (Re)initialize the pool.
    ///
    /// Destroys every entity parked under the holding container, replaces
    /// all stores, name bindings, timers and statistics with empty ones, then
    /// pre-spawns the configured preloads (prototypes first, then paths).
    /// Preload failures are logged and skipped.
    pub fn reset(&mut self) {
        if self.state.is_some() {
            debug!(epoch = self.epoch, "resetting a live pool");
        }
        self.backend.destroy_all_children();
        // Idle hits waiting for delivery refer to instances destroyed above.
        let dropped = self.ready.len();
        self.ready.clear();
        if dropped > 0 {
            debug!(dropped, "pending idle-hit deliveries dropped by reset");
        }
        self.epoch += 1;
        self.state = Some(PoolState::new(&self.config.settings));

        let preload = std::mem::take(&mut self.config.preload);
        for entry in &preload.prototypes {
            // Already logged by `pre_spawn`.
            let _ = self.pre_spawn(&entry.prototype, entry.count);
        }
        for entry in &preload.paths {
            let _ = self.pre_spawn_path(&entry.path, entry.count);
        }
        self.config.preload = preload;

        info!(
            epoch = self.epoch,
            bare_idle = self.total_idle(EntityKind::Bare),
            capability_idle = self.total_idle(EntityKind::Capability),
            "pool initialized"
        );
    }

    /// Tear down all pool state. A no-op when uninitialized.
    ///
    /// Stops both reclamation timers; entries still counting down are
    /// dropped without despawning. In-flight async loads are kept and still
    /// deliver their instances, untracked.
    pub fn destroy(&mut self) {
        let Some(mut state) = self.state.take() else {
            debug!("destroy on an uninitialized pool ignored");
            return;
        };
        state.clear();
        self.epoch += 1;
        info!(epoch = self.epoch, "pool destroyed");
    }

    /// Whether [`reset`](Self::reset) has run since creation or the last destroy.
    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    /// Current epoch. Bumped by every reset and destroy.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Whether `pooled` was spawned by the current pool state.
    pub fn is_current<T>(&self, pooled: &Pooled<T>) -> bool {
        self.state.is_some() && pooled.epoch() == self.epoch
    }

    // -- spawn -------------------------------------------------------------

    /// Spawn a bare instance of `prototype` at `pose`, reusing an idle one
    /// when available.
    pub fn spawn(
        &mut self,
        prototype: &B::Prototype,
        pose: Pose,
    ) -> Result<Pooled<B::Instance>, PoolError> {
        self.spawn_in::<Bare>(prototype, pose)
            .inspect_err(|e| e.log("spawn"))
    }

    /// Spawn a capability instance; `on_spawn` runs on every hand-out.
    pub fn spawn_capability(
        &mut self,
        prototype: &B::Prototype,
        pose: Pose,
    ) -> Result<Pooled<B::Capable>, PoolError> {
        self.spawn_in::<Capability>(prototype, pose)
            .inspect_err(|e| e.log("spawn_capability"))
    }

    /// Spawn by logical name, loading `path` on the first miss.
    ///
    /// The first successful load binds `name`; later calls reuse that
    /// binding's idle queue regardless of `path`.
    pub fn spawn_by_name(
        &mut self,
        name: &str,
        path: &str,
        pose: Pose,
    ) -> Result<Pooled<B::Instance>, PoolError> {
        self.spawn_named_in::<Bare>(name, path, pose)
            .inspect_err(|e| e.log("spawn_by_name"))
    }

    /// Capability variant of [`spawn_by_name`](Self::spawn_by_name).
    pub fn spawn_capability_by_name(
        &mut self,
        name: &str,
        path: &str,
        pose: Pose,
    ) -> Result<Pooled<B::Capable>, PoolError> {
        self.spawn_named_in::<Capability>(name, path, pose)
            .inspect_err(|e| e.log("spawn_capability_by_name"))
    }

    /// Asynchronous spawn by logical name.
    ///
    /// Returns immediately. `callback` runs exactly once from a later
    /// [`tick`](Self::tick): with an idle instance if one was bound to
    /// `name`, otherwise with a fresh instance once `path` has loaded. A load
    /// that finds nothing is logged and the callback is dropped.
    ///
    /// An idle hit still waiting for delivery when [`reset`](Self::reset)
    /// runs is dropped with its callback, since reset destroys the instance.
    /// Loads in flight are not affected and still call back.
    pub fn spawn_by_name_async<F>(
        &mut self,
        name: &str,
        path: &str,
        pose: Pose,
        callback: F,
    ) -> Result<(), PoolError>
    where
        F: FnOnce(&mut Self, Pooled<B::Instance>) + 'static,
    {
        self.spawn_named_async_in::<Bare>(name, path, pose, Box::new(callback))
            .inspect_err(|e| e.log("spawn_by_name_async"))
    }

    /// Capability variant of [`spawn_by_name_async`](Self::spawn_by_name_async).
    pub fn spawn_capability_by_name_async<F>(
        &mut self,
        name: &str,
        path: &str,
        pose: Pose,
        callback: F,
    ) -> Result<(), PoolError>
    where
        F: FnOnce(&mut Self, Pooled<B::Capable>) + 'static,
    {
        self.spawn_named_async_in::<Capability>(name, path, pose, Box::new(callback))
            .inspect_err(|e| e.log("spawn_capability_by_name_async"))
    }

    /// Instantiate `count` instances and queue them immediately, so later
    /// spawns are served without instantiation.
    ///
    /// Routes to the capability queue when the prototype carries the
    /// capability.
    pub fn pre_spawn(&mut self, prototype: &B::Prototype, count: usize) -> Result<(), PoolError> {
        self.pre_spawn_inner(prototype, count)
            .inspect_err(|e| e.log("pre_spawn"))
    }

    /// Load `path` asynchronously, then pre-spawn `count` instances.
    pub fn pre_spawn_path(&mut self, path: &str, count: usize) -> Result<(), PoolError> {
        if path.is_empty() {
            let err = PoolError::EmptyPath;
            err.log("pre_spawn_path");
            return Err(err);
        }
        self.start_load(path, LoadJob::PreSpawn { count });
        Ok(())
    }

    // -- despawn -----------------------------------------------------------

    /// Return a bare instance to its idle queue now.
    pub fn despawn(&mut self, pooled: Pooled<B::Instance>) -> Result<(), PoolError> {
        self.release_in::<Bare>(pooled, Duration::ZERO)
            .inspect_err(|e| e.log("despawn"))
    }

    /// Return a bare instance after `lifetime`, counted in reclamation ticks.
    pub fn despawn_after(
        &mut self,
        pooled: Pooled<B::Instance>,
        lifetime: Duration,
    ) -> Result<(), PoolError> {
        self.release_in::<Bare>(pooled, lifetime)
            .inspect_err(|e| e.log("despawn_after"))
    }

    /// Return a capability instance now; `on_despawn` runs before queueing.
    pub fn despawn_capability(&mut self, pooled: Pooled<B::Capable>) -> Result<(), PoolError> {
        self.release_in::<Capability>(pooled, Duration::ZERO)
            .inspect_err(|e| e.log("despawn_capability"))
    }

    /// Return a capability instance after `lifetime`; `on_despawn` runs when it expires.
    pub fn despawn_capability_after(
        &mut self,
        pooled: Pooled<B::Capable>,
        lifetime: Duration,
    ) -> Result<(), PoolError> {
        self.release_in::<Capability>(pooled, lifetime)
            .inspect_err(|e| e.log("despawn_capability_after"))
    }

    // -- tick --------------------------------------------------------------

    /// Advance the pool by `elapsed`.
    pub fn tick(&mut self, elapsed: Duration) -> TickReport {
        let mut report = self.pump_loads();
        let epoch = self.epoch;
        if let Some(state) = self.state.as_mut() {
            let (pool, ledger) = <Bare as Route<B>>::parts(state);
            report.reclaimed += pool.reclaim(&mut self.backend, ledger, elapsed, epoch);
            let (pool, ledger) = <Capability as Route<B>>::parts(state);
            report.reclaimed += pool.reclaim(&mut self.backend, ledger, elapsed, epoch);
        }
        report
    }

    /// Run queued callbacks and collect finished loads without advancing the
    /// timers.
    ///
    /// Callbacks that start new async spawns enqueue their deliveries for
    /// the next pump.
    pub fn pump_loads(&mut self) -> TickReport {
        let mut report = TickReport::default();

        for delivery in std::mem::take(&mut self.ready) {
            delivery.deliver(self);
            report.delivered += 1;
        }

        for LoadCompletion { ticket, prototype } in self.backend.poll_loads() {
            let Some(InFlight { path, job }) = self.in_flight.remove(&ticket) else {
                warn!(%ticket, "completion for an unknown load ticket");
                continue;
            };
            let Some(prototype) = prototype else {
                PoolError::ResourceNotFound { path }.log("async load");
                report.loads_failed += 1;
                continue;
            };
            debug!(%ticket, %path, "async load finished");
            report.loads_completed += 1;
            if self.finish_load(job, &prototype) {
                report.delivered += 1;
            }
        }
        report
    }

    // -- inspection --------------------------------------------------------

    /// Idle instances queued under `key`. Zero when uninitialized.
    pub fn idle_count(&self, kind: EntityKind, key: PrototypeKey) -> usize {
        self.state
            .as_ref()
            .map_or(0, |state| state.idle_count(kind, key))
    }

    /// Idle instances of one kind across all prototypes.
    pub fn total_idle(&self, kind: EntityKind) -> usize {
        self.state.as_ref().map_or(0, |state| match kind {
            EntityKind::Bare => state.bare.store.total_idle(),
            EntityKind::Capability => state.capability.store.total_idle(),
        })
    }

    /// The key a logical name is bound to.
    pub fn resolve_name(&self, kind: EntityKind, name: &str) -> Option<PrototypeKey> {
        let state = self.state.as_ref()?;
        match kind {
            EntityKind::Bare => <Bare as Route<B>>::pool(state).names.resolve(name),
            EntityKind::Capability => <Capability as Route<B>>::pool(state).names.resolve(name),
        }
    }

    /// Deferred despawns still counting down.
    pub fn scheduled_reclamations(&self, kind: EntityKind) -> usize {
        self.state.as_ref().map_or(0, |state| match kind {
            EntityKind::Bare => state.bare.timer.len(),
            EntityKind::Capability => state.capability.timer.len(),
        })
    }

    /// Async loads not yet completed.
    pub fn pending_loads(&self) -> usize {
        self.in_flight.len()
    }

    /// Callbacks waiting for the next tick.
    pub fn pending_deliveries(&self) -> usize {
        self.ready.len()
    }

    /// Statistics, when tracked and initialized.
    pub fn ledger(&self) -> Option<&Ledger> {
        self.state.as_ref()?.ledger.as_ref()
    }

    /// Cross-check the ledger against the idle queues.
    pub fn verify_ledger(&self) -> Result<(), PoolError> {
        let Some(state) = self.state.as_ref() else {
            return Ok(());
        };
        if let Some(ledger) = state.ledger.as_ref() {
            for kind in [EntityKind::Bare, EntityKind::Capability] {
                ledger.verify(kind, |key| state.idle_count(kind, key))?;
            }
        }
        Ok(())
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn config(&self) -> &PoolConfig<B::Prototype> {
        &self.config
    }

    // -- internals ---------------------------------------------------------

    fn state_parts<A: Route<B>>(
        &mut self,
    ) -> Result<(&mut B, &mut KindPool<B, A>, Option<&mut Ledger>, u64), PoolError> {
        let state = self.state.as_mut().ok_or(PoolError::NotInitialized)?;
        let (pool, ledger) = A::parts(state);
        Ok((&mut self.backend, pool, ledger, self.epoch))
    }

    fn spawn_in<A: Route<B>>(
        &mut self,
        prototype: &B::Prototype,
        pose: Pose,
    ) -> Result<Pooled<A::Item>, PoolError> {
        let (backend, pool, ledger, epoch) = self.state_parts::<A>()?;
        pool.spawn(backend, ledger, prototype, pose, epoch)
    }

    fn spawn_named_in<A: Route<B>>(
        &mut self,
        name: &str,
        path: &str,
        pose: Pose,
    ) -> Result<Pooled<A::Item>, PoolError> {
        let (backend, pool, ledger, epoch) = self.state_parts::<A>()?;
        pool.spawn_named(backend, ledger, name, path, pose, epoch)
    }

    fn spawn_named_async_in<A: Route<B>>(
        &mut self,
        name: &str,
        path: &str,
        pose: Pose,
        callback: SpawnCallback<B, A::Item>,
    ) -> Result<(), PoolError> {
        let (backend, pool, ledger, epoch) = self.state_parts::<A>()?;
        if let Some(pooled) = pool.acquire_named(backend, ledger, name, pose, epoch)? {
            self.ready.push_back(A::delivery(pooled, callback));
            return Ok(());
        }
        if path.is_empty() {
            return Err(PoolError::EmptyPath);
        }
        self.start_load(path, A::job(name.to_owned(), pose, callback));
        Ok(())
    }

    fn pre_spawn_inner(&mut self, prototype: &B::Prototype, count: usize) -> Result<(), PoolError> {
        let key = self
            .backend
            .prototype_key(prototype)
            .ok_or(PoolError::InvalidPrototype)?;
        if self.backend.has_capability(prototype) {
            let (backend, pool, ledger, epoch) = self.state_parts::<Capability>()?;
            pool.pre_spawn(backend, ledger, key, prototype, count, epoch)
        } else {
            let (backend, pool, ledger, epoch) = self.state_parts::<Bare>()?;
            pool.pre_spawn(backend, ledger, key, prototype, count, epoch)
        }
    }

    fn release_in<A: Route<B>>(
        &mut self,
        pooled: Pooled<A::Item>,
        lifetime: Duration,
    ) -> Result<(), PoolError> {
        let (backend, pool, ledger, epoch) = self.state_parts::<A>()?;
        pool.release_after(backend, ledger, pooled, lifetime, epoch)
    }

    fn start_load(&mut self, path: &str, job: LoadJob<B>) -> LoadTicket {
        let ticket = LoadTicket(self.next_ticket);
        self.next_ticket += 1;
        self.in_flight.insert(
            ticket,
            InFlight {
                path: path.to_owned(),
                job,
            },
        );
        self.backend.load_async(path, ticket);
        debug!(%ticket, %path, "async load started");
        ticket
    }

    /// Returns `true` if a callback was invoked.
    fn finish_load(&mut self, job: LoadJob<B>, prototype: &B::Prototype) -> bool {
        match job {
            LoadJob::PreSpawn { count } => {
                let _ = self.pre_spawn(prototype, count);
                false
            }
            LoadJob::Bare {
                name,
                pose,
                callback,
            } => self.finish_spawn::<Bare>(&name, prototype, pose, callback),
            LoadJob::Capable {
                name,
                pose,
                callback,
            } => self.finish_spawn::<Capability>(&name, prototype, pose, callback),
        }
    }

    /// Instantiate for a completed async spawn. Never re-checks the idle
    /// queue: concurrent loads of one name each produce a fresh instance.
    fn finish_spawn<A: Route<B>>(
        &mut self,
        name: &str,
        prototype: &B::Prototype,
        pose: Pose,
        callback: SpawnCallback<B, A::Item>,
    ) -> bool {
        let epoch = self.epoch;
        let result = match self.state.as_mut() {
            Some(state) => {
                let (pool, ledger) = A::parts(state);
                pool.create_named(&mut self.backend, ledger, name, prototype, pose, epoch)
            }
            None => {
                warn!(
                    kind = %A::KIND,
                    name,
                    "async load finished after the pool was destroyed; instance is untracked"
                );
                self.backend
                    .prototype_key(prototype)
                    .ok_or(PoolError::InvalidPrototype)
                    .and_then(|key| {
                        KindPool::<B, A>::create(&mut self.backend, None, key, prototype, pose, epoch)
                    })
            }
        };
        match result {
            Ok(pooled) => {
                callback(self, pooled);
                true
            }
            Err(err) => {
                err.log("async spawn");
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::HashSet;
    use std::rc::Rc;

    use super::*;
    use crate::backend::{BackendError, Poolable};
    use crate::config::PreloadConfig;
    use crate::key::PrototypeInfo;

    // -- mock backend -------------------------------------------------------

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    struct Handle(u32);

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct Proto {
        id: u64,
        capable: bool,
    }

    #[derive(Debug)]
    struct Mob {
        handle: Handle,
        spawns: u32,
        despawns: u32,
    }

    impl Poolable for Mob {
        type Handle = Handle;

        fn on_spawn(&mut self) {
            self.spawns += 1;
        }

        fn on_despawn(&mut self) {
            self.despawns += 1;
        }

        fn handle(&self) -> &Handle {
            &self.handle
        }
    }

    #[derive(Default)]
    struct Mock {
        next: u32,
        instantiated: u32,
        alive: HashSet<Handle>,
        active: HashSet<Handle>,
        poses: HashMap<Handle, Pose>,
        capable: HashSet<Handle>,
        resources: HashMap<String, Proto>,
        requested: Vec<(String, LoadTicket)>,
    }

    impl Mock {
        fn make(&mut self, pose: Pose) -> Handle {
            self.next += 1;
            self.instantiated += 1;
            let h = Handle(self.next);
            self.alive.insert(h);
            self.active.insert(h);
            self.poses.insert(h, pose);
            h
        }

        /// Loads requested but not yet polled.
        fn requested_tickets(&self) -> usize {
            self.requested.len()
        }
    }

    impl Backend for Mock {
        type Prototype = Proto;
        type Instance = Handle;
        type Capable = Mob;

        fn prototype_key(&self, p: &Proto) -> Option<PrototypeKey> {
            (p.id != 0).then(|| PrototypeKey::new(p.id))
        }

        fn describe(&self, p: &Proto) -> PrototypeInfo {
            PrototypeInfo {
                display_name: format!("proto{}", p.id),
                source_path: format!("Assets/Resources/proto{}.prefab", p.id),
            }
        }

        fn has_capability(&self, p: &Proto) -> bool {
            p.capable
        }

        fn instance_has_capability(&self, h: &Handle) -> bool {
            self.capable.contains(h)
        }

        fn instantiate(&mut self, p: &Proto, pose: Pose) -> Result<Handle, BackendError> {
            if p.id == 13 {
                return Err(BackendError {
                    prototype: "proto13".into(),
                    reason: "unlucky".into(),
                });
            }
            Ok(self.make(pose))
        }

        fn instantiate_capable(&mut self, _p: &Proto, pose: Pose) -> Result<Mob, BackendError> {
            let handle = self.make(pose);
            self.capable.insert(handle);
            Ok(Mob {
                handle,
                spawns: 0,
                despawns: 0,
            })
        }

        fn load(&mut self, path: &str) -> Option<Proto> {
            self.resources.get(path).copied()
        }

        fn load_async(&mut self, path: &str, ticket: LoadTicket) {
            self.requested.push((path.to_owned(), ticket));
        }

        fn poll_loads(&mut self) -> Vec<LoadCompletion<Proto>> {
            std::mem::take(&mut self.requested)
                .into_iter()
                .map(|(path, ticket)| LoadCompletion {
                    ticket,
                    prototype: self.resources.get(&path).copied(),
                })
                .collect()
        }

        fn is_alive(&self, h: &Handle) -> bool {
            self.alive.contains(h)
        }

        fn set_active(&mut self, h: &Handle, active: bool) {
            if active {
                self.active.insert(*h);
            } else {
                self.active.remove(h);
            }
        }

        fn set_pose(&mut self, h: &Handle, pose: Pose) {
            self.poses.insert(*h, pose);
        }

        fn park(&mut self, _h: &Handle) {}

        fn destroy_all_children(&mut self) {
            self.alive.clear();
            self.active.clear();
        }
    }

    const ROCK: Proto = Proto {
        id: 1,
        capable: false,
    };
    const ORC: Proto = Proto {
        id: 2,
        capable: true,
    };
    const NULL: Proto = Proto {
        id: 0,
        capable: false,
    };
    const TICK: Duration = Duration::from_millis(100);

    fn pool() -> PoolContext<Mock> {
        let mut mock = Mock::default();
        mock.resources.insert("Props/Rock".into(), ROCK);
        mock.resources.insert("Enemies/Orc".into(), ORC);
        let mut ctx = PoolContext::new(mock, PoolConfig::default());
        ctx.reset();
        ctx
    }

    // -- lifecycle ----------------------------------------------------------

    #[test]
    fn operations_fail_before_reset() {
        let mut ctx = PoolContext::new(Mock::default(), PoolConfig::default());
        assert!(!ctx.is_initialized());
        assert!(matches!(
            ctx.spawn(&ROCK, Pose::IDENTITY),
            Err(PoolError::NotInitialized)
        ));
        assert!(matches!(
            ctx.pre_spawn(&ROCK, 2),
            Err(PoolError::NotInitialized)
        ));
        assert_eq!(ctx.backend().instantiated, 0);
    }

    #[test]
    fn destroy_is_idempotent() {
        let mut ctx = pool();
        let epoch = ctx.epoch();
        ctx.destroy();
        ctx.destroy();
        assert!(!ctx.is_initialized());
        assert_eq!(ctx.epoch(), epoch + 1);
        assert_eq!(ctx.total_idle(EntityKind::Bare), 0);
    }

    #[test]
    fn reset_destroys_parked_instances_and_preloads() {
        let mut mock = Mock::default();
        mock.resources.insert("Props/Rock".into(), ROCK);
        let config = PoolConfig {
            preload: PreloadConfig::new()
                .with_prototype(ORC, 2)
                .with_path("Props/Rock", 3),
            ..PoolConfig::default()
        };
        let mut ctx = PoolContext::new(mock, config);
        ctx.reset();

        // Prototype preloads run synchronously, path preloads on the next tick.
        assert_eq!(ctx.idle_count(EntityKind::Capability, PrototypeKey::new(2)), 2);
        assert_eq!(ctx.pending_loads(), 1);
        ctx.tick(Duration::ZERO);
        assert_eq!(ctx.idle_count(EntityKind::Bare, PrototypeKey::new(1)), 3);

        let first = ctx.spawn(&ROCK, Pose::IDENTITY).unwrap();
        ctx.reset();
        assert!(!ctx.backend().is_alive(first.instance()));
        assert_eq!(ctx.config().preload.prototypes.len(), 1);
        assert_eq!(ctx.idle_count(EntityKind::Capability, PrototypeKey::new(2)), 2);
    }

    // -- spawn / despawn ----------------------------------------------------

    #[test]
    fn despawned_instance_is_reused() {
        let mut ctx = pool();
        let a = ctx.spawn(&ROCK, Pose::IDENTITY).unwrap();
        let handle = *a.instance();
        ctx.despawn(a).unwrap();
        assert!(!ctx.backend().active.contains(&handle));

        let b = ctx.spawn(&ROCK, Pose::at([1.0, 2.0, 3.0])).unwrap();
        assert_eq!(*b.instance(), handle);
        assert!(ctx.backend().active.contains(&handle));
        assert_eq!(ctx.backend().poses[&handle], Pose::at([1.0, 2.0, 3.0]));
        assert_eq!(ctx.backend().instantiated, 1);
    }

    #[test]
    fn idle_queue_is_fifo() {
        let mut ctx = pool();
        let a = ctx.spawn(&ROCK, Pose::IDENTITY).unwrap();
        let b = ctx.spawn(&ROCK, Pose::IDENTITY).unwrap();
        let (ha, hb) = (*a.instance(), *b.instance());
        ctx.despawn(a).unwrap();
        ctx.despawn(b).unwrap();

        assert_eq!(*ctx.spawn(&ROCK, Pose::IDENTITY).unwrap().instance(), ha);
        assert_eq!(*ctx.spawn(&ROCK, Pose::IDENTITY).unwrap().instance(), hb);
    }

    #[test]
    fn pre_spawn_serves_spawns_without_instantiation() {
        let mut ctx = pool();
        ctx.pre_spawn(&ROCK, 3).unwrap();
        let before = ctx.backend().instantiated;
        assert_eq!(before, 3);

        for _ in 0..3 {
            ctx.spawn(&ROCK, Pose::IDENTITY).unwrap();
        }
        assert_eq!(ctx.backend().instantiated, before);
        ctx.spawn(&ROCK, Pose::IDENTITY).unwrap();
        assert_eq!(ctx.backend().instantiated, before + 1);
        ctx.verify_ledger().unwrap();
    }

    #[test]
    fn pre_spawn_routes_capability_prototypes() {
        let mut ctx = pool();
        ctx.pre_spawn(&ORC, 2).unwrap();
        assert_eq!(ctx.total_idle(EntityKind::Capability), 2);
        assert_eq!(ctx.total_idle(EntityKind::Bare), 0);

        let mob = ctx.spawn_capability(&ORC, Pose::IDENTITY).unwrap();
        // Instantiation, pre-spawn despawn, then the reuse.
        assert_eq!((mob.instance().spawns, mob.instance().despawns), (2, 1));
    }

    #[test]
    fn capability_hooks_run_on_every_cycle() {
        let mut ctx = pool();
        let mob = ctx.spawn_capability(&ORC, Pose::IDENTITY).unwrap();
        assert_eq!(mob.instance().spawns, 1);
        ctx.despawn_capability(mob).unwrap();
        let mob = ctx.spawn_capability(&ORC, Pose::IDENTITY).unwrap();
        assert_eq!((mob.instance().spawns, mob.instance().despawns), (2, 1));
    }

    #[test]
    fn capability_spawn_rejects_bare_prototypes() {
        let mut ctx = pool();
        let err = ctx.spawn_capability(&ROCK, Pose::IDENTITY).unwrap_err();
        assert!(matches!(err, PoolError::MissingCapability { .. }));
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn invalid_arguments_are_rejected() {
        let mut ctx = pool();
        assert!(matches!(
            ctx.spawn(&NULL, Pose::IDENTITY),
            Err(PoolError::InvalidPrototype)
        ));
        assert!(matches!(
            ctx.spawn_by_name("Rock", "", Pose::IDENTITY),
            Err(PoolError::EmptyPath)
        ));
        assert!(matches!(
            ctx.spawn_by_name("", "Props/Rock", Pose::IDENTITY),
            Err(PoolError::EmptyName)
        ));
        let err = ctx
            .spawn_by_name("Ghost", "Nowhere/Ghost", Pose::IDENTITY)
            .unwrap_err();
        assert!(err.is_resource_not_found());
    }

    #[test]
    fn backend_failures_propagate() {
        let mut ctx = pool();
        let cursed = Proto {
            id: 13,
            capable: false,
        };
        let err = ctx.spawn(&cursed, Pose::IDENTITY).unwrap_err();
        assert!(matches!(err, PoolError::Backend(_)));
        assert!(ctx.ledger().unwrap().record(EntityKind::Bare, PrototypeKey::new(13)).is_none());
    }

    #[test]
    fn dead_instances_cannot_be_despawned() {
        let mut ctx = pool();
        let a = ctx.spawn(&ROCK, Pose::IDENTITY).unwrap();
        ctx.backend_mut().alive.remove(a.instance());
        assert!(matches!(
            ctx.despawn(a),
            Err(PoolError::InvalidInstance { .. })
        ));
        assert_eq!(ctx.total_idle(EntityKind::Bare), 0);
    }

    #[test]
    fn stale_instances_are_rejected_after_reset() {
        let mut ctx = pool();
        let a = ctx.spawn(&ROCK, Pose::IDENTITY).unwrap();
        ctx.reset();
        assert!(!ctx.is_current(&a));
        let err = ctx.despawn(a).unwrap_err();
        assert!(matches!(err, PoolError::StaleInstance { .. }));
        assert!(err.is_invalid_argument());
    }

    // -- names ---------------------------------------------------------------

    #[test]
    fn name_binding_shares_one_queue() {
        let mut ctx = pool();
        let a = ctx
            .spawn_by_name("Rock", "Props/Rock", Pose::IDENTITY)
            .unwrap();
        let handle = *a.instance();
        ctx.despawn(a).unwrap();

        // A different path under the same name still hits the bound queue.
        let b = ctx
            .spawn_by_name("Rock", "Enemies/Orc", Pose::IDENTITY)
            .unwrap();
        assert_eq!(*b.instance(), handle);
        assert_eq!(
            ctx.resolve_name(EntityKind::Bare, "Rock"),
            Some(PrototypeKey::new(1))
        );
        assert_eq!(ctx.resolve_name(EntityKind::Capability, "Rock"), None);
    }

    // -- deferred despawn ----------------------------------------------------

    #[test]
    fn deferred_despawn_waits_for_lifetime() {
        let mut ctx = pool();
        let a = ctx.spawn(&ROCK, Pose::IDENTITY).unwrap();
        ctx.despawn_after(a, Duration::from_millis(300)).unwrap();
        assert_eq!(ctx.scheduled_reclamations(EntityKind::Bare), 1);

        assert_eq!(ctx.tick(TICK).reclaimed, 0);
        assert_eq!(ctx.tick(TICK).reclaimed, 0);
        assert_eq!(ctx.total_idle(EntityKind::Bare), 0);
        assert_eq!(ctx.tick(TICK).reclaimed, 1);
        assert_eq!(ctx.total_idle(EntityKind::Bare), 1);
    }

    #[test]
    fn zero_lifetime_despawns_immediately() {
        let mut ctx = pool();
        let mob = ctx.spawn_capability(&ORC, Pose::IDENTITY).unwrap();
        ctx.despawn_capability_after(mob, Duration::ZERO).unwrap();
        assert_eq!(ctx.total_idle(EntityKind::Capability), 1);
        assert_eq!(ctx.scheduled_reclamations(EntityKind::Capability), 0);
    }

    #[test]
    fn destroy_drops_pending_reclamations() {
        let mut ctx = pool();
        let a = ctx.spawn(&ROCK, Pose::IDENTITY).unwrap();
        ctx.despawn_after(a, TICK).unwrap();
        ctx.destroy();
        assert_eq!(ctx.tick(TICK * 5).reclaimed, 0);
    }

    // -- async ---------------------------------------------------------------

    #[test]
    fn async_spawn_fires_callback_once_after_load() {
        let mut ctx = pool();
        let hits = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&hits);
        ctx.spawn_by_name_async("Rock", "Props/Rock", Pose::IDENTITY, move |_, p| {
            sink.borrow_mut().push(*p.instance());
        })
        .unwrap();
        assert!(hits.borrow().is_empty());
        assert_eq!(ctx.backend().requested_tickets(), 1);

        let report = ctx.tick(Duration::ZERO);
        assert_eq!(report.loads_completed, 1);
        assert_eq!(report.delivered, 1);
        assert_eq!(hits.borrow().len(), 1);

        ctx.tick(Duration::ZERO);
        assert_eq!(hits.borrow().len(), 1);
        assert_eq!(ctx.pending_loads(), 0);
    }

    #[test]
    fn async_idle_hit_is_delivered_on_next_tick() {
        let mut ctx = pool();
        let a = ctx
            .spawn_by_name("Rock", "Props/Rock", Pose::IDENTITY)
            .unwrap();
        let handle = *a.instance();
        ctx.despawn(a).unwrap();

        let got = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&got);
        ctx.spawn_by_name_async("Rock", "Props/Rock", Pose::IDENTITY, move |_, p| {
            *sink.borrow_mut() = Some(*p.instance());
        })
        .unwrap();
        // Dequeued already, no load started.
        assert_eq!(ctx.total_idle(EntityKind::Bare), 0);
        assert_eq!(ctx.pending_loads(), 0);
        assert_eq!(ctx.pending_deliveries(), 1);
        assert!(got.borrow().is_none());

        ctx.tick(Duration::ZERO);
        assert_eq!(*got.borrow(), Some(handle));
    }

    #[test]
    fn reset_drops_pending_idle_hit_deliveries() {
        let mut ctx = pool();
        let a = ctx
            .spawn_by_name("Rock", "Props/Rock", Pose::IDENTITY)
            .unwrap();
        ctx.despawn(a).unwrap();

        let called = Rc::new(RefCell::new(false));
        let sink = Rc::clone(&called);
        ctx.spawn_by_name_async("Rock", "Props/Rock", Pose::IDENTITY, move |_, _| {
            *sink.borrow_mut() = true;
        })
        .unwrap();
        assert_eq!(ctx.pending_deliveries(), 1);

        ctx.reset();
        assert_eq!(ctx.pending_deliveries(), 0);
        ctx.tick(Duration::ZERO);
        assert!(!*called.borrow());
    }

    #[test]
    fn failed_async_load_never_calls_back() {
        let mut ctx = pool();
        let called = Rc::new(RefCell::new(false));
        let sink = Rc::clone(&called);
        ctx.spawn_capability_by_name_async("Ghost", "Nowhere/Ghost", Pose::IDENTITY, move |_, _| {
            *sink.borrow_mut() = true;
        })
        .unwrap();
        let report = ctx.tick(Duration::ZERO);
        assert_eq!(report.loads_failed, 1);
        assert!(!*called.borrow());
    }

    #[test]
    fn callback_can_despawn_through_the_context() {
        let mut ctx = pool();
        ctx.spawn_capability_by_name_async("Orc", "Enemies/Orc", Pose::IDENTITY, |pool, mob| {
            pool.despawn_capability(mob).unwrap();
        })
        .unwrap();
        ctx.tick(Duration::ZERO);
        assert_eq!(ctx.total_idle(EntityKind::Capability), 1);
        ctx.verify_ledger().unwrap();
    }

    #[test]
    fn load_finishing_after_destroy_delivers_untracked_instance() {
        let mut ctx = pool();
        let got = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&got);
        ctx.spawn_by_name_async("Rock", "Props/Rock", Pose::IDENTITY, move |pool, p| {
            *sink.borrow_mut() = Some(pool.is_current(&p));
        })
        .unwrap();
        ctx.destroy();
        ctx.tick(Duration::ZERO);
        assert_eq!(*got.borrow(), Some(false));
    }

    // -- stats ---------------------------------------------------------------

    #[test]
    fn ledger_tracks_every_cycle() {
        let mut ctx = pool();
        let a = ctx.spawn(&ROCK, Pose::IDENTITY).unwrap();
        let b = ctx.spawn(&ROCK, Pose::IDENTITY).unwrap();
        ctx.despawn(a).unwrap();
        let c = ctx.spawn(&ROCK, Pose::IDENTITY).unwrap();
        ctx.despawn(b).unwrap();
        ctx.despawn(c).unwrap();

        let rec = ctx
            .ledger()
            .unwrap()
            .record(EntityKind::Bare, PrototypeKey::new(1))
            .unwrap()
            .clone();
        assert_eq!(rec.spawn_count, 3);
        assert_eq!(rec.despawn_count, 3);
        assert_eq!(rec.live_instance_count, 2);
        ctx.verify_ledger().unwrap();
    }

    #[test]
    fn stats_can_be_switched_off() {
        let mut config = PoolConfig::default();
        config.settings.track_stats = false;
        let mut ctx = PoolContext::new(Mock::default(), config);
        ctx.reset();
        let a = ctx.spawn(&ROCK, Pose::IDENTITY).unwrap();
        ctx.despawn(a).unwrap();
        assert!(ctx.ledger().is_none());
        ctx.verify_ledger().unwrap();
    }

    #[test]
    fn misclassified_spawn_is_counted_under_the_path_used() {
        let mut ctx = pool();
        // Capability prototype through the bare path: warned, still pooled.
        let h = ctx.spawn(&ORC, Pose::IDENTITY).unwrap();
        ctx.despawn(h).unwrap();
        assert_eq!(ctx.idle_count(EntityKind::Bare, PrototypeKey::new(2)), 1);
        assert!(ctx
            .ledger()
            .unwrap()
            .record(EntityKind::Bare, PrototypeKey::new(2))
            .is_some());
    }
}
