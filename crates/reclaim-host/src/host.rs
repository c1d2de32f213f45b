//! Fixed-interval host loop.
//!
//! [`HostLoop`] plays the role of the engine's cooperative scheduler. Each
//! tick:
//!
//! 1. Registered systems run in registration order, each with mutable access
//!    to the pool and the current tick number.
//! 2. The pool is ticked by one fixed interval: queued async callbacks fire,
//!    finished loads are collected, reclamation timers advance.
//! 3. The tick counter advances.
//!
//! The backend is in memory and its load jitter is seeded, so a given set of
//! systems always produces the same scene.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use reclaim_host::prelude::*;
//!
//! let config = HostConfig::default();
//! let mut backend = config.backend();
//! let spark = backend.add_resource("Fx/Spark", false);
//!
//! let mut pool = PoolContext::new(backend, PoolConfig::default());
//! pool.reset();
//!
//! let mut host = HostLoop::new(pool, config);
//! host.add_system("emit", move |pool, _tick| {
//!     if let Ok(fx) = pool.spawn(&spark, Pose::IDENTITY) {
//!         let _ = pool.despawn_after(fx, Duration::from_millis(300));
//!     }
//! });
//!
//! host.run_ticks(10);
//! assert_eq!(host.tick_count(), 10);
//! // Three sparks in flight at a time, recycled from then on.
//! assert_eq!(host.pool().backend().instantiate_count(), 3);
//! ```

use std::time::{Duration, Instant};

use reclaim_pool::context::{PoolContext, TickReport};
use reclaim_pool::key::EntityKind;
use tracing::trace;

use crate::backend::MemoryBackend;

// ---------------------------------------------------------------------------
// HostConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Simulated time per tick. Must be positive.
    pub tick_interval: Duration,
    /// Polls before an async load completes.
    pub load_latency_ticks: u32,
    /// Seed for load latency jitter; `None` for fixed latency.
    pub latency_jitter: Option<u64>,
}

impl HostConfig {
    /// A backend with this configuration's load latency.
    pub fn backend(&self) -> MemoryBackend {
        MemoryBackend::with_latency(self.load_latency_ticks, self.latency_jitter)
    }
}

impl Default for HostConfig {
    /// 100 ms ticks, loads complete on the next tick.
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(100),
            load_latency_ticks: 0,
            latency_jitter: None,
        }
    }
}

// ---------------------------------------------------------------------------
// HostDiagnostics
// ---------------------------------------------------------------------------

/// Timing and occupancy for the last tick.
#[derive(Debug, Clone, Default)]
pub struct HostDiagnostics {
    /// Wall-clock time per system, in execution order.
    pub system_times: Vec<(String, Duration)>,
    /// Time spent in the pool's own tick.
    pub pool_time: Duration,
    pub total_time: Duration,
    pub bare_idle: usize,
    pub capability_idle: usize,
}

/// A per-tick system.
pub type SystemFn = Box<dyn FnMut(&mut PoolContext<MemoryBackend>, u64)>;

struct RegisteredSystem {
    name: String,
    func: SystemFn,
}

// ---------------------------------------------------------------------------
// HostLoop
// ---------------------------------------------------------------------------

pub struct HostLoop {
    pool: PoolContext<MemoryBackend>,
    systems: Vec<RegisteredSystem>,
    config: HostConfig,
    tick_counter: u64,
    last_report: TickReport,
    last_diagnostics: HostDiagnostics,
}

impl HostLoop {
    /// # Panics
    ///
    /// Panics if `config.tick_interval` is zero.
    pub fn new(pool: PoolContext<MemoryBackend>, config: HostConfig) -> Self {
        assert!(
            !config.tick_interval.is_zero(),
            "tick_interval must be positive, got {:?}",
            config.tick_interval
        );
        Self {
            pool,
            systems: Vec::new(),
            config,
            tick_counter: 0,
            last_report: TickReport::default(),
            last_diagnostics: HostDiagnostics::default(),
        }
    }

    /// Register a system; systems run in registration order.
    ///
    /// # Panics
    ///
    /// Panics if a system with the same name is already registered.
    pub fn add_system<F>(&mut self, name: &str, func: F)
    where
        F: FnMut(&mut PoolContext<MemoryBackend>, u64) + 'static,
    {
        assert!(
            !self.systems.iter().any(|s| s.name == name),
            "duplicate system name: {name:?}"
        );
        self.systems.push(RegisteredSystem {
            name: name.to_owned(),
            func: Box::new(func),
        });
    }

    /// Run one tick.
    pub fn tick(&mut self) -> TickReport {
        let tick_start = Instant::now();
        let mut system_times = Vec::with_capacity(self.systems.len());

        for system in &mut self.systems {
            let start = Instant::now();
            (system.func)(&mut self.pool, self.tick_counter);
            system_times.push((system.name.clone(), start.elapsed()));
        }

        let pool_start = Instant::now();
        let report = self.pool.tick(self.config.tick_interval);
        let pool_time = pool_start.elapsed();

        self.tick_counter += 1;
        self.last_report = report;
        self.last_diagnostics = HostDiagnostics {
            system_times,
            pool_time,
            total_time: tick_start.elapsed(),
            bare_idle: self.pool.total_idle(EntityKind::Bare),
            capability_idle: self.pool.total_idle(EntityKind::Capability),
        };
        trace!(tick = self.tick_counter, ?report, "host tick");
        report
    }

    /// Run `count` ticks; returns the summed report.
    pub fn run_ticks(&mut self, count: u64) -> TickReport {
        let mut total = TickReport::default();
        for _ in 0..count {
            let r = self.tick();
            total.delivered += r.delivered;
            total.loads_completed += r.loads_completed;
            total.loads_failed += r.loads_failed;
            total.reclaimed += r.reclaimed;
        }
        total
    }

    // -- accessors ----------------------------------------------------------

    pub fn tick_count(&self) -> u64 {
        self.tick_counter
    }

    /// Simulated time: tick count times the interval.
    pub fn sim_time(&self) -> Duration {
        let nanos = self.config.tick_interval.as_nanos() * u128::from(self.tick_counter);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    pub fn tick_interval(&self) -> Duration {
        self.config.tick_interval
    }

    pub fn pool(&self) -> &PoolContext<MemoryBackend> {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut PoolContext<MemoryBackend> {
        &mut self.pool
    }

    pub fn system_names(&self) -> Vec<&str> {
        self.systems.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn last_report(&self) -> TickReport {
        self.last_report
    }

    pub fn last_diagnostics(&self) -> &HostDiagnostics {
        &self.last_diagnostics
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use reclaim_pool::config::PoolConfig;
    use reclaim_pool::key::Pose;

    fn host() -> HostLoop {
        let config = HostConfig::default();
        let mut pool = PoolContext::new(config.backend(), PoolConfig::default());
        pool.reset();
        HostLoop::new(pool, config)
    }

    #[test]
    #[should_panic(expected = "tick_interval must be positive")]
    fn zero_interval_panics() {
        let config = HostConfig {
            tick_interval: Duration::ZERO,
            ..HostConfig::default()
        };
        let pool = PoolContext::new(config.backend(), PoolConfig::default());
        let _ = HostLoop::new(pool, config);
    }

    #[test]
    #[should_panic(expected = "duplicate system name")]
    fn duplicate_system_panics() {
        let mut host = host();
        host.add_system("a", |_, _| {});
        host.add_system("a", |_, _| {});
    }

    #[test]
    fn systems_run_in_order_each_tick() {
        let mut host = host();
        host.add_system("first", |_, _| {});
        host.add_system("second", |_, _| {});
        host.run_ticks(3);

        assert_eq!(host.system_names(), vec!["first", "second"]);
        let names: Vec<_> = host
            .last_diagnostics()
            .system_times
            .iter()
            .map(|(n, _)| n.as_str())
            .collect();
        assert_eq!(names, vec!["first", "second"]);
        assert_eq!(host.sim_time(), Duration::from_millis(300));
    }

    #[test]
    fn systems_see_the_tick_number() {
        let mut host = host();
        let rock = host.pool_mut().backend_mut().add_resource("Props/Rock", false);
        host.add_system("spawner", move |pool, tick| {
            if tick == 0 {
                let r = pool.spawn(&rock, Pose::IDENTITY).unwrap();
                pool.despawn_after(r, Duration::from_millis(200)).unwrap();
            }
        });
        host.tick();
        assert_eq!(host.last_report().reclaimed, 0);
        host.tick();
        assert_eq!(host.last_report().reclaimed, 1);
        assert_eq!(host.last_diagnostics().bare_idle, 1);
    }
}
