//! Bullet storm: a short shooter session on the in-memory host.
//!
//! A turret fires volleys of bullets that expire after a fixed flight time,
//! while drones stream in through async loads and die after a few ticks.
//! At the end the session statistics are exported, and the next session's
//! preload plan is built from them.
//!
//! Run with: `RUST_LOG=reclaim_pool=debug cargo run --example bullet_storm`

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use anyhow::Context;
use reclaim_host::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

const SETTINGS: &str = r#"{ "reclaim_interval_ms": 50, "track_stats": true }"#;
const PRELOAD: &str = r#"[ { "path": "Fx/Bullet", "count": 8 } ]"#;
const TICKS: u64 = 120;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = PoolSettings::from_json(SETTINGS).context("parsing pool settings")?;
    let host_config = HostConfig {
        tick_interval: settings.reclaim_interval(),
        load_latency_ticks: 3,
        latency_jitter: Some(0xB011E7),
    };

    let mut backend = host_config.backend();
    let bullet = backend.add_resource("Fx/Bullet", false);
    backend.add_resource("Enemies/Drone", true);

    let config = PoolConfig {
        settings,
        preload: PreloadConfig::new()
            .with_paths_json(PRELOAD)
            .context("parsing preload paths")?,
    };
    let mut pool = PoolContext::new(backend, config);
    pool.reset();
    let mut host = HostLoop::new(pool, host_config);

    host.add_system("turret", move |pool, tick| {
        if tick % 2 != 0 {
            return;
        }
        for i in 0..3 {
            let angle = (tick as f32 * 0.3) + i as f32;
            let pose = Pose::at([angle.cos(), angle.sin(), 0.0]);
            if let Ok(b) = pool.spawn(&bullet, pose) {
                let _ = pool.despawn_after(b, Duration::from_millis(400));
            }
        }
    });

    let drones: Rc<RefCell<Vec<(u64, Pooled<Actor>)>>> = Rc::default();
    let arrived = Rc::clone(&drones);
    host.add_system("drones", move |pool, tick| {
        if tick % 10 == 0 {
            let sink = Rc::clone(&arrived);
            let _ = pool.spawn_capability_by_name_async(
                "Drone",
                "Enemies/Drone",
                Pose::at([0.0, 10.0, 0.0]),
                move |_, drone| sink.borrow_mut().push((tick, drone)),
            );
        }
        let mut live = arrived.borrow_mut();
        while live.first().is_some_and(|(born, _)| tick >= born + 25) {
            let (_, drone) = live.remove(0);
            let _ = pool.despawn_capability(drone);
        }
    });

    let report = host.run_ticks(TICKS);
    let diag = host.last_diagnostics();
    info!(
        ticks = host.tick_count(),
        sim_time = ?host.sim_time(),
        reclaimed = report.reclaimed,
        loads = report.loads_completed,
        bullets_idle = diag.bare_idle,
        drones_idle = diag.capability_idle,
        instantiated = host.pool().backend().instantiate_count(),
        "session finished"
    );

    // Return the drones still flying so the export sees both groups.
    for (_, drone) in drones.borrow_mut().drain(..) {
        host.pool_mut().despawn_capability(drone)?;
    }
    host.pool().verify_ledger()?;

    let dir = tempfile::tempdir()?;
    let ledger = host
        .pool()
        .ledger()
        .context("statistics are disabled")?;
    let written = reclaim_stats::export_scene(ledger, dir.path(), "BulletStorm")?;
    let file = dir.path().join(reclaim_stats::file_name("BulletStorm")?);
    info!(written, file = %file.display(), "statistics exported");

    let doc = reclaim_stats::StatsDocument::load(&file)?;
    let plan = reclaim_stats::preload_plan(&doc);
    for entry in &plan.paths {
        info!(path = %entry.path, count = entry.count, "next session preload");
    }
    Ok(())
}
