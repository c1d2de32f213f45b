//! Instrumentation ledger: per-prototype spawn statistics.
//!
//! The [`Ledger`] keeps one [`StatRecord`] per prototype and entity kind,
//! updated in lockstep with every pool operation. Because the pool only ever
//! hands out instances it instantiated or queued itself, a statistic update
//! for an untracked prototype means the pool's own invariants were broken;
//! that is reported as a [`LedgerError`], never silently absorbed.
//!
//! The ledger also cross-checks entity kinds: a capability-bearing prototype
//! pushed through the bare path (or the reverse) is logged as a warning. The
//! pool stays consistent either way.
//!
//! # Example
//!
//! ```
//! use reclaim_pool::ledger::Ledger;
//! use reclaim_pool::key::{EntityKind, PrototypeInfo, PrototypeKey};
//!
//! let mut ledger = Ledger::new();
//! let key = PrototypeKey::new(1);
//! let info = PrototypeInfo { display_name: "bullet".into(), source_path: "fx/bullet".into() };
//!
//! ledger.on_first_instantiate(EntityKind::Bare, key, &info, false);
//! ledger.on_despawn(EntityKind::Bare, key).unwrap();
//! ledger.on_spawn_from_pool(EntityKind::Bare, key).unwrap();
//!
//! let record = ledger.record(EntityKind::Bare, key).unwrap();
//! assert_eq!((record.spawn_count, record.despawn_count, record.live_instance_count), (2, 1, 1));
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::key::{EntityKind, PrototypeInfo, PrototypeKey};

// ---------------------------------------------------------------------------
// StatRecord
// ---------------------------------------------------------------------------

/// Counters for one prototype.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatRecord {
    pub display_name: String,
    pub source_path: String,
    /// Times an instance was handed out (fresh or reused).
    pub spawn_count: u64,
    /// Times an instance was returned to the pool.
    pub despawn_count: u64,
    /// Instances ever created for this prototype.
    pub live_instance_count: u64,
}

// ---------------------------------------------------------------------------
// LedgerError
// ---------------------------------------------------------------------------

/// Internal-consistency violations detected by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// A spawn or despawn was recorded for a prototype that was never
    /// instantiated through the pool.
    #[error("invariant violated: no statistics for {kind} prototype {key} (recorded before instantiation)")]
    Untracked { kind: EntityKind, key: PrototypeKey },

    /// Counters disagree with the idle queue.
    #[error(
        "invariant violated: {kind} prototype {key} has {live} instances, {idle} idle, \
         but {spawned} spawns vs {despawned} despawns"
    )]
    Drift {
        kind: EntityKind,
        key: PrototypeKey,
        live: u64,
        idle: u64,
        spawned: u64,
        despawned: u64,
    },
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Per-kind, per-prototype statistics.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    bare: HashMap<PrototypeKey, StatRecord>,
    capability: HashMap<PrototypeKey, StatRecord>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    fn storage(&self, kind: EntityKind) -> &HashMap<PrototypeKey, StatRecord> {
        match kind {
            EntityKind::Bare => &self.bare,
            EntityKind::Capability => &self.capability,
        }
    }

    fn storage_mut(&mut self, kind: EntityKind) -> &mut HashMap<PrototypeKey, StatRecord> {
        match kind {
            EntityKind::Bare => &mut self.bare,
            EntityKind::Capability => &mut self.capability,
        }
    }

    /// Record a fresh instantiation, which also counts as a spawn.
    ///
    /// Creates the record on first sight; afterwards bumps the instance count
    /// (the same prototype can be instantiated several times before anything
    /// is ever queued).
    pub fn on_first_instantiate(
        &mut self,
        kind: EntityKind,
        key: PrototypeKey,
        info: &PrototypeInfo,
        has_capability: bool,
    ) {
        let storage = self.storage_mut(kind);
        if let Some(record) = storage.get_mut(&key) {
            record.live_instance_count += 1;
            record.spawn_count += 1;
            return;
        }
        storage.insert(
            key,
            StatRecord {
                display_name: info.display_name.clone(),
                source_path: info.source_path.clone(),
                spawn_count: 1,
                despawn_count: 0,
                live_instance_count: 1,
            },
        );
        check_kind(kind, has_capability, &info.display_name, "spawn");
    }

    /// Record an instance handed out from the idle queue.
    pub fn on_spawn_from_pool(
        &mut self,
        kind: EntityKind,
        key: PrototypeKey,
    ) -> Result<(), LedgerError> {
        let record = self
            .storage_mut(kind)
            .get_mut(&key)
            .ok_or(LedgerError::Untracked { kind, key })?;
        record.spawn_count += 1;
        Ok(())
    }

    /// Record an instance returned to the idle queue.
    pub fn on_despawn(&mut self, kind: EntityKind, key: PrototypeKey) -> Result<(), LedgerError> {
        let record = self
            .storage_mut(kind)
            .get_mut(&key)
            .ok_or(LedgerError::Untracked { kind, key })?;
        record.despawn_count += 1;
        Ok(())
    }

    /// Warn if an instance despawned through the `kind` path does not match
    /// its capability. Returns `true` when the kinds agree.
    pub fn check_despawn_kind(
        &self,
        kind: EntityKind,
        key: PrototypeKey,
        has_capability: bool,
    ) -> bool {
        let name = self
            .record(kind, key)
            .map_or("<untracked>", |r| r.display_name.as_str());
        check_kind(kind, has_capability, name, "despawn")
    }

    pub fn record(&self, kind: EntityKind, key: PrototypeKey) -> Option<&StatRecord> {
        self.storage(kind).get(&key)
    }

    /// All records of one kind (unordered).
    pub fn records(&self, kind: EntityKind) -> impl Iterator<Item = (PrototypeKey, &StatRecord)> {
        self.storage(kind).iter().map(|(k, r)| (*k, r))
    }

    pub fn len(&self, kind: EntityKind) -> usize {
        self.storage(kind).len()
    }

    pub fn is_empty(&self, kind: EntityKind) -> bool {
        self.storage(kind).is_empty()
    }

    /// Check every record of `kind` against the idle queue sizes reported by
    /// `idle_count`: instances not idle must equal spawns not yet despawned.
    pub fn verify(
        &self,
        kind: EntityKind,
        idle_count: impl Fn(PrototypeKey) -> usize,
    ) -> Result<(), LedgerError> {
        for (&key, record) in self.storage(kind) {
            let idle = idle_count(key) as u64;
            let out_live = record.live_instance_count as i128 - idle as i128;
            let out_spawned = record.spawn_count as i128 - record.despawn_count as i128;
            if out_live != out_spawned {
                return Err(LedgerError::Drift {
                    kind,
                    key,
                    live: record.live_instance_count,
                    idle,
                    spawned: record.spawn_count,
                    despawned: record.despawn_count,
                });
            }
        }
        Ok(())
    }
}

/// Misclassification check shared by spawn and despawn.
fn check_kind(kind: EntityKind, has_capability: bool, name: &str, action: &str) -> bool {
    match (kind, has_capability) {
        (EntityKind::Bare, true) => {
            warn!(prototype = %name, "trying to {action} a capability entity through the bare path");
            false
        }
        (EntityKind::Capability, false) => {
            warn!(prototype = %name, "trying to {action} a bare entity through the capability path");
            false
        }
        _ => true,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
