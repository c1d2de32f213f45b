//! Reclaim Pool -- runtime object recycling for scene entities.
//!
//! Instead of creating and destroying entities on demand, callers *spawn*
//! from the pool and *despawn* back into it. Despawned instances are
//! deactivated and queued per prototype; the next spawn of that prototype
//! reuses the oldest queued instance. Only when a queue is empty does the
//! pool ask its [`Backend`](backend::Backend) for a fresh instance.
//!
//! Two entity kinds are pooled side by side:
//!
//! - **bare** entities, plain positional instances with no hooks;
//! - **capability** entities, implementing [`Poolable`](backend::Poolable)
//!   and notified on every spawn and despawn.
//!
//! Beyond direct spawning the pool offers name-based spawning (first load
//! binds a logical name to a prototype), asynchronous spawning driven by the
//! host tick, pre-spawning, deferred despawn after a lifetime, and per
//! prototype statistics (`stats` feature).
//!
//! All state lives in an explicit [`PoolContext`](context::PoolContext);
//! nothing is global. The context is single-threaded and is driven by the
//! host calling [`tick`](context::PoolContext::tick) once per frame.

#![deny(unsafe_code)]

pub mod activation;
pub mod backend;
pub mod config;
pub mod context;
pub mod key;
pub mod ledger;
pub mod names;
pub mod pool;
pub mod store;
pub mod timer;

use tracing::{error, warn};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by pool operations.
///
/// Every failing public operation logs its error through `tracing` before
/// returning it. The classification helpers group variants the way callers
/// usually react to them.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// The pool has not been reset yet, or was destroyed.
    #[error("pool is not initialized (call reset first)")]
    NotInitialized,

    /// The prototype reference is null or no longer valid.
    #[error("prototype reference is null or no longer valid")]
    InvalidPrototype,

    /// The instance handed back no longer refers to a live entity.
    #[error("instance {instance} is no longer alive")]
    InvalidInstance { instance: String },

    /// The instance was spawned before the last reset or destroy.
    #[error(
        "instance of {key} was spawned in pool epoch {spawned_in}, \
         current epoch is {current}"
    )]
    StaleInstance {
        key: key::PrototypeKey,
        spawned_in: u64,
        current: u64,
    },

    #[error("resource path is empty")]
    EmptyPath,

    #[error("logical name is empty")]
    EmptyName,

    /// Loading by path found nothing.
    #[error("no prototype found at resource path '{path}'")]
    ResourceNotFound { path: String },

    /// A capability operation was given a prototype without the capability.
    #[error("prototype '{prototype}' does not implement the spawn/despawn capability")]
    MissingCapability { prototype: String },

    #[error(transparent)]
    Backend(#[from] backend::BackendError),

    /// The statistics ledger disagrees with the pool.
    #[error(transparent)]
    Ledger(#[from] ledger::LedgerError),

    #[error("invalid pool configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// A setting parsed but its value is out of range.
    #[error("invalid pool setting '{field}': {reason}")]
    InvalidSetting { field: &'static str, reason: String },
}

impl PoolError {
    /// The caller passed something the pool cannot accept.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            PoolError::InvalidPrototype
                | PoolError::InvalidInstance { .. }
                | PoolError::StaleInstance { .. }
                | PoolError::EmptyPath
                | PoolError::EmptyName
                | PoolError::MissingCapability { .. }
                | PoolError::InvalidSetting { .. }
        )
    }

    pub fn is_resource_not_found(&self) -> bool {
        matches!(self, PoolError::ResourceNotFound { .. })
    }

    /// The pool's own bookkeeping is inconsistent.
    pub fn is_internal(&self) -> bool {
        matches!(self, PoolError::Ledger(_))
    }

    pub(crate) fn log(&self, operation: &str) {
        if self.is_internal() {
            error!(operation, error = %self, "pool bookkeeping is inconsistent");
        } else if matches!(self, PoolError::NotInitialized) {
            warn!(operation, "pool used before initialization");
        } else {
            error!(operation, error = %self, "pool operation failed");
        }
    }
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::activation::{Activation, Bare, Capability};
    pub use crate::backend::{Backend, BackendError, LoadCompletion, LoadTicket, Poolable};
    pub use crate::config::{PoolConfig, PoolSettings, PreloadConfig, PreloadPath, PreloadPrototype};
    pub use crate::context::{PoolContext, SpawnCallback, TickReport};
    pub use crate::key::{EntityKind, Pose, PrototypeInfo, PrototypeKey};
    pub use crate::ledger::{Ledger, LedgerError, StatRecord};
    pub use crate::pool::Pooled;
    pub use crate::PoolError;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_is_disjoint() {
        let errors = [
            PoolError::NotInitialized,
            PoolError::InvalidPrototype,
            PoolError::EmptyPath,
            PoolError::ResourceNotFound {
                path: "x".into(),
            },
            PoolError::Ledger(ledger::LedgerError::Untracked {
                kind: key::EntityKind::Bare,
                key: key::PrototypeKey::new(1),
            }),
        ];
        for err in &errors {
            let hits = [
                err.is_invalid_argument(),
                err.is_resource_not_found(),
                err.is_internal(),
            ]
            .iter()
            .filter(|b| **b)
            .count();
            assert!(hits <= 1, "{err} falls in {hits} categories");
        }
        assert!(errors[4].to_string().contains("invariant violated"));
    }
}
