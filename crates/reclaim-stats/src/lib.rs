//! Reclaim Stats -- persisted pool statistics.
//!
//! At the end of a session the pool's [`Ledger`](reclaim_pool::ledger::Ledger)
//! says how many instances of each prototype a scene actually needed.
//! [`export_merged`] folds that into a per-scene JSON document, and
//! [`preload_plan`] turns the document back into preload entries so the next
//! session can pre-spawn exactly that many up front.

#![deny(unsafe_code)]

pub mod document;
pub mod preload;

pub use document::{export_merged, export_scene, file_name, StatsDocument};
pub use preload::{apply_plan, preload_plan, resource_path, PreloadPlan, Unresolved};

/// Errors produced while reading or writing statistics documents.
#[derive(Debug, thiserror::Error)]
pub enum StatsError {
    #[error("statistics file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("statistics document is malformed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("scene name is empty")]
    EmptySceneName,
}
