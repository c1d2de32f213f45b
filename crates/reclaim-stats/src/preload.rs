//! Turning a statistics document back into preload configuration.
//!
//! Asset paths under a `Resources/` folder can be loaded by resource path at
//! runtime, so they become [`PreloadPath`] entries: everything up to and
//! including the last `Resources/` is dropped, as is the file extension.
//! Anything else needs an already loaded prototype and is returned as
//! unresolved for the caller to map.

use reclaim_pool::config::{PreloadConfig, PreloadPath};
use reclaim_pool::key::EntityKind;
use tracing::debug;

use crate::document::StatsDocument;

const RESOURCES_DIR: &str = "Resources/";

/// An element that could not be turned into a resource path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unresolved {
    pub kind: EntityKind,
    pub asset_path: String,
    pub count: usize,
}

/// Result of [`preload_plan`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreloadPlan {
    pub paths: Vec<PreloadPath>,
    pub unresolved: Vec<Unresolved>,
}

/// `Assets/Game/Resources/Enemies/Orc.prefab` -> `Enemies/Orc`.
pub fn resource_path(asset_path: &str) -> Option<String> {
    let start = asset_path.rfind(RESOURCES_DIR)? + RESOURCES_DIR.len();
    let rest = &asset_path[start..];
    if rest.is_empty() {
        return None;
    }
    // Only strip an extension from the final path segment.
    let stem = match rest.rfind('.') {
        Some(dot) if !rest[dot..].contains('/') && dot > 0 => &rest[..dot],
        _ => rest,
    };
    Some(stem.to_owned())
}

/// Convert every element of `doc` into a preload entry, bare entities first.
pub fn preload_plan(doc: &StatsDocument) -> PreloadPlan {
    let mut plan = PreloadPlan::default();
    for kind in [EntityKind::Bare, EntityKind::Capability] {
        for (asset_path, &count) in doc.group(kind) {
            let count = usize::try_from(count).unwrap_or(usize::MAX);
            match resource_path(asset_path) {
                Some(path) => plan.paths.push(PreloadPath { path, count }),
                None => plan.unresolved.push(Unresolved {
                    kind,
                    asset_path: asset_path.clone(),
                    count,
                }),
            }
        }
    }
    debug!(
        paths = plan.paths.len(),
        unresolved = plan.unresolved.len(),
        "preload plan built"
    );
    plan
}

/// Fold the plan's paths into `preload`: existing entries get the planned
/// count, new paths are appended in plan order.
pub fn apply_plan<P>(preload: &mut PreloadConfig<P>, plan: &PreloadPlan) {
    for planned in &plan.paths {
        match preload.paths.iter_mut().find(|p| p.path == planned.path) {
            Some(existing) => existing.count = planned.count,
            None => preload.paths.push(planned.clone()),
        }
    }
}
