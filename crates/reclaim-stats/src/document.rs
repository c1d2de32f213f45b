//! The persisted statistics document.
//!
//! One document per scene records, for every prototype that went through the
//! pool, how many instances the scene needed. Element names are prototype
//! source paths; values are instance counts. Documents only ever grow:
//! merging keeps the larger of the stored and the newly observed count, so a
//! quiet play session never shrinks what a busy one recorded.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use reclaim_pool::key::EntityKind;
use reclaim_pool::ledger::Ledger;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::StatsError;

/// Suffix appended to the scene name to form the document file name.
pub const FILE_SUFFIX: &str = "_prespawn.json";

/// Instance counts per source path, split by entity kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsDocument {
    pub bare_entities: BTreeMap<String, u64>,
    pub capability_entities: BTreeMap<String, u64>,
}

impl StatsDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a document from the ledger's live-instance counts.
    ///
    /// Records without a source path cannot be preloaded later and are
    /// skipped with a warning. Several prototypes sharing one path keep the
    /// largest count.
    pub fn from_ledger(ledger: &Ledger) -> Self {
        let mut doc = Self::new();
        for kind in [EntityKind::Bare, EntityKind::Capability] {
            for (key, record) in ledger.records(kind) {
                if record.source_path.is_empty() {
                    warn!(
                        %kind,
                        %key,
                        prototype = %record.display_name,
                        "prototype has no source path and cannot be pre-spawned"
                    );
                    continue;
                }
                doc.observe(kind, &record.source_path, record.live_instance_count);
            }
        }
        doc
    }

    pub fn group(&self, kind: EntityKind) -> &BTreeMap<String, u64> {
        match kind {
            EntityKind::Bare => &self.bare_entities,
            EntityKind::Capability => &self.capability_entities,
        }
    }

    fn group_mut(&mut self, kind: EntityKind) -> &mut BTreeMap<String, u64> {
        match kind {
            EntityKind::Bare => &mut self.bare_entities,
            EntityKind::Capability => &mut self.capability_entities,
        }
    }

    /// Record `count` for `path`, keeping the larger value.
    pub fn observe(&mut self, kind: EntityKind, path: &str, count: u64) {
        let slot = self.group_mut(kind).entry(path.to_owned()).or_insert(0);
        *slot = (*slot).max(count);
    }

    /// Merge `other` into `self`, element-wise maximum.
    pub fn merge_max(&mut self, other: &StatsDocument) {
        for kind in [EntityKind::Bare, EntityKind::Capability] {
            for (path, &count) in other.group(kind) {
                self.observe(kind, path, count);
            }
        }
    }

    /// Both groups have at least one element.
    pub fn is_exportable(&self) -> bool {
        !self.bare_entities.is_empty() && !self.capability_entities.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.bare_entities.is_empty() && self.capability_entities.is_empty()
    }

    pub fn to_json(&self) -> Result<String, StatsError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, StatsError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read a document. A missing file yields an empty document.
    pub fn load(path: &Path) -> Result<Self, StatsError> {
        match fs::read_to_string(path) {
            Ok(json) => Self::from_json(&json),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::new()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), StatsError> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

/// Document file name for `scene`.
pub fn file_name(scene: &str) -> Result<String, StatsError> {
    if scene.is_empty() {
        return Err(StatsError::EmptySceneName);
    }
    Ok(format!("{scene}{FILE_SUFFIX}"))
}

/// Merge the ledger into the document at `path` and write it back.
///
/// Nothing is written unless the ledger has entries of both kinds; returns
/// whether the file was written. An unreadable existing document is logged
/// and replaced.
pub fn export_merged(ledger: &Ledger, path: &Path) -> Result<bool, StatsError> {
    let observed = StatsDocument::from_ledger(ledger);
    if !observed.is_exportable() {
        debug!(path = %path.display(), "statistics not exported: a group is empty");
        return Ok(false);
    }

    let mut doc = match StatsDocument::load(path) {
        Ok(doc) => doc,
        Err(e) => {
            error!(path = %path.display(), error = %e, "existing statistics unreadable, starting over");
            StatsDocument::new()
        }
    };
    doc.merge_max(&observed);
    doc.save(path)?;
    debug!(
        path = %path.display(),
        bare = doc.bare_entities.len(),
        capability = doc.capability_entities.len(),
        "statistics exported"
    );
    Ok(true)
}

/// [`export_merged`] into `<dir>/<scene>_prespawn.json`.
pub fn export_scene(ledger: &Ledger, dir: &Path, scene: &str) -> Result<bool, StatsError> {
    export_merged(ledger, &dir.join(file_name(scene)?))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
