//! Prototype identity and spawn placement.
//!
//! A [`PrototypeKey`] names the idle queue an instance belongs to. Keys are
//! handed out by the [`Backend`](crate::backend::Backend) from the identity of
//! a loaded prototype object, so two prototypes that share a display name but
//! were loaded separately never share a queue.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// PrototypeKey
// ---------------------------------------------------------------------------

/// Opaque, stable identifier of a prototype.
///
/// Immutable once assigned. The numeric value carries no meaning beyond
/// equality; it is exposed only so backends can mint keys.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PrototypeKey(u64);

impl PrototypeKey {
    /// Mint a key from a backend-side identity value.
    #[inline]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw `u64` representation.
    #[inline]
    pub fn to_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for PrototypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrototypeKey({})", self.0)
    }
}

impl fmt::Display for PrototypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "proto#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// PrototypeInfo
// ---------------------------------------------------------------------------

/// Human-facing description of a prototype, used for statistics only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrototypeInfo {
    /// Display name (not unique).
    pub display_name: String,
    /// Where the prototype was loaded from. Empty when it has no on-disk
    /// source (e.g. created at runtime).
    pub source_path: String,
}

// ---------------------------------------------------------------------------
// EntityKind
// ---------------------------------------------------------------------------

/// Which of the two parallel pools an instance lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// Plain positional entity; no lifecycle hooks.
    Bare,
    /// Entity implementing [`Poolable`](crate::backend::Poolable); receives
    /// `on_spawn` / `on_despawn`.
    Capability,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Bare => f.write_str("bare"),
            EntityKind::Capability => f.write_str("capability"),
        }
    }
}

// ---------------------------------------------------------------------------
// Pose
// ---------------------------------------------------------------------------

/// Position and orientation applied to an instance when it is handed out.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// World-space position `[x, y, z]`.
    pub position: [f32; 3],
    /// Orientation quaternion `[x, y, z, w]`.
    pub orientation: [f32; 4],
}

impl Pose {
    /// Origin with identity orientation. Used by pre-spawning.
    pub const IDENTITY: Pose = Pose {
        position: [0.0, 0.0, 0.0],
        orientation: [0.0, 0.0, 0.0, 1.0],
    };

    /// A pose at `position` with identity orientation.
    pub fn at(position: [f32; 3]) -> Self {
        Self {
            position,
            ..Self::IDENTITY
        }
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
