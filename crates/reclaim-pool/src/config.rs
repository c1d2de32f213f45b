//! Pool configuration: engine settings and the preload lists consumed by
//! [`PoolContext::reset`](crate::context::PoolContext::reset).
//!
//! Settings and path lists are plain serde types so they can come from a JSON
//! file. Prototype preloads carry live backend references and are built in
//! code.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::timer::DEFAULT_RECLAIM_INTERVAL;
use crate::PoolError;

// ---------------------------------------------------------------------------
// PoolSettings
// ---------------------------------------------------------------------------

/// Engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    /// Reclamation tick interval in milliseconds. Must be positive.
    pub reclaim_interval_ms: u64,
    /// Keep per-prototype statistics. Ignored when the crate is built
    /// without the `stats` feature.
    pub track_stats: bool,
}

impl PoolSettings {
    /// Parse settings from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, PoolError> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check value ranges. [`PoolContext::new`](crate::context::PoolContext::new)
    /// asserts the same conditions.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.reclaim_interval_ms == 0 {
            return Err(PoolError::InvalidSetting {
                field: "reclaim_interval_ms",
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }

    pub fn reclaim_interval(&self) -> Duration {
        Duration::from_millis(self.reclaim_interval_ms)
    }

    /// Whether the engine should carry a ledger.
    pub fn stats_enabled(&self) -> bool {
        cfg!(feature = "stats") && self.track_stats
    }
}

impl Default for PoolSettings {
    /// 100 ms reclamation ticks, statistics on.
    fn default() -> Self {
        Self {
            reclaim_interval_ms: DEFAULT_RECLAIM_INTERVAL.as_millis() as u64,
            track_stats: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Preload lists
// ---------------------------------------------------------------------------

/// Pre-spawn `count` instances of a resource loaded by path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreloadPath {
    pub path: String,
    pub count: usize,
}

/// Pre-spawn `count` instances of an already loaded prototype.
#[derive(Debug, Clone)]
pub struct PreloadPrototype<P> {
    pub prototype: P,
    pub count: usize,
}

/// Ordered preload lists. Prototypes are pre-spawned first, then paths.
#[derive(Debug, Clone)]
pub struct PreloadConfig<P> {
    pub prototypes: Vec<PreloadPrototype<P>>,
    pub paths: Vec<PreloadPath>,
}

impl<P> PreloadConfig<P> {
    pub fn new() -> Self {
        Self {
            prototypes: Vec::new(),
            paths: Vec::new(),
        }
    }

    pub fn with_prototype(mut self, prototype: P, count: usize) -> Self {
        self.prototypes.push(PreloadPrototype { prototype, count });
        self
    }

    pub fn with_path(mut self, path: &str, count: usize) -> Self {
        self.paths.push(PreloadPath {
            path: path.to_owned(),
            count,
        });
        self
    }

    /// Replace the path list with one parsed from a JSON array of
    /// `{"path": ..., "count": ...}` objects.
    pub fn with_paths_json(mut self, json: &str) -> Result<Self, PoolError> {
        self.paths = serde_json::from_str(json)?;
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.prototypes.is_empty() && self.paths.is_empty()
    }
}

impl<P> Default for PreloadConfig<P> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// PoolConfig
// ---------------------------------------------------------------------------

/// Everything a [`PoolContext`](crate::context::PoolContext) needs besides
/// its backend.
#[derive(Debug, Clone)]
pub struct PoolConfig<P> {
    pub settings: PoolSettings,
    pub preload: PreloadConfig<P>,
}

impl<P> Default for PoolConfig<P> {
    fn default() -> Self {
        Self {
            settings: PoolSettings::default(),
            preload: PreloadConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings() {
        let s = PoolSettings::default();
        assert_eq!(s.reclaim_interval(), Duration::from_millis(100));
        assert!(s.track_stats);
        assert_eq!(s.stats_enabled(), cfg!(feature = "stats"));
    }

    #[test]
    fn settings_from_partial_json() {
        let s = PoolSettings::from_json(r#"{ "reclaim_interval_ms": 50 }"#).unwrap();
        assert_eq!(s.reclaim_interval(), Duration::from_millis(50));
        assert!(s.track_stats);
    }

    #[test]
    fn malformed_settings_are_config_errors() {
        let err = PoolSettings::from_json("{ not json").unwrap_err();
        assert!(matches!(err, PoolError::Config(_)));
    }

    #[test]
    fn zero_interval_in_json_is_rejected() {
        let err = PoolSettings::from_json(r#"{ "reclaim_interval_ms": 0 }"#).unwrap_err();
        assert!(matches!(
            err,
            PoolError::InvalidSetting {
                field: "reclaim_interval_ms",
                ..
            }
        ));
        assert!(PoolSettings::default().validate().is_ok());
    }

    #[test]
    fn preload_builder_keeps_order() {
        let cfg: PreloadConfig<&str> = PreloadConfig::new()
            .with_prototype("a", 2)
            .with_prototype("b", 1)
            .with_path("fx/spark", 4);
        assert_eq!(cfg.prototypes[0].prototype, "a");
        assert_eq!(cfg.prototypes[1].count, 1);
        assert_eq!(cfg.paths[0].path, "fx/spark");
        assert!(!cfg.is_empty());
    }

    #[test]
    fn preload_paths_from_json() {
        let cfg: PreloadConfig<()> = PreloadConfig::new()
            .with_paths_json(r#"[{"path": "Enemies/Orc", "count": 3}]"#)
            .unwrap();
        assert_eq!(
            cfg.paths,
            vec![PreloadPath {
                path: "Enemies/Orc".into(),
                count: 3
            }]
        );
    }
}
