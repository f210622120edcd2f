//! Engine configuration.
//!
//! Every section falls back to its defaults, so a partial JSON document such
//! as `{"persistence": {"debounce_ms": 250}}` is a valid configuration.

use crate::camera::{DEFAULT_MAX_ZOOM, DEFAULT_MIN_ZOOM};
use crate::hit_test::{DEFAULT_EDGE_TOLERANCE, PORT_HIT_MARGIN, PORT_RADIUS};
use crate::ports::{DEFAULT_HIT_RADIUS, DEFAULT_SNAP_DISTANCE};
use crate::storage::{DEFAULT_DEBOUNCE_MS, DEFAULT_MAX_RETRY_DELAY_MS, DEFAULT_MAX_SNAPSHOTS};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level configuration for the canvas engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub camera: CameraConfig,
    pub hit_test: HitTestConfig,
    pub persistence: PersistenceConfig,
    pub history: HistoryConfig,
}

impl EngineConfig {
    /// Parse a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize the configuration to pretty JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Zoom limits for the camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub min_zoom: f64,
    pub max_zoom: f64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            min_zoom: DEFAULT_MIN_ZOOM,
            max_zoom: DEFAULT_MAX_ZOOM,
        }
    }
}

/// Pointer tolerances, all in world units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HitTestConfig {
    /// Drawn radius of a port circle.
    pub port_radius: f64,
    /// Extra slack around a port when hit testing nodes.
    pub port_hit_margin: f64,
    /// Radius used by standalone port hit tests.
    pub port_hit_radius: f64,
    /// Maximum distance for snapping a dragged connector onto a port.
    pub snap_distance: f64,
    /// Maximum distance from a connector curve that still counts as a hit.
    pub edge_tolerance: f64,
}

impl Default for HitTestConfig {
    fn default() -> Self {
        Self {
            port_radius: PORT_RADIUS,
            port_hit_margin: PORT_HIT_MARGIN,
            port_hit_radius: DEFAULT_HIT_RADIUS,
            snap_distance: DEFAULT_SNAP_DISTANCE,
            edge_tolerance: DEFAULT_EDGE_TOLERANCE,
        }
    }
}

/// Snapshot persistence settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Quiet period after the last update before a snapshot is written.
    pub debounce_ms: u64,
    /// Snapshots kept per project after each successful write.
    pub max_snapshots_per_project: usize,
    /// Re-arm the timer with backoff when a write fails.
    pub retry_on_failure: bool,
    /// Upper bound for the retry backoff.
    pub max_retry_delay_ms: u64,
}

impl PersistenceConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn max_retry_delay(&self) -> Duration {
        Duration::from_millis(self.max_retry_delay_ms.max(self.debounce_ms))
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            max_snapshots_per_project: DEFAULT_MAX_SNAPSHOTS,
            retry_on_failure: true,
            max_retry_delay_ms: DEFAULT_MAX_RETRY_DELAY_MS,
        }
    }
}

/// Undo history settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub max_undo_steps: usize,
    /// Local edits closer together than this merge into one undo step.
    pub merge_interval_ms: i64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_undo_steps: 100,
            merge_interval_ms: 300,
        }
    }
}
