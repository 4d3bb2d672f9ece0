//! Engine configuration.
//!
//! One explicit, serializable object handed to the engine at construction.
//! There is intentionally no process-wide settings holder: every component
//! that needs a tunable receives it through this struct.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// All engine tunables with their defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    /// Frame buffer capacity (entries). The loader blocks when this many
    /// decoded frames are waiting.
    pub buffer_capacity: usize,

    /// Floor for the clock tick period, in milliseconds. Keeps extreme
    /// rate multipliers from busy-spinning the owning loop.
    pub min_tick_period_ms: u64,

    /// How long a clock tick may wait on an empty buffer before reporting
    /// an underrun. Bounded so the owning thread is never parked for long.
    pub pop_timeout_ms: u64,

    /// Consecutive empty pops before a stall event is emitted.
    pub stall_threshold: u32,

    /// Frame rate assumed when the host does not provide a usable one.
    pub fallback_frame_rate: f64,

    /// Whether new sessions loop inside the trim range.
    pub loop_by_default: bool,

    /// How long teardown waits for the loader thread before proceeding
    /// without it. Shutdown is never blocked indefinitely.
    pub loader_join_timeout_ms: u64,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 60,
            min_tick_period_ms: 2,
            pop_timeout_ms: 4,
            stall_threshold: 5,
            fallback_frame_rate: 30.0,
            loop_by_default: true,
            loader_join_timeout_ms: 500,
        }
    }
}

impl PreviewConfig {
    pub fn min_tick_period(&self) -> Duration {
        Duration::from_millis(self.min_tick_period_ms)
    }

    pub fn pop_timeout(&self) -> Duration {
        Duration::from_millis(self.pop_timeout_ms)
    }

    pub fn loader_join_timeout(&self) -> Duration {
        Duration::from_millis(self.loader_join_timeout_ms)
    }

    /// Load from a JSON file. Unknown fields are ignored, missing fields
    /// fall back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    /// Save as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, text)
            .with_context(|| format!("Failed to write config: {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_sane() {
        let cfg = PreviewConfig::default();
        assert!(cfg.buffer_capacity > 0);
        assert!(cfg.fallback_frame_rate > 0.0);
        assert!(cfg.pop_timeout() < Duration::from_secs(1));
    }

    /// Test: save then load round-trips every field
    /// Validates: serde layout is stable
    #[test]
    fn test_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prevue.json");

        let mut cfg = PreviewConfig::default();
        cfg.buffer_capacity = 12;
        cfg.fallback_frame_rate = 24.0;
        cfg.loop_by_default = false;
        cfg.save(&path).unwrap();

        let loaded = PreviewConfig::load(&path).unwrap();
        assert_eq!(loaded.buffer_capacity, 12);
        assert_eq!(loaded.fallback_frame_rate, 24.0);
        assert!(!loaded.loop_by_default);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prevue.json");
        std::fs::write(&path, r#"{ "buffer_capacity": 8 }"#).unwrap();

        let loaded = PreviewConfig::load(&path).unwrap();
        assert_eq!(loaded.buffer_capacity, 8);
        assert_eq!(
            loaded.stall_threshold,
            PreviewConfig::default().stall_threshold
        );
    }
}
