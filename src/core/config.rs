//! Per-session configuration.
//!
//! The defaults are the empirical constants of conventional AV-sync players;
//! they are exposed rather than derived. Host applications can embed
//! [`SessionConfig`] in their own config files through serde.

use serde::{Deserialize, Serialize};
use crate::core::time::Seconds;

/// Which clock drives presentation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    #[default]
    AudioMaster,
    VideoMaster,
    ExternalClock,
}

/// Drift thresholds used by `SyncController::compute_delay`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncThresholds {
    /// Lower bound of the display window (frame may be this late and still shown)
    pub sync_threshold_min: Seconds,
    /// Upper bound of the display window; also the lateness bound for drops
    pub sync_threshold_max: Seconds,
    /// Longest wait ever handed to the presenter
    pub max_wait: Seconds,
    /// Slave clocks further than this from the master are re-synced
    pub no_sync_threshold: Seconds,
    /// Frames are only dropped while more than this many packets are queued
    pub low_latency_backlog: usize,
}

impl Default for SyncThresholds {
    fn default() -> Self {
        Self {
            sync_threshold_min: 0.04,
            sync_threshold_max: 0.1,
            max_wait: 10.0,
            no_sync_threshold: 10.0,
            low_latency_backlog: 1,
        }
    }
}

/// Memory ceiling of a single packet queue. Any one queue over it throttles the demuxer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueLimits {
    pub max_bytes: usize,
    /// Ceiling on buffered media, in seconds
    pub max_duration: Seconds,
}

impl Default for QueueLimits {
    fn default() -> Self {
        Self {
            max_bytes: 15 * 1024 * 1024,
            max_duration: 10.0,
        }
    }
}

/// Buffering readiness thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub minimum_frames: usize,
    /// Buffered duration that must be exceeded, in seconds
    pub min_duration: Seconds,
    /// Total bytes across all queues after which the producer is throttled
    pub max_queue_bytes: usize,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            minimum_frames: 25,
            min_duration: 1.0,
            max_queue_bytes: 15 * 1024 * 1024,
        }
    }
}

/// Everything a playback session needs to decide policy
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub sync_mode: SyncMode,
    pub thresholds: SyncThresholds,
    /// Drop late frames when the decoder falls behind
    pub framedrop: bool,
    /// Don't limit the input buffer size (realtime sources)
    pub infinite_buffer: bool,
    pub gate: GateConfig,
    pub limits: QueueLimits,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.sync_mode, SyncMode::AudioMaster);
        assert!(!config.framedrop);
        assert!(!config.infinite_buffer);
        assert_eq!(config.gate.minimum_frames, 25);
        assert!((config.thresholds.sync_threshold_min - 0.04).abs() < 1e-12);
        assert!((config.thresholds.sync_threshold_max - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_partial_toml() {
        let text = r#"
            sync_mode = "video_master"
            framedrop = true

            [gate]
            minimum_frames = 10
        "#;
        let config: SessionConfig = toml::from_str(text).unwrap();
        assert_eq!(config.sync_mode, SyncMode::VideoMaster);
        assert!(config.framedrop);
        assert_eq!(config.gate.minimum_frames, 10);
        // Unspecified fields keep their defaults
        assert!((config.gate.min_duration - 1.0).abs() < 1e-12);
        assert_eq!(config.limits, QueueLimits::default());
    }
}
