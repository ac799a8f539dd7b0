//! Configuration management for the metronome engine
//!
//! This module provides runtime configuration loading from JSON files so the
//! fallback tone, render strategy and event plumbing can be tuned without
//! recompiling. Every section is optional in the file; missing fields take
//! their defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub tone: ToneConfig,
    pub render: RenderConfig,
    pub events: EventConfig,
}

/// Synthesized fallback tone parameters
///
/// Used whenever no beep asset is supplied or the asset cannot be decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToneConfig {
    /// Sine frequency in Hz
    pub frequency_hz: f32,
    /// Tone length in milliseconds (this is also the beep window)
    pub duration_ms: f32,
    /// Peak amplitude in [0.0, 1.0]
    pub amplitude: f32,
}

impl ToneConfig {
    /// Short, bright 1 kHz click
    pub fn click() -> Self {
        Self {
            frequency_hz: 1000.0,
            duration_ms: 50.0,
            amplitude: 0.3,
        }
    }

    /// Longer A4 beep for quieter practice
    pub fn soft() -> Self {
        Self {
            frequency_hz: 440.0,
            duration_ms: 100.0,
            amplitude: 0.3,
        }
    }
}

impl Default for ToneConfig {
    fn default() -> Self {
        Self::click()
    }
}

/// How the render path produces frames for the device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderStrategy {
    /// Render every device block on demand (dynamic mute, zero added latency)
    #[default]
    Streaming,
    /// Pre-render a fixed number of beats into one buffer at start
    Offline,
    /// Background scheduler keeps a rolling window of beats queued ahead
    Lookahead,
}

/// Render engine parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub strategy: RenderStrategy,
    /// Number of beats pre-rendered by the offline strategy
    pub offline_beats: u32,
    /// Horizon of queued audio for the lookahead strategy, in seconds
    pub lookahead_secs: f32,
    /// Wake-up period of the lookahead scheduler thread
    pub scheduler_tick_ms: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            strategy: RenderStrategy::Streaming,
            offline_beats: 64,
            lookahead_secs: 5.0,
            scheduler_tick_ms: 25,
        }
    }
}

/// Beat notification plumbing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    /// Capacity of the lock-free ring between the render path and the notifier
    pub ring_capacity: usize,
    /// Capacity of the broadcast channel delivering events to subscribers
    pub broadcast_capacity: usize,
    /// How often the notifier drains the ring
    pub poll_interval_ms: u64,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            ring_capacity: 1024,
            broadcast_capacity: 256,
            poll_interval_ms: 2,
        }
    }
}

impl AppConfig {
    /// Load configuration from JSON file
    ///
    /// # Arguments
    /// * `path` - Path to JSON config file
    ///
    /// # Returns
    /// The loaded configuration. If the file doesn't exist or the JSON is
    /// invalid, the failure is logged and the defaults are returned.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Load configuration from the default asset location
    pub fn load() -> Self {
        Self::load_from_file("assets/beep_config.json")
    }
}
