//! Engine tuning.
//!
//! All values have defaults; a config file only needs the keys it changes.

use oc_ir::Adsr;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub core: CoreConfig,
    pub voice: VoiceConfig,
    pub metronome: MetronomeConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Rate for offline hosts; device hosts report their own
    pub sample_rate: u32,
    /// Period of the scheduling tick
    pub tick_interval_ms: u64,
    /// How far ahead of the audio clock notes are scheduled
    pub lookahead_ms: u64,
    pub master_volume: f32,
    /// Time constant for click-free parameter changes, in seconds
    pub smoothing: f64,
    pub limiter_threshold: f32,
}

impl CoreConfig {
    pub fn tick_interval(&self) -> f64 {
        self.tick_interval_ms.max(1) as f64 / 1000.0
    }

    pub fn lookahead(&self) -> f64 {
        self.lookahead_ms.max(1) as f64 / 1000.0
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            tick_interval_ms: 25,
            lookahead_ms: 100,
            master_volume: 0.8,
            smoothing: 0.01,
            limiter_threshold: 0.9,
        }
    }
}

/// Voice defaults. Tracks carry their own patch; this sets what new tracks get.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    pub envelope: Adsr,
    /// Extra oscillator run time after the release completes, in seconds
    pub stop_tail: f64,
    /// Release used when the transport stops
    pub force_release: f64,
    pub cutoff_hz: f32,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            envelope: Adsr::default(),
            stop_tail: 0.05,
            force_release: 0.015,
            cutoff_hz: 2400.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetronomeConfig {
    pub enabled: bool,
    pub volume: f32,
    pub tick_hz: f32,
    pub accent_hz: f32,
}

impl Default for MetronomeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            volume: 0.5,
            tick_hz: 1000.0,
            accent_hz: 1800.0,
        }
    }
}
