//! Metronome click synthesis.

use oc_ir::Waveform;

use crate::config::MetronomeConfig;
use crate::graph::NodeId;
use crate::manager::AudioGraphManager;
use crate::node::ParamKind;

/// How long a click's nodes live, in seconds.
pub const CLICK_LENGTH: f64 = 0.08;

const CLICK_ATTACK: f64 = 0.005;
const CLICK_DECAY: f64 = 0.015;

#[derive(Clone, Debug)]
pub struct Metronome {
    config: MetronomeConfig,
}

impl Metronome {
    pub fn new(config: MetronomeConfig) -> Self {
        Self { config }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.config.enabled = enabled;
    }

    pub fn volume(&self) -> f32 {
        self.config.volume
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.config.volume = if volume.is_finite() { volume.clamp(0.0, 1.0) } else { 0.0 };
    }

    pub fn frequency(&self, accent: bool) -> f32 {
        if accent {
            self.config.accent_hz
        } else {
            self.config.tick_hz
        }
    }

    /// Build a square-wave burst at `time` feeding the master input.
    /// Returns the nodes to free once the click has played.
    pub fn build_click(&self, audio: &AudioGraphManager, time: f64, accent: bool) -> Option<[NodeId; 2]> {
        let target = audio.master_input()?;
        let osc = audio.create_oscillator(Waveform::Square, self.frequency(accent))?;
        let Some(gain) = audio.create_gain(0.0) else {
            audio.remove_node(osc);
            return None;
        };
        let wired = audio
            .connect(osc, gain)
            .and_then(|_| audio.connect(gain, target));
        if wired.is_err() {
            audio.remove_node(osc);
            audio.remove_node(gain);
            return None;
        }

        let volume = self.config.volume;
        audio.param(gain, ParamKind::Gain, |p| {
            p.set_value_at(0.0, time);
            p.linear_ramp_to(volume, time + CLICK_ATTACK);
            p.set_target_at(0.0, time + CLICK_ATTACK, CLICK_DECAY);
        });
        audio.with_graph(|g| {
            if let Some(node) = g.node_mut(osc) {
                node.start_at(time, 0.0);
                node.stop_at(time + CLICK_LENGTH);
            }
        });
        Some([osc, gain])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoreConfig;
    use crate::host::OfflineHost;

    #[test]
    fn accent_uses_higher_pitch() {
        let m = Metronome::new(MetronomeConfig::default());
        assert_eq!(m.frequency(false), 1000.0);
        assert_eq!(m.frequency(true), 1800.0);
    }

    #[test]
    fn click_is_audible_then_silent() {
        let mut audio = AudioGraphManager::new(Box::new(OfflineHost::new(48_000)), CoreConfig::default());
        audio.init().unwrap();
        let m = Metronome::new(MetronomeConfig {
            enabled: true,
            volume: 1.0,
            ..MetronomeConfig::default()
        });
        assert!(m.build_click(&audio, 0.0, true).is_some());
        let frames = audio.render_offline(4_800).unwrap();
        assert!(frames[..960].iter().any(|f| f.peak() > 1000));
        assert!(frames[3_900..].iter().all(|f| f.peak() == 0));
    }
}
