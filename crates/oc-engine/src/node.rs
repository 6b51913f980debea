//! Processing nodes of the audio graph.
//!
//! Every node consumes one summed stereo input per frame and produces one
//! stereo output. Sources ignore their input.

use std::f64::consts::{PI, TAU};
use std::sync::Arc;

use oc_ir::{SampleData, Waveform};

use crate::param::AudioParam;

/// Selects an automatable parameter on a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParamKind {
    Frequency,
    Gain,
    Cutoff,
    DelayTime,
    Pan,
}

/// Filter response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum FilterMode {
    #[default]
    LowPass,
    HighPass,
}

/// Start/stop window shared by scheduled sources.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Lifetime {
    start: Option<f64>,
    stop: Option<f64>,
}

impl Lifetime {
    fn is_active(&self, t: f64) -> bool {
        match self.start {
            Some(start) => t >= start && self.stop.map_or(true, |stop| t < stop),
            None => false,
        }
    }

    fn is_finished(&self, t: f64) -> bool {
        self.stop.is_some_and(|stop| t >= stop)
    }
}

#[derive(Clone, Debug)]
pub struct Oscillator {
    pub waveform: Waveform,
    pub frequency: AudioParam,
    phase: f64,
    lifetime: Lifetime,
}

impl Oscillator {
    pub fn new(waveform: Waveform, frequency: f32) -> Self {
        Self {
            waveform,
            frequency: AudioParam::new(frequency, 0.0, 22_050.0),
            phase: 0.0,
            lifetime: Lifetime::default(),
        }
    }

    fn process(&mut self, t: f64, sample_rate: f64) -> f32 {
        if !self.lifetime.is_active(t) {
            return 0.0;
        }
        let out = match self.waveform {
            Waveform::Sine => (self.phase * TAU).sin(),
            Waveform::Square => {
                if self.phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Waveform::Sawtooth => 2.0 * self.phase - 1.0,
            Waveform::Triangle => 1.0 - 4.0 * (self.phase - 0.5).abs(),
        };
        self.phase = (self.phase + self.frequency.value_at(t) as f64 / sample_rate).fract();
        out as f32
    }
}

#[derive(Clone, Debug)]
pub struct Gain {
    pub gain: AudioParam,
}

/// Topology-preserving state variable filter (Simper's trapezoidal SVF).
#[derive(Clone, Debug)]
pub struct Filter {
    pub mode: FilterMode,
    pub cutoff: AudioParam,
    /// 0 (none) to 1 (self-oscillation edge)
    pub resonance: f32,
    ic1: [f64; 2],
    ic2: [f64; 2],
}

impl Filter {
    pub fn new(mode: FilterMode, cutoff: f32, resonance: f32) -> Self {
        Self {
            mode,
            cutoff: AudioParam::new(cutoff, 10.0, 22_050.0),
            resonance: resonance.clamp(0.0, 1.0),
            ic1: [0.0; 2],
            ic2: [0.0; 2],
        }
    }

    fn process(&mut self, input: (f32, f32), t: f64, sample_rate: f64) -> (f32, f32) {
        let fc = (self.cutoff.value_at(t) as f64).clamp(10.0, sample_rate * 0.45);
        let g = (PI * fc / sample_rate).tan();
        let k = 2.0 - 1.98 * self.resonance as f64;
        let a1 = 1.0 / (1.0 + g * (g + k));
        let a2 = g * a1;
        let a3 = g * a2;

        let mut out = [0.0f32; 2];
        for (ch, v0) in [input.0 as f64, input.1 as f64].into_iter().enumerate() {
            let v3 = v0 - self.ic2[ch];
            let v1 = a1 * self.ic1[ch] + a2 * v3;
            let v2 = self.ic2[ch] + a2 * self.ic1[ch] + a3 * v3;
            self.ic1[ch] = 2.0 * v1 - self.ic1[ch];
            self.ic2[ch] = 2.0 * v2 - self.ic2[ch];
            out[ch] = match self.mode {
                FilterMode::LowPass => v2,
                FilterMode::HighPass => v0 - k * v1 - v2,
            } as f32;
        }
        (out[0], out[1])
    }
}

/// Feedback delay line.
#[derive(Clone, Debug)]
pub struct Delay {
    pub time: AudioParam,
    pub feedback: f32,
    buffer: Vec<(f32, f32)>,
    write: usize,
}

impl Delay {
    /// `max_seconds` bounds the delay time and sizes the buffer.
    pub fn new(max_seconds: f64, time: f64, feedback: f32, sample_rate: u32) -> Self {
        let len = ((max_seconds.max(0.001) * sample_rate as f64).ceil() as usize).max(2);
        Self {
            time: AudioParam::new(time as f32, 0.0, max_seconds as f32),
            feedback: feedback.clamp(0.0, 0.95),
            buffer: vec![(0.0, 0.0); len],
            write: 0,
        }
    }

    fn process(&mut self, input: (f32, f32), t: f64, sample_rate: f64) -> (f32, f32) {
        let len = self.buffer.len();
        let lag = ((self.time.value_at(t) as f64 * sample_rate).round() as usize).clamp(1, len - 1);
        let read = (self.write + len - lag) % len;
        let delayed = self.buffer[read];
        self.buffer[self.write] = (
            input.0 + delayed.0 * self.feedback,
            input.1 + delayed.1 * self.feedback,
        );
        self.write = (self.write + 1) % len;
        delayed
    }
}

/// One tap of a sparse impulse response.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tap {
    pub offset: usize,
    pub left: f32,
    pub right: f32,
}

/// Convolution with a sparse impulse response.
#[derive(Clone, Debug)]
pub struct Convolver {
    taps: Arc<[Tap]>,
    history: Vec<(f32, f32)>,
    pos: usize,
}

impl Convolver {
    pub fn new(taps: Arc<[Tap]>) -> Self {
        let len = taps.iter().map(|t| t.offset).max().unwrap_or(0) + 1;
        Self {
            taps,
            history: vec![(0.0, 0.0); len],
            pos: 0,
        }
    }

    fn process(&mut self, input: (f32, f32)) -> (f32, f32) {
        let len = self.history.len();
        self.history[self.pos] = input;
        let (mut l, mut r) = (0.0, 0.0);
        for tap in self.taps.iter() {
            let (hl, hr) = self.history[(self.pos + len - tap.offset) % len];
            l += hl * tap.left;
            r += hr * tap.right;
        }
        self.pos = (self.pos + 1) % len;
        (l, r)
    }
}

/// Build a velvet-noise reverb impulse: sparse random-sign taps under an
/// exponential decay. `seed` makes the result reproducible.
pub fn reverb_impulse(sample_rate: u32, seconds: f64, decay: f64, seed: u64) -> Arc<[Tap]> {
    const TAPS_PER_SECOND: f64 = 320.0;
    let mut rng = fastrand::Rng::with_seed(seed);
    let len = (seconds.max(0.01) * sample_rate as f64) as usize;
    let spacing = (sample_rate as f64 / TAPS_PER_SECOND).max(1.0) as usize;
    let norm = (1.0 / (seconds * TAPS_PER_SECOND).max(1.0).sqrt()) as f32;

    let mut taps = Vec::with_capacity(len / spacing + 1);
    let mut offset = 1;
    while offset < len {
        let jitter = rng.usize(0..spacing);
        let at = offset + jitter;
        if at >= len {
            break;
        }
        let env = (1.0 - at as f64 / len as f64).powf(decay.max(0.1)) as f32 * norm;
        let sign = |rng: &mut fastrand::Rng| if rng.bool() { 1.0 } else { -1.0 };
        taps.push(Tap {
            offset: at,
            left: sign(&mut rng) * env,
            right: sign(&mut rng) * env,
        });
        offset += spacing;
    }
    taps.into()
}

/// Equal-power stereo panner.
#[derive(Clone, Debug)]
pub struct Panner {
    pub pan: AudioParam,
}

impl Panner {
    fn process(&self, input: (f32, f32), t: f64) -> (f32, f32) {
        let pan = self.pan.value_at(t);
        let (l, r) = input;
        if pan <= 0.0 {
            let x = (pan + 1.0) * std::f32::consts::FRAC_PI_2;
            (l + r * x.cos(), r * x.sin())
        } else {
            let x = pan * std::f32::consts::FRAC_PI_2;
            (l * x.cos(), r + l * x.sin())
        }
    }
}

/// Peak limiter with instant attack and smooth release.
#[derive(Clone, Debug)]
pub struct Limiter {
    pub threshold: f32,
    envelope: f32,
    release: f32,
}

impl Limiter {
    pub fn new(threshold: f32, release_secs: f64, sample_rate: u32) -> Self {
        Self {
            threshold: threshold.clamp(0.01, 1.0),
            envelope: 0.0,
            release: (-1.0 / (release_secs.max(1e-4) * sample_rate as f64)).exp() as f32,
        }
    }

    fn process(&mut self, input: (f32, f32)) -> (f32, f32) {
        let peak = input.0.abs().max(input.1.abs());
        self.envelope = if peak > self.envelope {
            peak
        } else {
            self.envelope * self.release + peak * (1.0 - self.release)
        };
        let gain = if self.envelope > self.threshold {
            self.threshold / self.envelope
        } else {
            1.0
        };
        (input.0 * gain, input.1 * gain)
    }
}

/// A level reading from an analyser.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Reading {
    pub peak: f32,
    pub rms: f32,
}

/// Pass-through meter.
#[derive(Clone, Debug)]
pub struct Analyser {
    peak: f32,
    mean_square: f32,
    decay: f32,
}

impl Analyser {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            peak: 0.0,
            mean_square: 0.0,
            // ~300 ms integration
            decay: (-1.0 / (0.3 * sample_rate as f64)).exp() as f32,
        }
    }

    pub fn reading(&self) -> Reading {
        Reading {
            peak: self.peak,
            rms: self.mean_square.sqrt(),
        }
    }

    fn process(&mut self, input: (f32, f32)) -> (f32, f32) {
        let peak = input.0.abs().max(input.1.abs());
        self.peak = peak.max(self.peak * self.decay);
        let sq = (input.0 * input.0 + input.1 * input.1) * 0.5;
        self.mean_square = self.mean_square * self.decay + sq * (1.0 - self.decay);
        input
    }
}

/// Plays decoded sample data once, resampled to the graph rate.
#[derive(Clone, Debug)]
pub struct BufferSource {
    data: Arc<SampleData>,
    offset: f64,
    position: Option<f64>,
    lifetime: Lifetime,
}

impl BufferSource {
    pub fn new(data: Arc<SampleData>) -> Self {
        Self {
            data,
            offset: 0.0,
            position: None,
            lifetime: Lifetime::default(),
        }
    }

    fn process(&mut self, t: f64, sample_rate: f64) -> (f32, f32) {
        if !self.lifetime.is_active(t) {
            return (0.0, 0.0);
        }
        let source_rate = self.data.sample_rate() as f64;
        let pos = *self.position.get_or_insert(self.offset * source_rate);
        let idx = pos.floor() as usize;
        if idx >= self.data.frames() {
            self.lifetime.stop = Some(t);
            return (0.0, 0.0);
        }
        let frac = (pos - pos.floor()) as f32;
        let (l0, r0) = self.data.frame(idx);
        let (l1, r1) = self.data.frame(idx + 1);
        self.position = Some(pos + source_rate / sample_rate);
        (l0 + (l1 - l0) * frac, r0 + (r1 - r0) * frac)
    }
}

/// A node in the audio graph.
#[derive(Clone, Debug)]
pub enum Node {
    Oscillator(Oscillator),
    Gain(Gain),
    Filter(Filter),
    Delay(Delay),
    Convolver(Convolver),
    Panner(Panner),
    Limiter(Limiter),
    Analyser(Analyser),
    BufferSource(BufferSource),
    Destination,
}

impl Node {
    pub fn oscillator(waveform: Waveform, frequency: f32) -> Self {
        Node::Oscillator(Oscillator::new(waveform, frequency))
    }

    pub fn gain(value: f32) -> Self {
        Node::Gain(Gain {
            gain: AudioParam::new(value, 0.0, 4.0),
        })
    }

    pub fn panner(pan: f32) -> Self {
        Node::Panner(Panner {
            pan: AudioParam::new(pan, -1.0, 1.0),
        })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Node::Oscillator(_) => "oscillator",
            Node::Gain(_) => "gain",
            Node::Filter(_) => "filter",
            Node::Delay(_) => "delay",
            Node::Convolver(_) => "convolver",
            Node::Panner(_) => "panner",
            Node::Limiter(_) => "limiter",
            Node::Analyser(_) => "analyser",
            Node::BufferSource(_) => "buffer-source",
            Node::Destination => "destination",
        }
    }

    pub fn param(&self, kind: ParamKind) -> Option<&AudioParam> {
        match (self, kind) {
            (Node::Oscillator(o), ParamKind::Frequency) => Some(&o.frequency),
            (Node::Gain(g), ParamKind::Gain) => Some(&g.gain),
            (Node::Filter(f), ParamKind::Cutoff) => Some(&f.cutoff),
            (Node::Delay(d), ParamKind::DelayTime) => Some(&d.time),
            (Node::Panner(p), ParamKind::Pan) => Some(&p.pan),
            _ => None,
        }
    }

    pub fn param_mut(&mut self, kind: ParamKind) -> Option<&mut AudioParam> {
        match (self, kind) {
            (Node::Oscillator(o), ParamKind::Frequency) => Some(&mut o.frequency),
            (Node::Gain(g), ParamKind::Gain) => Some(&mut g.gain),
            (Node::Filter(f), ParamKind::Cutoff) => Some(&mut f.cutoff),
            (Node::Delay(d), ParamKind::DelayTime) => Some(&mut d.time),
            (Node::Panner(p), ParamKind::Pan) => Some(&mut p.pan),
            _ => None,
        }
    }

    /// Schedule a source to start at `time`. `offset` (seconds) only applies
    /// to buffer sources. Returns false for nodes that are not sources.
    pub fn start_at(&mut self, time: f64, offset: f64) -> bool {
        match self {
            Node::Oscillator(o) => o.lifetime.start = Some(time),
            Node::BufferSource(b) => {
                b.lifetime.start = Some(time);
                b.offset = offset.max(0.0);
                b.position = None;
            }
            _ => return false,
        }
        true
    }

    /// Schedule a source to stop at `time`.
    pub fn stop_at(&mut self, time: f64) -> bool {
        match self {
            Node::Oscillator(o) => o.lifetime.stop = Some(time),
            Node::BufferSource(b) => b.lifetime.stop = Some(time),
            _ => return false,
        }
        true
    }

    /// Whether a source has played out at `t`.
    pub fn is_finished(&self, t: f64) -> bool {
        match self {
            Node::Oscillator(o) => o.lifetime.is_finished(t),
            Node::BufferSource(b) => b.lifetime.is_finished(t),
            _ => false,
        }
    }

    pub fn reading(&self) -> Option<Reading> {
        match self {
            Node::Analyser(a) => Some(a.reading()),
            _ => None,
        }
    }

    pub(crate) fn prune(&mut self, now: f64) {
        for kind in [
            ParamKind::Frequency,
            ParamKind::Gain,
            ParamKind::Cutoff,
            ParamKind::DelayTime,
            ParamKind::Pan,
        ] {
            if let Some(param) = self.param_mut(kind) {
                param.prune(now);
            }
        }
    }

    pub(crate) fn process(&mut self, input: (f32, f32), t: f64, sample_rate: f64) -> (f32, f32) {
        match self {
            Node::Oscillator(o) => {
                let s = o.process(t, sample_rate);
                (s, s)
            }
            Node::Gain(g) => {
                let v = g.gain.value_at(t);
                (input.0 * v, input.1 * v)
            }
            Node::Filter(f) => f.process(input, t, sample_rate),
            Node::Delay(d) => d.process(input, t, sample_rate),
            Node::Convolver(c) => c.process(input),
            Node::Panner(p) => p.process(input, t),
            Node::Limiter(l) => l.process(input),
            Node::Analyser(a) => a.process(input),
            Node::BufferSource(b) => b.process(t, sample_rate),
            Node::Destination => input,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f64 = 48_000.0;

    fn run(node: &mut Node, input: (f32, f32), frames: usize) -> Vec<(f32, f32)> {
        (0..frames)
            .map(|i| node.process(input, i as f64 / SR, SR))
            .collect()
    }

    #[test]
    fn oscillator_is_silent_until_started() {
        let mut osc = Node::oscillator(Waveform::Square, 1000.0);
        assert!(run(&mut osc, (0.0, 0.0), 10).iter().all(|s| s.0 == 0.0));
        osc.start_at(0.0, 0.0);
        osc.stop_at(5.0 / SR);
        let out = run(&mut osc, (0.0, 0.0), 10);
        assert_eq!(out[0].0, 1.0);
        assert!(out[6..].iter().all(|s| s.0 == 0.0));
        assert!(osc.is_finished(1.0));
    }

    #[test]
    fn center_pan_passes_mono_through() {
        let mut p = Node::panner(0.0);
        let out = run(&mut p, (0.5, 0.5), 1)[0];
        assert!((out.0 - 0.5).abs() < 1e-6);
        assert!((out.1 - 0.5).abs() < 1e-6);
    }

    #[test]
    fn hard_left_pan_folds_right_into_left() {
        let mut p = Node::panner(-1.0);
        let out = run(&mut p, (0.25, 0.5), 1)[0];
        assert!((out.0 - 0.75).abs() < 1e-6);
        assert!(out.1.abs() < 1e-6);
    }

    #[test]
    fn limiter_caps_peaks() {
        let mut lim = Node::Limiter(Limiter::new(0.9, 0.05, 48_000));
        let out = run(&mut lim, (2.0, -2.0), 8);
        assert!(out.iter().all(|s| s.0 <= 0.9 + 1e-6 && s.1 >= -0.9 - 1e-6));
    }

    #[test]
    fn low_pass_passes_dc() {
        let mut f = Node::Filter(Filter::new(FilterMode::LowPass, 1000.0, 0.0));
        let out = run(&mut f, (1.0, 1.0), 4800);
        assert!((out[4799].0 - 1.0).abs() < 1e-3);
        let mut h = Node::Filter(Filter::new(FilterMode::HighPass, 1000.0, 0.0));
        let out = run(&mut h, (1.0, 1.0), 4800);
        assert!(out[4799].0.abs() < 1e-3);
    }

    #[test]
    fn delay_repeats_after_lag() {
        let mut d = Node::Delay(Delay::new(1.0, 10.0 / SR, 0.0, SR as u32));
        let mut out = Vec::new();
        for i in 0..20 {
            let input = if i == 0 { (1.0, 1.0) } else { (0.0, 0.0) };
            out.push(d.process(input, i as f64 / SR, SR));
        }
        assert_eq!(out[10], (1.0, 1.0));
        assert!(out.iter().enumerate().all(|(i, s)| i == 10 || s.0 == 0.0));
    }

    #[test]
    fn impulse_is_reproducible_and_decays() {
        let a = reverb_impulse(48_000, 1.0, 2.0, 7);
        let b = reverb_impulse(48_000, 1.0, 2.0, 7);
        assert_eq!(a, b);
        let first = a.first().map(|t| t.left.abs()).unwrap_or(0.0);
        let last = a.last().map(|t| t.left.abs()).unwrap_or(0.0);
        assert!(first > last);
    }

    #[test]
    fn buffer_source_plays_from_offset_then_finishes() {
        let data = SampleData::from_interleaved(&[0.1, 0.2, 0.3, 0.4], 1, SR as u32);
        let mut src = Node::BufferSource(BufferSource::new(Arc::new(data)));
        src.start_at(0.0, 2.0 / SR);
        let out = run(&mut src, (0.0, 0.0), 4);
        assert!((out[0].0 - 0.3).abs() < 1e-6);
        assert!((out[1].0 - 0.4).abs() < 1e-6);
        assert_eq!(out[2], (0.0, 0.0));
        assert!(src.is_finished(3.0 / SR));
    }

    #[test]
    fn params_are_reachable_by_kind() {
        let mut g = Node::gain(0.5);
        assert!(g.param_mut(ParamKind::Gain).is_some());
        assert!(g.param(ParamKind::Pan).is_none());
        assert_eq!(Node::Destination.label(), "destination");
    }
}
