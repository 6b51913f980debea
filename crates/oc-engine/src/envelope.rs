//! ADSR contours written as automation on an amplitude parameter.

use oc_ir::Adsr;

use crate::param::AudioParam;

/// Timing of a scheduled contour on the audio clock.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Contour {
    /// When the release ramp begins
    pub release_start: f64,
    /// When the amplitude reaches zero
    pub ends_at: f64,
}

impl Contour {
    /// A contour that sustains until stopped.
    pub const SUSTAIN: Contour = Contour {
        release_start: f64::INFINITY,
        ends_at: f64::INFINITY,
    };
}

/// Schedule attack and decay from `start`, then, for a note of known
/// `duration`, the hold and release so the amplitude reaches zero at
/// `start + duration`. The release starts at `note_end - release`, or at
/// `start` for notes shorter than their release.
pub fn schedule_contour(
    param: &mut AudioParam,
    env: &Adsr,
    peak: f32,
    start: f64,
    duration: Option<f64>,
) -> Contour {
    let env = env.sanitized();
    let peak = peak.clamp(0.0, 1.0);
    let sustain = peak * env.sustain as f32;

    param.cancel_scheduled_values(start);
    param.set_value_at(0.0, start);
    param.linear_ramp_to(peak, start + env.attack);
    param.linear_ramp_to(sustain, start + env.attack + env.decay);

    let Some(duration) = duration else {
        return Contour::SUSTAIN;
    };
    let note_end = start + duration.max(0.0);
    let release_start = (note_end - env.release).max(start);
    param.cancel_and_hold(release_start);
    param.linear_ramp_to(0.0, note_end.max(release_start + 1e-4));
    Contour {
        release_start,
        ends_at: note_end,
    }
}

/// Release from the current amplitude at `now`, reaching zero after
/// `release` seconds. Returns when the amplitude reaches zero.
pub fn schedule_release(param: &mut AudioParam, now: f64, release: f64) -> f64 {
    let ends_at = now + release.max(1e-4);
    param.cancel_and_hold(now);
    param.linear_ramp_to(0.0, ends_at);
    ends_at
}
