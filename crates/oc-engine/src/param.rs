//! Sample-accurate parameter automation.
//!
//! An [`AudioParam`] holds an intrinsic value plus a time-sorted list of
//! automation events on the audio clock. Each event fixes an anchor value
//! at its time. Between two anchors the value holds, except that a
//! [`linear_ramp_to`](AudioParam::linear_ramp_to) interpolates from the
//! previous anchor and a [`set_target_at`](AudioParam::set_target_at)
//! approaches its target exponentially until the next event.

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum Automation {
    SetValue { time: f64, value: f32 },
    /// Ramp ending at `time`
    LinearRamp { time: f64, value: f32 },
    SetTarget { time: f64, target: f32, time_constant: f64 },
}

impl Automation {
    fn time(&self) -> f64 {
        match *self {
            Automation::SetValue { time, .. }
            | Automation::LinearRamp { time, .. }
            | Automation::SetTarget { time, .. } => time,
        }
    }
}

/// An automatable scalar parameter.
#[derive(Clone, Debug)]
pub struct AudioParam {
    value: f32,
    min: f32,
    max: f32,
    events: Vec<Automation>,
}

impl AudioParam {
    pub fn new(value: f32, min: f32, max: f32) -> Self {
        Self {
            value: value.clamp(min, max),
            min,
            max,
            events: Vec::new(),
        }
    }

    /// Intrinsic value, used before the first event.
    pub fn value(&self) -> f32 {
        self.value
    }

    /// Set the intrinsic value and drop all automation.
    pub fn set_value(&mut self, value: f32) {
        self.value = self.clamp(value);
        self.events.clear();
    }

    /// Number of pending automation events.
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Jump to `value` at `time`.
    pub fn set_value_at(&mut self, value: f32, time: f64) {
        self.insert(Automation::SetValue { time, value });
    }

    /// Ramp linearly from the previous anchor to `value`, arriving at `end_time`.
    pub fn linear_ramp_to(&mut self, value: f32, end_time: f64) {
        self.insert(Automation::LinearRamp { time: end_time, value });
    }

    /// From `start`, approach `target` with the given time constant (seconds).
    /// A non-positive time constant jumps straight to the target.
    pub fn set_target_at(&mut self, target: f32, start: f64, time_constant: f64) {
        if time_constant > 0.0 {
            self.insert(Automation::SetTarget {
                time: start,
                target,
                time_constant,
            });
        } else {
            self.set_value_at(target, start);
        }
    }

    /// Remove every event at or after `from`.
    pub fn cancel_scheduled_values(&mut self, from: f64) {
        self.events.retain(|e| e.time() < from);
    }

    /// Freeze the value into a hold at `at`, removing later automation.
    pub fn cancel_and_hold(&mut self, at: f64) {
        let held = self.value_at(at);
        self.cancel_scheduled_values(at);
        self.events.push(Automation::SetValue { time: at, value: held });
    }

    /// Collapse automation that lies entirely before `now`.
    pub fn prune(&mut self, now: f64) {
        let done = self.events.partition_point(|e| e.time() <= now);
        if done == 0 {
            return;
        }
        let last = self.events[done - 1];
        let anchor = self.value_at(last.time());
        let mut kept: Vec<Automation> = match last {
            Automation::SetTarget { time, .. } => {
                vec![Automation::SetValue { time, value: anchor }, last]
            }
            _ => vec![Automation::SetValue {
                time: last.time(),
                value: anchor,
            }],
        };
        kept.extend_from_slice(&self.events[done..]);
        self.events = kept;
    }

    /// Value at audio-clock time `t`.
    pub fn value_at(&self, t: f64) -> f32 {
        let mut value = self.value;
        let mut anchor_time: Option<f64> = None;
        let mut approach: Option<(f32, f64)> = None;

        for event in &self.events {
            if let Automation::LinearRamp { time: end, value: to } = *event {
                if end > t {
                    let Some(start) = anchor_time else {
                        return self.clamp(value);
                    };
                    if t <= start || end <= start {
                        return self.clamp(value);
                    }
                    let frac = ((t - start) / (end - start)) as f32;
                    return self.clamp(value + (to - value) * frac);
                }
                value = to;
                anchor_time = Some(end);
                approach = None;
                continue;
            }

            let time = event.time();
            if time > t {
                break;
            }
            if let (Some((target, tc)), Some(start)) = (approach, anchor_time) {
                value = exponential(value, target, time - start, tc);
            }
            match *event {
                Automation::SetValue { value: v, .. } => {
                    value = v;
                    approach = None;
                }
                Automation::SetTarget {
                    target,
                    time_constant,
                    ..
                } => approach = Some((target, time_constant)),
                Automation::LinearRamp { .. } => {}
            }
            anchor_time = Some(time);
        }

        if let (Some((target, tc)), Some(start)) = (approach, anchor_time) {
            value = exponential(value, target, t - start, tc);
        }
        self.clamp(value)
    }

    fn insert(&mut self, event: Automation) {
        let time = event.time();
        if !time.is_finite() {
            return;
        }
        let idx = self.events.partition_point(|e| e.time() <= time);
        self.events.insert(idx, event);
    }

    fn clamp(&self, value: f32) -> f32 {
        if value.is_finite() {
            value.clamp(self.min, self.max)
        } else {
            self.value
        }
    }
}

fn exponential(from: f32, target: f32, elapsed: f64, time_constant: f64) -> f32 {
    let k = (-elapsed.max(0.0) / time_constant).exp() as f32;
    target + (from - target) * k
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn intrinsic_value_before_events() {
        let mut p = AudioParam::new(0.5, 0.0, 1.0);
        p.set_value_at(1.0, 2.0);
        assert_eq!(p.value_at(1.0), 0.5);
        assert_eq!(p.value_at(2.0), 1.0);
    }

    #[test]
    fn linear_ramp_interpolates_from_previous_anchor() {
        let mut p = AudioParam::new(0.0, 0.0, 1.0);
        p.set_value_at(0.0, 1.0);
        p.linear_ramp_to(1.0, 2.0);
        assert!(close(p.value_at(1.5), 0.5));
        assert_eq!(p.value_at(2.0), 1.0);
        assert_eq!(p.value_at(10.0), 1.0);
    }

    #[test]
    fn set_target_approaches_exponentially() {
        let mut p = AudioParam::new(1.0, 0.0, 1.0);
        p.set_target_at(0.0, 0.0, 0.1);
        assert!(close(p.value_at(0.1), (-1.0f32).exp()));
        assert!(p.value_at(1.0) < 1e-4);
    }

    #[test]
    fn cancel_and_hold_freezes_mid_ramp() {
        let mut p = AudioParam::new(0.0, 0.0, 1.0);
        p.set_value_at(0.0, 0.0);
        p.linear_ramp_to(1.0, 1.0);
        p.cancel_and_hold(0.25);
        assert!(close(p.value_at(0.25), 0.25));
        assert!(close(p.value_at(5.0), 0.25));
        p.linear_ramp_to(0.0, 0.5);
        assert!(close(p.value_at(0.375), 0.125));
        assert_eq!(p.value_at(0.5), 0.0);
    }

    #[test]
    fn cancel_scheduled_values_drops_later_events() {
        let mut p = AudioParam::new(0.0, 0.0, 1.0);
        p.set_value_at(0.5, 1.0);
        p.set_value_at(1.0, 2.0);
        p.cancel_scheduled_values(1.5);
        assert_eq!(p.event_count(), 1);
        assert_eq!(p.value_at(3.0), 0.5);
    }

    #[test]
    fn prune_keeps_curve_shape() {
        let mut p = AudioParam::new(0.0, 0.0, 1.0);
        p.set_value_at(0.0, 0.0);
        p.linear_ramp_to(1.0, 1.0);
        p.set_value_at(1.0, 2.0);
        p.linear_ramp_to(0.0, 3.0);
        let before = p.value_at(2.5);
        p.prune(2.2);
        assert!(p.event_count() <= 2);
        assert!(close(p.value_at(2.5), before));
    }

    #[test]
    fn values_are_clamped() {
        let mut p = AudioParam::new(5.0, 0.0, 1.0);
        assert_eq!(p.value(), 1.0);
        p.set_value_at(-3.0, 0.0);
        assert_eq!(p.value_at(1.0), 0.0);
    }
}
