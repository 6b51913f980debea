//! Audio frame type.

/// A stereo audio frame (16-bit integer).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Frame {
    pub left: i16,
    pub right: i16,
}

impl Frame {
    /// Create a silent frame.
    pub const fn silence() -> Self {
        Self { left: 0, right: 0 }
    }

    /// Quantize a float stereo pair in `[-1, 1]`, clamping overs.
    pub fn from_f32(left: f32, right: f32) -> Self {
        Self {
            left: quantize(left),
            right: quantize(right),
        }
    }

    pub fn to_f32(self) -> (f32, f32) {
        (self.left as f32 / 32768.0, self.right as f32 / 32768.0)
    }

    /// Largest absolute sample of either side.
    pub fn peak(self) -> i16 {
        self.left.saturating_abs().max(self.right.saturating_abs())
    }
}

fn quantize(sample: f32) -> i16 {
    if !sample.is_finite() {
        return 0;
    }
    (sample * 32767.0).round().clamp(-32768.0, 32767.0) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantize_clamps_overs() {
        let f = Frame::from_f32(2.0, -2.0);
        assert_eq!(f.left, 32767);
        assert_eq!(f.right, -32768);
        assert_eq!(Frame::from_f32(f32::NAN, 0.0), Frame::silence());
    }

    #[test]
    fn peak_and_scaling() {
        let f = Frame { left: -32768, right: 16384 };
        assert_eq!(f.peak(), 32767);
        assert_eq!(f.to_f32(), (-1.0, 0.5));
    }
}
