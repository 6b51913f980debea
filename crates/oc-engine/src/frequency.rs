//! Note-to-frequency conversion.

/// MIDI note of concert A.
const A4_NOTE: i16 = 69;

/// Frequency of concert A in Hz.
const A4_HZ: f64 = 440.0;

/// Equal-tempered frequency of a MIDI note: `440 * 2^((n - 69) / 12)`.
pub fn midi_to_hz(note: u8) -> f32 {
    let semitones = note as i16 - A4_NOTE;
    (A4_HZ * (semitones as f64 / 12.0).exp2()) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concert_a() {
        assert_eq!(midi_to_hz(69), 440.0);
    }

    #[test]
    fn octaves_double() {
        assert!((midi_to_hz(81) - 880.0).abs() < 1e-3);
        assert!((midi_to_hz(57) - 220.0).abs() < 1e-3);
    }

    #[test]
    fn middle_c() {
        assert!((midi_to_hz(60) - 261.626).abs() < 1e-2);
    }
}
