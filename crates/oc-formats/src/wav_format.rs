//! WAV encoding and decoding for PCM audio.

use crate::FormatError;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use oc_engine::Frame;
use oc_ir::SampleData;
use std::io::{Cursor, Seek, Write};

// --- Writing ---

/// Encode frames as 16-bit stereo PCM.
pub fn write_wav<W: Write + Seek>(w: W, frames: &[Frame], sample_rate: u32) -> Result<(), FormatError> {
    let spec = WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::new(w, spec)?;
    let mut samples = writer.get_i16_writer(frames.len() as u32 * 2);
    for frame in frames {
        samples.write_sample(frame.left);
        samples.write_sample(frame.right);
    }
    samples.flush()?;
    writer.finalize()?;
    Ok(())
}

pub fn frames_to_wav(frames: &[Frame], sample_rate: u32) -> Result<Vec<u8>, FormatError> {
    let mut buf = Cursor::new(Vec::new());
    write_wav(&mut buf, frames, sample_rate)?;
    Ok(buf.into_inner())
}

// --- Reading ---

/// Decode a WAV file from raw bytes into stereo sample data. Mono files
/// are duplicated to both channels; extra channels are dropped.
pub fn decode_wav(data: &[u8]) -> Result<SampleData, FormatError> {
    let mut reader = WavReader::new(Cursor::new(data))?;
    let spec = reader.spec();
    if spec.channels == 0 || spec.sample_rate == 0 {
        return Err(FormatError::InvalidHeader);
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader.samples::<f32>().collect::<Result<Vec<f32>, _>>()?,
        SampleFormat::Int => {
            if !(1..=32).contains(&spec.bits_per_sample) {
                return Err(FormatError::Unsupported(format!(
                    "{}-bit integer PCM",
                    spec.bits_per_sample
                )));
            }
            let scale = (1u64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<Vec<f32>, _>>()?
        }
    };

    Ok(SampleData::from_interleaved(
        &interleaved,
        spec.channels,
        spec.sample_rate,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mono16(samples: &[i16], sample_rate: u32) -> Vec<u8> {
        let spec = WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut buf = Cursor::new(Vec::new());
        let mut writer = WavWriter::new(&mut buf, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
        buf.into_inner()
    }

    #[test]
    fn mono_is_duplicated_to_both_channels() {
        let bytes = mono16(&[0, 16384, -16384, 32767], 22_050);
        let data = decode_wav(&bytes).unwrap();
        assert_eq!(data.sample_rate(), 22_050);
        assert_eq!(data.frames(), 4);
        let (l, r) = data.frame(1);
        assert!((l - 0.5).abs() < 1e-4);
        assert_eq!(l, r);
        let (l, _) = data.frame(2);
        assert!((l + 0.5).abs() < 1e-4);
    }

    #[test]
    fn rendered_frames_decode_back() {
        let frames: Vec<Frame> = (0..100)
            .map(|i| Frame {
                left: i * 100,
                right: -i * 100,
            })
            .collect();
        let bytes = frames_to_wav(&frames, 48_000).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        let data = decode_wav(&bytes).unwrap();
        assert_eq!(data.frames(), 100);
        assert!((data.duration_secs() - 100.0 / 48_000.0).abs() < 1e-9);
        let (l, r) = data.frame(50);
        assert!((l - 5000.0 / 32768.0).abs() < 1e-4);
        assert!((r + 5000.0 / 32768.0).abs() < 1e-4);
    }

    #[test]
    fn float_wav_decodes() {
        let spec = WavSpec {
            channels: 2,
            sample_rate: 44_100,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut buf = Cursor::new(Vec::new());
        let mut writer = WavWriter::new(&mut buf, spec).unwrap();
        for s in [0.25f32, -0.25, 0.5, -0.5] {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
        let data = decode_wav(&buf.into_inner()).unwrap();
        assert_eq!(data.frames(), 2);
        assert_eq!(data.frame(1), (0.5, -0.5));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(decode_wav(b"not a wav file at all").is_err());
        assert!(decode_wav(&[]).is_err());
        let mut bytes = mono16(&[1, 2, 3], 8_000);
        bytes[0..4].copy_from_slice(b"RIFX");
        assert!(decode_wav(&bytes).is_err());
    }
}
