//! Pure-Rust audio sample-format conversion for the fixture registry
//!
//! Converts between sample types (u8/s16/s32/flt/dbl), between planar and
//! interleaved layouts, and between mono and multi-channel layouts. Sample
//! rate is never changed.

use crate::error::{Result, TranscodeError};
use crate::format::Resampler;
use crate::media::{AudioBuffer, AudioSampleFormat, SampleType};

/// Convert `buffer` into `target`, keeping sample rate and sample count.
pub fn convert_buffer(buffer: &AudioBuffer, target: &AudioSampleFormat) -> Result<AudioBuffer> {
    if buffer.format == *target {
        return Ok(buffer.clone());
    }

    let expected = buffer.plane_len();
    if buffer.planes.len() != buffer.format.plane_count()
        || buffer.planes.iter().any(|p| p.len() < expected)
    {
        return Err(TranscodeError::Resample(format!(
            "buffer does not match its declared format {} ({} samples)",
            buffer.format, buffer.samples
        )));
    }

    let channels = read_channels(buffer);
    let mixed = remix(channels, buffer.format.channels, target.channels)?;

    let mut out = AudioBuffer::silent(*target, buffer.sample_rate, buffer.samples);
    let width = target.sample_type.bytes_per_sample();
    for (ch, samples) in mixed.iter().enumerate() {
        for (i, value) in samples.iter().enumerate() {
            let (plane, offset) = if target.planar {
                (ch, i * width)
            } else {
                (0, (i * target.channels as usize + ch) * width)
            };
            write_sample(target.sample_type, *value, &mut out.planes[plane][offset..offset + width]);
        }
    }
    Ok(out)
}

fn read_channels(buffer: &AudioBuffer) -> Vec<Vec<f64>> {
    let fmt = buffer.format;
    let width = fmt.sample_type.bytes_per_sample();
    let channels = fmt.channels as usize;
    (0..channels)
        .map(|ch| {
            (0..buffer.samples)
                .map(|i| {
                    let (plane, offset) = if fmt.planar {
                        (ch, i * width)
                    } else {
                        (0, (i * channels + ch) * width)
                    };
                    read_sample(fmt.sample_type, &buffer.planes[plane][offset..offset + width])
                })
                .collect()
        })
        .collect()
}

fn remix(channels: Vec<Vec<f64>>, from: u16, to: u16) -> Result<Vec<Vec<f64>>> {
    if from == to {
        return Ok(channels);
    }
    if from == 1 {
        return Ok(vec![channels[0].clone(); to as usize]);
    }
    if to == 1 {
        let samples = channels.first().map(Vec::len).unwrap_or(0);
        let mono = (0..samples)
            .map(|i| channels.iter().map(|c| c[i]).sum::<f64>() / from as f64)
            .collect();
        return Ok(vec![mono]);
    }
    Err(TranscodeError::Resample(format!(
        "no channel mapping from {} to {} channels",
        from, to
    )))
}

fn read_sample(sample_type: SampleType, bytes: &[u8]) -> f64 {
    match sample_type {
        SampleType::U8 => (bytes[0] as f64 - 128.0) / 128.0,
        SampleType::S16 => i16::from_ne_bytes([bytes[0], bytes[1]]) as f64 / 32768.0,
        SampleType::S32 => {
            i32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64 / 2147483648.0
        }
        SampleType::Float => f32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64,
        SampleType::Double => {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&bytes[..8]);
            f64::from_ne_bytes(raw)
        }
    }
}

fn write_sample(sample_type: SampleType, value: f64, out: &mut [u8]) {
    match sample_type {
        SampleType::U8 => out[0] = (value * 128.0 + 128.0).round().clamp(0.0, 255.0) as u8,
        SampleType::S16 => {
            let v = (value * 32768.0).round().clamp(-32768.0, 32767.0) as i16;
            out.copy_from_slice(&v.to_ne_bytes());
        }
        SampleType::S32 => {
            let v = (value * 2147483648.0)
                .round()
                .clamp(-2147483648.0, 2147483647.0) as i32;
            out.copy_from_slice(&v.to_ne_bytes());
        }
        SampleType::Float => out.copy_from_slice(&(value as f32).to_ne_bytes()),
        SampleType::Double => out.copy_from_slice(&value.to_ne_bytes()),
    }
}

/// Stateless [`Resampler`] doing sample-format conversion in Rust
#[derive(Debug, Clone)]
pub struct SampleConverter {
    source: AudioSampleFormat,
    target: AudioSampleFormat,
}

impl SampleConverter {
    pub fn new(source: AudioSampleFormat, target: AudioSampleFormat) -> Self {
        Self { source, target }
    }
}

impl Resampler for SampleConverter {
    fn resample(&mut self, buffer: &AudioBuffer) -> Result<Option<AudioBuffer>> {
        if buffer.format != self.source {
            return Err(TranscodeError::Resample(format!(
                "expected {} input, got {}",
                self.source, buffer.format
            )));
        }
        convert_buffer(buffer, &self.target).map(Some)
    }

    fn flush(&mut self) -> Result<Option<AudioBuffer>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f32_mono(values: &[f32]) -> AudioBuffer {
        let bytes = values.iter().flat_map(|v| v.to_ne_bytes()).collect();
        AudioBuffer {
            format: AudioSampleFormat::interleaved(1, SampleType::Float),
            sample_rate: 44100,
            samples: values.len(),
            planes: vec![bytes],
        }
    }

    fn s16_values(buffer: &AudioBuffer, plane: usize) -> Vec<i16> {
        buffer.planes[plane]
            .chunks_exact(2)
            .map(|c| i16::from_ne_bytes([c[0], c[1]]))
            .collect()
    }

    #[test]
    fn test_float_to_s16() {
        let input = f32_mono(&[0.0, 0.5, -0.5, 1.0, -1.0]);
        let out = convert_buffer(&input, &AudioSampleFormat::interleaved(1, SampleType::S16)).unwrap();
        assert_eq!(out.samples, 5);
        assert_eq!(s16_values(&out, 0), vec![0, 16384, -16384, 32767, -32768]);
    }

    #[test]
    fn test_mono_to_planar_stereo() {
        let input = f32_mono(&[0.25, -0.25]);
        let target = AudioSampleFormat::new(2, SampleType::S16, true);
        let out = convert_buffer(&input, &target).unwrap();
        assert_eq!(out.planes.len(), 2);
        assert_eq!(s16_values(&out, 0), s16_values(&out, 1));
        assert_eq!(s16_values(&out, 0), vec![8192, -8192]);
    }

    #[test]
    fn test_stereo_downmix() {
        let values: Vec<i16> = vec![1000, 3000, -2000, 2000];
        let bytes = values.iter().flat_map(|v| v.to_ne_bytes()).collect();
        let input = AudioBuffer {
            format: AudioSampleFormat::interleaved(2, SampleType::S16),
            sample_rate: 48000,
            samples: 2,
            planes: vec![bytes],
        };
        let out = convert_buffer(&input, &AudioSampleFormat::interleaved(1, SampleType::S16)).unwrap();
        assert_eq!(s16_values(&out, 0), vec![2000, 0]);
    }

    #[test]
    fn test_unsupported_channel_mapping() {
        let input = AudioBuffer::silent(AudioSampleFormat::interleaved(6, SampleType::S16), 48000, 4);
        let err = convert_buffer(&input, &AudioSampleFormat::interleaved(2, SampleType::S16));
        assert!(matches!(err, Err(TranscodeError::Resample(_))));
    }

    #[test]
    fn test_converter_rejects_wrong_input() {
        let mut conv = SampleConverter::new(
            AudioSampleFormat::interleaved(2, SampleType::S16),
            AudioSampleFormat::interleaved(2, SampleType::Float),
        );
        let input = f32_mono(&[0.1]);
        assert!(conv.resample(&input).is_err());
        assert!(conv.flush().unwrap().is_none());
    }

    #[test]
    fn test_u8_roundtrip_midpoint() {
        let input = AudioBuffer {
            format: AudioSampleFormat::interleaved(1, SampleType::U8),
            sample_rate: 8000,
            samples: 3,
            planes: vec![vec![128, 255, 0]],
        };
        let out = convert_buffer(&input, &AudioSampleFormat::interleaved(1, SampleType::Double)).unwrap();
        let values: Vec<f64> = out.planes[0]
            .chunks_exact(8)
            .map(|c| f64::from_ne_bytes(c.try_into().unwrap()))
            .collect();
        assert_eq!(values[0], 0.0);
        assert!((values[1] - 127.0 / 128.0).abs() < 1e-12);
        assert_eq!(values[2], -1.0);
    }
}
