//! Decoded frame types

use super::params::{AudioSampleFormat, PixelFormat};
use super::types::{DataType, Rational};

/// Decoded PCM audio.
///
/// `planes` holds one buffer per channel for planar formats, or a single
/// interleaved buffer otherwise. Samples are in native byte order.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub format: AudioSampleFormat,
    pub sample_rate: u32,
    /// Samples per channel
    pub samples: usize,
    pub planes: Vec<Vec<u8>>,
}

impl AudioBuffer {
    /// Zero-filled buffer
    pub fn silent(format: AudioSampleFormat, sample_rate: u32, samples: usize) -> Self {
        let plane_len = if format.planar {
            samples * format.sample_type.bytes_per_sample()
        } else {
            samples * format.bytes_per_frame()
        };
        Self {
            format,
            sample_rate,
            samples,
            planes: vec![vec![0u8; plane_len]; format.plane_count()],
        }
    }

    /// Expected byte length of each plane
    pub fn plane_len(&self) -> usize {
        if self.format.planar {
            self.samples * self.format.sample_type.bytes_per_sample()
        } else {
            self.samples * self.format.bytes_per_frame()
        }
    }

    /// Playback duration in seconds
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            0.0
        } else {
            self.samples as f64 / self.sample_rate as f64
        }
    }
}

/// Decoded picture
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub planes: Vec<Vec<u8>>,
    /// Bytes per row for each plane
    pub strides: Vec<usize>,
}

/// Payload of a frame
#[derive(Debug, Clone, PartialEq)]
pub enum FrameData {
    Audio(AudioBuffer),
    Video(PixelBuffer),
}

/// A decoded frame with its presentation timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub pts: Option<i64>,
    pub time_base: Rational,
    pub data: FrameData,
}

impl Frame {
    pub fn audio(buffer: AudioBuffer, pts: Option<i64>, time_base: Rational) -> Self {
        Self {
            pts,
            time_base,
            data: FrameData::Audio(buffer),
        }
    }

    pub fn video(buffer: PixelBuffer, pts: Option<i64>, time_base: Rational) -> Self {
        Self {
            pts,
            time_base,
            data: FrameData::Video(buffer),
        }
    }

    pub fn data_type(&self) -> DataType {
        match self.data {
            FrameData::Audio(_) => DataType::Audio,
            FrameData::Video(_) => DataType::Video,
        }
    }

    pub fn audio_buffer(&self) -> Option<&AudioBuffer> {
        match &self.data {
            FrameData::Audio(buffer) => Some(buffer),
            FrameData::Video(_) => None,
        }
    }

    pub fn pixel_buffer(&self) -> Option<&PixelBuffer> {
        match &self.data {
            FrameData::Video(buffer) => Some(buffer),
            FrameData::Audio(_) => None,
        }
    }
}
