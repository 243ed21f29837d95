//! Coding parameters and stream descriptions

use std::any::Any;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use bytes::Bytes;

use super::types::{CodingFormatId, DataType, Rational};
use crate::error::TranscodeError;

/// Numeric representation of one audio sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleType {
    U8,
    S16,
    S32,
    Float,
    Double,
}

impl SampleType {
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleType::U8 => 1,
            SampleType::S16 => 2,
            SampleType::S32 | SampleType::Float => 4,
            SampleType::Double => 8,
        }
    }

    /// FFmpeg-style short name without the planar suffix
    pub fn name(&self) -> &'static str {
        match self {
            SampleType::U8 => "u8",
            SampleType::S16 => "s16",
            SampleType::S32 => "s32",
            SampleType::Float => "flt",
            SampleType::Double => "dbl",
        }
    }
}

/// Layout of audio samples: channel count, sample type and planarity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AudioSampleFormat {
    pub channels: u16,
    pub sample_type: SampleType,
    pub planar: bool,
}

impl AudioSampleFormat {
    pub fn new(channels: u16, sample_type: SampleType, planar: bool) -> Self {
        Self {
            channels,
            sample_type,
            planar,
        }
    }

    /// Interleaved layout with the given channel count
    pub fn interleaved(channels: u16, sample_type: SampleType) -> Self {
        Self::new(channels, sample_type, false)
    }

    /// Number of data planes a buffer of this format has
    pub fn plane_count(&self) -> usize {
        if self.planar {
            self.channels as usize
        } else {
            1
        }
    }

    /// Bytes for one sample across all channels
    pub fn bytes_per_frame(&self) -> usize {
        self.sample_type.bytes_per_sample() * self.channels as usize
    }
}

impl fmt::Display for AudioSampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{} x{}",
            self.sample_type.name(),
            if self.planar { "p" } else { "" },
            self.channels
        )
    }
}

/// Sample type and planarity parsed from names like `s16`, `fltp`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleSpec {
    pub sample_type: SampleType,
    pub planar: bool,
}

impl SampleSpec {
    /// Full format keeping the given channel count
    pub fn with_channels(&self, channels: u16) -> AudioSampleFormat {
        AudioSampleFormat::new(channels, self.sample_type, self.planar)
    }
}

impl FromStr for SampleSpec {
    type Err = TranscodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let (base, planar) = match lower.strip_suffix('p') {
            Some(base) => (base, true),
            None => (lower.as_str(), false),
        };
        let sample_type = match base {
            "u8" => SampleType::U8,
            "s16" => SampleType::S16,
            "s32" => SampleType::S32,
            "flt" | "f32" => SampleType::Float,
            "dbl" | "f64" => SampleType::Double,
            _ => {
                return Err(TranscodeError::Config(format!(
                    "unknown sample format '{}'",
                    s
                )))
            }
        };
        Ok(Self {
            sample_type,
            planar,
        })
    }
}

/// Pixel layout of decoded video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Yuv420p,
    Yuv422p,
    Yuv444p,
    Nv12,
    Rgb24,
    Bgr24,
    Rgba,
    Bgra,
    Gray8,
}

impl PixelFormat {
    pub fn name(&self) -> &'static str {
        match self {
            PixelFormat::Yuv420p => "yuv420p",
            PixelFormat::Yuv422p => "yuv422p",
            PixelFormat::Yuv444p => "yuv444p",
            PixelFormat::Nv12 => "nv12",
            PixelFormat::Rgb24 => "rgb24",
            PixelFormat::Bgr24 => "bgr24",
            PixelFormat::Rgba => "rgba",
            PixelFormat::Bgra => "bgra",
            PixelFormat::Gray8 => "gray",
        }
    }

    /// Number of planes a frame of this format has
    pub fn plane_count(&self) -> usize {
        match self {
            PixelFormat::Yuv420p | PixelFormat::Yuv422p | PixelFormat::Yuv444p => 3,
            PixelFormat::Nv12 => 2,
            _ => 1,
        }
    }
}

/// Audio-specific coding parameters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioParameters {
    pub sample_format: Option<AudioSampleFormat>,
    pub sample_rate: u32,
}

/// Video-specific coding parameters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoParameters {
    pub pixel_format: Option<PixelFormat>,
    pub width: u32,
    pub height: u32,
}

/// Backend-specific parameter block carried next to the model's fields.
///
/// A backend attaches the full native description of a demuxed or encoded
/// stream so stream copy can hand the muxer fields the model does not name.
/// Two blocks are equal only when they are the same allocation.
#[derive(Clone)]
pub struct NativeParameters(Rc<dyn Any>);

impl NativeParameters {
    pub fn new<T: Any>(value: T) -> Self {
        Self(Rc::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }
}

impl fmt::Debug for NativeParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("NativeParameters(..)")
    }
}

impl PartialEq for NativeParameters {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

/// Full coding parameters of a stream or port
#[derive(Debug, Clone, PartialEq)]
pub struct CodingParameters {
    pub data_type: DataType,
    pub coding_format: Option<CodingFormatId>,
    pub audio: AudioParameters,
    pub video: VideoParameters,
    pub bit_rate: u64,
    pub vbr: bool,
    /// Codec-private setup data (e.g. AudioSpecificConfig, avcC)
    pub extradata: Bytes,
    /// Must be cleared whenever a field above is changed
    pub native: Option<NativeParameters>,
}

impl CodingParameters {
    pub fn new(data_type: DataType) -> Self {
        Self {
            data_type,
            coding_format: None,
            audio: AudioParameters::default(),
            video: VideoParameters::default(),
            bit_rate: 0,
            vbr: false,
            extradata: Bytes::new(),
            native: None,
        }
    }

    /// Audio parameters for the given coding format and sample layout
    pub fn audio(
        coding_format: CodingFormatId,
        sample_format: AudioSampleFormat,
        sample_rate: u32,
    ) -> Self {
        let mut params = Self::new(DataType::Audio);
        params.coding_format = Some(coding_format);
        params.audio = AudioParameters {
            sample_format: Some(sample_format),
            sample_rate,
        };
        params
    }

    /// Video parameters for the given coding format and frame geometry
    pub fn video(
        coding_format: CodingFormatId,
        pixel_format: PixelFormat,
        width: u32,
        height: u32,
    ) -> Self {
        let mut params = Self::new(DataType::Video);
        params.coding_format = Some(coding_format);
        params.video = VideoParameters {
            pixel_format: Some(pixel_format),
            width,
            height,
        };
        params
    }

    /// Coding format name for logs
    pub fn coding_format_name(&self) -> &'static str {
        self.coding_format.map(|c| c.name()).unwrap_or("none")
    }
}

/// One elementary stream of a container: coding parameters plus timing
#[derive(Debug, Clone, PartialEq)]
pub struct Stream {
    pub coding_parameters: CodingParameters,
    pub time_scale: Rational,
    pub start_time: Option<i64>,
    pub duration: Option<i64>,
}

impl Stream {
    pub fn new(data_type: DataType) -> Self {
        Self::with_parameters(CodingParameters::new(data_type))
    }

    pub fn with_parameters(coding_parameters: CodingParameters) -> Self {
        Self {
            coding_parameters,
            time_scale: Rational::new(1, 1000),
            start_time: None,
            duration: None,
        }
    }

    pub fn data_type(&self) -> DataType {
        self.coding_parameters.data_type
    }

    /// Copy time scale, start time and duration from another stream
    pub fn copy_timing_from(&mut self, other: &Stream) {
        self.time_scale = other.time_scale;
        self.start_time = other.start_time;
        self.duration = other.duration;
    }
}
