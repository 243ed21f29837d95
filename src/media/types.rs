//! Identifiers shared by every layer: data types, coding formats and time bases

use std::fmt;
use std::str::FromStr;

use crate::error::TranscodeError;

/// Kind of elementary stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DataType {
    Audio,
    Video,
    Subtitle,
    Data,
}

impl DataType {
    /// Lower-case name used in logs and filter directives
    pub fn name(&self) -> &'static str {
        match self {
            DataType::Audio => "audio",
            DataType::Video => "video",
            DataType::Subtitle => "subtitle",
            DataType::Data => "data",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DataType {
    type Err = TranscodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "audio" | "a" => Ok(DataType::Audio),
            "video" | "v" => Ok(DataType::Video),
            "subtitle" | "s" => Ok(DataType::Subtitle),
            "data" | "d" => Ok(DataType::Data),
            other => Err(TranscodeError::Config(format!("unknown data type '{}'", other))),
        }
    }
}

/// Rational number used for time scales
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// Value as a float, 0 for a zero denominator
    pub fn as_f64(&self) -> f64 {
        if self.den == 0 {
            0.0
        } else {
            self.num as f64 / self.den as f64
        }
    }

    /// True when both terms are positive
    pub fn is_valid(&self) -> bool {
        self.num > 0 && self.den > 0
    }

    /// Convert a timestamp from one time base to another, rounding to nearest
    /// with ties away from zero.
    pub fn rescale(ts: i64, from: Rational, to: Rational) -> i64 {
        if from == to || !from.is_valid() || !to.is_valid() {
            return ts;
        }
        let num = ts as i128 * from.num as i128 * to.den as i128;
        let den = from.den as i128 * to.num as i128;
        let half = den / 2;
        let q = if num >= 0 {
            (num + half) / den
        } else {
            (num - half) / den
        };
        q.clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }
}

impl Default for Rational {
    fn default() -> Self {
        Self::new(1, 1)
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Identity of a coding format (codec), independent of any backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CodingFormatId {
    // Audio
    PcmU8,
    PcmS16Le,
    PcmS16Be,
    PcmS24Le,
    PcmS32Le,
    PcmF32Le,
    PcmF64Le,
    Aac,
    Ac3,
    Eac3,
    Mp3,
    Opus,
    Vorbis,
    Flac,
    Alac,
    TrueHd,
    // Video
    RawVideo,
    H264,
    Hevc,
    Vp8,
    Vp9,
    Av1,
    Mpeg2Video,
    Mpeg4,
    Mjpeg,
    Png,
    // Subtitle
    SubRip,
    WebVtt,
    Ass,
    MovText,
    /// Coding format known to the backend but not listed above
    Other {
        name: &'static str,
        data_type: DataType,
    },
}

impl CodingFormatId {
    /// Every named coding format, in declaration order
    pub const ALL: &'static [CodingFormatId] = &[
        CodingFormatId::PcmU8,
        CodingFormatId::PcmS16Le,
        CodingFormatId::PcmS16Be,
        CodingFormatId::PcmS24Le,
        CodingFormatId::PcmS32Le,
        CodingFormatId::PcmF32Le,
        CodingFormatId::PcmF64Le,
        CodingFormatId::Aac,
        CodingFormatId::Ac3,
        CodingFormatId::Eac3,
        CodingFormatId::Mp3,
        CodingFormatId::Opus,
        CodingFormatId::Vorbis,
        CodingFormatId::Flac,
        CodingFormatId::Alac,
        CodingFormatId::TrueHd,
        CodingFormatId::RawVideo,
        CodingFormatId::H264,
        CodingFormatId::Hevc,
        CodingFormatId::Vp8,
        CodingFormatId::Vp9,
        CodingFormatId::Av1,
        CodingFormatId::Mpeg2Video,
        CodingFormatId::Mpeg4,
        CodingFormatId::Mjpeg,
        CodingFormatId::Png,
        CodingFormatId::SubRip,
        CodingFormatId::WebVtt,
        CodingFormatId::Ass,
        CodingFormatId::MovText,
    ];

    /// Canonical short name (matches FFmpeg codec names)
    pub fn name(&self) -> &'static str {
        match self {
            CodingFormatId::PcmU8 => "pcm_u8",
            CodingFormatId::PcmS16Le => "pcm_s16le",
            CodingFormatId::PcmS16Be => "pcm_s16be",
            CodingFormatId::PcmS24Le => "pcm_s24le",
            CodingFormatId::PcmS32Le => "pcm_s32le",
            CodingFormatId::PcmF32Le => "pcm_f32le",
            CodingFormatId::PcmF64Le => "pcm_f64le",
            CodingFormatId::Aac => "aac",
            CodingFormatId::Ac3 => "ac3",
            CodingFormatId::Eac3 => "eac3",
            CodingFormatId::Mp3 => "mp3",
            CodingFormatId::Opus => "opus",
            CodingFormatId::Vorbis => "vorbis",
            CodingFormatId::Flac => "flac",
            CodingFormatId::Alac => "alac",
            CodingFormatId::TrueHd => "truehd",
            CodingFormatId::RawVideo => "rawvideo",
            CodingFormatId::H264 => "h264",
            CodingFormatId::Hevc => "hevc",
            CodingFormatId::Vp8 => "vp8",
            CodingFormatId::Vp9 => "vp9",
            CodingFormatId::Av1 => "av1",
            CodingFormatId::Mpeg2Video => "mpeg2video",
            CodingFormatId::Mpeg4 => "mpeg4",
            CodingFormatId::Mjpeg => "mjpeg",
            CodingFormatId::Png => "png",
            CodingFormatId::SubRip => "subrip",
            CodingFormatId::WebVtt => "webvtt",
            CodingFormatId::Ass => "ass",
            CodingFormatId::MovText => "mov_text",
            CodingFormatId::Other { name, .. } => name,
        }
    }

    /// Data type carried by streams of this coding format
    pub fn data_type(&self) -> DataType {
        use CodingFormatId::*;
        match self {
            PcmU8 | PcmS16Le | PcmS16Be | PcmS24Le | PcmS32Le | PcmF32Le | PcmF64Le | Aac
            | Ac3 | Eac3 | Mp3 | Opus | Vorbis | Flac | Alac | TrueHd => DataType::Audio,
            RawVideo | H264 | Hevc | Vp8 | Vp9 | Av1 | Mpeg2Video | Mpeg4 | Mjpeg | Png => {
                DataType::Video
            }
            SubRip | WebVtt | Ass | MovText => DataType::Subtitle,
            Other { data_type, .. } => *data_type,
        }
    }

    /// True for uncompressed PCM audio
    pub fn is_pcm(&self) -> bool {
        self.name().starts_with("pcm_")
    }
}

impl fmt::Display for CodingFormatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CodingFormatId {
    type Err = TranscodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        let alias = match wanted.as_str() {
            "h265" => "hevc",
            "srt" => "subrip",
            "vtt" => "webvtt",
            "ssa" => "ass",
            other => other,
        };
        CodingFormatId::ALL
            .iter()
            .copied()
            .find(|id| id.name() == alias)
            .ok_or_else(|| TranscodeError::UnknownCodingFormat(s.to_string()))
    }
}
