//! Encoded packet type

use bytes::Bytes;

use super::types::Rational;

/// An encoded media packet.
///
/// Carries compressed data from a single stream. `stream_index` identifies the
/// stream the packet belongs to; nodes with a merged input queue route on it.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub stream_index: usize,
    pub pts: Option<i64>,
    pub dts: Option<i64>,
    /// Duration in `time_base` units, 0 if unknown
    pub duration: i64,
    pub time_base: Rational,
    pub is_keyframe: bool,
    pub data: Bytes,
}

impl Packet {
    pub fn new(stream_index: usize, data: impl Into<Bytes>) -> Self {
        Self {
            stream_index,
            pts: None,
            dts: None,
            duration: 0,
            time_base: Rational::default(),
            is_keyframe: true,
            data: data.into(),
        }
    }

    pub fn with_pts(mut self, pts: i64, time_base: Rational) -> Self {
        self.pts = Some(pts);
        self.dts = Some(pts);
        self.time_base = time_base;
        self
    }

    pub fn with_duration(mut self, duration: i64) -> Self {
        self.duration = duration;
        self
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
