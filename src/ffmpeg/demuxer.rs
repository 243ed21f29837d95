//! libavformat input

use std::path::Path;

use ffmpeg_next as ffmpeg;
use tracing::debug;

use super::convert;
use crate::error::{FfmpegError, Result};
use crate::format::Demuxer;
use crate::media::{DataType, Packet, Stream};

/// Demuxer over an opened input file
pub struct FfmpegDemuxer {
    input: ffmpeg::format::context::Input,
    streams: Vec<Stream>,
}

impl FfmpegDemuxer {
    /// Open and probe a file
    pub fn open(path: &Path) -> Result<Self> {
        let input = ffmpeg::format::input(&path)
            .map_err(|e| FfmpegError::OpenInput(format!("{}: {}", path.display(), e)))?;
        let streams = input.streams().map(|s| convert::stream(&s)).collect();
        Ok(Self { input, streams })
    }

    /// libavformat name of the detected container
    pub fn format_name(&self) -> &str {
        self.input.format().name()
    }
}

fn is_complete(stream: &Stream) -> bool {
    let params = &stream.coding_parameters;
    match params.data_type {
        DataType::Audio => params.audio.sample_rate > 0 && params.audio.sample_format.is_some(),
        DataType::Video => params.video.width > 0 && params.video.height > 0,
        _ => true,
    }
}

impl Demuxer for FfmpegDemuxer {
    fn read_header(&mut self) -> Result<()> {
        // avformat_open_input has already parsed the header
        debug!(
            "{}: {} streams",
            self.format_name(),
            self.streams.len()
        );
        Ok(())
    }

    fn find_stream_info(&mut self) -> Result<bool> {
        Ok(self.streams.iter().all(is_complete))
    }

    fn streams(&self) -> &[Stream] {
        &self.streams
    }

    fn read_packet(&mut self) -> Result<Option<Packet>> {
        loop {
            let mut packet = ffmpeg::Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {
                    let index = packet.stream();
                    let time_base = self
                        .streams
                        .get(index)
                        .map(|s| s.time_scale)
                        .unwrap_or_default();
                    return Ok(Some(convert::from_ffmpeg_packet(&packet, index, time_base)));
                }
                Err(ffmpeg::Error::Eof) => return Ok(None),
                Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => continue,
                Err(e) => return Err(FfmpegError::ReadFrame(e.to_string()).into()),
            }
        }
    }
}
