//! libavformat output

use std::path::Path;

use ffmpeg_next as ffmpeg;
use tracing::debug;

use super::convert;
use crate::error::{FfmpegError, Result, TranscodeError};
use crate::format::Muxer;
use crate::media::{Packet, Stream};

/// Muxer writing a container file
pub struct FfmpegMuxer {
    output: ffmpeg::format::context::Output,
    streams: Vec<Stream>,
}

impl FfmpegMuxer {
    /// Create the output file for a named libavformat muxer
    pub fn create(path: &Path, format_name: &str) -> Result<Self> {
        let output = ffmpeg::format::output_as(&path, format_name)
            .map_err(|e| FfmpegError::MuxerCreate(format!("{}: {}", path.display(), e)))?;
        Ok(Self {
            output,
            streams: Vec::new(),
        })
    }
}

impl Muxer for FfmpegMuxer {
    fn add_stream(&mut self, stream: Stream) -> Result<usize> {
        let mut out = self
            .output
            .add_stream(ffmpeg::encoder::find(ffmpeg::codec::Id::None))
            .map_err(|e| FfmpegError::StreamConfig(e.to_string()))?;
        out.set_parameters(convert::codec_parameters(&stream.coding_parameters));
        convert::stream_reset_codec_tag(&mut out);
        out.set_time_base(convert::rational(stream.time_scale));
        let index = out.index();

        debug!(
            "output stream {}: {} {}",
            index,
            stream.data_type(),
            stream.coding_parameters.coding_format_name()
        );
        self.streams.push(stream);
        Ok(index)
    }

    fn stream(&self, index: usize) -> Option<&Stream> {
        self.streams.get(index)
    }

    fn stream_count(&self) -> usize {
        self.streams.len()
    }

    fn write_header(&mut self) -> Result<()> {
        self.output
            .write_header()
            .map_err(|e| FfmpegError::WriteHeader(e.to_string()))?;
        Ok(())
    }

    fn write_packet(&mut self, packet: &Packet) -> Result<()> {
        let index = packet.stream_index;
        // write_header may have changed the stream time base
        let dst_time_base = self
            .output
            .stream(index)
            .ok_or(TranscodeError::StreamNotFound(index))?
            .time_base();

        let mut pkt = convert::to_ffmpeg_packet(packet);
        pkt.set_stream(index);
        pkt.set_position(-1);
        if packet.time_base.is_valid() {
            pkt.rescale_ts(convert::rational(packet.time_base), dst_time_base);
        }
        pkt.write_interleaved(&mut self.output)
            .map_err(|e| FfmpegError::WritePacket(e.to_string()))?;
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        self.output
            .write_trailer()
            .map_err(|e| FfmpegError::WriteTrailer(e.to_string()))?;
        Ok(())
    }
}
