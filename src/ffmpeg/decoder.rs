//! libavcodec decoders

use ffmpeg_next as ffmpeg;
use tracing::debug;

use super::convert::{self, is_drained};
use crate::error::{FfmpegError, Result, TranscodeError};
use crate::format::DecoderContext;
use crate::media::{CodingParameters, DataType, Frame, Packet, Rational, Stream};

enum DecoderHandle {
    Audio(ffmpeg::decoder::Audio),
    Video(ffmpeg::decoder::Video),
}

/// Decoder for one audio or video stream
pub struct FfmpegDecoder {
    decoder: DecoderHandle,
    /// Output parameters, updated from the opened codec context
    parameters: CodingParameters,
    time_base: Rational,
}

impl FfmpegDecoder {
    pub fn open(stream: &Stream) -> Result<Self> {
        let params = &stream.coding_parameters;
        let mut context =
            ffmpeg::codec::Context::from_parameters(convert::codec_parameters(params))
                .map_err(|e| FfmpegError::DecoderCreate(e.to_string()))?;
        context.set_time_base(convert::rational(stream.time_scale));

        let mut parameters = params.clone();
        parameters.native = None;
        let decoder = match params.data_type {
            DataType::Audio => {
                let decoder = context
                    .decoder()
                    .audio()
                    .map_err(|e| decoder_error(params, e))?;
                if let Some(spec) = convert::sample_spec(decoder.format()) {
                    let channels = decoder.channels() as u16;
                    if channels > 0 {
                        parameters.audio.sample_format = Some(spec.with_channels(channels));
                    }
                }
                if decoder.rate() > 0 {
                    parameters.audio.sample_rate = decoder.rate();
                }
                DecoderHandle::Audio(decoder)
            }
            DataType::Video => {
                let decoder = context
                    .decoder()
                    .video()
                    .map_err(|e| decoder_error(params, e))?;
                if let Some(px) = convert::pixel_format(decoder.format()) {
                    parameters.video.pixel_format = Some(px);
                }
                DecoderHandle::Video(decoder)
            }
            other => {
                return Err(TranscodeError::Negotiation(format!(
                    "cannot decode {} streams",
                    other
                )))
            }
        };

        debug!(
            "opened {} decoder for {}",
            params.coding_format_name(),
            stream.data_type()
        );
        Ok(Self {
            decoder,
            parameters,
            time_base: stream.time_scale,
        })
    }
}

fn decoder_error(params: &CodingParameters, e: ffmpeg::Error) -> TranscodeError {
    match e {
        ffmpeg::Error::DecoderNotFound => {
            FfmpegError::DecoderNotFound(params.coding_format_name().to_string()).into()
        }
        e => FfmpegError::DecoderCreate(e.to_string()).into(),
    }
}

impl DecoderContext for FfmpegDecoder {
    fn parameters(&self) -> &CodingParameters {
        &self.parameters
    }

    fn decode(&mut self, packet: &Packet) -> Result<()> {
        let mut pkt = convert::to_ffmpeg_packet(packet);
        if packet.time_base.is_valid() && packet.time_base != self.time_base {
            pkt.rescale_ts(
                convert::rational(packet.time_base),
                convert::rational(self.time_base),
            );
        }

        let result = match &mut self.decoder {
            DecoderHandle::Audio(d) => d.send_packet(&pkt),
            DecoderHandle::Video(d) => d.send_packet(&pkt),
        };
        match result {
            Ok(()) => Ok(()),
            // Corrupt packets are skipped, the stream keeps going
            Err(ffmpeg::Error::InvalidData) => {
                debug!("skipping invalid packet at pts {:?}", packet.pts);
                Ok(())
            }
            Err(e) => Err(FfmpegError::DecodePacket(e.to_string()).into()),
        }
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        match &mut self.decoder {
            DecoderHandle::Audio(d) => {
                let mut frame = ffmpeg::util::frame::Audio::empty();
                match d.receive_frame(&mut frame) {
                    Ok(()) => {
                        let buffer = convert::audio_buffer(&frame)?;
                        Ok(Some(Frame::audio(buffer, frame.timestamp(), self.time_base)))
                    }
                    Err(e) if is_drained(&e) => Ok(None),
                    Err(e) => Err(FfmpegError::DecodePacket(e.to_string()).into()),
                }
            }
            DecoderHandle::Video(d) => {
                let mut frame = ffmpeg::util::frame::Video::empty();
                match d.receive_frame(&mut frame) {
                    Ok(()) => {
                        let buffer = convert::pixel_buffer(&frame)?;
                        Ok(Some(Frame::video(buffer, frame.timestamp(), self.time_base)))
                    }
                    Err(e) if is_drained(&e) => Ok(None),
                    Err(e) => Err(FfmpegError::DecodePacket(e.to_string()).into()),
                }
            }
        }
    }

    fn flush(&mut self) -> Result<()> {
        let result = match &mut self.decoder {
            DecoderHandle::Audio(d) => d.send_eof(),
            DecoderHandle::Video(d) => d.send_eof(),
        };
        match result {
            Ok(()) => Ok(()),
            Err(e) if is_drained(&e) => Ok(()),
            Err(e) => Err(FfmpegError::DecodePacket(e.to_string()).into()),
        }
    }
}
