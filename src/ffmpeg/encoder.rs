//! libavcodec encoders
//!
//! Audio encoders with a fixed frame size (AAC, MP3, Opus...) are fed through
//! a sample FIFO so every frame but the last holds exactly `frame_size`
//! samples. PCM encoders report a frame size of 0 and take buffers as-is.
//!
//! Every `send_frame` is followed by draining `receive_packet` into a local
//! queue; libavcodec refuses a new frame while an encoded packet is pending.

use std::collections::VecDeque;

use ffmpeg_next as ffmpeg;
use ffmpeg_next::codec::capabilities::Capabilities;
use tracing::debug;

use super::convert::{self, is_drained};
use crate::error::{FfmpegError, Result, TranscodeError};
use crate::format::EncoderContext;
use crate::media::{AudioBuffer, CodingParameters, DataType, Frame, Packet, Rational};

enum EncoderHandle {
    Audio(ffmpeg::encoder::Audio),
    Video(ffmpeg::encoder::Video),
}

/// Encoder producing one stream
pub struct FfmpegEncoder {
    encoder: EncoderHandle,
    parameters: CodingParameters,
    time_base: Rational,
    /// 0 for encoders accepting any frame length
    frame_size: usize,
    small_last_frame: bool,
    fifo: Option<AudioBuffer>,
    /// Audio pts of the next frame sent, in `time_base`
    next_pts: Option<i64>,
    ready: VecDeque<Packet>,
}

impl FfmpegEncoder {
    pub fn open(params: &CodingParameters, time_scale: Rational) -> Result<Self> {
        let id = params.coding_format.ok_or_else(|| {
            TranscodeError::Negotiation("encoder needs a coding format".to_string())
        })?;
        let codec = ffmpeg::encoder::find(convert::codec_id(id))
            .ok_or_else(|| FfmpegError::EncoderNotFound(id.name().to_string()))?;
        let small_last_frame = codec.capabilities().contains(Capabilities::SMALL_LAST_FRAME);
        let mut context = ffmpeg::codec::Context::new_with_codec(codec);

        let (encoder, time_base, frame_size) = match params.data_type {
            DataType::Audio => {
                let fmt = params.audio.sample_format.ok_or_else(|| {
                    TranscodeError::Negotiation(format!("{} encoder needs a sample format", id))
                })?;
                let rate = params.audio.sample_rate;
                if rate == 0 {
                    return Err(TranscodeError::Negotiation(format!(
                        "{} encoder needs a sample rate",
                        id
                    )));
                }
                let time_base = Rational::new(1, rate as i32);
                context.set_time_base(convert::rational(time_base));

                let mut encoder = context
                    .encoder()
                    .audio()
                    .map_err(|e| FfmpegError::EncoderCreate(e.to_string()))?;
                encoder.set_rate(rate as i32);
                encoder.set_format(convert::sample(&fmt));
                encoder.set_channel_layout(convert::channel_layout(fmt.channels));
                if params.bit_rate > 0 {
                    encoder.set_bit_rate(params.bit_rate as usize);
                }
                let opened = encoder
                    .open_as(codec)
                    .map_err(|e| FfmpegError::EncoderCreate(format!("{}: {}", id, e)))?;
                let frame_size = opened.frame_size() as usize;
                (EncoderHandle::Audio(opened), time_base, frame_size)
            }
            DataType::Video => {
                let px = params.video.pixel_format.ok_or_else(|| {
                    TranscodeError::Negotiation(format!("{} encoder needs a pixel format", id))
                })?;
                context.set_time_base(convert::rational(time_scale));

                let mut encoder = context
                    .encoder()
                    .video()
                    .map_err(|e| FfmpegError::EncoderCreate(e.to_string()))?;
                encoder.set_width(params.video.width);
                encoder.set_height(params.video.height);
                encoder.set_format(convert::pixel(px));
                encoder.set_time_base(convert::rational(time_scale));
                if params.bit_rate > 0 {
                    encoder.set_bit_rate(params.bit_rate as usize);
                }
                let opened = encoder
                    .open_as(codec)
                    .map_err(|e| FfmpegError::EncoderCreate(format!("{}: {}", id, e)))?;
                (EncoderHandle::Video(opened), time_scale, 0)
            }
            other => {
                return Err(TranscodeError::Negotiation(format!(
                    "cannot encode {} streams",
                    other
                )))
            }
        };

        let mut parameters = match &encoder {
            EncoderHandle::Audio(e) => convert::encoder_parameters(e),
            EncoderHandle::Video(e) => convert::encoder_parameters(e),
        };
        parameters.vbr = params.vbr;

        debug!(
            "opened {} encoder, time base {}, frame size {}",
            id, time_base, frame_size
        );
        Ok(Self {
            encoder,
            parameters,
            time_base,
            frame_size,
            small_last_frame,
            fifo: None,
            next_pts: None,
            ready: VecDeque::new(),
        })
    }

    /// Move every packet the encoder has ready into `ready`
    fn receive_ready(&mut self) -> Result<()> {
        loop {
            let mut packet = ffmpeg::Packet::empty();
            let result = match &mut self.encoder {
                EncoderHandle::Audio(e) => e.receive_packet(&mut packet),
                EncoderHandle::Video(e) => e.receive_packet(&mut packet),
            };
            match result {
                Ok(()) => self
                    .ready
                    .push_back(convert::from_ffmpeg_packet(&packet, 0, self.time_base)),
                Err(e) if is_drained(&e) => return Ok(()),
                Err(e) => return Err(FfmpegError::EncodeFrame(e.to_string()).into()),
            }
        }
    }

    fn send_audio(&mut self, buffer: &AudioBuffer) -> Result<()> {
        let mut frame = convert::audio_frame(buffer);
        frame.set_pts(self.next_pts);
        self.next_pts = self.next_pts.map(|pts| pts + buffer.samples as i64);

        if let EncoderHandle::Audio(e) = &mut self.encoder {
            e.send_frame(&frame)
                .map_err(|e| FfmpegError::EncodeFrame(e.to_string()))?;
        }
        self.receive_ready()
    }

    fn send_video(&mut self, frame: &Frame) -> Result<()> {
        let buffer = frame.pixel_buffer().ok_or_else(|| {
            TranscodeError::Encode("video encoder received an audio frame".to_string())
        })?;
        let mut out = convert::video_frame(buffer);
        out.set_pts(
            frame
                .pts
                .map(|pts| Rational::rescale(pts, frame.time_base, self.time_base)),
        );
        if let EncoderHandle::Video(e) = &mut self.encoder {
            e.send_frame(&out)
                .map_err(|e| FfmpegError::EncodeFrame(e.to_string()))?;
        }
        self.receive_ready()
    }

    /// Send every full frame sitting in the FIFO
    fn drain_fifo(&mut self) -> Result<()> {
        while let Some(chunk) = self.fifo.as_mut().and_then(|f| take_front(f, self.frame_size)) {
            self.send_audio(&chunk)?;
        }
        Ok(())
    }

    /// Send what is left in the FIFO at end of stream
    fn flush_fifo(&mut self) -> Result<()> {
        let Some(mut rest) = self.fifo.take().filter(|f| f.samples > 0) else {
            return Ok(());
        };
        if !self.small_last_frame && rest.samples < self.frame_size {
            let pad = AudioBuffer::silent(rest.format, rest.sample_rate, self.frame_size - rest.samples);
            append(&mut rest, &pad);
        }
        self.send_audio(&rest)
    }
}

/// Append `other`'s samples to `buffer`; both share one format
fn append(buffer: &mut AudioBuffer, other: &AudioBuffer) {
    for (plane, extra) in buffer.planes.iter_mut().zip(&other.planes) {
        plane.extend_from_slice(extra);
    }
    buffer.samples += other.samples;
}

/// Split off the first `samples` samples, `None` if fewer are buffered
fn take_front(buffer: &mut AudioBuffer, samples: usize) -> Option<AudioBuffer> {
    if samples == 0 || buffer.samples < samples {
        return None;
    }
    let mut chunk = AudioBuffer::silent(buffer.format, buffer.sample_rate, samples);
    let len = chunk.plane_len();
    for (dst, src) in chunk.planes.iter_mut().zip(buffer.planes.iter_mut()) {
        dst.copy_from_slice(&src[..len]);
        src.drain(..len);
    }
    buffer.samples -= samples;
    Some(chunk)
}

impl EncoderContext for FfmpegEncoder {
    fn parameters(&self) -> &CodingParameters {
        &self.parameters
    }

    fn encode(&mut self, frame: &Frame) -> Result<()> {
        if let EncoderHandle::Video(_) = self.encoder {
            return self.send_video(frame);
        }

        let buffer = frame.audio_buffer().ok_or_else(|| {
            TranscodeError::Encode("audio encoder received a video frame".to_string())
        })?;
        if self.next_pts.is_none() {
            let start = frame
                .pts
                .map(|pts| Rational::rescale(pts, frame.time_base, self.time_base))
                .unwrap_or(0);
            self.next_pts = Some(start);
        }

        if self.frame_size == 0 {
            return self.send_audio(buffer);
        }
        match self.fifo.as_mut() {
            Some(fifo) => append(fifo, buffer),
            None => self.fifo = Some(buffer.clone()),
        }
        self.drain_fifo()
    }

    fn next_packet(&mut self) -> Result<Option<Packet>> {
        Ok(self.ready.pop_front())
    }

    fn flush(&mut self) -> Result<()> {
        self.flush_fifo()?;
        let result = match &mut self.encoder {
            EncoderHandle::Audio(e) => e.send_eof(),
            EncoderHandle::Video(e) => e.send_eof(),
        };
        match result {
            Ok(()) => {}
            Err(e) if is_drained(&e) => {}
            Err(e) => return Err(FfmpegError::EncodeFrame(e.to_string()).into()),
        }
        self.receive_ready()
    }
}
