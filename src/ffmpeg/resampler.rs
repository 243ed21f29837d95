//! libswresample sample-format conversion

use ffmpeg_next as ffmpeg;
use ffmpeg_next::software::resampling;
use tracing::debug;

use super::convert;
use crate::error::{FfmpegError, Result, TranscodeError};
use crate::format::Resampler;
use crate::media::{AudioBuffer, AudioSampleFormat, CodingParameters};

/// Converts sample type and layout at a fixed sample rate
pub struct FfmpegResampler {
    context: resampling::Context,
    source: AudioSampleFormat,
}

impl FfmpegResampler {
    pub fn new(source: &CodingParameters, target: &AudioSampleFormat) -> Result<Self> {
        let from = source.audio.sample_format.ok_or_else(|| {
            TranscodeError::Negotiation("resampler source has no sample format".to_string())
        })?;
        let rate = source.audio.sample_rate;
        if rate == 0 {
            return Err(TranscodeError::Negotiation(
                "resampler source has no sample rate".to_string(),
            ));
        }

        let context = resampling::Context::get(
            convert::sample(&from),
            convert::channel_layout(from.channels),
            rate,
            convert::sample(target),
            convert::channel_layout(target.channels),
            rate,
        )
        .map_err(|e| FfmpegError::ResamplerCreate(e.to_string()))?;

        debug!("resampler {} -> {} at {} Hz", from, target, rate);
        Ok(Self {
            context,
            source: from,
        })
    }
}

impl Resampler for FfmpegResampler {
    fn resample(&mut self, buffer: &AudioBuffer) -> Result<Option<AudioBuffer>> {
        if buffer.format != self.source {
            return Err(TranscodeError::Resample(format!(
                "expected {}, got {}",
                self.source, buffer.format
            )));
        }
        let input = convert::audio_frame(buffer);
        // run() sizes and allocates the output frame itself
        let mut output = ffmpeg::util::frame::Audio::empty();
        self.context
            .run(&input, &mut output)
            .map_err(|e| TranscodeError::Resample(e.to_string()))?;

        if output.samples() == 0 {
            return Ok(None);
        }
        convert::audio_buffer(&output).map(Some)
    }

    fn flush(&mut self) -> Result<Option<AudioBuffer>> {
        let mut output = ffmpeg::util::frame::Audio::empty();
        match self.context.flush(&mut output) {
            Ok(_) if output.samples() > 0 => convert::audio_buffer(&output).map(Some),
            Ok(_) => Ok(None),
            Err(e) => {
                debug!("resampler flush: {}", e);
                Ok(None)
            }
        }
    }
}
