use std::any::Any;

use tracing::{debug, trace};

use super::node::{check_port, InputState, Node, NodeData, NodeKind, PortFormat, ProcessContext};
use crate::error::{Result, TranscodeError};
use crate::format::Resampler;
use crate::media::{AudioSampleFormat, CodingParameters, Frame, Rational};

/// Converts audio frames from one sample format to another
pub struct AudioResampleNode {
    source: CodingParameters,
    target: AudioSampleFormat,
    resampler: Box<dyn Resampler>,
    flushed: bool,
    /// Timestamp just past the last converted frame, for flushed samples
    next_pts: Option<(i64, Rational)>,
}

impl AudioResampleNode {
    pub fn new(
        source: CodingParameters,
        target: AudioSampleFormat,
        resampler: Box<dyn Resampler>,
    ) -> Self {
        Self {
            source,
            target,
            resampler,
            flushed: false,
            next_pts: None,
        }
    }

    pub fn target(&self) -> AudioSampleFormat {
        self.target
    }

    fn output_parameters(&self) -> CodingParameters {
        let mut params = self.source.clone();
        params.audio.sample_format = Some(self.target);
        params.native = None;
        params
    }
}

impl Node for AudioResampleNode {
    fn kind(&self) -> NodeKind {
        NodeKind::AudioResample
    }

    fn input_port_count(&self) -> usize {
        1
    }

    fn output_port_count(&self) -> usize {
        1
    }

    fn can_process(&self, input: &InputState) -> bool {
        input.has_data() || (!self.flushed && !input.upstream_expected)
    }

    fn input_format(&self, port: usize) -> Result<PortFormat> {
        check_port(NodeKind::AudioResample, port, 1)?;
        Ok(PortFormat::frames(self.source.clone()))
    }

    fn output_format(&self, port: usize) -> Result<PortFormat> {
        check_port(NodeKind::AudioResample, port, 1)?;
        Ok(PortFormat::frames(self.output_parameters()))
    }

    fn process_next_entity(&mut self, ctx: &mut ProcessContext<'_>) -> Result<()> {
        match ctx.next_data() {
            Some(data) => {
                let frame = data.into_frame()?;
                let buffer = frame.audio_buffer().ok_or_else(|| {
                    TranscodeError::Resample("audio resampler received a video frame".into())
                })?;

                if let Some(pts) = frame.pts {
                    let span = Rational::rescale(
                        buffer.samples as i64,
                        Rational::new(1, buffer.sample_rate.max(1) as i32),
                        frame.time_base,
                    );
                    self.next_pts = Some((pts + span, frame.time_base));
                }

                if let Some(out) = self.resampler.resample(buffer)? {
                    trace!(pts = ?frame.pts, samples = out.samples, "resampled frame");
                    ctx.forward(0, NodeData::Frame(Frame::audio(out, frame.pts, frame.time_base)));
                }
                Ok(())
            }
            None if !self.flushed && !ctx.upstream_expected() => {
                self.flushed = true;
                if let Some(out) = self.resampler.flush()? {
                    let (pts, time_base) = match self.next_pts {
                        Some((pts, tb)) => (Some(pts), tb),
                        None => (None, Rational::new(1, out.sample_rate.max(1) as i32)),
                    };
                    ctx.forward(0, NodeData::Frame(Frame::audio(out, pts, time_base)));
                }
                debug!(target_format = %self.target, "resampler flushed");
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
