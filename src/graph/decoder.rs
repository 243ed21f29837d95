use std::any::Any;

use tracing::{debug, trace};

use super::node::{check_port, InputState, Node, NodeData, NodeKind, PortFormat, ProcessContext};
use crate::error::Result;
use crate::format::DecoderContext;

/// Turns packets of one stream into frames
pub struct DecoderNode {
    decoder: Box<dyn DecoderContext>,
    flushed: bool,
    packets_in: u64,
    frames_out: u64,
}

impl DecoderNode {
    pub fn new(decoder: Box<dyn DecoderContext>) -> Self {
        Self {
            decoder,
            flushed: false,
            packets_in: 0,
            frames_out: 0,
        }
    }

    pub fn frames_out(&self) -> u64 {
        self.frames_out
    }

    pub fn is_flushed(&self) -> bool {
        self.flushed
    }

    fn drain(&mut self, ctx: &mut ProcessContext<'_>) -> Result<()> {
        while let Some(frame) = self.decoder.next_frame()? {
            self.frames_out += 1;
            trace!(pts = ?frame.pts, "decoded frame");
            ctx.forward(0, NodeData::Frame(frame));
        }
        Ok(())
    }
}

impl Node for DecoderNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Decoder
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
        check_port(NodeKind::Decoder, port, 1)?;
        Ok(PortFormat::packets(self.decoder.parameters().clone()))
    }

    fn output_format(&self, port: usize) -> Result<PortFormat> {
        check_port(NodeKind::Decoder, port, 1)?;
        Ok(PortFormat::frames(self.decoder.parameters().clone()))
    }

    fn process_next_entity(&mut self, ctx: &mut ProcessContext<'_>) -> Result<()> {
        match ctx.next_data() {
            Some(data) => {
                let packet = data.into_packet()?;
                self.packets_in += 1;
                self.decoder.decode(&packet)?;
                self.drain(ctx)
            }
            None if !self.flushed && !ctx.upstream_expected() => {
                self.flushed = true;
                self.decoder.flush()?;
                self.drain(ctx)?;
                debug!(
                    codec = self.decoder.parameters().coding_format_name(),
                    packets = self.packets_in,
                    frames = self.frames_out,
                    "decoder flushed"
                );
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
