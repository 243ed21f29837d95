use std::any::Any;

use tracing::{debug, trace};

use super::node::{check_port, InputState, Node, NodeData, NodeKind, PortFormat, ProcessContext};
use crate::error::Result;
use crate::format::EncoderContext;

/// Turns frames into packets for the source stream it serves
pub struct EncoderNode {
    encoder: Box<dyn EncoderContext>,
    /// Source stream index stamped on every packet
    stream_index: usize,
    flushed: bool,
    frames_in: u64,
    packets_out: u64,
}

impl EncoderNode {
    pub fn new(encoder: Box<dyn EncoderContext>, stream_index: usize) -> Self {
        Self {
            encoder,
            stream_index,
            flushed: false,
            frames_in: 0,
            packets_out: 0,
        }
    }

    pub fn stream_index(&self) -> usize {
        self.stream_index
    }

    pub fn packets_out(&self) -> u64 {
        self.packets_out
    }

    fn drain(&mut self, ctx: &mut ProcessContext<'_>) -> Result<()> {
        while let Some(mut packet) = self.encoder.next_packet()? {
            packet.stream_index = self.stream_index;
            self.packets_out += 1;
            trace!(stream = self.stream_index, pts = ?packet.pts, size = packet.len(), "encoded packet");
            ctx.forward(0, NodeData::Packet(packet));
        }
        Ok(())
    }
}

impl Node for EncoderNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Encoder
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
        check_port(NodeKind::Encoder, port, 1)?;
        Ok(PortFormat::frames(self.encoder.parameters().clone()))
    }

    fn output_format(&self, port: usize) -> Result<PortFormat> {
        check_port(NodeKind::Encoder, port, 1)?;
        Ok(PortFormat::packets(self.encoder.parameters().clone()))
    }

    fn process_next_entity(&mut self, ctx: &mut ProcessContext<'_>) -> Result<()> {
        match ctx.next_data() {
            Some(data) => {
                let frame = data.into_frame()?;
                self.frames_in += 1;
                self.encoder.encode(&frame)?;
                self.drain(ctx)
            }
            None if !self.flushed && !ctx.upstream_expected() => {
                self.flushed = true;
                self.encoder.flush()?;
                self.drain(ctx)?;
                debug!(
                    codec = self.encoder.parameters().coding_format_name(),
                    frames = self.frames_in,
                    packets = self.packets_out,
                    "encoder flushed"
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
