use std::any::Any;

use tracing::{debug, trace};

use super::node::{InputState, Node, NodeData, NodeKind, PortFormat, ProcessContext};
use crate::error::{Result, TranscodeError};
use crate::format::Demuxer;
use crate::media::Stream;

/// Reads coded units from a demuxer, one output port per stream
pub struct SourceNode {
    demuxer: Box<dyn Demuxer>,
    exhausted: bool,
    packets_read: u64,
}

impl SourceNode {
    /// `demuxer` must already be past header parsing
    pub fn new(demuxer: Box<dyn Demuxer>) -> Self {
        Self {
            demuxer,
            exhausted: false,
            packets_read: 0,
        }
    }

    pub fn streams(&self) -> &[Stream] {
        self.demuxer.streams()
    }

    pub fn stream(&self, index: usize) -> Result<&Stream> {
        self.demuxer
            .streams()
            .get(index)
            .ok_or(TranscodeError::StreamNotFound(index))
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn packets_read(&self) -> u64 {
        self.packets_read
    }
}

impl Node for SourceNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Source
    }

    fn input_port_count(&self) -> usize {
        0
    }

    fn output_port_count(&self) -> usize {
        self.demuxer.streams().len()
    }

    fn can_process(&self, _input: &InputState) -> bool {
        !self.exhausted
    }

    fn input_format(&self, _port: usize) -> Result<PortFormat> {
        Err(TranscodeError::Graph("source node has no input ports".into()))
    }

    fn output_format(&self, port: usize) -> Result<PortFormat> {
        let stream = self.stream(port)?;
        Ok(PortFormat::packets(stream.coding_parameters.clone()))
    }

    fn process_next_entity(&mut self, ctx: &mut ProcessContext<'_>) -> Result<()> {
        if self.exhausted {
            return Ok(());
        }
        match self.demuxer.read_packet()? {
            Some(packet) => {
                self.packets_read += 1;
                trace!(stream = packet.stream_index, pts = ?packet.pts, size = packet.len(), "read packet");
                ctx.forward(packet.stream_index, NodeData::Packet(packet));
            }
            None => {
                self.exhausted = true;
                debug!(packets = self.packets_read, "end of input");
            }
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
