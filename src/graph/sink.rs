use std::any::Any;
use std::collections::BTreeMap;

use tracing::{debug, info, trace};

use super::node::{InputState, Node, NodeKind, PortFormat, ProcessContext};
use crate::error::{Result, TranscodeError};
use crate::format::{ContainerFormat, Muxer};

/// Writes packets to a muxer, one input port per destination stream.
///
/// The header is written on the first processing call, once every
/// destination stream has been described. The muxer is finalized when the
/// queue is empty and nothing upstream can produce more input.
pub struct SinkNode {
    format: ContainerFormat,
    muxer: Box<dyn Muxer>,
    header_written: bool,
    finalized: bool,
    /// Source stream index -> destination stream index
    stream_map: BTreeMap<usize, usize>,
    packets_written: u64,
}

impl SinkNode {
    pub fn new(format: ContainerFormat, muxer: Box<dyn Muxer>) -> Self {
        Self {
            format,
            muxer,
            header_written: false,
            finalized: false,
            stream_map: BTreeMap::new(),
            packets_written: 0,
        }
    }

    pub fn format(&self) -> &ContainerFormat {
        &self.format
    }

    pub fn muxer(&self) -> &dyn Muxer {
        self.muxer.as_ref()
    }

    pub fn muxer_mut(&mut self) -> &mut dyn Muxer {
        self.muxer.as_mut()
    }

    /// Route packets of source stream `source` to destination stream `dest`
    pub fn map_stream(&mut self, source: usize, dest: usize) {
        self.stream_map.insert(source, dest);
    }

    /// Destination stream for a source stream; unmapped streams keep their index
    pub fn destination(&self, source: usize) -> usize {
        self.stream_map.get(&source).copied().unwrap_or(source)
    }

    pub fn is_header_written(&self) -> bool {
        self.header_written
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn packets_written(&self) -> u64 {
        self.packets_written
    }
}

impl Node for SinkNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Sink
    }

    fn input_port_count(&self) -> usize {
        self.muxer.stream_count()
    }

    fn output_port_count(&self) -> usize {
        0
    }

    fn can_process(&self, input: &InputState) -> bool {
        !self.finalized && (!self.header_written || input.has_data() || !input.upstream_expected)
    }

    fn input_format(&self, port: usize) -> Result<PortFormat> {
        let stream = self
            .muxer
            .stream(port)
            .ok_or(TranscodeError::StreamNotFound(port))?;
        Ok(PortFormat::packets(stream.coding_parameters.clone()))
    }

    fn output_format(&self, _port: usize) -> Result<PortFormat> {
        Err(TranscodeError::Graph("sink node has no output ports".into()))
    }

    fn process_next_entity(&mut self, ctx: &mut ProcessContext<'_>) -> Result<()> {
        if self.finalized {
            return Ok(());
        }

        if !self.header_written {
            self.muxer.write_header()?;
            self.header_written = true;
            debug!(format = %self.format.name, streams = self.muxer.stream_count(), "header written");
            return Ok(());
        }

        if let Some(data) = ctx.next_data() {
            let mut packet = data.into_packet()?;
            let dest = self.destination(packet.stream_index);
            if dest >= self.muxer.stream_count() {
                return Err(TranscodeError::StreamNotFound(dest));
            }
            trace!(source = packet.stream_index, dest, pts = ?packet.pts, "writing packet");
            packet.stream_index = dest;
            self.muxer.write_packet(&packet)?;
            self.packets_written += 1;
        } else if !ctx.upstream_expected() {
            self.muxer.finalize()?;
            self.finalized = true;
            info!(
                format = %self.format.name,
                packets = self.packets_written,
                "output finalized"
            );
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
