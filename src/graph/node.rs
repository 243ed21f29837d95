//! Node contract and the data model flowing between nodes

use std::any::Any;
use std::collections::VecDeque;
use std::fmt;

use crate::error::{Result, TranscodeError};
use crate::media::{CodingParameters, DataType, Frame, Packet};

/// Position of a node in its graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Downstream end of an output port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link {
    pub node: NodeId,
    pub port: usize,
}

/// A unit flowing between nodes: exactly one of frame or packet
#[derive(Debug, Clone, PartialEq)]
pub enum NodeData {
    Frame(Frame),
    Packet(Packet),
}

impl NodeData {
    pub fn into_packet(self) -> Result<Packet> {
        match self {
            NodeData::Packet(packet) => Ok(packet),
            NodeData::Frame(_) => Err(TranscodeError::Graph(
                "expected a packet but received a frame".into(),
            )),
        }
    }

    pub fn into_frame(self) -> Result<Frame> {
        match self {
            NodeData::Frame(frame) => Ok(frame),
            NodeData::Packet(_) => Err(TranscodeError::Graph(
                "expected a frame but received a packet".into(),
            )),
        }
    }

    pub fn is_packet(&self) -> bool {
        matches!(self, NodeData::Packet(_))
    }
}

/// What a port carries
#[derive(Debug, Clone, PartialEq)]
pub struct PortFormat {
    /// `true` for encoded packets, `false` for decoded frames
    pub packets: bool,
    pub parameters: CodingParameters,
}

impl PortFormat {
    pub fn packets(parameters: CodingParameters) -> Self {
        Self {
            packets: true,
            parameters,
        }
    }

    pub fn frames(parameters: CodingParameters) -> Self {
        Self {
            packets: false,
            parameters,
        }
    }

    pub fn data_type(&self) -> DataType {
        self.parameters.data_type
    }

    /// Short description for logs, e.g. `packets(aac)`
    pub fn describe(&self) -> String {
        let repr = if self.packets { "packets" } else { "frames" };
        match self.parameters.audio.sample_format {
            Some(fmt) if !self.packets => {
                format!("{}({}, {})", repr, self.parameters.coding_format_name(), fmt)
            }
            _ => format!("{}({})", repr, self.parameters.coding_format_name()),
        }
    }
}

/// Role of a node, used for logging and inspection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Source,
    Decoder,
    Encoder,
    AudioResample,
    Sink,
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Source => "source",
            NodeKind::Decoder => "decoder",
            NodeKind::Encoder => "encoder",
            NodeKind::AudioResample => "audio-resample",
            NodeKind::Sink => "sink",
        }
    }
}

/// Input-side state the graph hands to [`Node::can_process`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputState {
    /// Units waiting in the node's queue
    pub pending: usize,
    /// Whether any upstream neighbor may still produce input
    pub upstream_expected: bool,
}

impl InputState {
    pub fn has_data(&self) -> bool {
        self.pending > 0
    }
}

/// Per-call view of the node's queue and its outputs
pub struct ProcessContext<'a> {
    queue: &'a mut VecDeque<NodeData>,
    outputs: Vec<(usize, NodeData)>,
    upstream_expected: bool,
}

impl<'a> ProcessContext<'a> {
    pub(crate) fn new(queue: &'a mut VecDeque<NodeData>, upstream_expected: bool) -> Self {
        Self {
            queue,
            outputs: Vec::new(),
            upstream_expected,
        }
    }

    /// Pop the oldest queued unit
    pub fn next_data(&mut self) -> Option<NodeData> {
        self.queue.pop_front()
    }

    pub fn has_data(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Whether any upstream neighbor may still produce input
    pub fn upstream_expected(&self) -> bool {
        self.upstream_expected
    }

    /// Send a unit to an output port; units on unconnected ports are dropped
    pub fn forward(&mut self, port: usize, data: NodeData) {
        self.outputs.push((port, data));
    }

    pub(crate) fn into_outputs(self) -> Vec<(usize, NodeData)> {
        self.outputs
    }
}

/// A unit of work with typed ports.
///
/// Every call to [`Node::process_next_entity`] does at most one unit of
/// bounded work and never blocks on another node.
pub trait Node: Any {
    fn kind(&self) -> NodeKind;

    fn input_port_count(&self) -> usize;

    fn output_port_count(&self) -> usize;

    /// Whether the node currently has useful work
    fn can_process(&self, input: &InputState) -> bool;

    fn input_format(&self, port: usize) -> Result<PortFormat>;

    fn output_format(&self, port: usize) -> Result<PortFormat>;

    fn process_next_entity(&mut self, ctx: &mut ProcessContext<'_>) -> Result<()>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

pub(crate) fn check_port(kind: NodeKind, port: usize, count: usize) -> Result<()> {
    if port < count {
        Ok(())
    } else {
        Err(TranscodeError::Graph(format!(
            "{} node has no port {}",
            kind.name(),
            port
        )))
    }
}
