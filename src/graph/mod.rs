//! Dataflow graph and its cooperative scheduler
//!
//! Nodes live in an arena indexed by [`NodeId`]. Each slot keeps the node,
//! its output-port table, the upstream references used for liveness queries
//! and one FIFO queue of pending units. [`FilterGraph::run`] polls every node
//! in registration order until a full pass makes no progress.

pub mod decoder;
pub mod encoder;
pub mod node;
pub mod resample;
pub mod sink;
pub mod source;

use std::collections::VecDeque;
use std::fmt;

use tracing::{debug, info, trace, warn};

use crate::error::{Result, TranscodeError};

pub use decoder::DecoderNode;
pub use encoder::EncoderNode;
pub use node::{
    InputState, Link, Node, NodeData, NodeId, NodeKind, PortFormat, ProcessContext,
};
pub use resample::AudioResampleNode;
pub use sink::SinkNode;
pub use source::SourceNode;

/// Default queue length past which a warning is logged
pub const DEFAULT_QUEUE_WARN_THRESHOLD: usize = 1024;

struct NodeSlot {
    node: Box<dyn Node>,
    outputs: Vec<Option<Link>>,
    inputs: Vec<Option<NodeId>>,
    queue: VecDeque<NodeData>,
    queue_warned: bool,
}

/// Counters reported by [`FilterGraph::run`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Scheduler passes, including the final pass without progress
    pub passes: usize,
    /// Total `process_next_entity` calls
    pub steps: usize,
}

/// Owns all nodes and drives them to quiescence
pub struct FilterGraph {
    slots: Vec<NodeSlot>,
    queue_warn_threshold: usize,
    ran: bool,
}

impl Default for FilterGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FilterGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nodes: Vec<&'static str> = self.slots.iter().map(|s| s.node.kind().name()).collect();
        f.debug_struct("FilterGraph")
            .field("nodes", &nodes)
            .field("ran", &self.ran)
            .finish()
    }
}

impl FilterGraph {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            queue_warn_threshold: DEFAULT_QUEUE_WARN_THRESHOLD,
            ran: false,
        }
    }

    pub fn with_queue_warn_threshold(mut self, threshold: usize) -> Self {
        self.queue_warn_threshold = threshold;
        self
    }

    /// Register a node; registration order is scheduling order
    pub fn add_node(&mut self, node: Box<dyn Node>) -> NodeId {
        let id = NodeId(self.slots.len());
        debug!(node = %id, kind = node.kind().name(), "adding node");
        self.slots.push(NodeSlot {
            outputs: vec![None; node.output_port_count()],
            inputs: Vec::new(),
            queue: VecDeque::new(),
            queue_warned: false,
            node,
        });
        id
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.slots.len()).map(NodeId)
    }

    fn slot(&self, id: NodeId) -> Result<&NodeSlot> {
        self.slots
            .get(id.0)
            .ok_or_else(|| TranscodeError::Graph(format!("unknown node {}", id)))
    }

    pub fn node(&self, id: NodeId) -> Result<&dyn Node> {
        Ok(self.slot(id)?.node.as_ref())
    }

    /// Borrow a node as its concrete type
    pub fn downcast<T: Node>(&self, id: NodeId) -> Option<&T> {
        self.slots
            .get(id.0)
            .and_then(|slot| slot.node.as_any().downcast_ref::<T>())
    }

    pub fn downcast_mut<T: Node>(&mut self, id: NodeId) -> Option<&mut T> {
        self.slots
            .get_mut(id.0)
            .and_then(|slot| slot.node.as_any_mut().downcast_mut::<T>())
    }

    pub fn kind(&self, id: NodeId) -> Result<NodeKind> {
        Ok(self.slot(id)?.node.kind())
    }

    /// Number of registered nodes of the given kind
    pub fn count_kind(&self, kind: NodeKind) -> usize {
        self.slots.iter().filter(|s| s.node.kind() == kind).count()
    }

    pub fn output_port_count(&self, id: NodeId) -> Result<usize> {
        Ok(self.slot(id)?.outputs.len())
    }

    /// Downstream end of an output port, `None` while unconnected
    pub fn output_link(&self, id: NodeId, port: usize) -> Option<Link> {
        self.slots
            .get(id.0)
            .and_then(|slot| slot.outputs.get(port).copied().flatten())
    }

    /// Upstream neighbors registered on a node
    pub fn upstream(&self, id: NodeId) -> Vec<NodeId> {
        self.slots
            .get(id.0)
            .map(|slot| slot.inputs.iter().flatten().copied().collect())
            .unwrap_or_default()
    }

    pub fn output_format(&self, id: NodeId, port: usize) -> Result<PortFormat> {
        self.slot(id)?.node.output_format(port)
    }

    pub fn input_format(&self, id: NodeId, port: usize) -> Result<PortFormat> {
        self.slot(id)?.node.input_format(port)
    }

    /// Wire `from:out_port` to `to:in_port`.
    ///
    /// Rejects unknown ports, ports already in use and edges that would close
    /// a cycle.
    pub fn connect(&mut self, from: NodeId, out_port: usize, to: NodeId, in_port: usize) -> Result<()> {
        let from_slot = self.slot(from)?;
        if out_port >= from_slot.outputs.len() {
            return Err(TranscodeError::Graph(format!(
                "{} node {} has no output port {}",
                from_slot.node.kind().name(),
                from,
                out_port
            )));
        }
        if let Some(link) = from_slot.outputs[out_port] {
            return Err(TranscodeError::Graph(format!(
                "output port {}:{} is already connected to {}:{}",
                from, out_port, link.node, link.port
            )));
        }

        let to_slot = self.slot(to)?;
        if in_port >= to_slot.node.input_port_count() {
            return Err(TranscodeError::Graph(format!(
                "{} node {} has no input port {}",
                to_slot.node.kind().name(),
                to,
                in_port
            )));
        }
        if let Some(Some(existing)) = to_slot.inputs.get(in_port) {
            return Err(TranscodeError::Graph(format!(
                "input port {}:{} is already fed by {}",
                to, in_port, existing
            )));
        }

        if from == to || self.reaches(to, from) {
            return Err(TranscodeError::Graph(format!(
                "connecting {} to {} would create a cycle",
                from, to
            )));
        }

        self.slots[from.0].outputs[out_port] = Some(Link { node: to, port: in_port });
        let inputs = &mut self.slots[to.0].inputs;
        if inputs.len() <= in_port {
            inputs.resize(in_port + 1, None);
        }
        inputs[in_port] = Some(from);

        debug!(from = %from, out_port, to = %to, in_port, "connected");
        Ok(())
    }

    /// Whether `target` is reachable from `start` along output links
    fn reaches(&self, start: NodeId, target: NodeId) -> bool {
        let mut stack = vec![start];
        let mut seen = vec![false; self.slots.len()];
        while let Some(id) = stack.pop() {
            if id == target {
                return true;
            }
            if std::mem::replace(&mut seen[id.0], true) {
                continue;
            }
            stack.extend(self.slots[id.0].outputs.iter().flatten().map(|l| l.node));
        }
        false
    }

    /// Append a unit to a node's queue
    pub fn add_data(&mut self, id: NodeId, data: NodeData) -> Result<()> {
        self.slot(id)?;
        self.enqueue(id, data);
        Ok(())
    }

    fn enqueue(&mut self, id: NodeId, data: NodeData) {
        let threshold = self.queue_warn_threshold;
        let slot = &mut self.slots[id.0];
        slot.queue.push_back(data);
        if threshold > 0 && slot.queue.len() > threshold && !slot.queue_warned {
            slot.queue_warned = true;
            warn!(
                node = %id,
                kind = slot.node.kind().name(),
                queued = slot.queue.len(),
                "input queue keeps growing"
            );
        }
    }

    /// Units waiting in a node's queue
    pub fn pending(&self, id: NodeId) -> usize {
        self.slots.get(id.0).map(|s| s.queue.len()).unwrap_or(0)
    }

    /// Whether any upstream neighbor of `id` may still produce input
    pub fn is_more_input_from_upstream_expected(&self, id: NodeId) -> bool {
        match self.slots.get(id.0) {
            Some(slot) => slot
                .inputs
                .iter()
                .flatten()
                .any(|up| self.is_more_input_expected(*up)),
            None => false,
        }
    }

    /// Whether `id` can still process, or any upstream node still expects input
    pub fn is_more_input_expected(&self, id: NodeId) -> bool {
        let upstream_expected = self.is_more_input_from_upstream_expected(id);
        upstream_expected || self.can_process_with(id, upstream_expected)
    }

    pub fn input_state(&self, id: NodeId) -> InputState {
        InputState {
            pending: self.pending(id),
            upstream_expected: self.is_more_input_from_upstream_expected(id),
        }
    }

    pub fn can_process(&self, id: NodeId) -> bool {
        self.can_process_with(id, self.is_more_input_from_upstream_expected(id))
    }

    fn can_process_with(&self, id: NodeId, upstream_expected: bool) -> bool {
        match self.slots.get(id.0) {
            Some(slot) => slot.node.can_process(&InputState {
                pending: slot.queue.len(),
                upstream_expected,
            }),
            None => false,
        }
    }

    /// Give one node a single `process_next_entity` call and route its output
    pub fn process_node(&mut self, id: NodeId) -> Result<()> {
        let upstream_expected = self.is_more_input_from_upstream_expected(id);
        let slot = self
            .slots
            .get_mut(id.0)
            .ok_or_else(|| TranscodeError::Graph(format!("unknown node {}", id)))?;

        let mut ctx = ProcessContext::new(&mut slot.queue, upstream_expected);
        slot.node.process_next_entity(&mut ctx)?;

        for (port, data) in ctx.into_outputs() {
            match self.output_link(id, port) {
                Some(link) => self.enqueue(link.node, data),
                None => trace!(node = %id, port, "dropping unit on unconnected port"),
            }
        }
        Ok(())
    }

    /// One scheduler pass; returns the number of nodes that made progress
    pub fn run_pass(&mut self) -> Result<usize> {
        let mut steps = 0;
        for index in 0..self.slots.len() {
            let id = NodeId(index);
            if self.can_process(id) {
                self.process_node(id)?;
                steps += 1;
            }
        }
        Ok(steps)
    }

    /// Drive the graph until a full pass makes no progress.
    ///
    /// The first error from any node aborts the run. A graph runs only once.
    pub fn run(&mut self) -> Result<RunStats> {
        if self.ran {
            return Err(TranscodeError::Graph("graph has already run".into()));
        }
        self.ran = true;

        info!(nodes = self.slots.len(), "running filter graph");
        let mut stats = RunStats::default();
        loop {
            let steps = self.run_pass()?;
            stats.passes += 1;
            if steps == 0 {
                break;
            }
            stats.steps += steps;
        }
        info!(passes = stats.passes, steps = stats.steps, "filter graph finished");
        Ok(stats)
    }
}
