//! Graph construction and format negotiation
//!
//! [`FilterGraphBuilder`] opens the source and the sink, selects one stream
//! per data type and wires every selected stream to the sink. Conversion
//! nodes are inserted only where the formats on both sides of a connection
//! disagree; a stream whose coding format the destination container accepts
//! is copied without decoding.

pub mod directive;

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::config::{NegotiationConfig, TranscoderConfig};
use crate::error::{Result, TranscodeError};
use crate::format::{ContainerFormat, FormatRegistry};
use crate::graph::{
    AudioResampleNode, DecoderNode, EncoderNode, FilterGraph, Node, NodeId, PortFormat, SinkNode,
    SourceNode,
};
use crate::media::{
    AudioParameters, AudioSampleFormat, CodingFormatId, CodingParameters, DataType, Rational,
    Stream, VideoParameters,
};

pub use directive::FilterDirective;

/// Conversions smart connect may insert for one connection
const MAX_NEGOTIATION_DEPTH: usize = 8;

/// Output port at the end of a stream's chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MountPort {
    pub node: NodeId,
    pub port: usize,
}

/// How a selected stream reaches the sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscodeDecision {
    /// Coded units are forwarded untouched
    Copy,
    /// The stream is re-encoded to the given coding format
    Transcode(CodingFormatId),
}

/// Builds a [`FilterGraph`] from a source file to a destination file
pub struct FilterGraphBuilder<'r> {
    registry: &'r dyn FormatRegistry,
    negotiation: NegotiationConfig,
    graph: FilterGraph,
    source: Option<NodeId>,
    sink: Option<NodeId>,
    selected_streams: BTreeMap<DataType, usize>,
    decisions: BTreeMap<usize, TranscodeDecision>,
    /// Set when wiring the sink failed; the graph must not be built
    wiring_error: Option<String>,
}

impl<'r> FilterGraphBuilder<'r> {
    pub fn new(registry: &'r dyn FormatRegistry, config: &TranscoderConfig) -> Self {
        Self {
            registry,
            negotiation: config.negotiation.clone(),
            graph: FilterGraph::new().with_queue_warn_threshold(config.graph.queue_warn_threshold),
            source: None,
            sink: None,
            selected_streams: BTreeMap::new(),
            decisions: BTreeMap::new(),
            wiring_error: None,
        }
    }

    pub fn graph(&self) -> &FilterGraph {
        &self.graph
    }

    pub fn source(&self) -> Option<NodeId> {
        self.source
    }

    pub fn sink(&self) -> Option<NodeId> {
        self.sink
    }

    /// Source stream chosen for each data type
    pub fn selected_streams(&self) -> &BTreeMap<DataType, usize> {
        &self.selected_streams
    }

    /// Copy/transcode decision per source stream, filled by the sink wiring
    pub fn decisions(&self) -> &BTreeMap<usize, TranscodeDecision> {
        &self.decisions
    }

    /// Select `stream_index` for its data type, replacing the preselection
    pub fn select_stream(&mut self, stream_index: usize) -> Result<()> {
        if self.sink.is_some() {
            return Err(TranscodeError::Graph(
                "streams cannot be selected after the sink is wired".into(),
            ));
        }
        let data_type = self.source_node()?.stream(stream_index)?.data_type();
        self.selected_streams.insert(data_type, stream_index);
        Ok(())
    }

    /// Leave the data type out of the output
    pub fn deselect(&mut self, data_type: DataType) -> Result<()> {
        if self.sink.is_some() {
            return Err(TranscodeError::Graph(
                "streams cannot be deselected after the sink is wired".into(),
            ));
        }
        self.selected_streams.remove(&data_type);
        Ok(())
    }

    fn selected(&self, data_type: DataType) -> Result<usize> {
        self.selected_streams
            .get(&data_type)
            .copied()
            .ok_or_else(|| TranscodeError::Negotiation(format!("no {} stream selected", data_type)))
    }

    fn source_id(&self) -> Result<NodeId> {
        self.source
            .ok_or_else(|| TranscodeError::Config("no source loaded".into()))
    }

    fn source_node(&self) -> Result<&SourceNode> {
        let id = self.source_id()?;
        self.graph
            .downcast::<SourceNode>(id)
            .ok_or_else(|| TranscodeError::Graph(format!("node {} is not a source", id)))
    }

    fn sink_node_mut(&mut self) -> Result<&mut SinkNode> {
        let id = self
            .sink
            .ok_or_else(|| TranscodeError::Config("no sink loaded".into()))?;
        self.graph
            .downcast_mut::<SinkNode>(id)
            .ok_or_else(|| TranscodeError::Graph(format!("node {} is not a sink", id)))
    }

    fn source_stream(&self, stream_index: usize) -> Result<Stream> {
        Ok(self.source_node()?.stream(stream_index)?.clone())
    }

    /// Open the input and preselect the first stream of every data type
    pub fn load_source(&mut self, path: impl AsRef<Path>) -> Result<NodeId> {
        let path = path.as_ref();
        if self.source.is_some() {
            return Err(TranscodeError::Config("a source is already loaded".into()));
        }
        if !path.is_file() {
            return Err(TranscodeError::Config(format!(
                "input {} does not exist",
                path.display()
            )));
        }

        let format = match self.registry.probe_format(path)? {
            Some(format) => format,
            None => self.fallback_format(path)?,
        };

        let mut demuxer = self
            .registry
            .create_demuxer(&format, path)?
            .ok_or_else(|| {
                TranscodeError::Config(format!("no demuxer available for {}", format.name))
            })?;
        demuxer.read_header()?;
        if !demuxer.find_stream_info()? {
            warn!(path = %path.display(), "stream information is incomplete");
        }

        let node = SourceNode::new(demuxer);
        for (index, stream) in node.streams().iter().enumerate() {
            let selected = *self.selected_streams.entry(stream.data_type()).or_insert(index) == index;
            debug!(
                stream = index,
                data_type = %stream.data_type(),
                codec = stream.coding_parameters.coding_format_name(),
                selected,
                "input stream"
            );
        }

        info!(
            path = %path.display(),
            format = %format.name,
            streams = node.streams().len(),
            "loaded source"
        );
        let id = self.graph.add_node(Box::new(node));
        self.source = Some(id);
        Ok(id)
    }

    fn fallback_format(&self, path: &Path) -> Result<ContainerFormat> {
        let ext = extension(path).ok_or_else(|| {
            TranscodeError::Config(format!("cannot identify the format of {}", path.display()))
        })?;
        if !self.negotiation.allow_extension_fallback {
            return Err(TranscodeError::Config(format!(
                "probing {} failed and extension fallback is disabled",
                path.display()
            )));
        }
        let format = self.registry.find_format_by_extension(&ext).ok_or_else(|| {
            TranscodeError::Config(format!("no container format for extension '{}'", ext))
        })?;
        warn!(
            path = %path.display(),
            format = %format.name,
            "probing failed, guessed format from extension"
        );
        Ok(format)
    }

    /// Open the output, resolved by extension, and wire every selected stream
    pub fn load_sink(&mut self, path: impl AsRef<Path>) -> Result<NodeId> {
        let path = path.as_ref();
        self.source_id()?;
        if self.sink.is_some() {
            return Err(TranscodeError::Config("a sink is already loaded".into()));
        }

        let ext = extension(path).ok_or_else(|| {
            TranscodeError::Config(format!("output {} has no file extension", path.display()))
        })?;
        let format = self.registry.find_format_by_extension(&ext).ok_or_else(|| {
            TranscodeError::Config(format!("no container format for extension '{}'", ext))
        })?;
        let muxer = self.registry.create_muxer(&format, path)?.ok_or_else(|| {
            TranscodeError::Config(format!("no muxer available for {}", format.name))
        })?;

        info!(path = %path.display(), format = %format.name, "loaded sink");
        let id = self.graph.add_node(Box::new(SinkNode::new(format, muxer)));
        self.sink = Some(id);
        if let Err(e) = self.connect_to_sink() {
            self.wiring_error = Some(e.to_string());
            return Err(e);
        }
        Ok(id)
    }

    /// Find the frontier of a stream's chain
    pub fn follow(&self, stream_index: usize) -> Result<MountPort> {
        let source = self.source_id()?;
        if stream_index >= self.graph.output_port_count(source)? {
            return Err(TranscodeError::StreamNotFound(stream_index));
        }

        let mut current = MountPort {
            node: source,
            port: stream_index,
        };
        while let Some(link) = self.graph.output_link(current.node, current.port) {
            match self.graph.output_port_count(link.node)? {
                1 => {
                    current = MountPort {
                        node: link.node,
                        port: 0,
                    }
                }
                0 => {
                    return Err(TranscodeError::Negotiation(format!(
                        "stream {} already ends at {}",
                        stream_index, link.node
                    )))
                }
                n => {
                    return Err(TranscodeError::Negotiation(format!(
                        "node {} with {} output ports cannot appear mid-chain",
                        link.node, n
                    )))
                }
            }
        }
        Ok(current)
    }

    /// Connect the frontier of `stream_index` to `target:port`, inserting
    /// decoders, encoders and resamplers as the formats require.
    pub fn smart_connect(&mut self, stream_index: usize, target: NodeId, port: usize) -> Result<()> {
        self.negotiate(stream_index, target, port, 0)
    }

    fn negotiate(&mut self, stream_index: usize, target: NodeId, port: usize, depth: usize) -> Result<()> {
        if depth > MAX_NEGOTIATION_DEPTH {
            return Err(TranscodeError::Negotiation(format!(
                "stream {}: no conversion chain found within {} steps",
                stream_index, MAX_NEGOTIATION_DEPTH
            )));
        }

        let frontier = self.follow(stream_index)?;
        let from = self.graph.output_format(frontier.node, frontier.port)?;
        let to = self.graph.input_format(target, port)?;
        debug!(
            stream = stream_index,
            from = %from.describe(),
            to = %to.describe(),
            "negotiating"
        );

        if from.data_type() != to.data_type() {
            return Err(TranscodeError::Negotiation(format!(
                "stream {}: cannot connect {} to {}",
                stream_index,
                from.data_type(),
                to.data_type()
            )));
        }

        match (from.packets, to.packets) {
            (true, true) if from.parameters.coding_format == to.parameters.coding_format => {}
            (true, _) => {
                self.add_decoder(stream_index, &from, depth)?;
                return self.negotiate(stream_index, target, port, depth + 1);
            }
            (false, true) => {
                let time_scale = self.source_stream(stream_index)?.time_scale;
                self.add_encoder(stream_index, to.parameters.clone(), time_scale, depth)?;
                return self.negotiate(stream_index, target, port, depth + 1);
            }
            (false, false) => match from.data_type() {
                DataType::Audio => {
                    let wanted = to.parameters.audio.sample_format;
                    if let (Some(have), Some(want)) = (from.parameters.audio.sample_format, wanted) {
                        if have != want {
                            debug!(stream = stream_index, from = %have, to = %want, "inserting resampler");
                            self.add_resampler(stream_index, &from.parameters, want, depth)?;
                            return self.negotiate(stream_index, target, port, depth + 1);
                        }
                    }
                }
                DataType::Video => {
                    let have = &from.parameters.video;
                    let want = &to.parameters.video;
                    let pixels_differ = matches!(
                        (have.pixel_format, want.pixel_format),
                        (Some(a), Some(b)) if a != b
                    );
                    if pixels_differ || have.width != want.width || have.height != want.height {
                        return Err(TranscodeError::Negotiation(format!(
                            "stream {}: video frames differ in pixel format or size and no scaler is available",
                            stream_index
                        )));
                    }
                }
                _ => {}
            },
        }

        self.graph.connect(frontier.node, frontier.port, target, port)
    }

    fn add_decoder(&mut self, stream_index: usize, from: &PortFormat, depth: usize) -> Result<NodeId> {
        let mut stream = Stream::with_parameters(from.parameters.clone());
        stream.copy_timing_from(&self.source_stream(stream_index)?);

        let decoder = self.registry.create_decoder(&stream)?;
        debug!(stream = stream_index, codec = from.parameters.coding_format_name(), "inserting decoder");
        self.mount(stream_index, Box::new(DecoderNode::new(decoder)), depth)
    }

    fn add_encoder(
        &mut self,
        stream_index: usize,
        parameters: CodingParameters,
        time_scale: Rational,
        depth: usize,
    ) -> Result<NodeId> {
        let encoder = self.registry.create_encoder(&parameters, time_scale)?;
        debug!(stream = stream_index, codec = parameters.coding_format_name(), "inserting encoder");
        self.mount(stream_index, Box::new(EncoderNode::new(encoder, stream_index)), depth)
    }

    fn add_resampler(
        &mut self,
        stream_index: usize,
        source: &CodingParameters,
        target: AudioSampleFormat,
        depth: usize,
    ) -> Result<NodeId> {
        let resampler = self.registry.create_resampler(source, &target)?;
        let node = AudioResampleNode::new(source.clone(), target, resampler);
        self.mount(stream_index, Box::new(node), depth)
    }

    /// Register a node and connect the stream's frontier to its input
    fn mount(&mut self, stream_index: usize, node: Box<dyn Node>, depth: usize) -> Result<NodeId> {
        let id = self.graph.add_node(node);
        self.negotiate(stream_index, id, 0, depth + 1)?;
        Ok(id)
    }

    /// Decode the selected stream of `data_type`
    pub fn insert_decoder(&mut self, data_type: DataType) -> Result<NodeId> {
        let stream_index = self.selected(data_type)?;
        let frontier = self.follow(stream_index)?;
        let from = self.graph.output_format(frontier.node, frontier.port)?;
        if !from.packets {
            return Err(TranscodeError::Negotiation(format!(
                "{} stream {} is already decoded",
                data_type, stream_index
            )));
        }
        self.add_decoder(stream_index, &from, 0)
    }

    /// Encode the selected stream of `data_type` to `coding_format`
    pub fn insert_encoder(&mut self, data_type: DataType, coding_format: CodingFormatId) -> Result<NodeId> {
        if coding_format.data_type() != data_type {
            return Err(TranscodeError::Negotiation(format!(
                "{} is not a {} coding format",
                coding_format, data_type
            )));
        }
        let stream_index = self.selected(data_type)?;
        let frontier = self.follow(stream_index)?;
        let from = self.graph.output_format(frontier.node, frontier.port)?;
        let parameters = self.encoder_parameters(&from.parameters, coding_format)?;
        let time_scale = self.source_stream(stream_index)?.time_scale;
        self.add_encoder(stream_index, parameters, time_scale, 0)
    }

    /// Convert the selected stream of `data_type` from `source` to `target`
    pub fn insert_audio_resampler(
        &mut self,
        data_type: DataType,
        source: &CodingParameters,
        target: AudioSampleFormat,
    ) -> Result<NodeId> {
        if data_type != DataType::Audio || source.data_type != DataType::Audio {
            return Err(TranscodeError::Negotiation(format!(
                "cannot resample a {} stream",
                data_type
            )));
        }
        let stream_index = self.selected(data_type)?;
        self.add_resampler(stream_index, source, target, 0)
    }

    /// Apply one explicit filter step
    pub fn apply(&mut self, directive: FilterDirective) -> Result<()> {
        debug!(%directive, "applying filter directive");
        match directive {
            FilterDirective::Decode(Some(data_type)) => {
                self.insert_decoder(data_type)?;
            }
            FilterDirective::Decode(None) => {
                let selected: Vec<(DataType, usize)> =
                    self.selected_streams.iter().map(|(dt, s)| (*dt, *s)).collect();
                for (data_type, stream_index) in selected {
                    let frontier = self.follow(stream_index)?;
                    if self.graph.output_format(frontier.node, frontier.port)?.packets {
                        self.insert_decoder(data_type)?;
                    }
                }
            }
            FilterDirective::Encode(coding_format) => {
                self.insert_encoder(coding_format.data_type(), coding_format)?;
            }
            FilterDirective::Resample(spec) => {
                let stream_index = self.selected(DataType::Audio)?;
                let frontier = self.follow(stream_index)?;
                let from = self.graph.output_format(frontier.node, frontier.port)?;
                let channels = from
                    .parameters
                    .audio
                    .sample_format
                    .map(|f| f.channels)
                    .ok_or_else(|| {
                        TranscodeError::Negotiation(format!(
                            "audio stream {} has an unknown sample format",
                            stream_index
                        ))
                    })?;
                self.insert_audio_resampler(
                    DataType::Audio,
                    &from.parameters,
                    spec.with_channels(channels),
                )?;
            }
        }
        Ok(())
    }

    /// Parameters for an encoder producing `coding_format` from `from`
    fn encoder_parameters(&self, from: &CodingParameters, coding_format: CodingFormatId) -> Result<CodingParameters> {
        let info = self
            .registry
            .coding_format(coding_format)
            .ok_or_else(|| TranscodeError::UnknownCodingFormat(coding_format.name().to_string()))?;
        if !info.has_encoder {
            return Err(TranscodeError::Negotiation(format!(
                "no encoder available for {}",
                coding_format
            )));
        }

        let mut params = CodingParameters::new(from.data_type);
        params.coding_format = Some(coding_format);
        match from.data_type {
            DataType::Audio => {
                let have = from.audio.sample_format;
                let sample_format = match (info.preferred_sample, have) {
                    (Some(spec), Some(have)) => Some(spec.with_channels(have.channels)),
                    (None, have) => have,
                    (Some(_), None) => {
                        return Err(TranscodeError::Negotiation(format!(
                            "cannot encode {}: source channel layout is unknown",
                            coding_format
                        )))
                    }
                };
                params.audio = AudioParameters {
                    sample_format,
                    sample_rate: from.audio.sample_rate,
                };
            }
            DataType::Video => {
                // there is no scaler node, so the decoded pixel format is kept
                params.video = VideoParameters {
                    pixel_format: from.video.pixel_format.or(info.preferred_pixel_format),
                    width: from.video.width,
                    height: from.video.height,
                };
            }
            _ => {}
        }
        if from.coding_format == Some(coding_format) {
            params.bit_rate = from.bit_rate;
            params.vbr = from.vbr;
        }
        Ok(params)
    }

    /// Transcode target for a stream the container cannot take as-is
    fn transcode_target(
        &self,
        container: &ContainerFormat,
        data_type: DataType,
        from: &PortFormat,
    ) -> Result<CodingFormatId> {
        if !self.negotiation.allow_transcode {
            return Err(TranscodeError::Negotiation(format!(
                "{} cannot carry {} as-is and transcoding is disabled",
                container.name,
                from.parameters.coding_format_name()
            )));
        }

        if let Some(id) = self.negotiation.codec_override(data_type)? {
            if !container.supports(data_type, Some(id)) {
                return Err(TranscodeError::Negotiation(format!(
                    "{} does not accept the configured {} codec {}",
                    container.name, data_type, id
                )));
            }
            return Ok(id);
        }

        if let Some(id) = from.parameters.coding_format {
            if container.supports(data_type, Some(id)) {
                return Ok(id);
            }
        }

        container.preferred_coding_format(data_type).ok_or_else(|| {
            TranscodeError::Negotiation(format!(
                "{} has no preferred {} coding format",
                container.name, data_type
            ))
        })
    }

    /// Create a destination stream for every selected stream and wire it,
    /// by stream copy when the container accepts the coded format.
    fn connect_to_sink(&mut self) -> Result<()> {
        let sink = self
            .sink
            .ok_or_else(|| TranscodeError::Config("no sink loaded".into()))?;
        let container = self.sink_node_mut()?.format().clone();
        let selected: Vec<(DataType, usize)> =
            self.selected_streams.iter().map(|(dt, s)| (*dt, *s)).collect();

        for (data_type, stream_index) in selected {
            let source_stream = self.source_stream(stream_index)?;
            let frontier = self.follow(stream_index)?;
            let from = self.graph.output_format(frontier.node, frontier.port)?;

            let copy = from.packets && container.supports(data_type, from.parameters.coding_format);
            let (decision, parameters) = if copy {
                (TranscodeDecision::Copy, from.parameters.clone())
            } else {
                let target = self.transcode_target(&container, data_type, &from)?;
                let wanted = self.encoder_parameters(&from.parameters, target)?;
                let encoder = self.add_encoder(stream_index, wanted, source_stream.time_scale, 0)?;
                let parameters = self.graph.output_format(encoder, 0)?.parameters;
                (TranscodeDecision::Transcode(target), parameters)
            };

            let mut dest = Stream::with_parameters(parameters);
            dest.copy_timing_from(&source_stream);
            let sink_node = self.sink_node_mut()?;
            let dest_index = sink_node.muxer_mut().add_stream(dest)?;
            sink_node.map_stream(stream_index, dest_index);

            self.smart_connect(stream_index, sink, dest_index)?;
            info!(
                stream = stream_index,
                dest = dest_index,
                data_type = %data_type,
                decision = ?decision,
                "wired stream to sink"
            );
            self.decisions.insert(stream_index, decision);
        }
        Ok(())
    }

    /// Finish construction and hand over the graph.
    ///
    /// Fails unless the sink was loaded and every selected stream wired to it.
    pub fn build(self) -> Result<FilterGraph> {
        if self.sink.is_none() {
            return Err(TranscodeError::Config("no sink loaded".into()));
        }
        if let Some(reason) = self.wiring_error {
            return Err(TranscodeError::Negotiation(format!(
                "output is not fully wired: {}",
                reason
            )));
        }
        Ok(self.graph)
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}
