//! Interfaces to the external collaborators the graph drives
//!
//! Demultiplexers, multiplexers, codec contexts and resamplers are consumed
//! only through the traits in this module. A [`FormatRegistry`] resolves
//! container and coding formats and creates the contexts.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::Result;
use crate::media::{
    AudioBuffer, AudioSampleFormat, CodingFormatId, CodingParameters, DataType, Frame, Packet,
    PixelFormat, Rational, SampleSpec, Stream,
};

/// Demultiplexed input
pub trait Demuxer {
    /// Parse the container header
    fn read_header(&mut self) -> Result<()>;

    /// Gather stream details; `false` when some information is missing
    fn find_stream_info(&mut self) -> Result<bool>;

    /// Streams found in the input
    fn streams(&self) -> &[Stream];

    /// Next coded unit, `None` at end of input
    fn read_packet(&mut self) -> Result<Option<Packet>>;
}

/// Multiplexed output
pub trait Muxer {
    /// Add a destination stream, returning its index
    fn add_stream(&mut self, stream: Stream) -> Result<usize>;

    fn stream(&self, index: usize) -> Option<&Stream>;

    fn stream_count(&self) -> usize;

    fn write_header(&mut self) -> Result<()>;

    /// Write a packet to the destination stream `packet.stream_index`
    fn write_packet(&mut self, packet: &Packet) -> Result<()>;

    /// Flush the trailer and close the output
    fn finalize(&mut self) -> Result<()>;
}

/// Decoder bound to one stream's coding parameters
pub trait DecoderContext {
    fn parameters(&self) -> &CodingParameters;

    fn decode(&mut self, packet: &Packet) -> Result<()>;

    /// Next ready frame, `None` when more input is needed
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Signal end of input so buffered frames become ready
    fn flush(&mut self) -> Result<()>;
}

/// Encoder bound to target coding parameters
pub trait EncoderContext {
    fn parameters(&self) -> &CodingParameters;

    fn encode(&mut self, frame: &Frame) -> Result<()>;

    /// Next ready packet, `None` when more input is needed
    fn next_packet(&mut self) -> Result<Option<Packet>>;

    /// Signal end of input so buffered packets become ready
    fn flush(&mut self) -> Result<()>;
}

/// Converts audio buffers from one sample format to another
pub trait Resampler {
    /// Convert one buffer; `None` when the resampler is still buffering
    fn resample(&mut self, buffer: &AudioBuffer) -> Result<Option<AudioBuffer>>;

    /// Drain buffered samples at end of stream
    fn flush(&mut self) -> Result<Option<AudioBuffer>>;
}

/// Description of a container format
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerFormat {
    pub name: String,
    pub extensions: Vec<String>,
    /// Coding formats the container accepts, per data type
    pub coding_formats: BTreeMap<DataType, Vec<CodingFormatId>>,
    /// Coding format to use when a stream must be re-encoded
    pub preferred: BTreeMap<DataType, CodingFormatId>,
}

impl ContainerFormat {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extensions: Vec::new(),
            coding_formats: BTreeMap::new(),
            preferred: BTreeMap::new(),
        }
    }

    pub fn with_extension(mut self, ext: impl Into<String>) -> Self {
        self.extensions.push(ext.into());
        self
    }

    /// Accept `formats` for `data_type`; the first one becomes preferred
    /// unless a preference is already set.
    pub fn accepting(mut self, data_type: DataType, formats: &[CodingFormatId]) -> Self {
        if let Some(first) = formats.first() {
            self.preferred.entry(data_type).or_insert(*first);
        }
        self.coding_formats
            .entry(data_type)
            .or_default()
            .extend_from_slice(formats);
        self
    }

    pub fn with_preferred(mut self, data_type: DataType, format: CodingFormatId) -> Self {
        self.preferred.insert(data_type, format);
        self
    }

    pub fn supported_coding_formats(&self, data_type: DataType) -> &[CodingFormatId] {
        self.coding_formats
            .get(&data_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn supports(&self, data_type: DataType, format: Option<CodingFormatId>) -> bool {
        match format {
            Some(format) => self.supported_coding_formats(data_type).contains(&format),
            None => false,
        }
    }

    pub fn preferred_coding_format(&self, data_type: DataType) -> Option<CodingFormatId> {
        self.preferred.get(&data_type).copied()
    }

    pub fn matches_extension(&self, ext: &str) -> bool {
        self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))
    }
}

/// Encoder-side facts about a coding format
#[derive(Debug, Clone, PartialEq)]
pub struct CodingFormatInfo {
    pub id: CodingFormatId,
    /// Sample layout the best encoder wants
    pub preferred_sample: Option<SampleSpec>,
    /// Pixel format the best encoder wants
    pub preferred_pixel_format: Option<PixelFormat>,
    pub has_encoder: bool,
    pub has_decoder: bool,
}

/// Resolves formats and creates the external contexts
pub trait FormatRegistry {
    /// Identify the container of an existing file by its content
    fn probe_format(&self, path: &Path) -> Result<Option<ContainerFormat>>;

    /// Look up a container by file extension (without the dot)
    fn find_format_by_extension(&self, ext: &str) -> Option<ContainerFormat>;

    /// `None` when no demuxer exists for the format
    fn create_demuxer(
        &self,
        format: &ContainerFormat,
        path: &Path,
    ) -> Result<Option<Box<dyn Demuxer>>>;

    /// `None` when no muxer exists for the format
    fn create_muxer(&self, format: &ContainerFormat, path: &Path)
        -> Result<Option<Box<dyn Muxer>>>;

    fn coding_format(&self, id: CodingFormatId) -> Option<CodingFormatInfo>;

    /// Best-matching decoder for a stream's parameters
    fn create_decoder(&self, stream: &Stream) -> Result<Box<dyn DecoderContext>>;

    /// Best-matching encoder producing `parameters`
    fn create_encoder(
        &self,
        parameters: &CodingParameters,
        time_scale: Rational,
    ) -> Result<Box<dyn EncoderContext>>;

    fn create_resampler(
        &self,
        source: &CodingParameters,
        target: &AudioSampleFormat,
    ) -> Result<Box<dyn Resampler>>;
}
