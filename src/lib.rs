//! Media transcoder built around a dataflow graph
//!
//! A [`FilterGraphBuilder`] opens a source and a destination, picks one
//! stream per data type and wires each to the destination. Streams the
//! destination container accepts are copied; everything else gets decoder,
//! resampler and encoder nodes inserted by format negotiation. The resulting
//! [`FilterGraph`] is run by a single-threaded cooperative scheduler.
//!
//! Demuxers, muxers and codecs are reached through the traits in [`format`];
//! the `ffmpeg` feature provides an implementation backed by FFmpeg.

pub mod builder;
pub mod config;
pub mod config_file;
pub mod error;
#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;
pub mod format;
pub mod graph;
pub mod media;

#[cfg(test)]
mod integration;

pub use builder::{FilterDirective, FilterGraphBuilder, MountPort, TranscodeDecision};
pub use config::TranscoderConfig;
pub use error::{ErrorKind, FfmpegError, Result, TranscodeError};
pub use format::FormatRegistry;
pub use graph::{FilterGraph, NodeId, NodeKind, RunStats};
