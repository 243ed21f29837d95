//! Media data model
//!
//! Backend-independent vocabulary shared by the graph, the builder and every
//! backend:
//! - Data types, coding format identifiers and time bases
//! - Coding parameters and stream descriptions
//! - Encoded packets and decoded frames

pub mod frame;
pub mod packet;
pub mod params;
pub mod types;

pub use frame::{AudioBuffer, Frame, FrameData, PixelBuffer};
pub use packet::Packet;
pub use params::{
    AudioParameters, AudioSampleFormat, CodingParameters, NativeParameters, PixelFormat,
    SampleSpec, SampleType, Stream, VideoParameters,
};
pub use types::{CodingFormatId, DataType, Rational};
