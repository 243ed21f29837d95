use thiserror::Error;

/// Main error type for the transcoder
#[derive(Error, Debug)]
pub enum TranscodeError {
    /// An error originating from the FFmpeg backend
    #[error("FFmpeg error: {0}")]
    Ffmpeg(#[from] FfmpegError),

    /// A standard I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// No usable container format, demuxer or muxer for a path
    #[error("Configuration error: {0}")]
    Config(String),

    /// Two ports could not be made compatible
    #[error("Negotiation error: {0}")]
    Negotiation(String),

    /// Invalid wiring or an inconsistent graph state
    #[error("Graph error: {0}")]
    Graph(String),

    /// A stream index that the source or sink does not have
    #[error("Stream not found: {0}")]
    StreamNotFound(usize),

    /// A coding format identifier that could not be resolved
    #[error("Unknown coding format: {0}")]
    UnknownCodingFormat(String),

    /// Failure reading from a demultiplexer
    #[error("Demuxing error: {0}")]
    Demuxing(String),

    /// Failure writing to a multiplexer
    #[error("Muxing error: {0}")]
    Muxing(String),

    /// Failure decoding a coded unit
    #[error("Decoding error: {0}")]
    Decode(String),

    /// Failure encoding a frame
    #[error("Encoding error: {0}")]
    Encode(String),

    /// Failure converting an audio buffer
    #[error("Resampling error: {0}")]
    Resample(String),
}

/// Which phase an error belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Detected while opening the source or sink
    Configuration,
    /// Detected while wiring the graph
    Negotiation,
    /// Raised while the graph runs
    Execution,
}

impl TranscodeError {
    /// Classify the error into configuration, negotiation or execution.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Configuration,
            Self::Negotiation(_) | Self::UnknownCodingFormat(_) | Self::StreamNotFound(_) => {
                ErrorKind::Negotiation
            }
            Self::Ffmpeg(FfmpegError::OpenInput(_))
            | Self::Ffmpeg(FfmpegError::FindStreamInfo(_))
            | Self::Ffmpeg(FfmpegError::MuxerCreate(_)) => ErrorKind::Configuration,
            Self::Ffmpeg(FfmpegError::DecoderNotFound(_))
            | Self::Ffmpeg(FfmpegError::EncoderNotFound(_)) => ErrorKind::Negotiation,
            _ => ErrorKind::Execution,
        }
    }
}

/// FFmpeg-specific errors
#[derive(Error, Debug)]
pub enum FfmpegError {
    #[error("FFmpeg initialization failed: {0}")]
    InitFailed(String),

    #[error("Failed to open input file: {0}")]
    OpenInput(String),

    #[error("Failed to find stream info: {0}")]
    FindStreamInfo(String),

    #[error("Failed to find decoder: codec_id={0}")]
    DecoderNotFound(String),

    #[error("Failed to create decoder: {0}")]
    DecoderCreate(String),

    #[error("Failed to find encoder: codec_id={0}")]
    EncoderNotFound(String),

    #[error("Failed to create encoder: {0}")]
    EncoderCreate(String),

    #[error("Failed to create resampler: {0}")]
    ResamplerCreate(String),

    #[error("Failed to create muxer: {0}")]
    MuxerCreate(String),

    #[error("Failed to write header: {0}")]
    WriteHeader(String),

    #[error("Failed to write packet: {0}")]
    WritePacket(String),

    #[error("Failed to write trailer: {0}")]
    WriteTrailer(String),

    #[error("Failed to decode packet: {0}")]
    DecodePacket(String),

    #[error("Failed to encode frame: {0}")]
    EncodeFrame(String),

    #[error("Failed to read frame: {0}")]
    ReadFrame(String),

    #[error("Stream configuration failed: {0}")]
    StreamConfig(String),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, TranscodeError>;
