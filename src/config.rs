//! Transcoder configuration

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, TranscodeError};
use crate::graph::DEFAULT_QUEUE_WARN_THRESHOLD;
use crate::media::{CodingFormatId, DataType};

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset (trace, debug, info, warn, error)
    pub level: String,

    /// Output format (pretty, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

/// Stream negotiation policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegotiationConfig {
    /// Allow decode/encode when stream copy is impossible
    pub allow_transcode: bool,

    /// Fall back to extension lookup when probing the input fails
    pub allow_extension_fallback: bool,

    /// Audio coding format to transcode to, overriding the container's preference
    pub audio_codec: Option<String>,

    /// Video coding format to transcode to, overriding the container's preference
    pub video_codec: Option<String>,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            allow_transcode: true,
            allow_extension_fallback: true,
            audio_codec: None,
            video_codec: None,
        }
    }
}

impl NegotiationConfig {
    /// Configured transcode target for a data type, if any
    pub fn codec_override(&self, data_type: DataType) -> Result<Option<CodingFormatId>> {
        let name = match data_type {
            DataType::Audio => self.audio_codec.as_deref(),
            DataType::Video => self.video_codec.as_deref(),
            _ => None,
        };
        let Some(name) = name else {
            return Ok(None);
        };

        let id: CodingFormatId = name.parse()?;
        if id.data_type() != data_type {
            return Err(TranscodeError::Config(format!(
                "{} is not a {} coding format",
                id, data_type
            )));
        }
        Ok(Some(id))
    }
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Queue length past which a warning is logged; 0 disables the warning
    pub queue_warn_threshold: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            queue_warn_threshold: DEFAULT_QUEUE_WARN_THRESHOLD,
        }
    }
}

/// Transcoder configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranscoderConfig {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Negotiation configuration
    pub negotiation: NegotiationConfig,

    /// Scheduler configuration
    pub graph: GraphConfig,
}

impl TranscoderConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        toml::from_str(&content).map_err(|e| TranscodeError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| TranscodeError::Config(e.to_string()))?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }
}
