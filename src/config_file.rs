//! Configuration file support
//!
//! Loads transcoder configuration from TOML files. Every section and field is
//! optional; missing values take their defaults.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::{GraphConfig, LoggingConfig, NegotiationConfig, TranscoderConfig};
use crate::error::{Result, TranscodeError};

/// Configuration file format
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Logging settings
    pub logging: Option<LoggingSettings>,
    /// Negotiation settings
    pub negotiation: Option<NegotiationSettings>,
    /// Scheduler settings
    pub graph: Option<GraphSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error)
    pub level: Option<String>,
    /// Output format (json, pretty)
    pub format: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegotiationSettings {
    pub allow_transcode: Option<bool>,
    pub allow_extension_fallback: Option<bool>,
    pub audio_codec: Option<String>,
    pub video_codec: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSettings {
    pub queue_warn_threshold: Option<usize>,
}

impl ConfigFile {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            TranscodeError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content)
            .map_err(|e| TranscodeError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| TranscodeError::Config(e.to_string()))?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Generate default configuration file
    pub fn default_config() -> Self {
        Self {
            logging: Some(LoggingSettings {
                level: Some("info".to_string()),
                format: Some("pretty".to_string()),
            }),
            negotiation: Some(NegotiationSettings {
                allow_transcode: Some(true),
                allow_extension_fallback: Some(true),
                audio_codec: None,
                video_codec: None,
            }),
            graph: Some(GraphSettings {
                queue_warn_threshold: Some(GraphConfig::default().queue_warn_threshold),
            }),
        }
    }

    /// Convert to TranscoderConfig
    pub fn into_config(self) -> TranscoderConfig {
        let logging_defaults = LoggingConfig::default();
        let negotiation_defaults = NegotiationConfig::default();
        let graph_defaults = GraphConfig::default();

        let logging = match self.logging {
            Some(l) => LoggingConfig {
                level: l.level.unwrap_or(logging_defaults.level),
                format: l.format.unwrap_or(logging_defaults.format),
            },
            None => logging_defaults,
        };

        let negotiation = match self.negotiation {
            Some(n) => NegotiationConfig {
                allow_transcode: n
                    .allow_transcode
                    .unwrap_or(negotiation_defaults.allow_transcode),
                allow_extension_fallback: n
                    .allow_extension_fallback
                    .unwrap_or(negotiation_defaults.allow_extension_fallback),
                audio_codec: n.audio_codec,
                video_codec: n.video_codec,
            },
            None => negotiation_defaults,
        };

        let graph = GraphConfig {
            queue_warn_threshold: self
                .graph
                .and_then(|g| g.queue_warn_threshold)
                .unwrap_or(graph_defaults.queue_warn_threshold),
        };

        TranscoderConfig {
            logging,
            negotiation,
            graph,
        }
    }
}

/// Generate default configuration file at the specified path
pub fn generate_default_config<P: AsRef<Path>>(path: P) -> Result<()> {
    ConfigFile::default_config().to_file(path)
}
