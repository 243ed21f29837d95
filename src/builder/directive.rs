//! Filter directives given on the command line

use std::fmt;
use std::str::FromStr;

use crate::error::TranscodeError;
use crate::media::{CodingFormatId, DataType, SampleSpec};

/// An explicit filter-chain step applied before the sink is wired
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterDirective {
    /// `decode` or `decode=<audio|video>`: decode every selected stream, or one
    Decode(Option<DataType>),
    /// `encode=<codec>`: encode the stream of the codec's data type
    Encode(CodingFormatId),
    /// `resample=<sample-format>`: convert the audio stream's sample format
    Resample(SampleSpec),
}

impl FromStr for FilterDirective {
    type Err = TranscodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, arg) = match s.split_once('=') {
            Some((name, arg)) => (name.trim(), Some(arg.trim())),
            None => (s.trim(), None),
        };

        match (name, arg) {
            ("decode", None) => Ok(FilterDirective::Decode(None)),
            ("decode", Some(dt)) => Ok(FilterDirective::Decode(Some(dt.parse()?))),
            ("encode", Some(codec)) => Ok(FilterDirective::Encode(codec.parse()?)),
            ("resample", Some(fmt)) => Ok(FilterDirective::Resample(fmt.parse()?)),
            _ => Err(TranscodeError::Config(format!(
                "unknown filter directive '{}'",
                s
            ))),
        }
    }
}

impl fmt::Display for FilterDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterDirective::Decode(None) => write!(f, "decode"),
            FilterDirective::Decode(Some(dt)) => write!(f, "decode={}", dt),
            FilterDirective::Encode(codec) => write!(f, "encode={}", codec),
            FilterDirective::Resample(spec) => write!(
                f,
                "resample={}{}",
                spec.sample_type.name(),
                if spec.planar { "p" } else { "" }
            ),
        }
    }
}
