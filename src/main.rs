//! Command-line transcoder
//!
//! ```text
//! transcoder [--config <file>] in <input> [directive...] out <output>
//! ```
//!
//! Directives (`decode`, `decode=audio`, `encode=flac`, `resample=s16`) are
//! applied in order before the output is wired.

use std::path::PathBuf;
use std::process::ExitCode;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use transcoder::config_file::ConfigFile;
use transcoder::ffmpeg::{self, FfmpegRegistry};
use transcoder::{FilterDirective, FilterGraphBuilder, Result, TranscodeError, TranscoderConfig};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
const APP_NAME: &str = "transcoder";

const USAGE: &str =
    "usage: transcoder [--config <file>] in <input> [directive...] out <output>";

#[derive(Debug, Default, PartialEq)]
struct Invocation {
    config: Option<PathBuf>,
    input: Option<PathBuf>,
    directives: Vec<FilterDirective>,
    output: Option<PathBuf>,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Invocation> {
    let mut inv = Invocation::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        let mut value = |what: &str| {
            args.next()
                .map(PathBuf::from)
                .ok_or_else(|| TranscodeError::Config(format!("{} expects a path", what)))
        };
        match arg.as_str() {
            "--config" | "-c" => inv.config = Some(value("--config")?),
            "in" => inv.input = Some(value("in")?),
            "out" => inv.output = Some(value("out")?),
            directive if inv.input.is_some() && inv.output.is_none() => {
                inv.directives.push(directive.parse()?)
            }
            other => {
                return Err(TranscodeError::Config(format!(
                    "unexpected argument '{}'",
                    other
                )))
            }
        }
    }
    if inv.input.is_none() || inv.output.is_none() {
        return Err(TranscodeError::Config(USAGE.to_string()));
    }
    Ok(inv)
}

fn load_config(path: Option<&PathBuf>) -> Result<TranscoderConfig> {
    match path {
        Some(path) => Ok(ConfigFile::from_file(path)?.into_config()),
        None => Ok(TranscoderConfig::default()),
    }
}

/// Initialize logging with tracing
fn init_logging(config: &TranscoderConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.as_str().into());
    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.is_json() {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn run(inv: Invocation, config: &TranscoderConfig) -> Result<()> {
    ffmpeg::init()?;
    ffmpeg::install_log_filter();
    tracing::info!("{} v{} ({})", APP_NAME, VERSION, ffmpeg::version_info());

    let registry = FfmpegRegistry::new()?;
    let mut builder = FilterGraphBuilder::new(&registry, config);

    let (Some(input), Some(output)) = (inv.input, inv.output) else {
        return Err(TranscodeError::Config(USAGE.to_string()));
    };
    builder.load_source(&input)?;
    for directive in inv.directives {
        builder.apply(directive)?;
    }
    builder.load_sink(&output)?;

    let mut graph = builder.build()?;
    let stats = graph.run()?;
    tracing::info!(
        passes = stats.passes,
        steps = stats.steps,
        output = %output.display(),
        "done"
    );
    Ok(())
}

fn main() -> ExitCode {
    let inv = match parse_args(std::env::args().skip(1)) {
        Ok(inv) => inv,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::from(2);
        }
    };
    let config = match load_config(inv.config.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::from(2);
        }
    };
    init_logging(&config);

    match run(inv, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(kind = ?e.kind(), "{}", e);
            ExitCode::FAILURE
        }
    }
}
