//! FFmpeg backend
//!
//! Implements the collaborator traits of [`crate::format`] on top of
//! `ffmpeg-next`:
//! - [`FfmpegRegistry`] resolves containers and coding formats
//! - Demuxer and muxer wrap libavformat contexts
//! - Decoder, encoder and resampler wrap libavcodec and libswresample

pub mod convert;
pub mod decoder;
pub mod demuxer;
pub mod encoder;
pub mod muxer;
pub mod registry;
pub mod resampler;

pub use decoder::FfmpegDecoder;
pub use demuxer::FfmpegDemuxer;
pub use encoder::FfmpegEncoder;
pub use muxer::FfmpegMuxer;
pub use registry::FfmpegRegistry;
pub use resampler::FfmpegResampler;

use std::sync::Once;

use crate::error::FfmpegError;

/// Initialize FFmpeg library
///
/// Safe to call more than once.
pub fn init() -> Result<(), FfmpegError> {
    ffmpeg_next::init()
        .map_err(|e| FfmpegError::InitFailed(format!("ffmpeg::init() failed: {}", e)))?;

    static LOGGED: Once = Once::new();
    LOGGED.call_once(|| tracing::debug!("FFmpeg initialized ({})", version_info()));
    Ok(())
}

/// libavformat version as `major.minor.micro`
pub fn version_info() -> String {
    // SAFETY: `avformat_version` only reads a compile-time constant.
    let v = unsafe { ffmpeg_next::ffi::avformat_version() };
    format!("libavformat {}.{}.{}", v >> 16, (v >> 8) & 0xff, v & 0xff)
}

/// Route FFmpeg's own log output through `tracing`.
///
/// Call once at startup, after [`init`].
pub fn install_log_filter() {
    // SAFETY: both functions modify global FFmpeg state. They are called once
    // from `main` before any graph runs.
    unsafe {
        ffmpeg_next::ffi::av_log_set_level(ffmpeg_next::ffi::AV_LOG_WARNING as i32);
        ffmpeg_next::ffi::av_log_set_callback(Some(ffmpeg_log_callback));
    }
}

/// Messages FFmpeg repeats for every stream-copied PCM packet
const SUPPRESSED_MESSAGES: &[&str] = &[
    "Encoder did not produce proper pts",
    "Could not update timestamps for skipped samples",
];

unsafe extern "C" fn ffmpeg_log_callback(
    avcl: *mut std::ffi::c_void,
    level: std::ffi::c_int,
    fmt: *const std::ffi::c_char,
    vl: ffmpeg_next::ffi::va_list,
) {
    use std::ffi::{c_char, CStr};

    if level > unsafe { ffmpeg_next::ffi::av_log_get_level() } {
        return;
    }

    let mut buf = [0 as c_char; 1024];
    let mut print_prefix: std::ffi::c_int = 1;
    unsafe {
        ffmpeg_next::ffi::av_log_format_line(
            avcl,
            level,
            fmt,
            vl,
            buf.as_mut_ptr(),
            buf.len() as std::ffi::c_int,
            &mut print_prefix,
        );
    }

    let msg = unsafe { CStr::from_ptr(buf.as_ptr()) }.to_string_lossy();
    let msg = msg.trim_end();
    if msg.is_empty() || SUPPRESSED_MESSAGES.iter().any(|s| msg.contains(s)) {
        return;
    }

    if level <= ffmpeg_next::ffi::AV_LOG_ERROR as std::ffi::c_int {
        tracing::error!(target: "ffmpeg", "{}", msg);
    } else if level <= ffmpeg_next::ffi::AV_LOG_WARNING as std::ffi::c_int {
        tracing::warn!(target: "ffmpeg", "{}", msg);
    } else if level <= ffmpeg_next::ffi::AV_LOG_INFO as std::ffi::c_int {
        tracing::info!(target: "ffmpeg", "{}", msg);
    } else {
        tracing::debug!(target: "ffmpeg", "{}", msg);
    }
}
