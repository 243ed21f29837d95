//! Container and codec lookup backed by libavformat and libavcodec

use std::ffi::{c_int, c_void, CStr, CString};
use std::path::Path;
use std::ptr;

use ffmpeg_next as ffmpeg;
use ffmpeg_next::ffi;
use ffmpeg_next::format::{Pixel, Sample};
use tracing::debug;

use super::{convert, FfmpegDecoder, FfmpegDemuxer, FfmpegEncoder, FfmpegMuxer, FfmpegResampler};
use crate::error::Result;
use crate::format::{
    CodingFormatInfo, ContainerFormat, DecoderContext, Demuxer, EncoderContext, FormatRegistry,
    Muxer, Resampler,
};
use crate::media::{
    AudioSampleFormat, CodingFormatId, CodingParameters, DataType, PixelFormat, Rational,
    SampleSpec, Stream,
};

/// Format registry over the linked FFmpeg libraries
#[derive(Debug, Clone, Copy)]
pub struct FfmpegRegistry;

impl FfmpegRegistry {
    pub fn new() -> Result<Self> {
        super::init()?;
        Ok(Self)
    }
}

/// Describe a libavformat muxer, querying which coding formats it stores
///
/// # Safety
/// `fmt` must point to a muxer returned by libavformat.
unsafe fn describe_output_format(fmt: *const ffi::AVOutputFormat) -> ContainerFormat {
    let f = unsafe { &*fmt };
    let name = unsafe { CStr::from_ptr(f.name) }.to_string_lossy().into_owned();
    let mut container = ContainerFormat::new(name);
    if !f.extensions.is_null() {
        let extensions = unsafe { CStr::from_ptr(f.extensions) }.to_string_lossy();
        for ext in extensions.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            container = container.with_extension(ext);
        }
    }

    let defaults = [
        (DataType::Audio, f.audio_codec),
        (DataType::Video, f.video_codec),
        (DataType::Subtitle, f.subtitle_codec),
    ];
    let every_codec = convert::all_coding_formats();
    for (data_type, default_codec) in defaults {
        let mut accepted: Vec<CodingFormatId> = every_codec
            .iter()
            .copied()
            .filter(|id| id.data_type() == data_type)
            .filter(|id| unsafe {
                ffi::avformat_query_codec(fmt, convert::codec_id(*id).into(), 0) == 1
            })
            .collect();

        if let Some(default) = convert::coding_format(ffmpeg::codec::Id::from(default_codec)) {
            // Muxers without codec tag tables answer "unknown" for everything
            if !accepted.contains(&default) {
                accepted.insert(0, default);
            }
            container = container.with_preferred(data_type, default);
        }
        container = container.accepting(data_type, &accepted);
    }
    container
}

/// First entry of an encoder's supported-config list that maps to the media model
fn first_supported<T: Copy, R>(
    codec: &ffmpeg::Codec,
    config: ffi::AVCodecConfig,
    map: impl Fn(T) -> Option<R>,
) -> Option<R> {
    let mut configs: *const c_void = ptr::null();
    let mut count: c_int = 0;
    // SAFETY: a null context queries the codec's static tables. On success
    // `configs` points to `count` entries of the config's element type, owned
    // by libavcodec.
    let ret = unsafe {
        ffi::avcodec_get_supported_config(
            ptr::null(),
            codec.as_ptr(),
            config,
            0,
            &mut configs,
            &mut count,
        )
    };
    if ret < 0 || configs.is_null() || count <= 0 {
        return None;
    }
    let entries = unsafe { std::slice::from_raw_parts(configs as *const T, count as usize) };
    entries.iter().find_map(|e| map(*e))
}

fn preferred_sample(codec: &ffmpeg::Codec) -> Option<SampleSpec> {
    first_supported(
        codec,
        ffi::AVCodecConfig::AV_CODEC_CONFIG_SAMPLE_FORMAT,
        |f: ffi::AVSampleFormat| convert::sample_spec(Sample::from(f)),
    )
}

fn preferred_pixel_format(codec: &ffmpeg::Codec) -> Option<PixelFormat> {
    first_supported(
        codec,
        ffi::AVCodecConfig::AV_CODEC_CONFIG_PIX_FORMAT,
        |f: ffi::AVPixelFormat| convert::pixel_format(Pixel::from(f)),
    )
}

impl FormatRegistry for FfmpegRegistry {
    fn probe_format(&self, path: &Path) -> Result<Option<ContainerFormat>> {
        match ffmpeg::format::input(&path) {
            Ok(input) => {
                let fmt = input.format();
                let mut container = ContainerFormat::new(fmt.name());
                for ext in fmt.extensions() {
                    container = container.with_extension(ext);
                }
                Ok(Some(container))
            }
            Err(e) => {
                debug!("probe {}: {}", path.display(), e);
                Ok(None)
            }
        }
    }

    fn find_format_by_extension(&self, ext: &str) -> Option<ContainerFormat> {
        let filename = CString::new(format!("output.{}", ext)).ok()?;
        // SAFETY: arguments are null or valid C strings that outlive the call.
        let fmt = unsafe { ffi::av_guess_format(ptr::null(), filename.as_ptr(), ptr::null()) };
        if fmt.is_null() {
            return None;
        }
        Some(unsafe { describe_output_format(fmt) })
    }

    fn create_demuxer(
        &self,
        _format: &ContainerFormat,
        path: &Path,
    ) -> Result<Option<Box<dyn Demuxer>>> {
        // libavformat probes again and weighs the extension itself
        Ok(Some(Box::new(FfmpegDemuxer::open(path)?)))
    }

    fn create_muxer(
        &self,
        format: &ContainerFormat,
        path: &Path,
    ) -> Result<Option<Box<dyn Muxer>>> {
        Ok(Some(Box::new(FfmpegMuxer::create(path, &format.name)?)))
    }

    fn coding_format(&self, id: CodingFormatId) -> Option<CodingFormatInfo> {
        let codec_id = convert::codec_id(id);
        let encoder = ffmpeg::encoder::find(codec_id);
        let has_decoder = ffmpeg::decoder::find(codec_id).is_some();
        if encoder.is_none() && !has_decoder {
            return None;
        }

        let (preferred_sample, preferred_pixel_format) = match (&encoder, id.data_type()) {
            (Some(codec), DataType::Audio) => (preferred_sample(codec), None),
            (Some(codec), DataType::Video) => (None, preferred_pixel_format(codec)),
            _ => (None, None),
        };
        Some(CodingFormatInfo {
            id,
            preferred_sample,
            preferred_pixel_format,
            has_encoder: encoder.is_some(),
            has_decoder,
        })
    }

    fn create_decoder(&self, stream: &Stream) -> Result<Box<dyn DecoderContext>> {
        Ok(Box::new(FfmpegDecoder::open(stream)?))
    }

    fn create_encoder(
        &self,
        parameters: &CodingParameters,
        time_scale: Rational,
    ) -> Result<Box<dyn EncoderContext>> {
        Ok(Box::new(FfmpegEncoder::open(parameters, time_scale)?))
    }

    fn create_resampler(
        &self,
        source: &CodingParameters,
        target: &AudioSampleFormat,
    ) -> Result<Box<dyn Resampler>> {
        Ok(Box::new(FfmpegResampler::new(source, target)?))
    }
}
