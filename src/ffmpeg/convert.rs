//! Conversions between FFmpeg types and the media model
//!
//! All `unsafe` field access to `AVCodecParameters` lives here, each block
//! with its safety argument. Callers outside this module never need `unsafe`.

use std::ffi::{c_int, CString};
use std::ops::Deref;
use std::rc::Rc;

use bytes::Bytes;
use ffmpeg_next as ffmpeg;
use ffmpeg_next::codec::Id;
use ffmpeg_next::ffi;
use ffmpeg_next::format::sample::Type as SampleLayout;
use ffmpeg_next::format::{Pixel, Sample};
use ffmpeg_next::util::channel_layout::ChannelLayout;

use crate::error::{Result, TranscodeError};
use crate::media::{
    AudioBuffer, AudioSampleFormat, CodingFormatId, CodingParameters, DataType, NativeParameters,
    Packet, PixelBuffer, PixelFormat, Rational, SampleSpec, SampleType, Stream,
};

const PIXEL_FORMATS: [PixelFormat; 9] = [
    PixelFormat::Yuv420p,
    PixelFormat::Yuv422p,
    PixelFormat::Yuv444p,
    PixelFormat::Nv12,
    PixelFormat::Rgb24,
    PixelFormat::Bgr24,
    PixelFormat::Rgba,
    PixelFormat::Bgra,
    PixelFormat::Gray8,
];

const SAMPLE_FORMATS: [ffi::AVSampleFormat; 10] = [
    ffi::AVSampleFormat::AV_SAMPLE_FMT_U8,
    ffi::AVSampleFormat::AV_SAMPLE_FMT_S16,
    ffi::AVSampleFormat::AV_SAMPLE_FMT_S32,
    ffi::AVSampleFormat::AV_SAMPLE_FMT_FLT,
    ffi::AVSampleFormat::AV_SAMPLE_FMT_DBL,
    ffi::AVSampleFormat::AV_SAMPLE_FMT_U8P,
    ffi::AVSampleFormat::AV_SAMPLE_FMT_S16P,
    ffi::AVSampleFormat::AV_SAMPLE_FMT_S32P,
    ffi::AVSampleFormat::AV_SAMPLE_FMT_FLTP,
    ffi::AVSampleFormat::AV_SAMPLE_FMT_DBLP,
];

// ── Identifiers ─────────────────────────────────────────────────────────────

pub fn codec_id(id: CodingFormatId) -> Id {
    match id {
        CodingFormatId::PcmU8 => Id::PCM_U8,
        CodingFormatId::PcmS16Le => Id::PCM_S16LE,
        CodingFormatId::PcmS16Be => Id::PCM_S16BE,
        CodingFormatId::PcmS24Le => Id::PCM_S24LE,
        CodingFormatId::PcmS32Le => Id::PCM_S32LE,
        CodingFormatId::PcmF32Le => Id::PCM_F32LE,
        CodingFormatId::PcmF64Le => Id::PCM_F64LE,
        CodingFormatId::Aac => Id::AAC,
        CodingFormatId::Ac3 => Id::AC3,
        CodingFormatId::Eac3 => Id::EAC3,
        CodingFormatId::Mp3 => Id::MP3,
        CodingFormatId::Opus => Id::OPUS,
        CodingFormatId::Vorbis => Id::VORBIS,
        CodingFormatId::Flac => Id::FLAC,
        CodingFormatId::Alac => Id::ALAC,
        CodingFormatId::TrueHd => Id::TRUEHD,
        CodingFormatId::RawVideo => Id::RAWVIDEO,
        CodingFormatId::H264 => Id::H264,
        CodingFormatId::Hevc => Id::HEVC,
        CodingFormatId::Vp8 => Id::VP8,
        CodingFormatId::Vp9 => Id::VP9,
        CodingFormatId::Av1 => Id::AV1,
        CodingFormatId::Mpeg2Video => Id::MPEG2VIDEO,
        CodingFormatId::Mpeg4 => Id::MPEG4,
        CodingFormatId::Mjpeg => Id::MJPEG,
        CodingFormatId::Png => Id::PNG,
        CodingFormatId::SubRip => Id::SUBRIP,
        CodingFormatId::WebVtt => Id::WEBVTT,
        CodingFormatId::Ass => Id::ASS,
        CodingFormatId::MovText => Id::MOV_TEXT,
        CodingFormatId::Other { name, .. } => codec_id_by_name(name),
    }
}

/// Look a codec up by its descriptor name, `Id::None` when FFmpeg has none
fn codec_id_by_name(name: &str) -> Id {
    let Ok(name) = CString::new(name) else {
        return Id::None;
    };
    // SAFETY: `name` is a valid NUL-terminated string for the call. The
    // returned descriptor is static data owned by libavcodec, or null.
    unsafe {
        let descriptor = ffi::avcodec_descriptor_get_by_name(name.as_ptr());
        if descriptor.is_null() {
            Id::None
        } else {
            Id::from((*descriptor).id)
        }
    }
}

fn data_type(medium: ffmpeg::media::Type) -> DataType {
    match medium {
        ffmpeg::media::Type::Audio => DataType::Audio,
        ffmpeg::media::Type::Video => DataType::Video,
        ffmpeg::media::Type::Subtitle => DataType::Subtitle,
        _ => DataType::Data,
    }
}

/// Codecs without a named identifier map to [`CodingFormatId::Other`];
/// `None` only for `Id::None`
pub fn coding_format(id: Id) -> Option<CodingFormatId> {
    if id == Id::None {
        return None;
    }
    let known = CodingFormatId::ALL
        .iter()
        .copied()
        .find(|c| codec_id(*c) == id);
    Some(known.unwrap_or(CodingFormatId::Other {
        name: id.name(),
        data_type: data_type(id.medium()),
    }))
}

/// Every codec libavcodec describes, in descriptor order
pub fn all_coding_formats() -> Vec<CodingFormatId> {
    let mut out = Vec::new();
    // SAFETY: `avcodec_descriptor_next` walks libavcodec's static descriptor
    // table; a null argument starts the walk and a null result ends it.
    unsafe {
        let mut descriptor = ffi::avcodec_descriptor_next(std::ptr::null());
        while !descriptor.is_null() {
            out.extend(coding_format(Id::from((*descriptor).id)));
            descriptor = ffi::avcodec_descriptor_next(descriptor);
        }
    }
    out
}

pub fn rational(r: Rational) -> ffmpeg::Rational {
    ffmpeg::Rational::new(r.num, r.den)
}

pub fn from_rational(r: ffmpeg::Rational) -> Rational {
    Rational::new(r.numerator(), r.denominator())
}

// ── Sample and pixel formats ────────────────────────────────────────────────

pub fn sample(fmt: &AudioSampleFormat) -> Sample {
    let layout = if fmt.planar {
        SampleLayout::Planar
    } else {
        SampleLayout::Packed
    };
    match fmt.sample_type {
        SampleType::U8 => Sample::U8(layout),
        SampleType::S16 => Sample::I16(layout),
        SampleType::S32 => Sample::I32(layout),
        SampleType::Float => Sample::F32(layout),
        SampleType::Double => Sample::F64(layout),
    }
}

pub fn sample_spec(sample: Sample) -> Option<SampleSpec> {
    let (sample_type, layout) = match sample {
        Sample::U8(l) => (SampleType::U8, l),
        Sample::I16(l) => (SampleType::S16, l),
        Sample::I32(l) => (SampleType::S32, l),
        Sample::F32(l) => (SampleType::Float, l),
        Sample::F64(l) => (SampleType::Double, l),
        _ => return None,
    };
    Some(SampleSpec {
        sample_type,
        planar: layout == SampleLayout::Planar,
    })
}

/// Map the integer `format` field of `AVCodecParameters` for audio
fn sample_from_raw(raw: c_int) -> Option<SampleSpec> {
    SAMPLE_FORMATS
        .iter()
        .find(|f| **f as c_int == raw)
        .and_then(|f| sample_spec(Sample::from(*f)))
}

pub fn pixel(fmt: PixelFormat) -> Pixel {
    match fmt {
        PixelFormat::Yuv420p => Pixel::YUV420P,
        PixelFormat::Yuv422p => Pixel::YUV422P,
        PixelFormat::Yuv444p => Pixel::YUV444P,
        PixelFormat::Nv12 => Pixel::NV12,
        PixelFormat::Rgb24 => Pixel::RGB24,
        PixelFormat::Bgr24 => Pixel::BGR24,
        PixelFormat::Rgba => Pixel::RGBA,
        PixelFormat::Bgra => Pixel::BGRA,
        PixelFormat::Gray8 => Pixel::GRAY8,
    }
}

pub fn pixel_format(px: Pixel) -> Option<PixelFormat> {
    PIXEL_FORMATS.iter().copied().find(|f| pixel(*f) == px)
}

/// Map the integer `format` field of `AVCodecParameters` for video
fn pixel_from_raw(raw: c_int) -> Option<PixelFormat> {
    PIXEL_FORMATS
        .iter()
        .copied()
        .find(|f| ffi::AVPixelFormat::from(pixel(*f)) as c_int == raw)
}

pub fn channel_layout(channels: u16) -> ChannelLayout {
    match channels {
        1 => ChannelLayout::MONO,
        3 => ChannelLayout::SURROUND,
        4 => ChannelLayout::QUAD,
        5 => ChannelLayout::_5POINT0,
        6 => ChannelLayout::_5POINT1,
        8 => ChannelLayout::_7POINT1,
        _ => ChannelLayout::STEREO,
    }
}

// ── Codec parameters ────────────────────────────────────────────────────────

/// Build FFmpeg codec parameters from the media model
pub fn to_codec_parameters(params: &CodingParameters) -> ffmpeg::codec::Parameters {
    let mut out = ffmpeg::codec::Parameters::new();
    // SAFETY: `Parameters::new` allocates a valid `AVCodecParameters` owned by
    // `out`. All written fields are plain values except `ch_layout`, which is
    // initialised by `av_channel_layout_default`, and `extradata`, which is
    // allocated with `av_mallocz` as FFmpeg expects and freed with `out`.
    unsafe {
        let p = &mut *out.as_mut_ptr();
        p.codec_type = match params.data_type {
            DataType::Audio => ffi::AVMediaType::AVMEDIA_TYPE_AUDIO,
            DataType::Video => ffi::AVMediaType::AVMEDIA_TYPE_VIDEO,
            DataType::Subtitle => ffi::AVMediaType::AVMEDIA_TYPE_SUBTITLE,
            DataType::Data => ffi::AVMediaType::AVMEDIA_TYPE_DATA,
        };
        p.codec_id = params.coding_format.map(codec_id).unwrap_or(Id::None).into();
        p.bit_rate = params.bit_rate as i64;

        match params.data_type {
            DataType::Audio => {
                p.sample_rate = params.audio.sample_rate as c_int;
                if let Some(fmt) = params.audio.sample_format {
                    p.format = ffi::AVSampleFormat::from(sample(&fmt)) as c_int;
                    ffi::av_channel_layout_default(&mut p.ch_layout, fmt.channels as c_int);
                }
            }
            DataType::Video => {
                p.width = params.video.width as c_int;
                p.height = params.video.height as c_int;
                if let Some(px) = params.video.pixel_format {
                    p.format = ffi::AVPixelFormat::from(pixel(px)) as c_int;
                }
            }
            _ => {}
        }

        let size = params.extradata.len();
        if size > 0 {
            let buf = ffi::av_mallocz(size + ffi::AV_INPUT_BUFFER_PADDING_SIZE as usize) as *mut u8;
            if !buf.is_null() {
                std::ptr::copy_nonoverlapping(params.extradata.as_ptr(), buf, size);
                p.extradata = buf;
                p.extradata_size = size as c_int;
            }
        }
    }
    out
}

/// Read FFmpeg codec parameters into the media model
pub fn from_codec_parameters(params: &ffmpeg::codec::Parameters) -> CodingParameters {
    let data_type = data_type(params.medium());
    let mut out = CodingParameters::new(data_type);
    out.coding_format = coding_format(params.id());

    // SAFETY: `params.as_ptr()` is valid for the lifetime of `params`. Only
    // plain fields are read; `extradata` is copied out when non-null with the
    // size FFmpeg recorded next to it.
    unsafe {
        let p = &*params.as_ptr();
        out.bit_rate = p.bit_rate.max(0) as u64;
        match data_type {
            DataType::Audio => {
                out.audio.sample_rate = p.sample_rate.max(0) as u32;
                let channels = p.ch_layout.nb_channels.max(0) as u16;
                out.audio.sample_format = sample_from_raw(p.format)
                    .filter(|_| channels > 0)
                    .map(|spec| spec.with_channels(channels));
            }
            DataType::Video => {
                out.video.width = p.width.max(0) as u32;
                out.video.height = p.height.max(0) as u32;
                out.video.pixel_format = pixel_from_raw(p.format);
            }
            _ => {}
        }
        if !p.extradata.is_null() && p.extradata_size > 0 {
            out.extradata = Bytes::copy_from_slice(std::slice::from_raw_parts(
                p.extradata,
                p.extradata_size as usize,
            ));
        }
    }
    out
}

/// Media-model parameters keeping an owned copy of the native block
pub fn with_native(params: &ffmpeg::codec::Parameters) -> CodingParameters {
    let mut out = from_codec_parameters(params);
    out.native = Some(NativeParameters::new(params.clone()));
    out
}

/// FFmpeg parameters for `params`, preferring the attached native block
pub fn codec_parameters(params: &CodingParameters) -> ffmpeg::codec::Parameters {
    match params
        .native
        .as_ref()
        .and_then(|n| n.downcast_ref::<ffmpeg::codec::Parameters>())
    {
        Some(native) => native.clone(),
        None => to_codec_parameters(params),
    }
}

/// Copy an opened codec context into a fresh `AVCodecParameters`
pub fn context_parameters(ctx: &ffmpeg::codec::Context) -> ffmpeg::codec::Parameters {
    // SAFETY: `avcodec_parameters_alloc` returns a valid pointer or null under
    // OOM. `avcodec_parameters_from_context` copies fields from a live context.
    unsafe {
        let params = ffi::avcodec_parameters_alloc();
        ffi::avcodec_parameters_from_context(params, ctx.as_ptr());
        ffmpeg::codec::Parameters::wrap(params, None::<Rc<dyn std::any::Any>>)
    }
}

/// Media-model parameters of an opened encoder
pub fn encoder_parameters<E>(encoder: &E) -> CodingParameters
where
    E: Deref,
    E::Target: Deref<Target = ffmpeg::codec::Context>,
{
    let ctx: &ffmpeg::codec::Context = encoder.deref().deref();
    with_native(&context_parameters(ctx))
}

/// Zero `codec_tag` on an output stream so the muxer picks its own tag.
///
/// Must be called after `set_parameters` and before `write_header`.
pub fn stream_reset_codec_tag(out_stream: &mut ffmpeg::format::stream::StreamMut) {
    // SAFETY: `codecpar` is non-null once `set_parameters` ran; `codec_tag` is
    // a plain u32 field.
    unsafe {
        (*(*out_stream.as_mut_ptr()).codecpar).codec_tag = 0;
    }
}

/// Describe a demuxed stream
pub fn stream(stream: &ffmpeg::format::stream::Stream) -> Stream {
    let mut out = Stream::with_parameters(with_native(&stream.parameters()));
    out.time_scale = from_rational(stream.time_base());
    out.start_time = Some(stream.start_time()).filter(|t| *t != ffi::AV_NOPTS_VALUE);
    out.duration = Some(stream.duration()).filter(|d| *d > 0);
    out
}

/// EAGAIN or EOF from a send/receive call: nothing more right now
pub(crate) fn is_drained(e: &ffmpeg::Error) -> bool {
    matches!(e, ffmpeg::Error::Eof)
        || matches!(e, ffmpeg::Error::Other { errno } if *errno == ffmpeg::error::EAGAIN)
}

// ── Packets and frames ──────────────────────────────────────────────────────

pub fn to_ffmpeg_packet(packet: &Packet) -> ffmpeg::Packet {
    let mut out = ffmpeg::Packet::copy(&packet.data);
    out.set_pts(packet.pts);
    out.set_dts(packet.dts);
    out.set_duration(packet.duration);
    if packet.is_keyframe {
        out.set_flags(ffmpeg::packet::Flags::KEY);
    }
    out
}

pub fn from_ffmpeg_packet(packet: &ffmpeg::Packet, stream_index: usize, time_base: Rational) -> Packet {
    Packet {
        stream_index,
        pts: packet.pts(),
        dts: packet.dts(),
        duration: packet.duration(),
        time_base,
        is_keyframe: packet.is_key(),
        data: Bytes::copy_from_slice(packet.data().unwrap_or(&[])),
    }
}

pub fn audio_buffer(frame: &ffmpeg::util::frame::Audio) -> Result<AudioBuffer> {
    let spec = sample_spec(frame.format()).ok_or_else(|| {
        TranscodeError::Decode(format!("unsupported sample format {:?}", frame.format()))
    })?;
    let format = spec.with_channels(frame.channels() as u16);

    let mut buffer = AudioBuffer::silent(format, frame.rate(), frame.samples());
    let len = buffer.plane_len();
    for (index, plane) in buffer.planes.iter_mut().enumerate() {
        let data = frame.data(index);
        if data.len() < len {
            return Err(TranscodeError::Decode(format!(
                "audio plane {} holds {} bytes, expected {}",
                index,
                data.len(),
                len
            )));
        }
        plane.copy_from_slice(&data[..len]);
    }
    Ok(buffer)
}

pub fn audio_frame(buffer: &AudioBuffer) -> ffmpeg::util::frame::Audio {
    let mut frame = ffmpeg::util::frame::Audio::new(
        sample(&buffer.format),
        buffer.samples,
        channel_layout(buffer.format.channels),
    );
    frame.set_rate(buffer.sample_rate);
    let len = buffer.plane_len();
    for (index, plane) in buffer.planes.iter().enumerate() {
        let dst = frame.data_mut(index);
        let n = len.min(dst.len()).min(plane.len());
        dst[..n].copy_from_slice(&plane[..n]);
    }
    frame
}

pub fn pixel_buffer(frame: &ffmpeg::util::frame::Video) -> Result<PixelBuffer> {
    let format = pixel_format(frame.format()).ok_or_else(|| {
        TranscodeError::Decode(format!("unsupported pixel format {:?}", frame.format()))
    })?;
    let planes = frame.planes();
    Ok(PixelBuffer {
        format,
        width: frame.width(),
        height: frame.height(),
        planes: (0..planes).map(|i| frame.data(i).to_vec()).collect(),
        strides: (0..planes).map(|i| frame.stride(i)).collect(),
    })
}

pub fn video_frame(buffer: &PixelBuffer) -> ffmpeg::util::frame::Video {
    let mut frame =
        ffmpeg::util::frame::Video::new(pixel(buffer.format), buffer.width, buffer.height);
    let planes = frame.planes().min(buffer.planes.len());
    for index in 0..planes {
        let dst_stride = frame.stride(index);
        let src_stride = buffer.strides.get(index).copied().unwrap_or(dst_stride).max(1);
        let row = dst_stride.min(src_stride);
        let src = &buffer.planes[index];
        let dst = frame.data_mut(index);
        for (r, line) in src.chunks(src_stride).enumerate() {
            let start = r * dst_stride;
            let n = row.min(line.len());
            if start + n > dst.len() {
                break;
            }
            dst[start..start + n].copy_from_slice(&line[..n]);
        }
    }
    frame
}
