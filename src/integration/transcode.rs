//! Source-to-sink scenarios: stream copy, automatic conversion chains,
//! explicit directives and configuration failures

use std::path::Path;

use super::fixtures::*;
use crate::builder::{FilterDirective, FilterGraphBuilder, TranscodeDecision};
use crate::config::TranscoderConfig;
use crate::error::{ErrorKind, TranscodeError};
use crate::graph::{AudioResampleNode, FilterGraph, NodeKind, SinkNode, SourceNode};
use crate::media::{
    AudioSampleFormat, CodingFormatId, DataType, NativeParameters, Packet, Rational, SampleSpec,
    SampleType,
};

fn build(
    registry: &FixtureRegistry,
    config: &TranscoderConfig,
    input: &Path,
    output: &Path,
) -> crate::error::Result<FilterGraph> {
    let mut builder = FilterGraphBuilder::new(registry, config);
    builder.load_source(input)?;
    builder.load_sink(output)?;
    builder.build()
}

fn s16_values(data: &[u8]) -> Vec<i16> {
    data.chunks_exact(2)
        .map(|c| i16::from_ne_bytes([c[0], c[1]]))
        .collect()
}

fn all_quiescent(graph: &FilterGraph) -> bool {
    graph.node_ids().all(|id| !graph.can_process(id))
}

#[test]
fn test_stream_copy_forwards_every_unit_in_order() {
    let ws = Workspace::new();
    let input = ws.touch("movie.mkv");
    let output = ws.path("copy.mkv");
    let movie = movie_input(5);
    let registry = FixtureRegistry::new().with_input(&input, movie.clone());
    let config = TranscoderConfig::default();

    let mut builder = FilterGraphBuilder::new(&registry, &config);
    builder.load_source(&input).unwrap();
    assert_eq!(builder.selected_streams().get(&DataType::Video), Some(&0));
    assert_eq!(builder.selected_streams().get(&DataType::Audio), Some(&1));
    builder.load_sink(&output).unwrap();
    assert_eq!(builder.decisions().get(&0), Some(&TranscodeDecision::Copy));
    assert_eq!(builder.decisions().get(&1), Some(&TranscodeDecision::Copy));

    let mut graph = builder.build().unwrap();
    assert_eq!(graph.count_kind(NodeKind::Decoder), 0);
    assert_eq!(graph.count_kind(NodeKind::Encoder), 0);
    graph.run().unwrap();
    assert!(all_quiescent(&graph));

    // audio is wired first, so source 1 -> dest 0 and source 0 -> dest 1
    let expected: Vec<(usize, Vec<u8>, Option<i64>)> = movie
        .packets
        .iter()
        .filter(|p| p.stream_index != 2)
        .map(|p| (1 - p.stream_index, p.data.to_vec(), p.pts))
        .collect();

    let record = registry.output(&output).unwrap();
    let record = record.borrow();
    assert!(record.header_written);
    assert!(record.finalized);
    assert_eq!(record.streams.len(), 2);
    assert_eq!(
        record.streams[0].coding_parameters.coding_format,
        Some(CodingFormatId::Aac)
    );
    assert_eq!(record.streams[0].time_scale, Rational::new(1, 48000));
    let written: Vec<(usize, Vec<u8>, Option<i64>)> = record
        .packets
        .iter()
        .map(|p| (p.stream_index, p.data.to_vec(), p.pts))
        .collect();
    assert_eq!(written, expected);
}

#[test]
fn test_sine_to_wav_inserts_decoder_resampler_encoder() {
    let ws = Workspace::new();
    let input = ws.touch("sine.f32");
    let output = ws.path("sine.wav");
    let registry = FixtureRegistry::new().with_input(&input, sine_input(50));
    let config = TranscoderConfig::default();

    let mut builder = FilterGraphBuilder::new(&registry, &config);
    builder.load_source(&input).unwrap();
    builder.load_sink(&output).unwrap();
    assert_eq!(
        builder.decisions().get(&0),
        Some(&TranscodeDecision::Transcode(CodingFormatId::PcmS16Le))
    );

    let mut graph = builder.build().unwrap();
    assert_eq!(graph.count_kind(NodeKind::Decoder), 1);
    assert_eq!(graph.count_kind(NodeKind::AudioResample), 1);
    assert_eq!(graph.count_kind(NodeKind::Encoder), 1);
    graph.run().unwrap();

    let record = registry.output(&output).unwrap();
    let record = record.borrow();
    assert!(record.finalized);
    let params = &record.streams[0].coding_parameters;
    assert_eq!(params.coding_format, Some(CodingFormatId::PcmS16Le));
    assert_eq!(
        params.audio.sample_format.map(|f| (f.sample_type, f.channels)),
        Some((SampleType::S16, 1))
    );

    assert_eq!(record.packets.len(), 50);
    for (i, packet) in record.packets.iter().enumerate() {
        assert_eq!(packet.stream_index, 0);
        assert_eq!(packet.len(), SINE_PACKET_SAMPLES * 2);
        assert_eq!(packet.pts, Some((i * SINE_PACKET_SAMPLES) as i64));
    }

    let first = s16_values(&record.packets[0].data);
    for (n, value) in first.iter().enumerate().take(20) {
        let expected = (sine_sample(n) as f64 * 32768.0).round() as i16;
        assert_eq!(*value, expected, "sample {}", n);
    }
}

#[test]
fn test_one_second_sine_to_16_bit() {
    let ws = Workspace::new();
    let input = ws.touch("second.f32");
    let output = ws.path("second.wav");
    let registry = FixtureRegistry::new().with_input(&input, sine_second());
    let config = TranscoderConfig::default();

    let mut graph = build(&registry, &config, &input, &output).unwrap();
    assert_eq!(graph.count_kind(NodeKind::AudioResample), 1);
    graph.run().unwrap();

    let record = registry.output(&output).unwrap();
    let record = record.borrow();
    assert_eq!(record.packets.len(), 1);
    assert_eq!(record.packets[0].stream_index, 0);
    assert_eq!(record.packets[0].len(), SINE_RATE as usize * 2);
    assert_eq!(
        record.streams[0]
            .coding_parameters
            .audio
            .sample_format
            .map(|f| f.sample_type),
        Some(SampleType::S16)
    );
}

#[test]
fn test_resampler_sits_between_decoder_and_encoder() {
    let ws = Workspace::new();
    let input = ws.touch("sine.f32");
    let output = ws.path("out.mka");
    let registry = FixtureRegistry::new().with_input(&input, sine_input(4));
    let config = TranscoderConfig::default();

    let mut builder = FilterGraphBuilder::new(&registry, &config);
    builder.load_source(&input).unwrap();
    let decoder = builder.insert_decoder(DataType::Audio).unwrap();
    let encoder = builder
        .insert_encoder(DataType::Audio, CodingFormatId::PcmS16Le)
        .unwrap();

    let graph = builder.graph();
    assert_eq!(graph.count_kind(NodeKind::AudioResample), 1);
    let upstream = graph.upstream(encoder);
    assert_eq!(upstream.len(), 1);
    assert_eq!(graph.kind(upstream[0]).unwrap(), NodeKind::AudioResample);
    assert_eq!(graph.upstream(upstream[0]), vec![decoder]);
    let resampler = graph.downcast::<AudioResampleNode>(upstream[0]).unwrap();
    assert_eq!(resampler.target().sample_type, SampleType::S16);

    // matroska takes pcm_s16le, so the encoder output goes straight in
    builder.load_sink(&output).unwrap();
    assert_eq!(builder.decisions().get(&0), Some(&TranscodeDecision::Copy));
    let mut graph = builder.build().unwrap();
    assert_eq!(graph.count_kind(NodeKind::Encoder), 1);
    graph.run().unwrap();
    assert_eq!(registry.output(&output).unwrap().borrow().packets.len(), 4);
}

#[test]
fn test_directive_chain() {
    let ws = Workspace::new();
    let input = ws.touch("sine.f32");
    let output = ws.path("out.mka");
    let registry = FixtureRegistry::new().with_input(&input, sine_input(10));
    let config = TranscoderConfig::default();

    let mut builder = FilterGraphBuilder::new(&registry, &config);
    builder.load_source(&input).unwrap();
    for directive in ["decode=audio", "resample=s16", "encode=flac"] {
        builder.apply(directive.parse::<FilterDirective>().unwrap()).unwrap();
    }
    builder.load_sink(&output).unwrap();
    assert_eq!(builder.decisions().get(&0), Some(&TranscodeDecision::Copy));

    let mut graph = builder.build().unwrap();
    assert_eq!(graph.count_kind(NodeKind::Decoder), 1);
    // flac wants s16, which the explicit resampler already produces
    assert_eq!(graph.count_kind(NodeKind::AudioResample), 1);
    assert_eq!(graph.count_kind(NodeKind::Encoder), 1);
    graph.run().unwrap();

    let record = registry.output(&output).unwrap();
    let record = record.borrow();
    assert_eq!(
        record.streams[0].coding_parameters.coding_format,
        Some(CodingFormatId::Flac)
    );
    assert_eq!(record.packets.len(), 10);
    assert_eq!(record.packets[9].pts, Some(9 * SINE_PACKET_SAMPLES as i64));
}

#[test]
fn test_directive_errors() {
    let ws = Workspace::new();
    let input = ws.touch("sine.f32");
    let registry = FixtureRegistry::new().with_input(&input, sine_input(1));
    let config = TranscoderConfig::default();

    let mut builder = FilterGraphBuilder::new(&registry, &config);
    builder.load_source(&input).unwrap();
    // no video stream to decode
    let err = builder.apply(FilterDirective::Decode(Some(DataType::Video))).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Negotiation);
    let err = builder
        .insert_encoder(DataType::Audio, CodingFormatId::H264)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Negotiation);

    builder.apply(FilterDirective::Decode(None)).unwrap();
    let err = builder.insert_decoder(DataType::Audio).unwrap_err();
    assert!(matches!(err, TranscodeError::Negotiation(_)));
}

#[test]
fn test_video_decode_and_reencode() {
    let ws = Workspace::new();
    let input = ws.touch("movie.mkv");
    let output = ws.path("out.mkv");
    let registry = FixtureRegistry::new().with_input(&input, movie_input(3));
    let config = TranscoderConfig::default();

    let mut builder = FilterGraphBuilder::new(&registry, &config);
    builder.load_source(&input).unwrap();
    builder.apply(FilterDirective::Decode(Some(DataType::Video))).unwrap();
    builder.load_sink(&output).unwrap();
    assert_eq!(
        builder.decisions().get(&0),
        Some(&TranscodeDecision::Transcode(CodingFormatId::H264))
    );
    assert_eq!(builder.decisions().get(&1), Some(&TranscodeDecision::Copy));

    let mut graph = builder.build().unwrap();
    graph.run().unwrap();
    let record = registry.output(&output).unwrap();
    let record = record.borrow();
    assert_eq!(record.packets_for(0).len(), 3);
    let video = record.packets_for(1);
    assert_eq!(video.len(), 3);
    assert_eq!(
        video.iter().map(|p| p.pts).collect::<Vec<_>>(),
        vec![Some(0), Some(40), Some(80)]
    );
}

#[test]
fn test_stream_selection() {
    let ws = Workspace::new();
    let input = ws.touch("movie.mkv");
    let registry = FixtureRegistry::new().with_input(&input, movie_input(4));
    let config = TranscoderConfig::default();

    // second audio stream, no video
    let output = ws.path("pcm.mka");
    let mut builder = FilterGraphBuilder::new(&registry, &config);
    builder.load_source(&input).unwrap();
    builder.select_stream(2).unwrap();
    builder.deselect(DataType::Video).unwrap();
    builder.load_sink(&output).unwrap();
    assert!(builder.select_stream(1).is_err());
    assert!(builder.follow(2).is_err());

    let mut graph = builder.build().unwrap();
    graph.run().unwrap();
    let record = registry.output(&output).unwrap();
    let record = record.borrow();
    assert_eq!(record.streams.len(), 1);
    assert_eq!(
        record.streams[0].coding_parameters.coding_format,
        Some(CodingFormatId::PcmS16Le)
    );
    assert_eq!(record.packets.len(), 4);
    assert!(record.packets.iter().all(|p| p.len() == 128));
}

#[test]
fn test_termination_and_idempotent_exhaustion() {
    let ws = Workspace::new();
    let input = ws.touch("sine.f32");
    let output = ws.path("sine.wav");
    let registry = FixtureRegistry::new().with_input(&input, sine_input(3));
    let config = TranscoderConfig::default();

    let mut builder = FilterGraphBuilder::new(&registry, &config);
    let source = builder.load_source(&input).unwrap();
    let sink = builder.load_sink(&output).unwrap();
    let mut graph = builder.build().unwrap();
    let stats = graph.run().unwrap();
    assert!(stats.passes > 3);
    assert!(all_quiescent(&graph));

    let node = graph.downcast::<SourceNode>(source).unwrap();
    assert!(node.is_exhausted());
    assert_eq!(node.packets_read(), 3);
    let node = graph.downcast::<SinkNode>(sink).unwrap();
    assert!(node.is_finalized());
    assert_eq!(node.packets_written(), 3);
    // three packets plus the one read that reported end of input
    assert_eq!(registry.read_calls(&input), 4);

    // polling finished nodes again never reaches the demuxer or the muxer
    for _ in 0..3 {
        graph.process_node(source).unwrap();
        graph.process_node(sink).unwrap();
    }
    assert_eq!(registry.read_calls(&input), 4);
    assert_eq!(graph.downcast::<SourceNode>(source).unwrap().packets_read(), 3);
    assert_eq!(registry.output(&output).unwrap().borrow().packets.len(), 3);

    assert!(matches!(graph.run(), Err(TranscodeError::Graph(_))));
}

#[test]
fn test_copy_of_codec_without_named_id_keeps_native_parameters() {
    let ws = Workspace::new();
    let input = ws.touch("concert.mkv");
    let output = ws.path("copy.mka");

    let mut stream = audio_stream(DTS, AudioSampleFormat::new(6, SampleType::Float, true), 48000);
    let native = NativeParameters::new(String::from("dts core, 5.1"));
    stream.coding_parameters.native = Some(native.clone());
    let packets = (0..4)
        .map(|seq| {
            Packet::new(0, vec![seq as u8; 8])
                .with_pts(seq * 512, stream.time_scale)
                .with_duration(512)
        })
        .collect();
    let registry = FixtureRegistry::new().with_input(
        &input,
        FixtureInput {
            format: matroska(),
            streams: vec![stream],
            packets,
            probe: true,
        },
    );
    let config = TranscoderConfig::default();

    let mut builder = FilterGraphBuilder::new(&registry, &config);
    builder.load_source(&input).unwrap();
    builder.load_sink(&output).unwrap();
    assert_eq!(builder.decisions().get(&0), Some(&TranscodeDecision::Copy));
    let mut graph = builder.build().unwrap();
    assert_eq!(graph.count_kind(NodeKind::Decoder), 0);
    assert_eq!(graph.count_kind(NodeKind::Encoder), 0);
    graph.run().unwrap();

    let record = registry.output(&output).unwrap();
    let record = record.borrow();
    let params = &record.streams[0].coding_parameters;
    assert_eq!(params.coding_format, Some(DTS));
    assert_eq!(params.native, Some(native));
    assert_eq!(
        params.native.as_ref().and_then(|n| n.downcast_ref::<String>()).map(String::as_str),
        Some("dts core, 5.1")
    );
    assert_eq!(record.packets.len(), 4);
}

#[test]
fn test_empty_input_still_writes_header_and_trailer() {
    let ws = Workspace::new();
    let input = ws.touch("empty.f32");
    let output = ws.path("empty.wav");
    let registry = FixtureRegistry::new().with_input(&input, sine_input(0));
    let config = TranscoderConfig::default();

    let mut graph = build(&registry, &config, &input, &output).unwrap();
    graph.run().unwrap();
    let record = registry.output(&output).unwrap();
    let record = record.borrow();
    assert!(record.header_written);
    assert!(record.finalized);
    assert!(record.packets.is_empty());
}

#[test]
fn test_transcode_disabled() {
    let ws = Workspace::new();
    let input = ws.touch("sine.f32");
    let output = ws.path("sine.wav");
    let registry = FixtureRegistry::new().with_input(&input, sine_input(3));
    let mut config = TranscoderConfig::default();
    config.negotiation.allow_transcode = false;

    let err = build(&registry, &config, &input, &output).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Negotiation);
    assert!(!registry.output(&output).unwrap().borrow().header_written);

    // copy still works
    let output = ws.path("sine.mka");
    let mut graph = build(&registry, &config, &input, &output).unwrap();
    graph.run().unwrap();
    assert_eq!(registry.output(&output).unwrap().borrow().packets.len(), 3);
}

#[test]
fn test_failed_wiring_blocks_build() {
    let ws = Workspace::new();
    let input = ws.touch("sine.f32");
    let output = ws.path("sine.wav");
    let registry = FixtureRegistry::new().with_input(&input, sine_input(3));
    let mut config = TranscoderConfig::default();
    config.negotiation.allow_transcode = false;

    let mut builder = FilterGraphBuilder::new(&registry, &config);
    builder.load_source(&input).unwrap();
    assert!(builder.load_sink(&output).is_err());
    match builder.build() {
        Err(e) => assert_eq!(e.kind(), ErrorKind::Negotiation),
        Ok(_) => panic!("graph built after wiring failed"),
    }

    let record = registry.output(&output).unwrap();
    let record = record.borrow();
    assert!(!record.header_written);
    assert!(!record.finalized);
}

#[test]
fn test_codec_override() {
    let ws = Workspace::new();
    let input = ws.touch("sine.f32");
    let registry = FixtureRegistry::new().with_input(&input, sine_input(2));
    let mut config = TranscoderConfig::default();

    config.negotiation.audio_codec = Some("pcm_u8".to_string());
    let output = ws.path("u8.wav");
    let mut builder = FilterGraphBuilder::new(&registry, &config);
    builder.load_source(&input).unwrap();
    builder.load_sink(&output).unwrap();
    assert_eq!(
        builder.decisions().get(&0),
        Some(&TranscodeDecision::Transcode(CodingFormatId::PcmU8))
    );
    let mut graph = builder.build().unwrap();
    graph.run().unwrap();
    let record = registry.output(&output).unwrap();
    assert!(record
        .borrow()
        .packets
        .iter()
        .all(|p| p.len() == SINE_PACKET_SAMPLES));

    config.negotiation.audio_codec = Some("flac".to_string());
    let err = build(&registry, &config, &input, &ws.path("flac.wav")).unwrap_err();
    assert!(matches!(err, TranscodeError::Negotiation(_)));
}

#[test]
fn test_missing_coding_format_info() {
    let ws = Workspace::new();
    let input = ws.touch("sine.f32");
    let registry = FixtureRegistry::new()
        .with_input(&input, sine_input(2))
        .without_coding_format(CodingFormatId::PcmS16Le);
    let config = TranscoderConfig::default();

    let err = build(&registry, &config, &input, &ws.path("out.wav")).unwrap_err();
    assert!(matches!(err, TranscodeError::UnknownCodingFormat(_)));
    assert_eq!(err.kind(), ErrorKind::Negotiation);
}

#[test]
fn test_configuration_errors() {
    let ws = Workspace::new();
    let input = ws.touch("sine.f32");
    let stray = ws.touch("stray.wav");
    let registry = FixtureRegistry::new().with_input(&input, sine_input(1));
    let config = TranscoderConfig::default();

    let mut builder = FilterGraphBuilder::new(&registry, &config);
    let err = builder.load_sink(ws.path("early.wav")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    let err = builder.load_source(ws.path("missing.wav")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    // format found by extension but nothing can demux the file
    let err = builder.load_source(&stray).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);

    builder.load_source(&input).unwrap();
    assert!(builder.load_source(&input).is_err());
    let err = builder.load_sink(ws.path("out.xyz")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    let err = builder.load_sink(ws.path("noext")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);

    let err = FilterGraphBuilder::new(&registry, &config).build().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn test_extension_fallback() {
    let ws = Workspace::new();
    let input = ws.touch("raw.f32");
    let mut raw = sine_input(2);
    raw.probe = false;
    let registry = FixtureRegistry::new().with_input(&input, raw);

    let config = TranscoderConfig::default();
    let mut graph = build(&registry, &config, &input, &ws.path("out.mka")).unwrap();
    graph.run().unwrap();

    let mut config = TranscoderConfig::default();
    config.negotiation.allow_extension_fallback = false;
    let err = build(&registry, &config, &input, &ws.path("out2.mka")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn test_resample_directive_uses_stream_channels() {
    let ws = Workspace::new();
    let input = ws.touch("movie.mkv");
    let registry = FixtureRegistry::new().with_input(&input, movie_input(1));
    let config = TranscoderConfig::default();

    let mut builder = FilterGraphBuilder::new(&registry, &config);
    builder.load_source(&input).unwrap();
    builder
        .apply(FilterDirective::Resample(SampleSpec {
            sample_type: SampleType::S16,
            planar: true,
        }))
        .unwrap();

    let graph = builder.graph();
    let id = graph
        .node_ids()
        .find(|id| graph.kind(*id).ok() == Some(NodeKind::AudioResample))
        .unwrap();
    let target = graph.downcast::<AudioResampleNode>(id).unwrap().target();
    assert_eq!(target.channels, 2);
    assert!(target.planar);
    assert_eq!(builder.follow(1).unwrap().node, id);
    let frontier = graph.output_format(id, 0).unwrap();
    assert!(!frontier.packets);
    assert_eq!(frontier.parameters.audio.sample_format, Some(target));
    // the packets had to be decoded first
    assert_eq!(graph.count_kind(NodeKind::Decoder), 1);
}
