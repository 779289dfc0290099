//! Codec classification and decoder-configuration extraction tests.

mod common;

use common::{Mp4Spec, build_mp4, sample_avcc_payload};
use framesift::{
    CodecFamily, FramesiftError, HardwareAcceleration, Mp4Parser, normalize_description,
    parse_avc_config,
};

// ── Family classification ──────────────────────────────────────────

#[test]
fn sample_entry_codes_classify() {
    assert_eq!(CodecFamily::classify("avc1"), CodecFamily::Avc);
    assert_eq!(CodecFamily::classify("avc3"), CodecFamily::Avc);
    assert_eq!(CodecFamily::classify("avc1.64001f"), CodecFamily::Avc);
    assert_eq!(CodecFamily::classify("hvc1"), CodecFamily::Hevc);
    assert_eq!(CodecFamily::classify("hev1.1.6.L93.B0"), CodecFamily::Hevc);
    assert_eq!(CodecFamily::classify("vp09"), CodecFamily::Vp9);
    assert_eq!(CodecFamily::classify("av01"), CodecFamily::Av1);
    assert_eq!(CodecFamily::classify("mp4v"), CodecFamily::Unsupported);
    assert_eq!(CodecFamily::classify(""), CodecFamily::Unsupported);
}

#[test]
fn ffmpeg_names_classify_too() {
    assert_eq!(CodecFamily::classify("h264"), CodecFamily::Avc);
    assert_eq!(CodecFamily::classify("hevc"), CodecFamily::Hevc);
    assert_eq!(CodecFamily::classify("vp9"), CodecFamily::Vp9);
    assert_eq!(CodecFamily::classify("av1"), CodecFamily::Av1);
}

#[test]
fn description_requirements_follow_the_family() {
    assert!(CodecFamily::Avc.requires_description());
    assert!(CodecFamily::Hevc.requires_description());
    assert!(!CodecFamily::Vp9.requires_description());
    assert!(!CodecFamily::Av1.requires_description());
}

// ── AVC configuration record ───────────────────────────────────────

#[test]
fn avc_record_parses_parameter_sets() {
    let record = parse_avc_config(&sample_avcc_payload()).unwrap();
    assert_eq!(record.profile_indication, 0x64);
    assert_eq!(record.level_indication, 0x1f);
    assert_eq!(record.sps, vec![vec![0x67, 0x42]]);
    assert_eq!(record.pps, vec![vec![0x68]]);
    assert_eq!(record.codec_string(), "avc1.64001f");
}

#[test]
fn wrong_version_byte_is_a_configuration_error() {
    let mut payload = sample_avcc_payload();
    payload[0] = 2;
    assert!(matches!(
        parse_avc_config(&payload),
        Err(FramesiftError::Configuration(_))
    ));
}

#[test]
fn truncated_record_is_a_configuration_error() {
    let payload = sample_avcc_payload();
    assert!(matches!(
        parse_avc_config(&payload[..7]),
        Err(FramesiftError::Configuration(_))
    ));
}

// ── Description normalization ──────────────────────────────────────

#[test]
fn raw_payloads_pass_through_unchanged() {
    let payload = sample_avcc_payload();
    assert_eq!(normalize_description(&payload, "avcC"), payload);
}

#[test]
fn a_reserialized_box_header_is_stripped() {
    // A structured record serialized back with its box header re-added.
    let payload = sample_avcc_payload();
    let mut boxed = Vec::new();
    boxed.extend_from_slice(&((payload.len() as u32 + 8).to_be_bytes()));
    boxed.extend_from_slice(b"avcC");
    boxed.extend_from_slice(&payload);

    assert_eq!(normalize_description(&boxed, "avcC"), payload);
}

#[test]
fn lookalike_payloads_are_not_mangled() {
    // Starts with bytes that resemble a header but the size doesn't match
    // the buffer: treat as raw.
    let mut payload = vec![0, 0, 0, 99];
    payload.extend_from_slice(b"avcC");
    payload.extend_from_slice(&[1, 2, 3]);
    assert_eq!(normalize_description(&payload, "avcC"), payload);
}

// ── Extraction from parsed tracks ──────────────────────────────────

fn parse_track(spec: &Mp4Spec) -> framesift::TrackInfo {
    let bytes = build_mp4(spec);
    let mut parser = Mp4Parser::new();
    parser.append(&bytes, 0).unwrap();
    parser.info().unwrap().video_track().unwrap().clone()
}

#[test]
fn avc_tracks_yield_a_hardware_preferring_configuration() {
    let track = parse_track(&Mp4Spec {
        samples: vec![(vec![0u8; 8], 100)],
        ..Mp4Spec::default()
    });

    let config = framesift::extract_decoder_configuration(&track).unwrap();
    assert_eq!(config.codec, "avc1.64001f");
    assert_eq!(config.coded_width, 8);
    assert_eq!(config.coded_height, 8);
    assert_eq!(config.description.as_deref(), Some(&sample_avcc_payload()[..]));
    assert_eq!(
        config.hardware_acceleration,
        HardwareAcceleration::PreferHardware
    );
}

// The configuration failure happens here, before a
// single sample could reach a decoder.
#[test]
fn missing_parameter_sets_fail_configuration() {
    let track = parse_track(&Mp4Spec {
        samples: vec![(vec![0u8; 8], 100)],
        avcc: None,
        ..Mp4Spec::default()
    });

    assert!(matches!(
        framesift::extract_decoder_configuration(&track),
        Err(FramesiftError::Configuration(_))
    ));
}

#[test]
fn unsupported_codecs_fail_configuration() {
    let mut track = parse_track(&Mp4Spec {
        samples: vec![(vec![0u8; 8], 100)],
        ..Mp4Spec::default()
    });
    track.codec = Some("mp4v".to_string());

    assert!(matches!(
        framesift::extract_decoder_configuration(&track),
        Err(FramesiftError::Configuration(_))
    ));
}
