//! Incremental container parser tests against synthetic MP4 byte streams.

mod common;

use common::{Mp4Spec, build_mp4, build_uniform_mp4, mp4_box};
use framesift::{FramesiftError, Mp4Parser, TrackKind};

// ── Readiness and metadata ─────────────────────────────────────────

#[test]
fn metadata_is_ready_after_the_movie_box() {
    let bytes = build_uniform_mp4(30, 3000, 100);
    let mut parser = Mp4Parser::new();
    parser.append(&bytes, 0).unwrap();

    let info = parser.info().expect("metadata should be ready");
    assert_eq!(info.major_brand.as_deref(), Some("isom"));
    assert_eq!(info.timescale, 3000);
    assert_eq!(info.tracks.len(), 1);

    let track = info.video_track().expect("video track");
    assert_eq!(track.id, 1);
    assert_eq!(track.kind, TrackKind::Video);
    assert_eq!(track.timescale, 3000);
    assert_eq!(track.duration, 3000);
    assert_eq!(track.sample_count, 30);
    assert_eq!(track.width, 8);
    assert_eq!(track.height, 8);
    assert_eq!(track.codec.as_deref(), Some("avc1"));
    assert!(track.codec_config.is_some());
    assert_eq!(track.codec_config.as_ref().unwrap().kind, "avcC");
}

#[test]
fn metadata_survives_tiny_incremental_appends() {
    let bytes = build_uniform_mp4(10, 3000, 100);
    let mut parser = Mp4Parser::new();

    // Drip-feed 7 bytes at a time; readiness must arrive at the same point.
    let mut offset = 0u64;
    for chunk in bytes.chunks(7) {
        parser.append(chunk, offset).unwrap();
        offset += chunk.len() as u64;
    }

    let info = parser.info().expect("metadata should be ready");
    assert_eq!(info.video_track().unwrap().sample_count, 10);
}

// ── Demuxing ───────────────────────────────────────────────────────

#[test]
fn samples_are_demuxed_in_decode_order_with_timing() {
    let bytes = build_uniform_mp4(30, 3000, 100);
    let mut parser = Mp4Parser::new();
    parser.append(&bytes, 0).unwrap();

    parser.start_extraction(1, 8).unwrap();

    let mut all = Vec::new();
    while let Some(batch) = parser.next_batch().unwrap() {
        assert!(batch.len() <= 8, "batch exceeds the requested size");
        all.extend(batch);
    }

    assert_eq!(all.len(), 30);
    for (index, sample) in all.iter().enumerate() {
        assert_eq!(sample.track_id, 1);
        assert_eq!(sample.pts, index as i64 * 100);
        assert_eq!(sample.duration, 100);
        assert_eq!(sample.timescale, 3000);
        assert_eq!(sample.data, vec![index as u8; 16]);
        // stss listed only sample 1 as sync.
        assert_eq!(sample.is_sync, index == 0);
    }

    // pts conversion: 100/3000 s = 33333us per step.
    assert_eq!(all[3].pts_micros(), 100_000);
}

#[test]
fn missing_sync_table_marks_every_sample_sync() {
    let samples = (0..4).map(|i| (vec![i as u8; 4], 100)).collect();
    let bytes = build_mp4(&Mp4Spec {
        samples,
        sync_samples: None,
        ..Mp4Spec::default()
    });

    let mut parser = Mp4Parser::new();
    parser.append(&bytes, 0).unwrap();
    parser.start_extraction(1, 10).unwrap();

    let batch = parser.next_batch().unwrap().unwrap();
    assert!(batch.iter().all(|sample| sample.is_sync));
}

#[test]
fn batches_stall_until_payload_bytes_arrive() {
    let bytes = build_uniform_mp4(6, 3000, 100);
    let mut parser = Mp4Parser::new();

    // Append everything except the last 40 bytes of mdat.
    let cut = bytes.len() - 40;
    parser.append(&bytes[..cut], 0).unwrap();
    parser.start_extraction(1, 100).unwrap();

    // Some samples are available, the rest stall.
    let first = parser.next_batch().unwrap().unwrap();
    assert!(first.len() < 6, "the cut must hold back some samples");

    let second = parser.next_batch().unwrap().unwrap();
    assert!(second.is_empty(), "no bytes arrived, nothing to demux");

    parser.append(&bytes[cut..], cut as u64).unwrap();
    let mut rest = Vec::new();
    while let Some(batch) = parser.next_batch().unwrap() {
        rest.extend(batch);
    }
    assert_eq!(first.len() + rest.len(), 6);
}

// ── Error handling ─────────────────────────────────────────────────

#[test]
fn garbage_bytes_fail_with_a_parse_error() {
    let mut parser = Mp4Parser::new();
    let error = parser.append(&[0u8; 64], 0).unwrap_err();
    assert!(matches!(error, FramesiftError::Parse(_)));
    assert!(parser.info().is_none(), "no metadata after a parse error");
}

#[test]
fn a_failed_parser_rejects_further_use() {
    let mut parser = Mp4Parser::new();
    assert!(parser.append(&[0u8; 64], 0).is_err());
    assert!(parser.append(b"more", 64).is_err());
    assert!(parser.next_batch().is_err());
}

#[test]
fn non_contiguous_appends_are_rejected() {
    let bytes = build_uniform_mp4(4, 3000, 100);
    let mut parser = Mp4Parser::new();
    parser.append(&bytes[..100], 0).unwrap();

    let error = parser.append(&bytes[200..300], 200).unwrap_err();
    assert!(matches!(error, FramesiftError::Parse(_)));
}

#[test]
fn a_movie_box_without_tracks_is_unparseable() {
    let mut bytes = mp4_box(b"ftyp", b"isom\0\0\0\0isom");
    bytes.extend_from_slice(&mp4_box(b"moov", &[]));

    let mut parser = Mp4Parser::new();
    assert!(matches!(
        parser.append(&bytes, 0),
        Err(FramesiftError::Parse(_))
    ));
}

#[test]
fn extraction_before_readiness_is_an_invalid_state() {
    let mut parser = Mp4Parser::new();
    assert!(matches!(
        parser.start_extraction(1, 10),
        Err(FramesiftError::InvalidState(_))
    ));
    assert!(matches!(
        parser.next_batch(),
        Err(FramesiftError::InvalidState(_))
    ));
}

#[test]
fn unknown_track_ids_are_rejected() {
    let bytes = build_uniform_mp4(4, 3000, 100);
    let mut parser = Mp4Parser::new();
    parser.append(&bytes, 0).unwrap();

    assert!(matches!(
        parser.start_extraction(99, 10),
        Err(FramesiftError::InvalidState(_))
    ));
}

// ── Stop ───────────────────────────────────────────────────────────

#[test]
fn stop_releases_the_parser() {
    let bytes = build_uniform_mp4(4, 3000, 100);
    let mut parser = Mp4Parser::new();
    parser.append(&bytes, 0).unwrap();
    parser.start_extraction(1, 10).unwrap();

    parser.stop();
    assert!(parser.append(b"zzzz", bytes.len() as u64).is_err());
    assert!(parser.next_batch().is_err());
    // Metadata extracted before the stop stays readable.
    assert!(parser.info().is_some());
}
