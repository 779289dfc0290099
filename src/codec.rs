//! Codec classification and decoder-configuration extraction.
//!
//! All the structural reach-through into sample-description data lives here:
//! [`extract_decoder_configuration`] is the single place that knows which
//! codec families need out-of-band parameter sets and how to normalize the
//! payload the container hands back.

use crate::decoder::{DecoderConfiguration, HardwareAcceleration};
use crate::error::FramesiftError;
use crate::mp4::TrackInfo;

/// Codec family of a video track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecFamily {
    /// H.264 / AVC (`avc1`, `avc3`).
    Avc,
    /// H.265 / HEVC (`hvc1`, `hev1`).
    Hevc,
    /// VP9 (`vp09`).
    Vp9,
    /// AV1 (`av01`).
    Av1,
    /// Anything else — not decodable on the fast path.
    Unsupported,
}

impl CodecFamily {
    /// Classify a codec identifier string.
    ///
    /// Accepts both sample-entry four-character codes (with or without a
    /// profile suffix, e.g. `"avc1.64001f"`) and FFmpeg codec names
    /// (`"h264"`, `"hevc"`, ...).
    pub fn classify(identifier: &str) -> Self {
        let prefix = identifier
            .split('.')
            .next()
            .unwrap_or(identifier)
            .to_ascii_lowercase();
        match prefix.as_str() {
            "avc1" | "avc3" | "h264" => CodecFamily::Avc,
            "hvc1" | "hev1" | "hevc" | "h265" => CodecFamily::Hevc,
            "vp09" | "vp9" => CodecFamily::Vp9,
            "av01" | "av1" => CodecFamily::Av1,
            _ => CodecFamily::Unsupported,
        }
    }

    /// Whether this family cannot decode anything without out-of-band
    /// parameter sets.
    pub fn requires_description(&self) -> bool {
        matches!(self, CodecFamily::Avc | CodecFamily::Hevc)
    }

    /// The FFmpeg decoder name for this family.
    pub fn ffmpeg_name(&self) -> Option<&'static str> {
        match self {
            CodecFamily::Avc => Some("h264"),
            CodecFamily::Hevc => Some("hevc"),
            CodecFamily::Vp9 => Some("vp9"),
            CodecFamily::Av1 => Some("av1"),
            CodecFamily::Unsupported => None,
        }
    }
}

/// AVCDecoderConfigurationRecord, as carried in the `avcC` box
/// (ISO/IEC 14496-15).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvcConfigRecord {
    /// AVC profile indication.
    pub profile_indication: u8,
    /// Profile compatibility flags.
    pub profile_compatibility: u8,
    /// AVC level indication.
    pub level_indication: u8,
    /// Sequence parameter sets.
    pub sps: Vec<Vec<u8>>,
    /// Picture parameter sets.
    pub pps: Vec<Vec<u8>>,
}

impl AvcConfigRecord {
    /// The RFC 6381 codec string for this record (e.g. `"avc1.64001f"`).
    pub fn codec_string(&self) -> String {
        format!(
            "avc1.{:02x}{:02x}{:02x}",
            self.profile_indication, self.profile_compatibility, self.level_indication
        )
    }
}

/// Parse an AVCDecoderConfigurationRecord.
///
/// # Errors
///
/// Returns [`FramesiftError::Configuration`] for a record with the wrong
/// version byte or truncated parameter sets — an unparseable record is as
/// fatal to the fast path as a missing one.
pub fn parse_avc_config(data: &[u8]) -> Result<AvcConfigRecord, FramesiftError> {
    let short = || {
        FramesiftError::Configuration("truncated AVC decoder configuration record".to_string())
    };

    if data.len() < 6 {
        return Err(short());
    }
    if data[0] != 1 {
        return Err(FramesiftError::Configuration(format!(
            "unsupported AVC configuration version {}",
            data[0]
        )));
    }

    let profile = data[1];
    let compatibility = data[2];
    let level = data[3];
    let mut pos = 5usize;

    let sps_count = (data[pos] & 0x1f) as usize;
    pos += 1;
    let mut sps = Vec::with_capacity(sps_count);
    for _ in 0..sps_count {
        if pos + 2 > data.len() {
            return Err(short());
        }
        let len = u16::from_be_bytes([data[pos], data[pos + 1]]) as usize;
        pos += 2;
        if pos + len > data.len() {
            return Err(short());
        }
        sps.push(data[pos..pos + len].to_vec());
        pos += len;
    }

    if pos >= data.len() {
        return Err(short());
    }
    let pps_count = data[pos] as usize;
    pos += 1;
    let mut pps = Vec::with_capacity(pps_count);
    for _ in 0..pps_count {
        if pos + 2 > data.len() {
            return Err(short());
        }
        let len = u16::from_be_bytes([data[pos], data[pos + 1]]) as usize;
        pos += 2;
        if pos + len > data.len() {
            return Err(short());
        }
        pps.push(data[pos..pos + len].to_vec());
        pos += len;
    }

    Ok(AvcConfigRecord {
        profile_indication: profile,
        profile_compatibility: compatibility,
        level_indication: level,
        sps,
        pps,
    })
}

/// Strip a re-added box header from a configuration payload.
///
/// Container libraries expose codec configuration either as the raw record
/// bytes or as a structured object whose serialization re-adds the 8-byte
/// `size + type` box header. Both forms arrive here; the header is detected
/// by matching the declared size against the buffer length and the type code
/// against `expected_kind`.
pub fn normalize_description(payload: &[u8], expected_kind: &str) -> Vec<u8> {
    if payload.len() >= 8 {
        let declared = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
        if declared as usize == payload.len() && &payload[4..8] == expected_kind.as_bytes() {
            return payload[8..].to_vec();
        }
    }
    payload.to_vec()
}

/// Build the decoder configuration for a video track.
///
/// Reads the track's codec identifier, extracts and normalizes the
/// out-of-band configuration payload for families that mandate one, and
/// returns a configuration preferring hardware decoding.
///
/// # Errors
///
/// Returns [`FramesiftError::Configuration`] when the codec family is
/// unsupported, or when a mandatory description is missing or unparseable.
/// Both cases must fail **before** any sample reaches the decoder —
/// attempting to decode AVC/HEVC without parameter sets reliably fails with
/// a key-frame-required error deep in the stream.
pub fn extract_decoder_configuration(
    track: &TrackInfo,
) -> Result<DecoderConfiguration, FramesiftError> {
    let identifier = track.codec.as_deref().unwrap_or("");
    let family = CodecFamily::classify(identifier);

    if family == CodecFamily::Unsupported {
        return Err(FramesiftError::Configuration(format!(
            "unsupported codec '{identifier}'"
        )));
    }

    let description = match &track.codec_config {
        Some(config) => Some(normalize_description(&config.payload, &config.kind)),
        None => None,
    };

    if family.requires_description() && description.is_none() {
        return Err(FramesiftError::Configuration(format!(
            "codec '{identifier}' requires out-of-band parameter sets but the track carries none"
        )));
    }

    // For AVC, validate the record and derive the full codec string.
    let codec = if family == CodecFamily::Avc {
        let record = parse_avc_config(description.as_deref().unwrap_or(&[]))?;
        if record.sps.is_empty() {
            return Err(FramesiftError::Configuration(
                "AVC configuration carries no sequence parameter sets".to_string(),
            ));
        }
        record.codec_string()
    } else {
        identifier.to_string()
    };

    Ok(DecoderConfiguration {
        codec,
        coded_width: track.width,
        coded_height: track.height,
        description,
        hardware_acceleration: HardwareAcceleration::PreferHardware,
    })
}
