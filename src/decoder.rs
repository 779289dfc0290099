//! The decoding primitive behind the fast path.
//!
//! [`FrameDecoder`] mirrors the platform decoder at its interface boundary:
//! configure once, feed compressed samples in decode order, receive decoded
//! frames asynchronously through a [`FrameSink`], flush, close, and expose a
//! pending-decode count for backpressure. The production implementation is
//! [`FfmpegDecoder`], which prefers a hardware device context when the
//! configuration asks for one and falls back to software silently.
//!
//! Decoded frames are release-tracked: every [`DecodedFrame`] registers with
//! its decoder's [`FrameLedger`] on creation and on drop, so an extraction
//! run can verify that obtain and release counts balance.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use ffmpeg_next::{
    codec::context::Context as CodecContext,
    decoder::Video as VideoDecoder,
    format::Pixel,
    frame::Video as VideoFrame,
    software::scaling::{Context as ScalingContext, Flags as ScalingFlags},
};
use ffmpeg_sys_next::{
    AV_CODEC_HW_CONFIG_METHOD_HW_DEVICE_CTX, AV_INPUT_BUFFER_PADDING_SIZE, AVBufferRef,
    AVCodecContext, AVCodecHWConfig, AVHWDeviceType,
};

use crate::codec::CodecFamily;
use crate::error::FramesiftError;
use crate::ffmpeg::ensure_initialized;
use crate::mp4::CompressedSample;

/// Hardware-acceleration preference for decoder configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HardwareAcceleration {
    /// Let the implementation decide.
    #[default]
    NoPreference,
    /// Use a hardware device when one is available, software otherwise.
    PreferHardware,
    /// Decode in software even when hardware is available.
    PreferSoftware,
}

/// Everything a decoder needs before the first compressed sample.
///
/// Built once from container metadata, passed to
/// [`FrameDecoder::configure`] exactly once per extraction attempt.
/// Reconfiguration is not supported — a configuration error is fatal to the
/// fast path for that attempt.
#[derive(Debug, Clone)]
pub struct DecoderConfiguration {
    /// Codec identifier string (e.g. `"avc1.64001f"`, `"vp09"`).
    pub codec: String,
    /// Coded width in pixels.
    pub coded_width: u32,
    /// Coded height in pixels.
    pub coded_height: u32,
    /// Out-of-band codec configuration (e.g. AVC parameter sets), when the
    /// codec family mandates one.
    pub description: Option<Vec<u8>>,
    /// Hardware-acceleration preference.
    pub hardware_acceleration: HardwareAcceleration,
}

/// Obtain/release accounting for decoded frames.
///
/// Every frame a decoder emits must be released exactly once, whether it was
/// sampled or discarded — unreleased frames are unbounded native memory on a
/// real platform. The ledger makes the invariant checkable.
#[derive(Debug, Default)]
pub struct FrameLedger {
    obtained: AtomicUsize,
    released: AtomicUsize,
}

impl FrameLedger {
    /// Number of frames handed out.
    pub fn obtained(&self) -> usize {
        self.obtained.load(Ordering::Acquire)
    }

    /// Number of frames released.
    pub fn released(&self) -> usize {
        self.released.load(Ordering::Acquire)
    }

    /// Whether every obtained frame has been released.
    pub fn balanced(&self) -> bool {
        self.obtained() == self.released()
    }

    fn record_obtain(&self) {
        self.obtained.fetch_add(1, Ordering::AcqRel);
    }

    fn record_release(&self) {
        self.released.fetch_add(1, Ordering::AcqRel);
    }
}

/// A decoded video frame: presentation timestamp, coded dimensions, and
/// packed RGB24 pixels.
///
/// Transient — consume it (or call [`release`](DecodedFrame::release))
/// promptly. Release is recorded on drop, so every frame is released exactly
/// once no matter which pipeline stage ends up owning it.
#[derive(Debug)]
pub struct DecodedFrame {
    pts: i64,
    width: u32,
    height: u32,
    data: Vec<u8>,
    ledger: Option<Arc<FrameLedger>>,
}

impl DecodedFrame {
    /// Create an untracked frame (tests, synthetic pipelines).
    pub fn new(pts_micros: i64, width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            pts: pts_micros,
            width,
            height,
            data,
            ledger: None,
        }
    }

    /// Create a frame registered against a ledger.
    pub fn tracked(
        pts_micros: i64,
        width: u32,
        height: u32,
        data: Vec<u8>,
        ledger: Arc<FrameLedger>,
    ) -> Self {
        ledger.record_obtain();
        Self {
            pts: pts_micros,
            width,
            height,
            data,
            ledger: Some(ledger),
        }
    }

    /// Presentation timestamp in microseconds.
    pub fn pts_micros(&self) -> i64 {
        self.pts
    }

    /// Coded width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Coded height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Packed RGB24 pixel data.
    pub fn pixel_data(&self) -> &[u8] {
        &self.data
    }

    /// Consume the frame, taking its pixel buffer. The release is still
    /// recorded.
    pub fn take_pixels(mut self) -> Vec<u8> {
        std::mem::take(&mut self.data)
    }

    /// Release the frame without reading it.
    pub fn release(self) {}
}

impl Drop for DecodedFrame {
    fn drop(&mut self) {
        if let Some(ledger) = &self.ledger {
            ledger.record_release();
        }
    }
}

/// Receiver for decoded frames.
///
/// Invoked synchronously from within [`FrameDecoder::decode`] /
/// [`FrameDecoder::drain_ready`] / [`FrameDecoder::flush`]. The sink takes
/// ownership of each frame and is responsible for releasing it.
pub trait FrameSink {
    /// Handle one decoded frame. Returning an error aborts the decode call.
    fn on_frame(&mut self, frame: DecodedFrame) -> Result<(), FramesiftError>;
}

/// The platform decoding primitive, at its interface boundary.
///
/// Implementations must deliver frames in presentation order for a single
/// stream fed in decode order, and must treat any decode failure as fatal —
/// decoder state after an error is not reliably resumable.
pub trait FrameDecoder {
    /// Configure the decoder. Exactly once; a second call is an error.
    fn configure(&mut self, config: &DecoderConfiguration) -> Result<(), FramesiftError>;

    /// Submit one compressed sample. Ready frames may be delivered to the
    /// sink before this returns, or buffered until a later call.
    fn decode(
        &mut self,
        sample: CompressedSample,
        sink: &mut dyn FrameSink,
    ) -> Result<(), FramesiftError>;

    /// Deliver decoded frames that are ready without submitting new input.
    /// Returns how many frames were delivered; zero means the decoder needs
    /// more input to make progress.
    fn drain_ready(&mut self, sink: &mut dyn FrameSink) -> Result<usize, FramesiftError>;

    /// Drain all in-flight decodes. The extraction attempt is complete only
    /// after flush returns successfully.
    fn flush(&mut self, sink: &mut dyn FrameSink) -> Result<(), FramesiftError>;

    /// Release decoder resources. Further calls are errors.
    fn close(&mut self);

    /// Number of submitted samples not yet delivered as frames.
    fn pending(&self) -> usize;

    /// The ledger tracking this decoder's frames.
    fn ledger(&self) -> Arc<FrameLedger>;
}

/// Hardware device types a hardware-preferring decoder may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareDevice {
    /// NVIDIA CUDA (Linux, Windows).
    Cuda,
    /// Video Acceleration API (Linux).
    Vaapi,
    /// DirectX Video Acceleration 2 (Windows).
    Dxva2,
    /// Direct3D 11 Video Acceleration (Windows).
    D3d11va,
    /// Apple VideoToolbox (macOS, iOS).
    VideoToolbox,
    /// Intel Quick Sync Video (cross-platform).
    Qsv,
}

/// List the hardware device types supported by the FFmpeg build.
pub fn available_hardware_devices() -> Vec<HardwareDevice> {
    if ensure_initialized().is_err() {
        return Vec::new();
    }

    let mut devices = Vec::new();
    let mut device_type = AVHWDeviceType::AV_HWDEVICE_TYPE_NONE;

    loop {
        device_type = unsafe { ffmpeg_sys_next::av_hwdevice_iterate_types(device_type) };
        if device_type == AVHWDeviceType::AV_HWDEVICE_TYPE_NONE {
            break;
        }

        let mapped = match device_type {
            AVHWDeviceType::AV_HWDEVICE_TYPE_CUDA => Some(HardwareDevice::Cuda),
            AVHWDeviceType::AV_HWDEVICE_TYPE_VAAPI => Some(HardwareDevice::Vaapi),
            AVHWDeviceType::AV_HWDEVICE_TYPE_DXVA2 => Some(HardwareDevice::Dxva2),
            AVHWDeviceType::AV_HWDEVICE_TYPE_D3D11VA => Some(HardwareDevice::D3d11va),
            AVHWDeviceType::AV_HWDEVICE_TYPE_VIDEOTOOLBOX => Some(HardwareDevice::VideoToolbox),
            AVHWDeviceType::AV_HWDEVICE_TYPE_QSV => Some(HardwareDevice::Qsv),
            _ => None,
        };

        if let Some(device) = mapped {
            devices.push(device);
        }
    }

    devices
}

/// FFmpeg-backed [`FrameDecoder`].
///
/// Configured from a codec identifier plus out-of-band extradata, so it
/// decodes demuxed samples directly — no container context. When the
/// configuration prefers hardware, a hardware device context is attached and
/// decoded surfaces are transferred back to system memory; if no suitable
/// device exists the decoder runs in software without reporting an error.
pub struct FfmpegDecoder {
    decoder: Option<VideoDecoder>,
    scaler: Option<ScalingContext>,
    scaler_key: (Pixel, u32, u32),
    hardware_active: bool,
    sent: usize,
    received: usize,
    ledger: Arc<FrameLedger>,
}

impl FfmpegDecoder {
    /// Create an unconfigured decoder.
    pub fn new() -> Self {
        Self {
            decoder: None,
            scaler: None,
            scaler_key: (Pixel::None, 0, 0),
            hardware_active: false,
            sent: 0,
            received: 0,
            ledger: Arc::new(FrameLedger::default()),
        }
    }

    /// Whether the FFmpeg build carries a decoder for this codec family.
    pub fn supports(family: CodecFamily) -> bool {
        if ensure_initialized().is_err() {
            return false;
        }
        family
            .ffmpeg_name()
            .and_then(ffmpeg_next::decoder::find_by_name)
            .is_some()
    }

    /// Whether the active configuration ended up on a hardware device.
    pub fn hardware_active(&self) -> bool {
        self.hardware_active
    }

    /// Receive at most one frame from the decoder and hand it to the sink.
    /// Returns `true` if a frame was delivered.
    fn receive_one(&mut self, sink: &mut dyn FrameSink) -> Result<bool, FramesiftError> {
        let Some(decoder) = self.decoder.as_mut() else {
            return Ok(false);
        };

        let mut frame = VideoFrame::empty();
        if decoder.receive_frame(&mut frame).is_err() {
            // Needs more input, or the stream has ended.
            return Ok(false);
        }

        let frame = if self.hardware_active {
            transfer_hardware_frame(&frame).unwrap_or(frame)
        } else {
            frame
        };

        let decoded = self.rasterize(&frame)?;
        self.received += 1;
        sink.on_frame(decoded)?;
        Ok(true)
    }

    /// Convert a decoded frame to packed RGB24 at its coded size.
    fn rasterize(&mut self, frame: &VideoFrame) -> Result<DecodedFrame, FramesiftError> {
        let (format, width, height) = (frame.format(), frame.width(), frame.height());

        if self.scaler.is_none() || self.scaler_key != (format, width, height) {
            self.scaler = Some(
                ScalingContext::get(
                    format,
                    width,
                    height,
                    Pixel::RGB24,
                    width,
                    height,
                    ScalingFlags::BILINEAR,
                )
                .map_err(|error| {
                    FramesiftError::Decode(format!("failed to create pixel converter: {error}"))
                })?,
            );
            self.scaler_key = (format, width, height);
        }

        let mut rgb_frame = VideoFrame::empty();
        self.scaler
            .as_mut()
            .unwrap()
            .run(frame, &mut rgb_frame)
            .map_err(|error| {
                FramesiftError::Decode(format!("pixel conversion failed: {error}"))
            })?;

        let data = packed_rgb_buffer(&rgb_frame, width, height);
        Ok(DecodedFrame::tracked(
            frame.pts().unwrap_or(0),
            width,
            height,
            data,
            Arc::clone(&self.ledger),
        ))
    }
}

impl Default for FfmpegDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder for FfmpegDecoder {
    fn configure(&mut self, config: &DecoderConfiguration) -> Result<(), FramesiftError> {
        ensure_initialized()?;

        if self.decoder.is_some() {
            return Err(FramesiftError::Configuration(
                "decoder is already configured; reconfiguration is not supported".to_string(),
            ));
        }

        let family = CodecFamily::classify(&config.codec);
        let name = family.ffmpeg_name().ok_or_else(|| {
            FramesiftError::Configuration(format!("unsupported codec '{}'", config.codec))
        })?;
        let codec = ffmpeg_next::decoder::find_by_name(name).ok_or_else(|| {
            FramesiftError::UnsupportedPlatform(format!(
                "this FFmpeg build has no '{name}' decoder"
            ))
        })?;

        if family.requires_description() && config.description.is_none() {
            return Err(FramesiftError::Configuration(format!(
                "codec '{}' cannot be configured without out-of-band parameter sets",
                config.codec
            )));
        }

        let mut context = CodecContext::new_with_codec(codec);

        unsafe {
            let pointer = context.as_mut_ptr();
            (*pointer).width = config.coded_width as i32;
            (*pointer).height = config.coded_height as i32;

            // The description becomes codec extradata. FFmpeg requires the
            // buffer to be allocated with its own allocator and padded.
            if let Some(description) = &config.description {
                let padded = description.len() + AV_INPUT_BUFFER_PADDING_SIZE as usize;
                let buffer = ffmpeg_sys_next::av_mallocz(padded) as *mut u8;
                if buffer.is_null() {
                    return Err(FramesiftError::Configuration(
                        "failed to allocate codec extradata".to_string(),
                    ));
                }
                std::ptr::copy_nonoverlapping(description.as_ptr(), buffer, description.len());
                (*pointer).extradata = buffer;
                (*pointer).extradata_size = description.len() as i32;
            }
        }

        if config.hardware_acceleration == HardwareAcceleration::PreferHardware {
            self.hardware_active = attach_hardware_device(&mut context);
            if self.hardware_active {
                log::debug!("decoder configured with a hardware device context");
            } else {
                log::debug!("no usable hardware device; decoding in software");
            }
        }

        let decoder = context.decoder().video().map_err(|error| {
            FramesiftError::Configuration(format!(
                "failed to open '{name}' decoder: {error}"
            ))
        })?;

        self.decoder = Some(decoder);
        Ok(())
    }

    fn decode(
        &mut self,
        sample: CompressedSample,
        sink: &mut dyn FrameSink,
    ) -> Result<(), FramesiftError> {
        if self.decoder.is_none() {
            return Err(FramesiftError::Decode(
                "decode called before configure".to_string(),
            ));
        }

        let mut packet = ffmpeg_next::Packet::copy(&sample.data);
        packet.set_pts(Some(sample.pts_micros()));
        packet.set_dts(Some(sample.dts_micros()));
        if sample.is_sync {
            packet.set_flags(ffmpeg_next::codec::packet::Flags::KEY);
        }

        loop {
            let outcome = self.decoder.as_mut().unwrap().send_packet(&packet);
            match outcome {
                Ok(()) => break,
                Err(error) => {
                    // The decoder may refuse input until output is drained;
                    // if nothing can be drained the sample genuinely failed.
                    if !self.receive_one(sink)? {
                        return Err(FramesiftError::Decode(error.to_string()));
                    }
                }
            }
        }

        self.sent += 1;
        Ok(())
    }

    fn drain_ready(&mut self, sink: &mut dyn FrameSink) -> Result<usize, FramesiftError> {
        let mut delivered = 0;
        while self.receive_one(sink)? {
            delivered += 1;
        }
        Ok(delivered)
    }

    fn flush(&mut self, sink: &mut dyn FrameSink) -> Result<(), FramesiftError> {
        let Some(decoder) = self.decoder.as_mut() else {
            return Ok(());
        };

        decoder
            .send_eof()
            .map_err(|error| FramesiftError::Decode(format!("flush failed: {error}")))?;
        while self.receive_one(sink)? {}
        Ok(())
    }

    fn close(&mut self) {
        self.decoder = None;
        self.scaler = None;
    }

    fn pending(&self) -> usize {
        self.sent.saturating_sub(self.received)
    }

    fn ledger(&self) -> Arc<FrameLedger> {
        Arc::clone(&self.ledger)
    }
}

/// Copy pixel data from an RGB24 frame into a tightly-packed buffer.
///
/// FFmpeg frames frequently carry per-row padding (stride > width × 3); the
/// padding is stripped so the result can go straight into an image buffer.
pub(crate) fn packed_rgb_buffer(frame: &VideoFrame, width: u32, height: u32) -> Vec<u8> {
    let stride = frame.stride(0);
    let row_len = (width as usize) * 3;
    let data = frame.data(0);

    if stride == row_len {
        data[..row_len * (height as usize)].to_vec()
    } else {
        let mut buffer = Vec::with_capacity(row_len * (height as usize));
        for row in 0..(height as usize) {
            let start = row * stride;
            buffer.extend_from_slice(&data[start..start + row_len]);
        }
        buffer
    }
}

/// Attach the best available hardware device context to a codec context.
///
/// Returns `true` on success. Every failure mode falls back to software.
fn attach_hardware_device(context: &mut CodecContext) -> bool {
    let Some(device_type) = best_hardware_device_for_codec(context) else {
        return false;
    };

    let mut device_context: *mut AVBufferRef = std::ptr::null_mut();
    let created = unsafe {
        ffmpeg_sys_next::av_hwdevice_ctx_create(
            &mut device_context,
            device_type,
            std::ptr::null(),
            std::ptr::null_mut(),
            0,
        )
    };
    if created < 0 {
        return false;
    }

    unsafe {
        let pointer = context.as_mut_ptr() as *mut AVCodecContext;
        (*pointer).hw_device_ctx = ffmpeg_sys_next::av_buffer_ref(device_context);

        // The codec context now holds its own reference.
        let mut our_reference = device_context;
        ffmpeg_sys_next::av_buffer_unref(&mut our_reference);
    }

    true
}

/// Find the first hardware device type the codec supports through a device
/// context.
fn best_hardware_device_for_codec(context: &CodecContext) -> Option<AVHWDeviceType> {
    let codec_pointer = unsafe { (*context.as_ptr()).codec };
    if codec_pointer.is_null() {
        return None;
    }

    let mut index: i32 = 0;
    loop {
        let config: *const AVCodecHWConfig =
            unsafe { ffmpeg_sys_next::avcodec_get_hw_config(codec_pointer, index) };
        if config.is_null() {
            return None;
        }

        let methods = unsafe { (*config).methods };
        if methods & (AV_CODEC_HW_CONFIG_METHOD_HW_DEVICE_CTX as i32) != 0 {
            let device_type = unsafe { (*config).device_type };
            if device_type != AVHWDeviceType::AV_HWDEVICE_TYPE_NONE {
                return Some(device_type);
            }
        }

        index += 1;
    }
}

/// Transfer a hardware surface to system memory.
///
/// Returns an error when the frame is already in system memory; callers keep
/// the original frame in that case.
fn transfer_hardware_frame(hardware_frame: &VideoFrame) -> Result<VideoFrame, FramesiftError> {
    let mut software_frame = VideoFrame::empty();

    let result = unsafe {
        ffmpeg_sys_next::av_hwframe_transfer_data(
            software_frame.as_mut_ptr(),
            hardware_frame.as_ptr(),
            0,
        )
    };

    if result < 0 {
        return Err(FramesiftError::Decode(
            "hardware frame transfer failed".to_string(),
        ));
    }

    unsafe {
        (*software_frame.as_mut_ptr()).pts = (*hardware_frame.as_ptr()).pts;
    }
    Ok(software_frame)
}
