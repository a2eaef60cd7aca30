/// Camera capture module
///
/// This module defines the seam between the workflow and the platform
/// camera:
/// - The `MediaCapture` provider hands out exclusive live streams
/// - A `CameraStream` yields RGBA frames until it is stopped
/// - `encode_jpeg` turns a frame into compressed bytes for the workflow
///
/// The OpenCV-backed implementation lives in device.rs behind the
/// `camera` cargo feature.

use image::codecs::jpeg::JpegEncoder;
use thiserror::Error;

#[cfg(feature = "camera")]
pub mod device;

/// JPEG quality for committed camera frames
const CAPTURE_JPEG_QUALITY: u8 = 90;

/// Errors from the camera provider or an open stream
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The platform refused access to the camera
    #[error("Camera permission was denied. Check your system privacy settings.")]
    PermissionDenied,

    /// No usable camera device was found (or the backend is compiled out)
    #[error("No camera device is available.")]
    NoDevice,

    /// The stream was used after it had been stopped
    #[error("The camera stream is no longer open.")]
    StreamClosed,

    /// Any other backend failure, kept as text for display
    #[error("Camera error: {0}")]
    Backend(String),

    /// A captured frame could not be compressed
    #[error("Failed to encode the captured frame: {0}")]
    Encode(String),
}

/// Requested stream parameters; the backend may deliver a near match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConstraints {
    pub width: u32,
    pub height: u32,
}

impl Default for StreamConstraints {
    fn default() -> Self {
        StreamConstraints {
            width: 1280,
            height: 720,
        }
    }
}

/// One decoded video frame, tightly packed RGBA
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraFrame {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// A live, exclusive camera stream.
///
/// `stop` must be idempotent: every workflow exit path calls it, and
/// concrete implementations also call it from `Drop` so a leaked handle
/// cannot keep the device's camera indicator lit.
pub trait CameraStream {
    /// Read the most recent frame from the device
    fn read_frame(&mut self) -> Result<CameraFrame, CaptureError>;

    /// Stop all tracks and release the device. Safe to call twice.
    fn stop(&mut self);
}

/// The platform facility that grants camera streams.
///
/// At most one stream is live at a time; acquiring is the caller's
/// signal that it owns the device until it stops the stream.
pub trait MediaCapture {
    fn acquire(
        &mut self,
        constraints: &StreamConstraints,
    ) -> Result<Box<dyn CameraStream>, CaptureError>;
}

/// Provider used when the crate is built without the `camera` feature.
/// Every acquisition reports that no device is available, which the UI
/// surfaces as a normal camera error.
pub struct DisabledCamera;

impl MediaCapture for DisabledCamera {
    fn acquire(
        &mut self,
        _constraints: &StreamConstraints,
    ) -> Result<Box<dyn CameraStream>, CaptureError> {
        Err(CaptureError::NoDevice)
    }
}

/// Build the default provider for this build configuration
pub fn default_provider() -> Box<dyn MediaCapture> {
    #[cfg(feature = "camera")]
    {
        Box::new(device::OpenCvCamera::default())
    }
    #[cfg(not(feature = "camera"))]
    {
        Box::new(DisabledCamera)
    }
}

/// Compress a camera frame to JPEG bytes for storage as a source image
pub fn encode_jpeg(frame: &CameraFrame) -> Result<Vec<u8>, CaptureError> {
    let rgba = image::RgbaImage::from_raw(frame.width, frame.height, frame.rgba.clone())
        .ok_or_else(|| CaptureError::Encode("frame buffer does not match dimensions".into()))?;

    // JPEG has no alpha channel, flatten first
    let rgb = image::DynamicImage::ImageRgba8(rgba).to_rgb8();

    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, CAPTURE_JPEG_QUALITY)
        .encode_image(&rgb)
        .map_err(|e| CaptureError::Encode(e.to_string()))?;

    Ok(bytes)
}
