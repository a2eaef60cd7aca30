/// OpenCV camera backend
///
/// Opens the default video device through `videoio::VideoCapture` and
/// converts the BGR frames OpenCV delivers into the RGBA layout the rest
/// of the application expects.

use opencv::{
    core::Mat,
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture},
};

use super::{CameraFrame, CameraStream, CaptureError, MediaCapture, StreamConstraints};

/// Provider backed by the system's default capture device
pub struct OpenCvCamera {
    device_index: i32,
}

impl Default for OpenCvCamera {
    fn default() -> Self {
        OpenCvCamera { device_index: 0 }
    }
}

impl OpenCvCamera {
    pub fn new(device_index: i32) -> Self {
        OpenCvCamera { device_index }
    }
}

impl MediaCapture for OpenCvCamera {
    fn acquire(
        &mut self,
        constraints: &StreamConstraints,
    ) -> Result<Box<dyn CameraStream>, CaptureError> {
        let mut cap = VideoCapture::new(self.device_index, videoio::CAP_ANY)
            .map_err(|e| CaptureError::Backend(e.to_string()))?;

        let opened = cap
            .is_opened()
            .map_err(|e| CaptureError::Backend(e.to_string()))?;
        if !opened {
            return Err(CaptureError::NoDevice);
        }

        // Best effort, the device may clamp these
        let _ = cap.set(videoio::CAP_PROP_FRAME_WIDTH, constraints.width as f64);
        let _ = cap.set(videoio::CAP_PROP_FRAME_HEIGHT, constraints.height as f64);

        log::info!(
            "camera stream opened on device {} ({}x{} requested)",
            self.device_index,
            constraints.width,
            constraints.height
        );

        Ok(Box::new(OpenCvStream { cap: Some(cap) }))
    }
}

/// An open capture handle. `cap` is None once the stream is stopped.
struct OpenCvStream {
    cap: Option<VideoCapture>,
}

impl CameraStream for OpenCvStream {
    fn read_frame(&mut self) -> Result<CameraFrame, CaptureError> {
        let cap = self.cap.as_mut().ok_or(CaptureError::StreamClosed)?;

        let mut frame = Mat::default();
        let got = cap
            .read(&mut frame)
            .map_err(|e| CaptureError::Backend(e.to_string()))?;
        if !got || frame.empty() {
            return Err(CaptureError::Backend("camera returned no frame".into()));
        }

        // OpenCV delivers BGR, the UI and the JPEG encoder want RGBA
        let mut rgba = Mat::default();
        imgproc::cvt_color(&frame, &mut rgba, imgproc::COLOR_BGR2RGBA, 0)
            .map_err(|e| CaptureError::Backend(e.to_string()))?;

        let width = rgba.cols() as u32;
        let height = rgba.rows() as u32;
        let bytes = rgba
            .data_bytes()
            .map_err(|e| CaptureError::Backend(e.to_string()))?
            .to_vec();

        Ok(CameraFrame {
            width,
            height,
            rgba: bytes,
        })
    }

    fn stop(&mut self) {
        if let Some(mut cap) = self.cap.take() {
            if let Err(e) = cap.release() {
                log::warn!("failed to release camera cleanly: {}", e);
            } else {
                log::info!("camera stream released");
            }
        }
    }
}

impl Drop for OpenCvStream {
    fn drop(&mut self) {
        self.stop();
    }
}
