/// The photo workflow controller
///
/// This is the heart of the application: a tagged state machine that
/// coordinates the camera, file uploads, the prompt and the remote
/// generation call into one visible mode at a time. Each variant carries
/// only the data that is valid for it, so illegal combinations (a live
/// stream next to a finished result, a result while a request is in
/// flight) cannot be represented at all.

use thiserror::Error;

use crate::capture::{
    encode_jpeg, CameraFrame, CameraStream, CaptureError, MediaCapture, StreamConstraints,
};
use crate::state::image::{GeneratedImage, SourceImage, CAPTURED_FRAME_MIME};

/// Validation failures raised at the generation trigger.
/// These never change state and never reach the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("Add a photo before generating.")]
    MissingImage,

    #[error("Describe the scene you want before generating.")]
    MissingPrompt,

    #[error("Capture or close the camera before generating.")]
    CameraActive,

    #[error("A generation is already in progress.")]
    GenerationInFlight,
}

/// Lightweight tag for the current state, for the UI and for tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Capturing,
    Ready,
    Generating,
    Complete,
    Failed,
}

/// Everything the generation service needs for one request.
/// `seq` ties an eventual response back to the attempt that started it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub seq: u64,
    pub payload_base64: String,
    pub mime_type: String,
    pub prompt: String,
}

/// The workflow states. `prior` on `Capturing` keeps the previously
/// committed photo around so cancelling a recapture loses nothing.
pub enum WorkflowState {
    Idle,
    Capturing {
        stream: Box<dyn CameraStream>,
        prior: Option<SourceImage>,
    },
    Ready {
        source: SourceImage,
    },
    Generating {
        source: SourceImage,
        seq: u64,
    },
    Complete {
        source: SourceImage,
        generated: GeneratedImage,
    },
    Failed {
        source: SourceImage,
    },
}

impl std::fmt::Debug for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.phase())
    }
}

impl WorkflowState {
    pub fn phase(&self) -> Phase {
        match self {
            WorkflowState::Idle => Phase::Idle,
            WorkflowState::Capturing { .. } => Phase::Capturing,
            WorkflowState::Ready { .. } => Phase::Ready,
            WorkflowState::Generating { .. } => Phase::Generating,
            WorkflowState::Complete { .. } => Phase::Complete,
            WorkflowState::Failed { .. } => Phase::Failed,
        }
    }

    /// The committed photo, whichever state currently holds it
    pub fn source_image(&self) -> Option<&SourceImage> {
        match self {
            WorkflowState::Idle => None,
            WorkflowState::Capturing { prior, .. } => prior.as_ref(),
            WorkflowState::Ready { source }
            | WorkflowState::Generating { source, .. }
            | WorkflowState::Complete { source, .. }
            | WorkflowState::Failed { source } => Some(source),
        }
    }

    pub fn generated_image(&self) -> Option<&GeneratedImage> {
        match self {
            WorkflowState::Complete { generated, .. } => Some(generated),
            _ => None,
        }
    }
}

/// Owns the camera provider and the current state, and exposes every
/// transition as a method. All camera exit paths stop the stream here,
/// never in the UI layer.
pub struct Workflow {
    provider: Box<dyn MediaCapture>,
    constraints: StreamConstraints,
    state: WorkflowState,
    next_seq: u64,
}

impl Workflow {
    pub fn new(provider: Box<dyn MediaCapture>) -> Self {
        Workflow {
            provider,
            constraints: StreamConstraints::default(),
            state: WorkflowState::Idle,
            next_seq: 0,
        }
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    pub fn source_image(&self) -> Option<&SourceImage> {
        self.state.source_image()
    }

    pub fn generated_image(&self) -> Option<&GeneratedImage> {
        self.state.generated_image()
    }

    pub fn camera_active(&self) -> bool {
        matches!(self.state, WorkflowState::Capturing { .. })
    }

    /// Acquire a camera stream and enter `Capturing`.
    ///
    /// A no-op when already capturing. On failure the current state is
    /// untouched and the error is surfaced for display; there is no
    /// automatic retry.
    pub fn start_camera(&mut self) -> Result<(), CaptureError> {
        if self.camera_active() {
            return Ok(());
        }

        // Acquire before touching state so a denial leaves us exactly
        // where we were.
        let stream = self.provider.acquire(&self.constraints)?;

        let prior = match std::mem::replace(&mut self.state, WorkflowState::Idle) {
            WorkflowState::Ready { source }
            | WorkflowState::Generating { source, .. }
            | WorkflowState::Complete { source, .. }
            | WorkflowState::Failed { source } => Some(source),
            _ => None,
        };

        self.state = WorkflowState::Capturing { stream, prior };
        Ok(())
    }

    /// Pull the latest frame for the live preview. Only valid while
    /// capturing.
    pub fn read_preview_frame(&mut self) -> Result<CameraFrame, CaptureError> {
        match &mut self.state {
            WorkflowState::Capturing { stream, .. } => stream.read_frame(),
            _ => Err(CaptureError::StreamClosed),
        }
    }

    /// Commit the current frame as the source image and release the
    /// camera. The release happens on the failure path too: a stream
    /// must never outlive this call.
    pub fn capture_frame(&mut self) -> Result<(), CaptureError> {
        match std::mem::replace(&mut self.state, WorkflowState::Idle) {
            WorkflowState::Capturing { mut stream, prior } => {
                let committed = stream
                    .read_frame()
                    .and_then(|frame| encode_jpeg(&frame));
                stream.stop();
                drop(stream);

                match committed {
                    Ok(bytes) => {
                        self.state = WorkflowState::Ready {
                            source: SourceImage::from_bytes(&bytes, CAPTURED_FRAME_MIME),
                        };
                        log::info!("frame captured and committed as source image");
                        Ok(())
                    }
                    Err(e) => {
                        // The capture failed but the previous photo, if
                        // any, is still good.
                        self.state = match prior {
                            Some(source) => WorkflowState::Ready { source },
                            None => WorkflowState::Idle,
                        };
                        Err(e)
                    }
                }
            }
            other => {
                self.state = other;
                Err(CaptureError::StreamClosed)
            }
        }
    }

    /// Leave `Capturing` without committing a frame, restoring whatever
    /// photo was live before the camera started. No-op otherwise.
    pub fn cancel_capture(&mut self) {
        match std::mem::replace(&mut self.state, WorkflowState::Idle) {
            WorkflowState::Capturing { mut stream, prior } => {
                stream.stop();
                self.state = match prior {
                    Some(source) => WorkflowState::Ready { source },
                    None => WorkflowState::Idle,
                };
            }
            other => self.state = other,
        }
    }

    /// Commit an uploaded file as the source image. Releases the camera
    /// first if it is open and discards any earlier generation result.
    pub fn set_file(&mut self, bytes: &[u8], mime_type: impl Into<String>) {
        if let WorkflowState::Capturing { mut stream, .. } =
            std::mem::replace(&mut self.state, WorkflowState::Idle)
        {
            stream.stop();
        }
        self.state = WorkflowState::Ready {
            source: SourceImage::from_bytes(bytes, mime_type),
        };
    }

    /// Validate the precondition and enter `Generating`.
    ///
    /// Returns the request to dispatch. Exactly one request may be in
    /// flight: further calls are rejected until the outcome lands. A
    /// rejected call changes nothing and makes no network traffic.
    pub fn begin_generation(&mut self, prompt: &str) -> Result<GenerationRequest, WorkflowError> {
        if matches!(self.state, WorkflowState::Generating { .. }) {
            return Err(WorkflowError::GenerationInFlight);
        }

        // A live camera means no committed photo yet; the prior image is
        // only held for restoring a cancelled recapture. Generating from
        // here would also sidestep the explicit stream release.
        if matches!(self.state, WorkflowState::Capturing { .. }) {
            return Err(WorkflowError::CameraActive);
        }

        let source = match self.state.source_image() {
            Some(source) => source.clone(),
            None => return Err(WorkflowError::MissingImage),
        };

        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(WorkflowError::MissingPrompt);
        }

        let seq = self.next_seq;
        self.next_seq += 1;

        let request = GenerationRequest {
            seq,
            payload_base64: source.payload_base64.clone(),
            mime_type: source.mime_type.clone(),
            prompt: prompt.to_string(),
        };

        self.state = WorkflowState::Generating { source, seq };
        Ok(request)
    }

    /// Apply a successful generation outcome. Returns false when the
    /// outcome is stale (the user reset or replaced the attempt while
    /// the request was in flight) and was ignored.
    pub fn complete_generation(&mut self, seq: u64, generated: GeneratedImage) -> bool {
        if !self.is_active_attempt(seq) {
            log::debug!("ignoring stale generation result (seq {})", seq);
            return false;
        }
        if let WorkflowState::Generating { source, .. } =
            std::mem::replace(&mut self.state, WorkflowState::Idle)
        {
            self.state = WorkflowState::Complete { source, generated };
        }
        true
    }

    /// Apply a failed generation outcome. The source image is retained
    /// so the user can retry without recapturing. Returns false for a
    /// stale outcome.
    pub fn fail_generation(&mut self, seq: u64) -> bool {
        if !self.is_active_attempt(seq) {
            log::debug!("ignoring stale generation failure (seq {})", seq);
            return false;
        }
        if let WorkflowState::Generating { source, .. } =
            std::mem::replace(&mut self.state, WorkflowState::Idle)
        {
            self.state = WorkflowState::Failed { source };
        }
        true
    }

    fn is_active_attempt(&self, seq: u64) -> bool {
        matches!(&self.state, WorkflowState::Generating { seq: active, .. } if *active == seq)
    }

    /// Unconditional reset to `Idle`. Releases the camera if it is open.
    /// This transition has no failure mode.
    pub fn start_over(&mut self) {
        if let WorkflowState::Capturing { mut stream, .. } =
            std::mem::replace(&mut self.state, WorkflowState::Idle)
        {
            stream.stop();
        }
        self.state = WorkflowState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Scripted stream that records whether it was stopped
    struct FakeStream {
        stopped: Arc<AtomicBool>,
        frame: Option<CameraFrame>,
    }

    impl CameraStream for FakeStream {
        fn read_frame(&mut self) -> Result<CameraFrame, CaptureError> {
            if self.stopped.load(Ordering::SeqCst) {
                return Err(CaptureError::StreamClosed);
            }
            self.frame
                .clone()
                .ok_or_else(|| CaptureError::Backend("no frame scripted".into()))
        }

        fn stop(&mut self) {
            self.stopped.store(true, Ordering::SeqCst);
        }
    }

    struct FakeCamera {
        deny: bool,
        frame: Option<CameraFrame>,
        stopped: Arc<AtomicBool>,
        acquires: Arc<AtomicUsize>,
    }

    impl MediaCapture for FakeCamera {
        fn acquire(
            &mut self,
            _constraints: &StreamConstraints,
        ) -> Result<Box<dyn CameraStream>, CaptureError> {
            if self.deny {
                return Err(CaptureError::PermissionDenied);
            }
            self.acquires.fetch_add(1, Ordering::SeqCst);
            self.stopped.store(false, Ordering::SeqCst);
            Ok(Box::new(FakeStream {
                stopped: self.stopped.clone(),
                frame: self.frame.clone(),
            }))
        }
    }

    fn test_frame() -> CameraFrame {
        CameraFrame {
            width: 4,
            height: 4,
            rgba: vec![128; 4 * 4 * 4],
        }
    }

    /// (workflow, stream-stopped flag, acquire counter)
    fn workflow_with_camera(
        deny: bool,
        frame: Option<CameraFrame>,
    ) -> (Workflow, Arc<AtomicBool>, Arc<AtomicUsize>) {
        let stopped = Arc::new(AtomicBool::new(true));
        let acquires = Arc::new(AtomicUsize::new(0));
        let workflow = Workflow::new(Box::new(FakeCamera {
            deny,
            frame,
            stopped: stopped.clone(),
            acquires: acquires.clone(),
        }));
        (workflow, stopped, acquires)
    }

    #[test]
    fn test_camera_denied_stays_idle() {
        let (mut workflow, _, _) = workflow_with_camera(true, None);

        let err = workflow.start_camera().unwrap_err();
        assert!(matches!(err, CaptureError::PermissionDenied));
        assert_eq!(workflow.phase(), Phase::Idle);
        assert!(!workflow.camera_active());
    }

    #[test]
    fn test_start_camera_while_capturing_is_noop() {
        let (mut workflow, _, acquires) = workflow_with_camera(false, Some(test_frame()));
        workflow.set_file(b"photo", "image/png");
        let committed = workflow.source_image().cloned();

        workflow.start_camera().unwrap();
        workflow.start_camera().unwrap();
        assert_eq!(acquires.load(Ordering::SeqCst), 1);

        // The committed photo survives entering and leaving capture
        workflow.cancel_capture();
        assert_eq!(workflow.phase(), Phase::Ready);
        assert_eq!(workflow.source_image().cloned(), committed);
    }

    #[test]
    fn test_capture_frame_commits_jpeg_and_releases_camera() {
        let (mut workflow, stopped, _) = workflow_with_camera(false, Some(test_frame()));

        workflow.start_camera().unwrap();
        assert!(!stopped.load(Ordering::SeqCst));

        workflow.capture_frame().unwrap();
        assert!(stopped.load(Ordering::SeqCst));
        assert_eq!(workflow.phase(), Phase::Ready);

        let source = workflow.source_image().unwrap();
        assert_eq!(source.mime_type, "image/jpeg");
        let bytes = source.decode().unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_failed_capture_still_releases_camera() {
        // Stream scripted to fail every read
        let (mut workflow, stopped, _) = workflow_with_camera(false, None);
        workflow.set_file(b"previous", "image/png");

        workflow.start_camera().unwrap();
        let err = workflow.capture_frame().unwrap_err();
        assert!(matches!(err, CaptureError::Backend(_)));

        // Camera released and the earlier photo restored
        assert!(stopped.load(Ordering::SeqCst));
        assert_eq!(workflow.phase(), Phase::Ready);
        assert_eq!(
            workflow.source_image().unwrap().payload_base64,
            SourceImage::from_bytes(b"previous", "image/png").payload_base64
        );
    }

    #[test]
    fn test_capture_frame_outside_capturing_is_rejected() {
        let (mut workflow, _, _) = workflow_with_camera(false, Some(test_frame()));
        assert!(matches!(
            workflow.capture_frame(),
            Err(CaptureError::StreamClosed)
        ));
        assert_eq!(workflow.phase(), Phase::Idle);
    }

    #[test]
    fn test_generate_with_empty_prompt_is_validation_error() {
        let (mut workflow, _, _) = workflow_with_camera(false, None);
        workflow.set_file(b"photo", "image/png");

        let err = workflow.begin_generation("   ").unwrap_err();
        assert_eq!(err, WorkflowError::MissingPrompt);
        assert_eq!(workflow.phase(), Phase::Ready);
    }

    #[test]
    fn test_generate_while_camera_is_live_is_rejected() {
        let (mut workflow, stopped, _) = workflow_with_camera(false, Some(test_frame()));
        workflow.set_file(b"photo", "image/png");
        workflow.start_camera().unwrap();

        let err = workflow.begin_generation("1920s jazz club").unwrap_err();
        assert_eq!(err, WorkflowError::CameraActive);

        // Still capturing, stream untouched
        assert_eq!(workflow.phase(), Phase::Capturing);
        assert!(!stopped.load(Ordering::SeqCst));

        // The retained photo is still there once the camera closes
        workflow.cancel_capture();
        assert_eq!(workflow.phase(), Phase::Ready);
        assert!(workflow.begin_generation("1920s jazz club").is_ok());
    }

    #[test]
    fn test_stream_stop_is_idempotent() {
        let stopped = Arc::new(AtomicBool::new(false));
        let mut stream = FakeStream {
            stopped: stopped.clone(),
            frame: Some(test_frame()),
        };

        assert!(stream.read_frame().is_ok());

        stream.stop();
        stream.stop();
        assert!(stopped.load(Ordering::SeqCst));
        assert!(matches!(
            stream.read_frame(),
            Err(CaptureError::StreamClosed)
        ));
    }

    #[test]
    fn test_generate_without_image_is_validation_error() {
        let (mut workflow, _, _) = workflow_with_camera(false, None);

        let err = workflow.begin_generation("1920s jazz club").unwrap_err();
        assert_eq!(err, WorkflowError::MissingImage);
        assert_eq!(workflow.phase(), Phase::Idle);
    }

    #[test]
    fn test_successful_generation_flow() {
        let (mut workflow, _, _) = workflow_with_camera(false, None);
        workflow.set_file(b"\x89PNG\r\n", "image/png");

        let request = workflow.begin_generation("1920s jazz club").unwrap();
        assert_eq!(workflow.phase(), Phase::Generating);
        assert_eq!(request.mime_type, "image/png");
        assert_eq!(request.prompt, "1920s jazz club");

        let applied =
            workflow.complete_generation(request.seq, GeneratedImage::from_base64("iVBORw0KGgo="));
        assert!(applied);
        assert_eq!(workflow.phase(), Phase::Complete);
        assert!(workflow
            .generated_image()
            .unwrap()
            .data_url()
            .starts_with("data:image/png;base64,"));
    }

    #[test]
    fn test_failed_generation_retains_source() {
        let (mut workflow, _, _) = workflow_with_camera(false, None);
        workflow.set_file(b"photo", "image/png");
        let before = workflow.source_image().cloned();

        let request = workflow.begin_generation("ancient rome").unwrap();
        assert!(workflow.fail_generation(request.seq));

        assert_eq!(workflow.phase(), Phase::Failed);
        assert_eq!(workflow.source_image().cloned(), before);
        assert!(workflow.generated_image().is_none());
    }

    #[test]
    fn test_second_generate_while_in_flight_is_rejected() {
        let (mut workflow, _, _) = workflow_with_camera(false, None);
        workflow.set_file(b"photo", "image/png");

        workflow.begin_generation("victorian london").unwrap();
        let err = workflow.begin_generation("victorian london").unwrap_err();
        assert_eq!(err, WorkflowError::GenerationInFlight);
        assert_eq!(workflow.phase(), Phase::Generating);
    }

    #[test]
    fn test_retry_after_failure_without_recapturing() {
        let (mut workflow, _, _) = workflow_with_camera(false, None);
        workflow.set_file(b"photo", "image/png");

        let first = workflow.begin_generation("wild west").unwrap();
        workflow.fail_generation(first.seq);

        // Same photo, new attempt
        let second = workflow.begin_generation("wild west").unwrap();
        assert_eq!(second.payload_base64, first.payload_base64);
        assert_eq!(workflow.phase(), Phase::Generating);
    }

    #[test]
    fn test_new_file_clears_previous_result() {
        let (mut workflow, _, _) = workflow_with_camera(false, None);
        workflow.set_file(b"first", "image/png");
        let request = workflow.begin_generation("renaissance florence").unwrap();
        workflow.complete_generation(request.seq, GeneratedImage::from_base64("iVBORw0KGgo="));
        assert!(workflow.generated_image().is_some());

        workflow.set_file(b"second", "image/jpeg");
        assert_eq!(workflow.phase(), Phase::Ready);
        assert!(workflow.generated_image().is_none());
        assert_eq!(workflow.source_image().unwrap().mime_type, "image/jpeg");
    }

    #[test]
    fn test_set_file_while_capturing_releases_camera() {
        let (mut workflow, stopped, _) = workflow_with_camera(false, Some(test_frame()));
        workflow.start_camera().unwrap();

        workflow.set_file(b"upload", "image/png");
        assert!(stopped.load(Ordering::SeqCst));
        assert_eq!(workflow.phase(), Phase::Ready);
    }

    #[test]
    fn test_start_over_from_any_state() {
        // From Capturing: camera released
        let (mut workflow, stopped, _) = workflow_with_camera(false, Some(test_frame()));
        workflow.start_camera().unwrap();
        workflow.start_over();
        assert!(stopped.load(Ordering::SeqCst));
        assert_eq!(workflow.phase(), Phase::Idle);
        assert!(workflow.source_image().is_none());

        // From Complete: everything cleared
        workflow.set_file(b"photo", "image/png");
        let request = workflow.begin_generation("prohibition era").unwrap();
        workflow.complete_generation(request.seq, GeneratedImage::from_base64("iVBORw0KGgo="));
        workflow.start_over();
        assert_eq!(workflow.phase(), Phase::Idle);
        assert!(workflow.source_image().is_none());
        assert!(workflow.generated_image().is_none());

        // From Failed
        workflow.set_file(b"photo", "image/png");
        let request = workflow.begin_generation("gold rush").unwrap();
        workflow.fail_generation(request.seq);
        workflow.start_over();
        assert_eq!(workflow.phase(), Phase::Idle);
    }

    #[test]
    fn test_stale_completion_after_start_over_is_ignored() {
        let (mut workflow, _, _) = workflow_with_camera(false, None);
        workflow.set_file(b"photo", "image/png");
        let request = workflow.begin_generation("silent film set").unwrap();

        workflow.start_over();
        let applied =
            workflow.complete_generation(request.seq, GeneratedImage::from_base64("iVBORw0KGgo="));
        assert!(!applied);
        assert_eq!(workflow.phase(), Phase::Idle);
    }

    #[test]
    fn test_stale_outcome_cannot_finish_a_newer_attempt() {
        let (mut workflow, _, _) = workflow_with_camera(false, None);
        workflow.set_file(b"photo", "image/png");
        let first = workflow.begin_generation("first attempt").unwrap();

        workflow.start_over();
        workflow.set_file(b"photo", "image/png");
        let second = workflow.begin_generation("second attempt").unwrap();
        assert_ne!(first.seq, second.seq);

        // The abandoned request resolves late and must not apply
        assert!(!workflow.fail_generation(first.seq));
        assert_eq!(workflow.phase(), Phase::Generating);

        assert!(workflow
            .complete_generation(second.seq, GeneratedImage::from_base64("iVBORw0KGgo=")));
        assert_eq!(workflow.phase(), Phase::Complete);
    }
}
