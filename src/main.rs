use iced::widget::image::Handle;
use iced::widget::{column, container, text};
use iced::{time, Alignment, Element, Length, Subscription, Task, Theme};
use rfd::FileDialog;
use std::path::PathBuf;
use std::time::Duration;

mod capture;
mod service;
mod state;
mod ui;

use service::{GenerationClient, ServiceConfig};
use state::image::GeneratedImage;
use state::workflow::{GenerationRequest, Workflow};

/// Generic text shown for any generation failure; the detailed cause
/// goes to the log, not the user
const GENERATION_FAILED_TEXT: &str = "Image generation failed. Please try again.";

/// How often the live camera preview is refreshed
const PREVIEW_FRAME_INTERVAL: Duration = Duration::from_millis(100);

/// Main application state
struct PastLens {
    /// The capture-to-generation state machine
    workflow: Workflow,
    /// Service client, None when no API key is configured
    client: Option<GenerationClient>,
    /// The user's scene description (independent of the photo lifecycle)
    prompt: String,
    /// User-visible error text, if any
    error: Option<String>,
    /// Status message to display to the user
    status: String,
    /// Latest live camera frame, decoded for display
    preview: Option<Handle>,
    /// Committed source photo, decoded for display
    source_handle: Option<Handle>,
    /// Generated scene, decoded for display
    generated_handle: Option<Handle>,
}

/// Application messages (events)
#[derive(Debug, Clone)]
pub enum Message {
    /// User clicked "Start Camera"
    StartCamera,
    /// User clicked "Capture Photo" while the camera is live
    CaptureFrame,
    /// User clicked "Cancel" while the camera is live
    CancelCapture,
    /// Time to refresh the live camera preview
    PreviewTick,
    /// User clicked "Upload Photo"
    PickFile,
    /// Background file load finished (bytes + MIME type, or error text)
    FileLoaded(Result<(Vec<u8>, String), String>),
    /// The prompt field changed
    PromptChanged(String),
    /// User clicked "Generate"
    Generate,
    /// The generation request resolved (attempt seq, PNG or error text)
    GenerationFinished(u64, Result<GeneratedImage, String>),
    /// User clicked "Start Over"
    StartOver,
}

impl PastLens {
    /// Create a new instance of the application
    fn new() -> (Self, Task<Message>) {
        let workflow = Workflow::new(capture::default_provider());

        let (client, status) = match ServiceConfig::from_env() {
            Some(config) => match GenerationClient::new(config) {
                Ok(client) => (Some(client), "Ready.".to_string()),
                Err(e) => {
                    log::error!("could not build generation client: {}", e);
                    (None, "Generation service unavailable.".to_string())
                }
            },
            None => {
                log::warn!("GEMINI_API_KEY is not set, generation is disabled");
                (
                    None,
                    "Set GEMINI_API_KEY to enable generation.".to_string(),
                )
            }
        };

        (
            PastLens {
                workflow,
                client,
                prompt: String::new(),
                error: None,
                status,
                preview: None,
                source_handle: None,
                generated_handle: None,
            },
            Task::none(),
        )
    }

    /// Handle application messages and update state
    fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::StartCamera => {
                match self.workflow.start_camera() {
                    Ok(()) => {
                        self.error = None;
                        self.status = "Camera live. Frame your shot and capture.".to_string();
                    }
                    Err(e) => {
                        log::warn!("camera start failed: {}", e);
                        self.error = Some(e.to_string());
                    }
                }
                Task::none()
            }

            Message::PreviewTick => {
                if let Ok(frame) = self.workflow.read_preview_frame() {
                    self.preview = Some(Handle::from_rgba(frame.width, frame.height, frame.rgba));
                }
                Task::none()
            }

            Message::CaptureFrame => {
                self.preview = None;
                match self.workflow.capture_frame() {
                    Ok(()) => {
                        self.error = None;
                        self.generated_handle = None;
                        self.status = "Photo captured. Describe the scene you want.".to_string();
                    }
                    Err(e) => {
                        log::warn!("frame capture failed: {}", e);
                        self.error = Some(e.to_string());
                    }
                }
                self.refresh_source_handle();
                Task::none()
            }

            Message::CancelCapture => {
                self.workflow.cancel_capture();
                self.preview = None;
                self.status = "Camera closed.".to_string();
                Task::none()
            }

            Message::PickFile => {
                // Native picker, image types only
                let file = FileDialog::new()
                    .set_title("Select a Photo")
                    .add_filter("Images", &["png", "jpg", "jpeg", "webp", "bmp", "gif"])
                    .pick_file();

                if let Some(path) = file {
                    return Task::perform(load_image_file(path), Message::FileLoaded);
                }
                Task::none()
            }

            Message::FileLoaded(Ok((bytes, mime_type))) => {
                log::info!("loaded {} byte upload ({})", bytes.len(), mime_type);
                self.workflow.set_file(&bytes, mime_type);
                self.preview = None;
                self.generated_handle = None;
                self.error = None;
                self.status = "Photo loaded. Describe the scene you want.".to_string();
                self.refresh_source_handle();
                Task::none()
            }

            Message::FileLoaded(Err(message)) => {
                log::warn!("file load failed: {}", message);
                self.error = Some(message);
                Task::none()
            }

            Message::PromptChanged(prompt) => {
                self.prompt = prompt;
                Task::none()
            }

            Message::Generate => {
                let Some(client) = self.client.clone() else {
                    self.error =
                        Some("Set GEMINI_API_KEY and restart to enable generation.".to_string());
                    return Task::none();
                };

                match self.workflow.begin_generation(&self.prompt) {
                    Ok(request) => {
                        self.error = None;
                        self.generated_handle = None;
                        self.status = "Generating...".to_string();
                        Task::perform(run_generation(client, request), |(seq, outcome)| {
                            Message::GenerationFinished(seq, outcome)
                        })
                    }
                    Err(e) => {
                        // Validation only: no state change, no network call
                        self.error = Some(e.to_string());
                        Task::none()
                    }
                }
            }

            Message::GenerationFinished(seq, Ok(generated)) => {
                if self.workflow.complete_generation(seq, generated) {
                    self.refresh_generated_handle();
                    self.status = "Done! Generate again or start over.".to_string();
                }
                Task::none()
            }

            Message::GenerationFinished(seq, Err(detail)) => {
                log::error!("generation failed: {}", detail);
                if self.workflow.fail_generation(seq) {
                    self.error = Some(GENERATION_FAILED_TEXT.to_string());
                    self.status = "Your photo is kept, you can retry.".to_string();
                }
                Task::none()
            }

            Message::StartOver => {
                self.workflow.start_over();
                self.prompt.clear();
                self.error = None;
                self.preview = None;
                self.source_handle = None;
                self.generated_handle = None;
                self.status = "Ready.".to_string();
                Task::none()
            }
        }
    }

    /// Decode the committed photo for display, if there is one
    fn refresh_source_handle(&mut self) {
        self.source_handle = self.workflow.source_image().and_then(|source| {
            match source.decode() {
                Ok(bytes) => Some(Handle::from_bytes(bytes)),
                Err(e) => {
                    log::warn!("could not decode source image for display: {}", e);
                    None
                }
            }
        });
    }

    /// Decode the generated scene for display, if there is one
    fn refresh_generated_handle(&mut self) {
        self.generated_handle = self.workflow.generated_image().and_then(|generated| {
            match generated.decode() {
                Ok(bytes) => Some(Handle::from_bytes(bytes)),
                Err(e) => {
                    log::warn!("could not decode generated image for display: {}", e);
                    None
                }
            }
        });
    }

    /// Build the user interface
    fn view(&self) -> Element<'_, Message> {
        let phase = self.workflow.phase();

        let content = column![
            ui::header(),
            ui::controls(phase),
            ui::preview_panel(
                phase,
                self.preview.as_ref(),
                self.source_handle.as_ref(),
                self.generated_handle.as_ref(),
            ),
            ui::prompt_form(&self.prompt, phase),
            ui::error_banner(self.error.as_deref()),
            text(&self.status).size(14),
        ]
        .spacing(16)
        .padding(24)
        .align_x(Alignment::Center);

        container(content)
            .width(Length::Fill)
            .height(Length::Fill)
            .center_x(Length::Fill)
            .center_y(Length::Fill)
            .into()
    }

    /// Poll the camera for preview frames only while it is live
    fn subscription(&self) -> Subscription<Message> {
        if self.workflow.camera_active() {
            time::every(PREVIEW_FRAME_INTERVAL).map(|_| Message::PreviewTick)
        } else {
            Subscription::none()
        }
    }

    /// Set the application theme
    fn theme(&self) -> Theme {
        Theme::Dark
    }
}

fn main() -> iced::Result {
    env_logger::init();

    iced::application("Past Lens", PastLens::update, PastLens::view)
        .subscription(PastLens::subscription)
        .theme(PastLens::theme)
        .centered()
        .run_with(PastLens::new)
}

/// Read an uploaded file off the UI thread, keeping its reported MIME type
async fn load_image_file(path: PathBuf) -> Result<(Vec<u8>, String), String> {
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| format!("Could not read {}: {}", path.display(), e))?;

    let mime_type = mime_guess::from_path(&path)
        .first_or_octet_stream()
        .essence_str()
        .to_string();

    Ok((bytes, mime_type))
}

/// Run one generation request to completion. The seq rides along so the
/// workflow can recognize (and drop) outcomes from abandoned attempts.
async fn run_generation(
    client: GenerationClient,
    request: GenerationRequest,
) -> (u64, Result<GeneratedImage, String>) {
    let seq = request.seq;
    let outcome = client
        .generate(&request)
        .await
        .map_err(|e| e.to_string());
    (seq, outcome)
}
