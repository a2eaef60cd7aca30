/// UI building blocks
///
/// Pure view builders: each function takes plain state and returns an
/// iced element. All interaction flows back through `crate::Message`;
/// nothing in here mutates anything.

use iced::widget::image::Handle;
use iced::widget::{button, column, row, text, text_input, Image};
use iced::{Alignment, Element, Length};

use crate::state::workflow::Phase;
use crate::Message;

/// Width of the displayed image panes
const IMAGE_PANE_WIDTH: f32 = 440.0;

/// Application title block
pub fn header() -> Element<'static, Message> {
    column![
        text("Past Lens").size(40),
        text("Step into another era — capture a photo, describe a scene").size(16),
    ]
    .spacing(4)
    .align_x(Alignment::Center)
    .into()
}

/// The action row for the current phase. Buttons that would violate a
/// transition simply are not offered (or are disabled while a
/// generation is in flight).
pub fn controls(phase: Phase) -> Element<'static, Message> {
    let buttons = match phase {
        Phase::Capturing => row![
            button("Capture Photo")
                .on_press(Message::CaptureFrame)
                .padding(10),
            button("Cancel").on_press(Message::CancelCapture).padding(10),
        ],
        Phase::Generating => row![
            // Only the unconditional reset stays live while a request
            // is in flight
            button("Start Camera").padding(10),
            button("Upload Photo").padding(10),
            button("Start Over").on_press(Message::StartOver).padding(10),
        ],
        Phase::Idle => row![
            button("Start Camera")
                .on_press(Message::StartCamera)
                .padding(10),
            button("Upload Photo").on_press(Message::PickFile).padding(10),
        ],
        Phase::Ready | Phase::Complete | Phase::Failed => row![
            button("Start Camera")
                .on_press(Message::StartCamera)
                .padding(10),
            button("Upload Photo").on_press(Message::PickFile).padding(10),
            button("Start Over").on_press(Message::StartOver).padding(10),
        ],
    };

    buttons.spacing(12).into()
}

/// The image area: live camera preview while capturing, otherwise the
/// committed photo and, once available, the generated scene next to it.
pub fn preview_panel<'a>(
    phase: Phase,
    preview: Option<&'a Handle>,
    source: Option<&'a Handle>,
    generated: Option<&'a Handle>,
) -> Element<'a, Message> {
    match phase {
        Phase::Capturing => match preview {
            Some(handle) => pane("Live camera", handle),
            None => text("Starting camera...").size(16).into(),
        },
        Phase::Idle => text("Capture or upload a photo to begin.").size(16).into(),
        Phase::Complete => {
            let mut panes = row![].spacing(16);
            if let Some(handle) = source {
                panes = panes.push(pane("Your photo", handle));
            }
            if let Some(handle) = generated {
                panes = panes.push(pane("Generated scene", handle));
            }
            panes.into()
        }
        Phase::Ready | Phase::Generating | Phase::Failed => {
            let mut parts = column![].spacing(8).align_x(Alignment::Center);
            if let Some(handle) = source {
                parts = parts.push(pane("Your photo", handle));
            }
            if phase == Phase::Generating {
                parts = parts.push(text("Generating your scene... this can take a moment").size(16));
            }
            parts.into()
        }
    }
}

fn pane<'a>(label: &'a str, handle: &Handle) -> Element<'a, Message> {
    column![
        text(label).size(14),
        Image::new(handle.clone()).width(Length::Fixed(IMAGE_PANE_WIDTH)),
    ]
    .spacing(4)
    .align_x(Alignment::Center)
    .into()
}

/// Prompt field plus the generate trigger. The trigger is only wired up
/// when the precondition holds: a committed photo, a non-blank prompt,
/// and no request already in flight.
pub fn prompt_form<'a>(prompt: &'a str, phase: Phase) -> Element<'a, Message> {
    let has_source = matches!(phase, Phase::Ready | Phase::Complete | Phase::Failed);
    let can_generate = has_source && !prompt.trim().is_empty();

    let field = text_input("Describe the historical scene, e.g. \"1920s jazz club\"", prompt)
        .padding(10)
        .width(Length::Fixed(520.0));
    // Freeze the field while generating
    let field = if phase == Phase::Generating {
        field
    } else {
        field.on_input(Message::PromptChanged)
    };

    row![
        field,
        button("Generate")
            .on_press_maybe(can_generate.then_some(Message::Generate))
            .padding(10),
    ]
    .spacing(12)
    .align_y(Alignment::Center)
    .into()
}

/// Single error display region; collapses to nothing when all is well
pub fn error_banner(error: Option<&str>) -> Element<'_, Message> {
    match error {
        Some(message) => text(message).size(16).style(text::danger).into(),
        None => column![].into(),
    }
}
