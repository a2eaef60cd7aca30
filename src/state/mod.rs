/// State management module
///
/// This module handles all core application state, including:
/// - Image payloads and the base64 transport contract (image.rs)
/// - The photo workflow state machine (workflow.rs)
///
/// Nothing in here touches the UI framework; the iced layer drives these
/// types from its update loop and renders whatever they expose.

pub mod image;
pub mod workflow;
