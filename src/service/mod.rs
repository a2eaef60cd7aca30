/// Generation service module
///
/// The remote AI collaborator that turns a photo plus a prompt into a
/// composite image:
/// - Endpoint, model and credentials resolution (config.rs)
/// - The HTTP client and wire format (client.rs)
///
/// The service is opaque to the rest of the application: one request in,
/// one PNG (or one error) out. No retries, no backoff, no queuing.

pub mod client;
pub mod config;

pub use client::{GenerationClient, GenerationError};
pub use config::ServiceConfig;
