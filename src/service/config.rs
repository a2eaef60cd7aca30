/// Generation service configuration
///
/// Resolved once at startup from the environment:
/// - `GEMINI_API_KEY`   required, the service credential
/// - `PAST_LENS_MODEL`  optional model override
/// - `PAST_LENS_API_BASE` optional endpoint override (e.g. a proxy)

use std::env;

/// Default image-capable model
const DEFAULT_MODEL: &str = "gemini-2.5-flash-image";

/// Default API endpoint base
const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub api_key: String,
    pub model: String,
    pub api_base: String,
}

impl ServiceConfig {
    /// Build a config with the default model and endpoint
    pub fn new(api_key: impl Into<String>) -> Self {
        ServiceConfig {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }

    /// Resolve from the environment. Returns None when no API key is
    /// set; the application still runs, generation is just unavailable.
    pub fn from_env() -> Option<Self> {
        let api_key = env::var("GEMINI_API_KEY").ok().filter(|k| !k.is_empty())?;

        let mut config = ServiceConfig::new(api_key);
        if let Ok(model) = env::var("PAST_LENS_MODEL") {
            if !model.is_empty() {
                config.model = model;
            }
        }
        if let Ok(base) = env::var("PAST_LENS_API_BASE") {
            if !base.is_empty() {
                config.api_base = base.trim_end_matches('/').to_string();
            }
        }
        Some(config)
    }

    /// Full URL of the generateContent endpoint for the configured model
    pub fn generate_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.api_base, self.model
        )
    }
}
