/// HTTP client for the generation service
///
/// Speaks the `generateContent` wire format: the request carries the
/// source photo as inline base64 data plus the prompt text, the response
/// carries the composite back as inline base64 PNG. One request, one
/// response; retrying is the user's decision, never the client's.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::state::image::GeneratedImage;
use crate::state::workflow::GenerationRequest;

use super::config::ServiceConfig;

/// Hard ceiling on one generation round trip. Without it a hung request
/// would pin the workflow in `Generating` forever.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Debug, Error)]
pub enum GenerationError {
    /// The request never completed (connection refused, DNS, TLS, ...)
    #[error("could not reach the generation service: {0}")]
    Http(reqwest::Error),

    /// The request exceeded the client timeout
    #[error("the generation request timed out")]
    Timeout,

    /// The service answered with a non-success status
    #[error("generation service error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// The service answered 200 but the body had no usable image
    #[error("unexpected response from the generation service: {0}")]
    MalformedResponse(String),
}

#[derive(Clone)]
pub struct GenerationClient {
    http: reqwest::Client,
    config: ServiceConfig,
}

impl GenerationClient {
    pub fn new(config: ServiceConfig) -> Result<Self, GenerationError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(GenerationError::Http)?;
        Ok(GenerationClient { http, config })
    }

    /// Send one generation request and return the composite image
    pub async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GeneratedImage, GenerationError> {
        let body = build_request_body(
            &request.payload_base64,
            &request.mime_type,
            &request.prompt,
        );

        log::info!(
            "dispatching generation request (seq {}, prompt {} chars, image {} base64 chars)",
            request.seq,
            request.prompt.len(),
            request.payload_base64.len()
        );

        let response = self
            .http
            .post(self.config.generate_url())
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GenerationError::Api {
                status: status.as_u16(),
                message: extract_api_error_message(&text),
            });
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| GenerationError::MalformedResponse(e.to_string()))?;

        let generated = extract_generated(&value)?;
        log::info!(
            "generation succeeded (seq {}, {} base64 chars)",
            request.seq,
            generated.payload_base64.len()
        );
        Ok(generated)
    }
}

fn map_transport_error(e: reqwest::Error) -> GenerationError {
    if e.is_timeout() {
        GenerationError::Timeout
    } else {
        GenerationError::Http(e)
    }
}

/// generateContent request body: the photo as inline data followed by
/// the prompt text, asking for an image back
#[derive(Debug, Serialize)]
struct GenerateContentBody<'a> {
    contents: [Content<'a>; 1],
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 2],
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Inline { inline_data: InlineData<'a> },
    Text { text: &'a str },
}

#[derive(Debug, Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseModalities")]
    response_modalities: [&'static str; 1],
}

fn build_request_body<'a>(
    payload_base64: &'a str,
    mime_type: &'a str,
    prompt: &'a str,
) -> GenerateContentBody<'a> {
    GenerateContentBody {
        contents: [Content {
            parts: [
                Part::Inline {
                    inline_data: InlineData {
                        mime_type,
                        data: payload_base64,
                    },
                },
                Part::Text { text: prompt },
            ],
        }],
        generation_config: GenerationConfig {
            response_modalities: ["IMAGE"],
        },
    }
}

/// Pull the first inline image out of a generateContent response
fn extract_generated(value: &Value) -> Result<GeneratedImage, GenerationError> {
    let parts = value
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            GenerationError::MalformedResponse("response has no content parts".into())
        })?;

    for part in parts {
        let data = part
            .pointer("/inline_data/data")
            .or_else(|| part.pointer("/inlineData/data"))
            .and_then(Value::as_str);
        if let Some(data) = data {
            return Ok(GeneratedImage::from_base64(data));
        }
    }

    Err(GenerationError::MalformedResponse(
        "response contained no image data".into(),
    ))
}

/// Best-effort extraction of the service's error message; falls back to
/// the raw body so the log always has something
fn extract_api_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.chars().take(300).collect())
}
