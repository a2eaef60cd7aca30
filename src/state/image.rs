/// Image payloads and the base64 transport contract
///
/// Every image in the workflow travels as base64 text. The display layer
/// wants a self-describing data URL (`data:<mime>;base64,<payload>`), while
/// the generation service wants the bare payload plus an explicit MIME type.
/// The types here own that split so nothing else has to think about it.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

/// MIME type assigned to frames captured from the camera
pub const CAPTURED_FRAME_MIME: &str = "image/jpeg";

/// MIME type of every image the generation service returns
pub const GENERATED_IMAGE_MIME: &str = "image/png";

/// A photo committed by the user, either a camera frame or an uploaded file.
///
/// Exactly one source image is live at a time; the workflow replaces the
/// whole value when the user captures or uploads again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    /// Bare base64 payload (no data-URL prefix)
    pub payload_base64: String,
    /// MIME type as reported by the camera encoder or the file picker
    pub mime_type: String,
}

impl SourceImage {
    /// Wrap raw image bytes (e.g. a freshly read file) as a source image
    pub fn from_bytes(bytes: &[u8], mime_type: impl Into<String>) -> Self {
        SourceImage {
            payload_base64: BASE64.encode(bytes),
            mime_type: mime_type.into(),
        }
    }

    /// Self-describing form for the display layer
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.payload_base64)
    }

    /// Decode back to raw bytes (for rendering in the UI)
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        BASE64.decode(&self.payload_base64)
    }
}

/// The composite produced by a successful generation call. Always PNG.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    /// Bare base64 payload as returned by the service
    pub payload_base64: String,
}

impl GeneratedImage {
    /// Wrap a payload from the service. A data-URL prefix, should the
    /// service hand one back, is stripped so `data_url` never doubles it.
    pub fn from_base64(payload: impl Into<String>) -> Self {
        let payload = payload.into();
        let bare = match split_data_url(&payload) {
            Some((_, bare)) => bare.to_string(),
            None => payload,
        };
        GeneratedImage {
            payload_base64: bare,
        }
    }

    /// Self-describing form for the display layer, with the fixed PNG marker
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", GENERATED_IMAGE_MIME, self.payload_base64)
    }

    /// Decode back to raw bytes (for rendering in the UI)
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        BASE64.decode(&self.payload_base64)
    }
}

/// Split a data URL into its MIME type and bare payload.
/// Returns None if the string is not a base64 data URL.
pub fn split_data_url(url: &str) -> Option<(&str, &str)> {
    let rest = url.strip_prefix("data:")?;
    let (mime, payload) = rest.split_once(";base64,")?;
    if mime.is_empty() {
        return None;
    }
    Some((mime, payload))
}
