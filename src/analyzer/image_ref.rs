//! Admission policy for image references before they reach the model.
//!
//! References are forwarded verbatim; this module only decides whether a
//! reference is acceptable. Remote URLs are not fetched.

use base64::{engine::general_purpose::STANDARD, Engine};
use image::ImageFormat;
use serde::Deserialize;
use url::Url;

use super::types::{AnalysisRequest, View};
use crate::error::AnalysisError;

/// Default cap on the decoded size of an inline (data URI) image.
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// Limits applied to every image reference in a request.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImagePolicy {
    /// Largest decoded data-URI payload accepted, in bytes
    pub max_image_bytes: usize,
    /// Whether http(s) URLs may be forwarded to the model
    pub allow_remote_urls: bool,
}

impl Default for ImagePolicy {
    fn default() -> Self {
        Self {
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
            allow_remote_urls: true,
        }
    }
}

/// Media types accepted inside data URIs, with the format their bytes must sniff as.
const ACCEPTED_MEDIA_TYPES: [(&str, ImageFormat); 4] = [
    ("image/jpeg", ImageFormat::Jpeg),
    ("image/png", ImageFormat::Png),
    ("image/webp", ImageFormat::WebP),
    ("image/gif", ImageFormat::Gif),
];

/// A data URI split into its declared media type and decoded bytes.
#[derive(Debug)]
pub struct InlineImage {
    pub media_type: String,
    pub data: Vec<u8>,
}

impl ImagePolicy {
    /// Check every reference in the request, failing on the first violation.
    pub fn check_request(&self, request: &AnalysisRequest) -> Result<(), AnalysisError> {
        for (view, reference) in request.views() {
            self.check_reference(view, reference)?;
        }
        Ok(())
    }

    fn check_reference(&self, view: View, reference: &str) -> Result<(), AnalysisError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(reject(view, "image reference is empty".to_string()));
        }

        if starts_with_ignore_case(reference, "data:") {
            let inline = decode_data_uri(reference).map_err(|e| reject(view, e))?;
            return self.check_inline(view, &inline);
        }

        let url = Url::parse(reference)
            .map_err(|e| reject(view, format!("not a valid URL or data URI: {}", e)))?;
        match url.scheme() {
            "http" | "https" if self.allow_remote_urls => Ok(()),
            "http" | "https" => Err(reject(view, "remote image URLs are disabled".to_string())),
            other => Err(reject(view, format!("unsupported URL scheme '{}'", other))),
        }
    }

    fn check_inline(&self, view: View, inline: &InlineImage) -> Result<(), AnalysisError> {
        let expected = ACCEPTED_MEDIA_TYPES
            .iter()
            .find(|(mt, _)| *mt == inline.media_type)
            .map(|(_, fmt)| *fmt)
            .ok_or_else(|| {
                reject(
                    view,
                    format!(
                        "unsupported media type '{}' (expected JPEG, PNG, WebP or GIF)",
                        inline.media_type
                    ),
                )
            })?;

        if inline.data.len() > self.max_image_bytes {
            return Err(reject(
                view,
                format!(
                    "image is {} bytes, limit is {} bytes",
                    inline.data.len(),
                    self.max_image_bytes
                ),
            ));
        }

        match image::guess_format(&inline.data) {
            Ok(actual) if actual == expected => Ok(()),
            Ok(actual) => Err(reject(
                view,
                format!(
                    "declared {} but data looks like {:?}",
                    inline.media_type, actual
                ),
            )),
            Err(_) => Err(reject(
                view,
                "data is not a recognizable image".to_string(),
            )),
        }
    }
}

/// Split a `data:<media-type>;base64,<payload>` URI and decode the payload.
pub fn decode_data_uri(uri: &str) -> Result<InlineImage, String> {
    let rest = uri
        .get(5..)
        .filter(|_| starts_with_ignore_case(uri, "data:"))
        .ok_or_else(|| "not a data URI".to_string())?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| "data URI has no payload".to_string())?;

    let mut parts = header.split(';');
    let media_type = parts.next().unwrap_or("").trim().to_lowercase();
    if !parts.any(|p| p.trim().eq_ignore_ascii_case("base64")) {
        return Err("data URI must be base64-encoded".to_string());
    }

    let data = STANDARD
        .decode(payload.trim())
        .map_err(|e| format!("invalid base64 image data: {}", e))?;

    Ok(InlineImage { media_type, data })
}

fn starts_with_ignore_case(s: &str, prefix: &str) -> bool {
    s.get(..prefix.len())
        .map(|head| head.eq_ignore_ascii_case(prefix))
        .unwrap_or(false)
}

fn reject(view: View, reason: String) -> AnalysisError {
    AnalysisError::InvalidRequest(format!("Invalid {} image: {}", view, reason))
}
