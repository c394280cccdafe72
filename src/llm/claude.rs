//! Anthropic Messages API client.

use async_trait::async_trait;
use tracing::{debug, error};

use super::{handle_api_response, send, ContentPart, GenerationRequest, VisionModel};
use crate::analyzer::image_ref::decode_data_uri;
use crate::error::AnalysisError;

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct ClaudeClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl ClaudeClient {
    pub fn new(http: reqwest::Client, base_url: String, model: String, api_key: String) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            api_key,
        }
    }

    /// Build the request body. The schema hint is not sent; the role
    /// instruction already spells out the expected JSON shape.
    fn request_body(&self, request: &GenerationRequest) -> Result<serde_json::Value, AnalysisError> {
        let blocks = request
            .content
            .iter()
            .map(content_block)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(serde_json::json!({
            "model": self.model,
            "max_tokens": request.max_tokens,
            "system": request.role,
            "messages": [
                {"role": "user", "content": blocks}
            ]
        }))
    }
}

/// Images go first-class: data URIs as base64 sources, hosted images as URL sources.
fn content_block(part: &ContentPart) -> Result<serde_json::Value, AnalysisError> {
    match part {
        ContentPart::Text(text) => Ok(serde_json::json!({"type": "text", "text": text})),
        ContentPart::ImageUrl(url) if is_data_uri(url) => {
            let (media_type, payload) = split_data_uri(url)?;
            Ok(serde_json::json!({
                "type": "image",
                "source": {"type": "base64", "media_type": media_type, "data": payload}
            }))
        }
        ContentPart::ImageUrl(url) => Ok(serde_json::json!({
            "type": "image",
            "source": {"type": "url", "url": url}
        })),
    }
}

fn is_data_uri(url: &str) -> bool {
    url.get(..5)
        .map(|head| head.eq_ignore_ascii_case("data:"))
        .unwrap_or(false)
}

/// Media type and the still-encoded payload of a base64 data URI.
fn split_data_uri(uri: &str) -> Result<(String, &str), AnalysisError> {
    // Decoding validates the URI; the API wants the payload still encoded.
    let inline = decode_data_uri(uri).map_err(AnalysisError::InvalidRequest)?;
    let payload = uri
        .split_once(',')
        .map(|(_, p)| p.trim())
        .unwrap_or_default();
    Ok((inline.media_type, payload))
}

#[async_trait]
impl VisionModel for ClaudeClient {
    async fn generate(&self, request: GenerationRequest) -> Result<String, AnalysisError> {
        let body = self.request_body(&request)?;
        debug!(
            "Calling claude model '{}' with max_tokens={}",
            self.model, request.max_tokens
        );

        let http_request = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body);

        let response = send(http_request, "claude").await?;
        let resp_json = handle_api_response(response, "claude").await?;

        // { "content": [{"type": "text", "text": "..."}] }
        resp_json["content"]
            .as_array()
            .and_then(|blocks| {
                blocks
                    .iter()
                    .find(|b| b["type"] == "text")
                    .and_then(|b| b["text"].as_str())
            })
            .map(|s| s.to_string())
            .ok_or_else(|| {
                let msg = "No text content in Claude API response".to_string();
                error!("{}", msg);
                AnalysisError::Upstream(msg)
            })
    }

    fn name(&self) -> String {
        format!("claude/{}", self.model)
    }
}
