//! OpenAI-compatible chat-completions client (OpenAI and OpenRouter).

use async_trait::async_trait;
use tracing::{debug, error};

use super::{handle_api_response, send, ContentPart, GenerationRequest, Provider, VisionModel};
use crate::error::AnalysisError;

pub struct OpenAiClient {
    http: reqwest::Client,
    provider: Provider,
    base_url: String,
    model: String,
    api_key: String,
}

impl OpenAiClient {
    pub fn new(
        http: reqwest::Client,
        provider: Provider,
        base_url: String,
        model: String,
        api_key: String,
    ) -> Self {
        Self {
            http,
            provider,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            api_key,
        }
    }

    /// Build the request body. OpenRouter gets `json_object` mode because
    /// strict schemas fail when it routes to non-OpenAI models.
    fn request_body(&self, request: &GenerationRequest) -> serde_json::Value {
        let parts: Vec<serde_json::Value> = request
            .content
            .iter()
            .map(|part| match part {
                ContentPart::Text(text) => serde_json::json!({"type": "text", "text": text}),
                ContentPart::ImageUrl(url) => {
                    serde_json::json!({"type": "image_url", "image_url": {"url": url}})
                }
            })
            .collect();

        let mut body = serde_json::json!({
            "model": self.model,
            "max_tokens": request.max_tokens,
            "messages": [
                {"role": "system", "content": request.role},
                {"role": "user", "content": parts}
            ]
        });

        if let Some(schema) = &request.response_schema {
            body["response_format"] = match self.provider {
                Provider::OpenRouter => serde_json::json!({"type": "json_object"}),
                _ => serde_json::json!({
                    "type": "json_schema",
                    "json_schema": {
                        "name": schema.name,
                        "strict": true,
                        "schema": schema.schema
                    }
                }),
            };
        }
        body
    }
}

#[async_trait]
impl VisionModel for OpenAiClient {
    async fn generate(&self, request: GenerationRequest) -> Result<String, AnalysisError> {
        let provider = self.provider.as_str();
        let body = self.request_body(&request);
        debug!(
            "Calling {} model '{}' with max_tokens={}",
            provider, self.model, request.max_tokens
        );

        let http_request = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(&body);

        let response = send(http_request, provider).await?;
        let resp_json = handle_api_response(response, provider).await?;

        // { "choices": [{"message": {"content": "..."}}] }
        resp_json["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| {
                let msg = format!("No content in {} API response", provider);
                error!("{}", msg);
                AnalysisError::Upstream(msg)
            })
    }

    fn name(&self) -> String {
        format!("{}/{}", self.provider.as_str(), self.model)
    }
}
