//! Text/vision generation service clients.
//!
//! The analyzer depends only on the `VisionModel` trait; concrete clients
//! are constructed from `ModelConfig` at startup and passed in.

pub mod claude;
pub mod openai;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::config::ModelConfig;
use crate::error::AnalysisError;

pub use claude::ClaudeClient;
pub use openai::OpenAiClient;

/// Supported generation services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    OpenAi,
    OpenRouter,
    Claude,
}

impl Provider {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Some(Provider::OpenAi),
            "openrouter" => Some(Provider::OpenRouter),
            "claude" | "anthropic" => Some(Provider::Claude),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::OpenRouter => "openrouter",
            Provider::Claude => "claude",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::OpenAi => "gpt-4o",
            Provider::OpenRouter => "openai/gpt-4o",
            Provider::Claude => "claude-sonnet-4-20250514",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Provider::OpenAi => "https://api.openai.com/v1",
            Provider::OpenRouter => "https://openrouter.ai/api/v1",
            Provider::Claude => "https://api.anthropic.com",
        }
    }

    /// Environment variable holding the API key for this provider.
    pub fn api_key_env(&self) -> &'static str {
        match self {
            Provider::OpenAi => "OPENAI_API_KEY",
            Provider::OpenRouter => "OPENROUTER_API_KEY",
            Provider::Claude => "ANTHROPIC_API_KEY",
        }
    }
}

/// One piece of user content.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentPart {
    Text(String),
    /// Hosted URL or data URI, forwarded as given
    ImageUrl(String),
}

/// Structured-output hint; providers without schema support ignore it.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseSchema {
    pub name: String,
    pub schema: serde_json::Value,
}

/// A single generation call: role instruction, user content and a length cap.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub role: String,
    pub content: Vec<ContentPart>,
    pub max_tokens: u32,
    pub response_schema: Option<ResponseSchema>,
}

impl GenerationRequest {
    pub fn new(role: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            role: role.into(),
            content: Vec::new(),
            max_tokens,
            response_schema: None,
        }
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.content.push(ContentPart::Text(text.into()));
        self
    }

    pub fn image(mut self, url: impl Into<String>) -> Self {
        self.content.push(ContentPart::ImageUrl(url.into()));
        self
    }

    pub fn schema(mut self, name: &str, schema: serde_json::Value) -> Self {
        self.response_schema = Some(ResponseSchema {
            name: name.to_string(),
            schema,
        });
        self
    }

    /// Concatenated text parts, used by tests and logging.
    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text(t) => Some(t.as_str()),
                ContentPart::ImageUrl(_) => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// "Given a role instruction, content and a length cap, return generated text."
#[async_trait]
pub trait VisionModel: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<String, AnalysisError>;

    /// Provider/model label for logs and the health endpoint.
    fn name(&self) -> String;
}

/// Build the configured client.
pub fn build_model(config: &ModelConfig) -> Result<Arc<dyn VisionModel>, AnalysisError> {
    let api_key = config.api_key.clone().filter(|k| !k.trim().is_empty()).ok_or_else(|| {
        AnalysisError::Config(format!(
            "No API key configured for '{}'. Set {}.",
            config.provider.as_str(),
            config.provider.api_key_env()
        ))
    })?;
    let http = build_api_client(config.request_timeout_secs)?;
    let base_url = config
        .base_url
        .clone()
        .unwrap_or_else(|| config.provider.default_base_url().to_string());

    let model: Arc<dyn VisionModel> = match config.provider {
        Provider::OpenAi | Provider::OpenRouter => Arc::new(OpenAiClient::new(
            http,
            config.provider,
            base_url,
            config.model.clone(),
            api_key,
        )),
        Provider::Claude => Arc::new(ClaudeClient::new(
            http,
            base_url,
            config.model.clone(),
            api_key,
        )),
    };
    Ok(model)
}

/// Build a reqwest client, optionally with an overall request timeout.
fn build_api_client(timeout_secs: Option<u64>) -> Result<reqwest::Client, AnalysisError> {
    let mut builder = reqwest::Client::builder();
    if let Some(secs) = timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    builder
        .build()
        .map_err(|e| AnalysisError::Config(format!("Failed to build HTTP client: {}", e)))
}

/// Send a prepared request, mapping transport failures to `Upstream`.
async fn send(
    request: reqwest::RequestBuilder,
    provider: &str,
) -> Result<reqwest::Response, AnalysisError> {
    request.send().await.map_err(|e| {
        let msg = if e.is_timeout() {
            format!("Model API timeout for provider '{}'", provider)
        } else {
            format!("Model API request failed for {}: {}", provider, e)
        };
        error!("{}", msg);
        AnalysisError::Upstream(msg)
    })
}

/// Check status and parse the body as JSON.
async fn handle_api_response(
    response: reqwest::Response,
    provider: &str,
) -> Result<serde_json::Value, AnalysisError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<failed to read body>".to_string());
        let truncated = if body.chars().count() > 1024 {
            format!("{}...", body.chars().take(1024).collect::<String>())
        } else {
            body
        };
        let msg = format!("Model API error: {} from {} - {}", status, provider, truncated);
        error!("{}", msg);
        return Err(AnalysisError::Upstream(msg));
    }

    let body_text = response.text().await.map_err(|e| {
        AnalysisError::Upstream(format!(
            "Failed to read API response body from {}: {}",
            provider, e
        ))
    })?;

    serde_json::from_str(&body_text).map_err(|e| {
        let msg = format!("Failed to parse {} API response wrapper: {}", provider, e);
        error!("{}", msg);
        AnalysisError::Upstream(msg)
    })
}
