use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Model service error: {0}")]
    Upstream(String),

    #[error("Model response is not valid JSON: {0}")]
    MalformedJson(String),

    #[error("Model response has unexpected shape: {0}")]
    ResponseShape(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl AnalysisError {
    /// Whether the caller sent something we refuse before contacting the model.
    pub fn is_client_error(&self) -> bool {
        matches!(self, AnalysisError::InvalidRequest(_))
    }
}
