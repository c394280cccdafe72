pub mod analyzer;
pub mod config;
mod error;
pub mod llm;
pub mod records;
pub mod server;

pub use analyzer::{AggregateResult, PostureAnalyzer, TokenCaps};
pub use config::ServerConfig;
pub use error::AnalysisError;
pub use server::{build_router, AppState};

/// Install the global tracing subscriber. `RUST_LOG` overrides the default `info` filter.
pub fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Build the analyzer from configuration, constructing the configured model client.
pub fn analyzer_from_config(config: &ServerConfig) -> Result<PostureAnalyzer, AnalysisError> {
    let model = llm::build_model(&config.model)?;
    let caps = TokenCaps {
        analysis: config.model.analysis_max_tokens,
        recommendation: config.model.recommendation_max_tokens,
    };
    Ok(PostureAnalyzer::new(model, caps, config.images.clone()))
}
