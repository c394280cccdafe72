//! Server configuration: defaults, optional TOML file, environment overrides.

use std::env;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::info;

use crate::analyzer::image_ref::ImagePolicy;
use crate::error::AnalysisError;
use crate::llm::Provider;

/// Generation cap for each per-view analysis call.
pub const DEFAULT_ANALYSIS_MAX_TOKENS: u32 = 1000;
/// Generation cap for the recommendation call.
pub const DEFAULT_RECOMMENDATION_MAX_TOKENS: u32 = 800;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Upper bound on request body size; four inline photos must fit
    pub max_body_bytes: usize,
    pub log_json: bool,
    pub model: ModelConfig,
    pub images: ImagePolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            max_body_bytes: 64 * 1024 * 1024,
            log_json: false,
            model: ModelConfig::default(),
            images: ImagePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub provider: Provider,
    pub model: String,
    /// Normally supplied through the provider's environment variable
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub analysis_max_tokens: u32,
    pub recommendation_max_tokens: u32,
    /// Unset means no client-side timeout
    pub request_timeout_secs: Option<u64>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: Provider::OpenAi,
            model: Provider::OpenAi.default_model().to_string(),
            api_key: None,
            base_url: None,
            analysis_max_tokens: DEFAULT_ANALYSIS_MAX_TOKENS,
            recommendation_max_tokens: DEFAULT_RECOMMENDATION_MAX_TOKENS,
            request_timeout_secs: None,
        }
    }
}

/// Raw view of the `[model]` table, used to tell whether `model` was set
/// explicitly or should follow the provider's default.
#[derive(Debug, Default, Deserialize)]
struct ModelTableProbe {
    #[serde(default)]
    model: Option<ModelNameProbe>,
}

#[derive(Debug, Default, Deserialize)]
struct ModelNameProbe {
    #[serde(default)]
    model: Option<String>,
}

impl ServerConfig {
    /// Load configuration: defaults, then the TOML file (if any), then env overrides.
    pub fn load() -> Result<Self, AnalysisError> {
        let mut config = match config_file_path() {
            Some(path) if path.exists() => {
                info!("Loading configuration from {}", path.display());
                Self::from_file(&path)?
            }
            _ => Self::default(),
        };
        config.apply_env(|name| env::var(name).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, AnalysisError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AnalysisError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&contents)
            .map_err(|e| AnalysisError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml(contents: &str) -> Result<Self, AnalysisError> {
        let mut config: ServerConfig = toml::from_str(contents)
            .map_err(|e| AnalysisError::Config(format!("Invalid configuration: {}", e)))?;

        let probe: ModelTableProbe = toml::from_str(contents).unwrap_or_default();
        let explicit_model = probe.model.and_then(|m| m.model).is_some();
        if !explicit_model {
            config.model.model = config.model.provider.default_model().to_string();
        }
        Ok(config)
    }

    /// Apply environment overrides. `lookup` is injected so tests need not
    /// mutate the process environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), AnalysisError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind) = lookup("POSTURE_BIND") {
            self.bind_addr = bind;
        }
        if let Some(json) = lookup("POSTURE_LOG_JSON") {
            self.log_json = parse_bool(&json).unwrap_or(self.log_json);
        }
        if let Some(provider) = lookup("POSTURE_PROVIDER") {
            let parsed = Provider::from_str(&provider).ok_or_else(|| {
                AnalysisError::Config(format!(
                    "Unsupported provider '{}'. Supported: openai, openrouter, claude",
                    provider
                ))
            })?;
            if parsed != self.model.provider {
                self.model.provider = parsed;
                self.model.model = parsed.default_model().to_string();
            }
        }
        if let Some(model) = lookup("POSTURE_MODEL") {
            self.model.model = model;
        }
        if let Some(base_url) = lookup("POSTURE_BASE_URL") {
            self.model.base_url = Some(base_url);
        }
        if let Some(key) = lookup(self.model.provider.api_key_env()) {
            self.model.api_key = Some(key);
        }
        Ok(())
    }
}

/// `POSTURE_CONFIG` if set, else `<config dir>/posture-lab/config.toml`.
pub fn config_file_path() -> Option<PathBuf> {
    env::var_os("POSTURE_CONFIG")
        .map(PathBuf::from)
        .or_else(|| dirs::config_dir().map(|d| d.join("posture-lab").join("config.toml")))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "true" | "TRUE" | "yes" | "YES" => Some(true),
        "0" | "false" | "FALSE" | "no" | "NO" => Some(false),
        _ => None,
    }
}
