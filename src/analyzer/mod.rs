//! AI vision analysis of four-view posture photos.

pub mod extraction;
pub mod image_ref;
pub mod pipeline;
pub mod prompts;
pub mod types;
pub mod validation;

pub use extraction::{extract_json_candidate, parse_model_json};
pub use image_ref::ImagePolicy;
pub use pipeline::{PostureAnalyzer, TokenCaps};
pub use types::*;
