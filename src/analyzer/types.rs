//! Type definitions for posture analysis.
//!
//! These types cover the inbound request, the per-view findings returned
//! by the vision model, and the aggregate payload sent back to the UI.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AnalysisError;

/// Number of photos in one assessment.
pub const VIEW_COUNT: usize = 4;

/// One of the four fixed camera angles a client is photographed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    Front,
    Back,
    Left,
    Right,
}

impl View {
    /// Views in request order. Index `i` of the request is always `ALL[i]`.
    pub const ALL: [View; VIEW_COUNT] = [View::Front, View::Back, View::Left, View::Right];

    pub fn as_str(&self) -> &'static str {
        match self {
            View::Front => "front",
            View::Back => "back",
            View::Left => "left",
            View::Right => "right",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "front" => Some(View::Front),
            "back" => Some(View::Back),
            "left" => Some(View::Left),
            "right" => Some(View::Right),
            _ => None,
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body region a finding refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FindingKind {
    Shoulders,
    Head,
    Hips,
    Spine,
    Other,
}

impl FindingKind {
    /// Map the model's free-form `type` label onto a known region.
    ///
    /// Models elaborate the label ("Forward head posture", "Left shoulder"),
    /// so the first word naming a region wins.
    pub fn normalize(label: &str) -> Self {
        label
            .split(|c: char| !c.is_alphabetic())
            .filter(|w| !w.is_empty())
            .find_map(|word| match word.to_lowercase().as_str() {
                "shoulder" | "shoulders" => Some(FindingKind::Shoulders),
                "head" => Some(FindingKind::Head),
                "hip" | "hips" | "pelvis" | "pelvic" => Some(FindingKind::Hips),
                "spine" | "spinal" => Some(FindingKind::Spine),
                _ => None,
            })
            .unwrap_or(FindingKind::Other)
    }
}

/// Clinical significance of a finding, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Normal,
    Mild,
    Moderate,
    Severe,
}

impl Severity {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "normal" => Some(Severity::Normal),
            "mild" => Some(Severity::Mild),
            "moderate" => Some(Severity::Moderate),
            "severe" => Some(Severity::Severe),
            _ => None,
        }
    }

    pub fn is_normal(&self) -> bool {
        *self == Severity::Normal
    }
}

/// One postural observation for one view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewFinding {
    /// Body region (serialized as `type` to match the UI contract)
    #[serde(rename = "type")]
    pub kind: FindingKind,
    /// Free-text description of what was observed
    #[serde(rename = "finding")]
    pub description: String,
    pub severity: Severity,
    /// Whatever measurement text the model emitted, e.g. "-2.3cm" or "5°"
    #[serde(default)]
    pub measurement: Option<String>,
}

/// Findings for a single photo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewAnalysis {
    pub position: View,
    #[serde(default)]
    pub findings: Vec<ViewFinding>,
}

/// Summary and recommendations produced by the aggregation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreatmentPlan {
    pub summary: String,
    pub recommendations: Vec<String>,
}

/// Response payload of a successful analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    /// Exactly four analyses, ordered front, back, left, right
    pub analyses: Vec<ViewAnalysis>,
    pub summary: String,
    pub recommendations: Vec<String>,
}

impl AggregateResult {
    pub fn new(analyses: Vec<ViewAnalysis>, plan: TreatmentPlan) -> Self {
        Self {
            analyses,
            summary: plan.summary,
            recommendations: plan.recommendations,
        }
    }

    /// All findings whose severity is not `normal`, in view order.
    pub fn issues(&self) -> Vec<&ViewFinding> {
        collect_issues(&self.analyses)
    }
}

/// Flatten findings across views (view order, then model order) and drop normal ones.
pub fn collect_issues(analyses: &[ViewAnalysis]) -> Vec<&ViewFinding> {
    analyses
        .iter()
        .flat_map(|a| a.findings.iter())
        .filter(|f| !f.severity.is_normal())
        .collect()
}

/// Four image references bound positionally to front, back, left, right.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRequest {
    images: [String; VIEW_COUNT],
}

impl AnalysisRequest {
    pub fn new(images: [String; VIEW_COUNT]) -> Self {
        Self { images }
    }

    /// Validate a raw request body of the form `{"imageUrls": [..]}`.
    ///
    /// Only the shape is checked here: the field must exist, be an array of
    /// exactly four strings. Content policy lives in `image_ref`.
    pub fn from_body(body: &Value) -> Result<Self, AnalysisError> {
        let urls = body
            .get("imageUrls")
            .and_then(Value::as_array)
            .filter(|urls| urls.len() == VIEW_COUNT)
            .ok_or_else(|| {
                AnalysisError::InvalidRequest(
                    "Exactly 4 images required (front, back, left, right)".to_string(),
                )
            })?;

        let mut images: [String; VIEW_COUNT] = Default::default();
        for (i, url) in urls.iter().enumerate() {
            images[i] = url
                .as_str()
                .ok_or_else(|| {
                    AnalysisError::InvalidRequest(format!(
                        "Image reference for the {} view must be a string",
                        View::ALL[i]
                    ))
                })?
                .trim()
                .to_string();
        }

        Ok(Self { images })
    }

    /// Image references in front, back, left, right order.
    pub fn images(&self) -> &[String; VIEW_COUNT] {
        &self.images
    }

    /// (view, image reference) pairs in positional order.
    pub fn views(&self) -> impl Iterator<Item = (View, &str)> {
        View::ALL
            .iter()
            .copied()
            .zip(self.images.iter().map(String::as_str))
    }
}
