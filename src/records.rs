//! Records exchanged with the practice's persistent store.
//!
//! Storage itself lives elsewhere; these are the row shapes for clients,
//! sessions, photos and reports, plus helpers to build them from an analysis.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analyzer::{AggregateResult, View, ViewAnalysis};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientRecord {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Where a session is in the capture -> analysis -> sign-off flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    InProgress,
    Analyzed,
    Completed,
}

impl SessionStatus {
    /// Next status; `Completed` is terminal.
    pub fn advance(self) -> Self {
        match self {
            SessionStatus::InProgress => SessionStatus::Analyzed,
            SessionStatus::Analyzed | SessionStatus::Completed => SessionStatus::Completed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub client_id: String,
    pub created_at: DateTime<Utc>,
    pub status: SessionStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoRecord {
    pub id: String,
    pub session_id: String,
    pub photo_type: View,
    pub original_url: String,
    pub analyzed_url: Option<String>,
    #[serde(rename = "analysis_json")]
    pub analysis: Option<ViewAnalysis>,
    pub created_at: DateTime<Utc>,
}

impl PhotoRecord {
    /// Attach the analysis for this photo's view. Analyses for other views are ignored.
    pub fn with_analysis(mut self, analyses: &[ViewAnalysis]) -> Self {
        self.analysis = analyses
            .iter()
            .find(|a| a.position == self.photo_type)
            .cloned();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRecord {
    pub id: String,
    pub session_id: String,
    pub summary: String,
    pub recommendations: Vec<String>,
    #[serde(rename = "full_report_json")]
    pub full_report: AggregateResult,
    pub created_at: DateTime<Utc>,
}

impl ReportRecord {
    pub fn from_result(id: String, session_id: String, result: &AggregateResult) -> Self {
        Self {
            id,
            session_id,
            summary: result.summary.clone(),
            recommendations: result.recommendations.clone(),
            full_report: result.clone(),
            created_at: Utc::now(),
        }
    }
}
