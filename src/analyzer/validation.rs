//! Schema checks for parsed model output.
//!
//! `parse_model_json` only guarantees syntactically valid JSON. These
//! functions turn that JSON into typed values or a `ResponseShape` error.

use serde_json::Value;
use tracing::warn;

use super::types::{FindingKind, Severity, TreatmentPlan, View, ViewAnalysis, ViewFinding};
use crate::error::AnalysisError;

fn shape_error(msg: String) -> AnalysisError {
    AnalysisError::ResponseShape(msg)
}

/// Convert the JSON returned for one photo into a `ViewAnalysis`.
///
/// `view` is the position bound by request index. The `position` echoed by
/// the model is informational only.
pub fn validate_view_analysis(json: &Value, view: View) -> Result<ViewAnalysis, AnalysisError> {
    let obj = json
        .as_object()
        .ok_or_else(|| shape_error(format!("{} analysis is not a JSON object", view)))?;

    if let Some(echoed) = obj.get("position").and_then(Value::as_str) {
        if View::from_str(echoed) != Some(view) {
            warn!(
                "Model labelled the {} photo as '{}'; keeping request order",
                view, echoed
            );
        }
    }

    let findings = match obj.get("findings") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, item)| validate_finding(item, view, i))
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => {
            return Err(shape_error(format!(
                "'findings' for the {} view is not an array",
                view
            )))
        }
    };

    Ok(ViewAnalysis {
        position: view,
        findings,
    })
}

fn validate_finding(json: &Value, view: View, index: usize) -> Result<ViewFinding, AnalysisError> {
    let obj = json.as_object().ok_or_else(|| {
        shape_error(format!("{} finding #{} is not a JSON object", view, index))
    })?;

    let description = obj
        .get("finding")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            shape_error(format!(
                "{} finding #{} is missing string field 'finding'",
                view, index
            ))
        })?
        .to_string();

    let severity_raw = obj.get("severity").and_then(Value::as_str).unwrap_or("");
    let severity = Severity::from_str(severity_raw).ok_or_else(|| {
        shape_error(format!(
            "{} finding #{} has invalid severity '{}' (expected normal|mild|moderate|severe)",
            view, index, severity_raw
        ))
    })?;

    let kind = obj
        .get("type")
        .and_then(Value::as_str)
        .map(FindingKind::normalize)
        .unwrap_or(FindingKind::Other);

    Ok(ViewFinding {
        kind,
        description,
        severity,
        measurement: measurement_text(obj.get("measurement")),
    })
}

/// Measurements are free text; numbers are stringified and "null"-ish values dropped.
fn measurement_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() || s.eq_ignore_ascii_case("null") || s.eq_ignore_ascii_case("n/a") {
                None
            } else {
                Some(s.to_string())
            }
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Convert the aggregation call's JSON into a `TreatmentPlan`.
///
/// The prompt asks for 4-6 recommendations but the count is not enforced.
pub fn validate_treatment_plan(json: &Value) -> Result<TreatmentPlan, AnalysisError> {
    let obj = json
        .as_object()
        .ok_or_else(|| shape_error("Recommendation response is not a JSON object".to_string()))?;

    let summary = obj
        .get("summary")
        .and_then(Value::as_str)
        .ok_or_else(|| shape_error("Missing string field 'summary'".to_string()))?
        .to_string();

    let items = obj
        .get("recommendations")
        .and_then(Value::as_array)
        .ok_or_else(|| shape_error("Missing array field 'recommendations'".to_string()))?;

    let recommendations = items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            item.as_str().map(str::to_string).ok_or_else(|| {
                shape_error(format!("Recommendation #{} is not a string", i))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(TreatmentPlan {
        summary,
        recommendations,
    })
}
