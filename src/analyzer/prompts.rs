//! Prompts and schemas for posture analysis model calls.

use super::types::{View, ViewFinding};

/// JSON schema for a single view analysis.
/// Matches what `validation::validate_view_analysis` accepts.
pub fn view_analysis_schema(view: View) -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "position": {
                "type": "string",
                "enum": [view.as_str()]
            },
            "findings": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "type": {
                            "type": "string",
                            "enum": ["Shoulders", "Head", "Hips", "Spine", "Other"]
                        },
                        "finding": {
                            "type": "string",
                            "description": "detailed description"
                        },
                        "severity": {
                            "type": "string",
                            "enum": ["normal", "mild", "moderate", "severe"]
                        },
                        "measurement": {
                            "type": ["string", "null"],
                            "description": "measurement with units or null"
                        }
                    },
                    "required": ["type", "finding", "severity", "measurement"],
                    "additionalProperties": false
                }
            }
        },
        "required": ["position", "findings"],
        "additionalProperties": false
    })
}

/// JSON schema for the summary and recommendation list.
pub fn treatment_plan_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "summary": {
                "type": "string",
                "description": "brief overall assessment"
            },
            "recommendations": {
                "type": "array",
                "items": { "type": "string" },
                "description": "4-6 specific treatments"
            }
        },
        "required": ["summary", "recommendations"],
        "additionalProperties": false
    })
}

/// Role instruction for analyzing one view.
pub fn build_view_analysis_role(view: View) -> String {
    let schema = serde_json::to_string_pretty(&example_view_shape(view))
        .unwrap_or_else(|_| "{}".to_string());

    format!(
        r#"You are a professional posture analyst. Analyze the {view} view body posture photo against the grid background.

Identify and measure:
1. Shoulder alignment (height difference in cm)
2. Head position (forward head posture in cm)
3. Hip alignment (rotation, height difference)
4. Spine curvature (kyphosis, lordosis)
5. Any other visible imbalances

Return ONLY a JSON object with this structure:
{schema}

Use "normal" severity for regions that are within normal limits.
If the image is unclear or shows no person, return an empty findings array."#,
        view = view,
        schema = schema,
    )
}

/// Short framing sent alongside the image.
pub fn build_view_framing(view: View) -> String {
    format!(
        "Analyze this {} view posture photo. The person is standing against a grid background. Identify any postural imbalances.",
        view
    )
}

fn example_view_shape(view: View) -> serde_json::Value {
    serde_json::json!({
        "position": view.as_str(),
        "findings": [
            {
                "type": "Shoulders|Head|Hips|Spine|Other",
                "finding": "detailed description",
                "severity": "normal|mild|moderate|severe",
                "measurement": "measurement with units or null"
            }
        ]
    })
}

/// Role instruction for the recommendation call.
pub fn build_treatment_role() -> String {
    r#"You are a physical therapy expert. Based on the posture analysis findings, generate 4-6 specific therapy recommendations.

If the findings list is empty, no postural issues were detected: give a reassuring summary and general posture maintenance recommendations.

Return ONLY a JSON object:
{
  "summary": "brief overall assessment",
  "recommendations": ["specific treatment 1", "specific treatment 2", ...]
}"#
    .to_string()
}

/// User message carrying the non-normal findings.
pub fn build_findings_message(issues: &[&ViewFinding]) -> String {
    let serialized = serde_json::to_string(issues).unwrap_or_else(|_| "[]".to_string());
    format!("Findings: {}", serialized)
}
