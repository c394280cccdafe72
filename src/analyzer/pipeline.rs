//! Four-view posture analysis followed by a single recommendation call.
//!
//! validate -> 4 concurrent view analyses -> 1 aggregation call -> assemble.
//! Any failure aborts the whole run; no partial results are returned.

use std::sync::Arc;

use tracing::{debug, info};

use super::extraction::parse_model_json;
use super::image_ref::ImagePolicy;
use super::prompts::{
    build_findings_message, build_treatment_role, build_view_analysis_role, build_view_framing,
    treatment_plan_schema, view_analysis_schema,
};
use super::types::{
    collect_issues, AggregateResult, AnalysisRequest, TreatmentPlan, View, ViewAnalysis,
};
use super::validation::{validate_treatment_plan, validate_view_analysis};
use crate::config::{DEFAULT_ANALYSIS_MAX_TOKENS, DEFAULT_RECOMMENDATION_MAX_TOKENS};
use crate::error::AnalysisError;
use crate::llm::{GenerationRequest, VisionModel};

/// Generation caps for the two kinds of calls.
#[derive(Debug, Clone, Copy)]
pub struct TokenCaps {
    pub analysis: u32,
    pub recommendation: u32,
}

impl Default for TokenCaps {
    fn default() -> Self {
        Self {
            analysis: DEFAULT_ANALYSIS_MAX_TOKENS,
            recommendation: DEFAULT_RECOMMENDATION_MAX_TOKENS,
        }
    }
}

pub struct PostureAnalyzer {
    model: Arc<dyn VisionModel>,
    caps: TokenCaps,
    policy: ImagePolicy,
}

impl PostureAnalyzer {
    pub fn new(model: Arc<dyn VisionModel>, caps: TokenCaps, policy: ImagePolicy) -> Self {
        Self {
            model,
            caps,
            policy,
        }
    }

    pub fn model_name(&self) -> String {
        self.model.name()
    }

    /// Run the full pipeline for one request.
    pub async fn analyze(&self, request: &AnalysisRequest) -> Result<AggregateResult, AnalysisError> {
        self.policy.check_request(request)?;

        info!("Starting posture analysis with {}", self.model.name());
        let analyses = self.analyze_views(request).await?;

        let plan = self.recommend(&analyses).await?;
        let result = AggregateResult::new(analyses, plan);

        info!(
            "Analysis complete: {} findings, {} issues, {} recommendations",
            result.analyses.iter().map(|a| a.findings.len()).sum::<usize>(),
            result.issues().len(),
            result.recommendations.len()
        );
        Ok(result)
    }

    /// Analyze all four views concurrently. The first failure wins; the
    /// remaining in-flight calls are dropped.
    pub async fn analyze_views(
        &self,
        request: &AnalysisRequest,
    ) -> Result<Vec<ViewAnalysis>, AnalysisError> {
        let [front, back, left, right] = request.images();

        let (front, back, left, right) = tokio::try_join!(
            self.analyze_view(View::Front, front),
            self.analyze_view(View::Back, back),
            self.analyze_view(View::Left, left),
            self.analyze_view(View::Right, right),
        )?;

        Ok(vec![front, back, left, right])
    }

    async fn analyze_view(&self, view: View, image: &str) -> Result<ViewAnalysis, AnalysisError> {
        let request = GenerationRequest::new(build_view_analysis_role(view), self.caps.analysis)
            .text(build_view_framing(view))
            .image(image)
            .schema("posture_view_analysis", view_analysis_schema(view));

        let text = self.model.generate(request).await?;
        let json = parse_model_json(&text)?;
        let analysis = validate_view_analysis(&json, view)?;

        info!("{} view: {} findings", view, analysis.findings.len());
        Ok(analysis)
    }

    /// Ask for a summary and recommendations based on the non-normal findings.
    ///
    /// The call is made even when every finding is normal.
    pub async fn recommend(&self, analyses: &[ViewAnalysis]) -> Result<TreatmentPlan, AnalysisError> {
        let issues = collect_issues(analyses);
        if issues.is_empty() {
            info!("No postural issues found; requesting maintenance recommendations");
        }

        let request = GenerationRequest::new(build_treatment_role(), self.caps.recommendation)
            .text(build_findings_message(&issues))
            .schema("posture_treatment_plan", treatment_plan_schema());
        debug!("Recommendation input: {}", request.text_content());

        let text = self.model.generate(request).await?;
        let json = parse_model_json(&text)?;
        validate_treatment_plan(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::types::{FindingKind, Severity, ViewFinding};
    use crate::llm::ContentPart;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    /// Replies based on the framing text; records every request.
    struct ScriptedModel {
        calls: AtomicUsize,
        requests: Mutex<Vec<GenerationRequest>>,
        fail_view: Option<View>,
        view_reply: fn(View) -> String,
        plan_reply: String,
    }

    impl ScriptedModel {
        fn new(view_reply: fn(View) -> String, plan_reply: &str) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
                fail_view: None,
                view_reply,
                plan_reply: plan_reply.to_string(),
            }
        }
    }

    #[async_trait]
    impl VisionModel for ScriptedModel {
        async fn generate(&self, request: GenerationRequest) -> Result<String, AnalysisError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let text = request.text_content();
            self.requests.lock().await.push(request);

            if text.starts_with("Findings:") {
                return Ok(self.plan_reply.clone());
            }
            let view = View::ALL
                .into_iter()
                .find(|v| text.contains(&format!("this {} view", v)))
                .ok_or_else(|| AnalysisError::Upstream("unexpected prompt".to_string()))?;
            if self.fail_view == Some(view) {
                return Err(AnalysisError::Upstream("connection reset".to_string()));
            }
            Ok((self.view_reply)(view))
        }

        fn name(&self) -> String {
            "scripted".to_string()
        }
    }

    fn request() -> AnalysisRequest {
        AnalysisRequest::new([
            "https://cdn.example.com/front.jpg".to_string(),
            "https://cdn.example.com/back.jpg".to_string(),
            "https://cdn.example.com/left.jpg".to_string(),
            "https://cdn.example.com/right.jpg".to_string(),
        ])
    }

    fn analyzer(model: Arc<ScriptedModel>) -> PostureAnalyzer {
        PostureAnalyzer::new(model, TokenCaps::default(), ImagePolicy::default())
    }

    /// Six findings in total, two of them normal.
    fn mixed_reply(view: View) -> String {
        match view {
            View::Front => format!(
                "```json\n{{\"position\":\"{}\",\"findings\":[{{\"type\":\"Shoulders\",\"finding\":\"Left shoulder lower\",\"severity\":\"moderate\",\"measurement\":\"-2.3cm\"}},{{\"type\":\"Hips\",\"finding\":\"Hips level\",\"severity\":\"normal\",\"measurement\":null}}]}}\n```",
                view
            ),
            View::Back => format!(
                "{{\"position\":\"{}\",\"findings\":[{{\"type\":\"Spine\",\"finding\":\"Mild scoliosis\",\"severity\":\"mild\",\"measurement\":null}}]}}",
                view
            ),
            View::Left => format!(
                "Here you go: {{\"position\":\"{}\",\"findings\":[{{\"type\":\"Head\",\"finding\":\"Forward head\",\"severity\":\"mild\",\"measurement\":\"+3.1cm\"}},{{\"type\":\"Spine\",\"finding\":\"Kyphosis normal\",\"severity\":\"normal\",\"measurement\":null}}]}}",
                view
            ),
            View::Right => format!(
                "{{\"position\":\"{}\",\"findings\":[{{\"type\":\"Hips\",\"finding\":\"Anterior tilt\",\"severity\":\"severe\",\"measurement\":\"12°\"}}]}}",
                view
            ),
        }
    }

    fn all_normal_reply(view: View) -> String {
        format!(
            "{{\"position\":\"{}\",\"findings\":[{{\"type\":\"Shoulders\",\"finding\":\"Level\",\"severity\":\"normal\",\"measurement\":null}}]}}",
            view
        )
    }

    const PLAN: &str = "```json\n{\"summary\":\"Moderate asymmetry\",\"recommendations\":[\"Chin tucks\",\"Hip flexor stretch\",\"Scapular retraction\",\"Core work\"]}\n```";

    #[tokio::test]
    async fn test_full_pipeline_success() {
        let model = Arc::new(ScriptedModel::new(mixed_reply, PLAN));
        let result = analyzer(model.clone()).analyze(&request()).await.unwrap();

        let positions: Vec<View> = result.analyses.iter().map(|a| a.position).collect();
        assert_eq!(positions, View::ALL.to_vec());
        assert_eq!(result.summary, "Moderate asymmetry");
        assert_eq!(result.recommendations.len(), 4);
        assert_eq!(model.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_recommendation_payload_excludes_normal_findings() {
        let model = Arc::new(ScriptedModel::new(mixed_reply, PLAN));
        analyzer(model.clone()).analyze(&request()).await.unwrap();

        let requests = model.requests.lock().await;
        let plan_request = requests
            .iter()
            .find(|r| r.text_content().starts_with("Findings:"))
            .expect("recommendation call made");
        let payload = plan_request.text_content();
        let sent: Vec<ViewFinding> =
            serde_json::from_str(payload.trim_start_matches("Findings:").trim()).unwrap();

        assert_eq!(sent.len(), 4);
        assert!(sent.iter().all(|f| f.severity != Severity::Normal));
        assert_eq!(sent[0].kind, FindingKind::Shoulders);
        assert_eq!(sent[3].severity, Severity::Severe);
        assert_eq!(plan_request.max_tokens, 800);
    }

    #[tokio::test]
    async fn test_view_calls_carry_image_and_cap() {
        let model = Arc::new(ScriptedModel::new(mixed_reply, PLAN));
        analyzer(model.clone()).analyze(&request()).await.unwrap();

        let requests = model.requests.lock().await;
        let left = requests
            .iter()
            .find(|r| r.text_content().contains("this left view"))
            .unwrap();
        assert_eq!(left.max_tokens, 1000);
        assert!(left.role.contains("left view"));
        assert!(left
            .content
            .contains(&ContentPart::ImageUrl("https://cdn.example.com/left.jpg".to_string())));
    }

    #[tokio::test]
    async fn test_all_normal_still_requests_plan() {
        let plan = "{\"summary\":\"Posture within normal limits\",\"recommendations\":[]}";
        let model = Arc::new(ScriptedModel::new(all_normal_reply, plan));
        let result = analyzer(model.clone()).analyze(&request()).await.unwrap();

        assert_eq!(model.calls.load(Ordering::SeqCst), 5);
        assert!(result.issues().is_empty());
        assert!(result.recommendations.is_empty());

        let requests = model.requests.lock().await;
        assert!(requests.iter().any(|r| r.text_content() == "Findings: []"));
    }

    #[tokio::test]
    async fn test_single_view_failure_fails_everything() {
        let mut scripted = ScriptedModel::new(mixed_reply, PLAN);
        scripted.fail_view = Some(View::Left);
        let model = Arc::new(scripted);

        let err = analyzer(model.clone()).analyze(&request()).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Upstream(_)));

        let requests = model.requests.lock().await;
        assert!(requests
            .iter()
            .all(|r| !r.text_content().starts_with("Findings:")));
    }

    #[tokio::test]
    async fn test_malformed_view_reply_fails() {
        fn prose(_: View) -> String {
            "I'm sorry, I can't assess this photo.".to_string()
        }
        let model = Arc::new(ScriptedModel::new(prose, PLAN));
        let err = analyzer(model).analyze(&request()).await.unwrap_err();
        assert!(matches!(err, AnalysisError::MalformedJson(_)));
    }

    #[tokio::test]
    async fn test_bad_plan_shape_fails() {
        let model = Arc::new(ScriptedModel::new(mixed_reply, "{\"summary\": 42}"));
        let err = analyzer(model).analyze(&request()).await.unwrap_err();
        assert!(matches!(err, AnalysisError::ResponseShape(_)));
    }

    #[tokio::test]
    async fn test_policy_violation_makes_no_calls() {
        let model = Arc::new(ScriptedModel::new(mixed_reply, PLAN));
        let bad = AnalysisRequest::new([
            "ftp://example.com/front.jpg".to_string(),
            "https://cdn.example.com/back.jpg".to_string(),
            "https://cdn.example.com/left.jpg".to_string(),
            "https://cdn.example.com/right.jpg".to_string(),
        ]);
        let err = analyzer(model.clone()).analyze(&bad).await.unwrap_err();
        assert!(err.is_client_error());
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }
}
