//! HTTP surface: `POST /api/analyze` and `GET /healthz`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tracing::{error, info_span, warn, Instrument};

use crate::analyzer::{AggregateResult, AnalysisRequest, PostureAnalyzer};
use crate::error::AnalysisError;

/// The only message callers see for non-input failures.
pub const GENERIC_FAILURE: &str = "Failed to analyze images";

#[derive(Clone)]
pub struct AppState {
    analyzer: Arc<PostureAnalyzer>,
    max_body_bytes: usize,
    request_seq: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(analyzer: PostureAnalyzer, max_body_bytes: usize) -> Self {
        Self {
            analyzer: Arc::new(analyzer),
            max_body_bytes,
            request_seq: Arc::new(AtomicU64::new(0)),
        }
    }

    fn next_request_id(&self) -> String {
        let seq = self.request_seq.fetch_add(1, Ordering::Relaxed);
        format!("{:x}-{}", chrono::Utc::now().timestamp_millis(), seq)
    }
}

pub fn build_router(state: AppState) -> Router {
    let max_body_bytes = state.max_body_bytes;
    Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/api/analyze", post(analyze_handler))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}

/// JSON `{ "error": ... }` response.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: String) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message,
        }
    }

    fn internal() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: GENERIC_FAILURE.to_string(),
        }
    }
}

impl From<AnalysisError> for ApiError {
    fn from(err: AnalysisError) -> Self {
        match err {
            AnalysisError::InvalidRequest(message) => {
                warn!("Rejected analysis request: {}", message);
                Self::bad_request(message)
            }
            other => {
                error!("Analysis error: {}", other);
                Self::internal()
            }
        }
    }
}

impl From<BytesRejection> for ApiError {
    fn from(rejection: BytesRejection) -> Self {
        Self {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

async fn healthz_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "model": state.analyzer.model_name(),
    }))
}

async fn analyze_handler(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<AggregateResult>, ApiError> {
    let span = info_span!("analyze", request_id = %state.next_request_id());

    async move {
        let body = body?;
        let json: Value = serde_json::from_slice(&body).map_err(|e| {
            error!("Request body is not JSON: {}", e);
            ApiError::internal()
        })?;
        let request = AnalysisRequest::from_body(&json)?;
        let result = state.analyzer.analyze(&request).await?;
        Ok::<_, ApiError>(Json(result))
    }
    .instrument(span)
    .await
}
