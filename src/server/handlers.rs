//! HTTP handlers for analysis and report download.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;

use super::AppState;
use crate::analysis::report::is_report_name;
use crate::analysis::{AnalysisError, Stage};
use crate::llm::LlmError;
use crate::source::SourceError;

/// Body of `POST /api/analyze`. Every field is optional.
#[derive(Debug, Default, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub path: Option<String>,
}

/// Failure body returned by every endpoint.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
}

fn error_response(status: StatusCode, message: String, stage: Option<Stage>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message,
            stage,
        }),
    )
        .into_response()
}

/// Map an analysis failure to an HTTP status.
///
/// A missing default source is a server misconfiguration, not a bad request.
pub fn status_for(err: &AnalysisError, explicit_reference: bool) -> StatusCode {
    match err {
        AnalysisError::Source(SourceError::InvalidReference { .. }) => StatusCode::BAD_REQUEST,
        AnalysisError::Source(SourceError::NotFound { .. }) if explicit_reference => {
            StatusCode::NOT_FOUND
        }
        AnalysisError::Source(_) => StatusCode::INTERNAL_SERVER_ERROR,
        AnalysisError::Generation {
            source: LlmError::Timeout(_),
            ..
        } => StatusCode::GATEWAY_TIMEOUT,
        AnalysisError::Generation { .. } => StatusCode::BAD_GATEWAY,
    }
}

/// Run one analysis.
///
/// An empty body analyzes the default source.
pub async fn analyze(State(state): State<AppState>, body: Bytes) -> Response {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        AnalyzeRequest::default()
    } else {
        match serde_json::from_slice::<AnalyzeRequest>(&body) {
            Ok(request) => request,
            Err(e) => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    format!("invalid request body: {}", e),
                    None,
                )
            }
        }
    };

    let explicit = request.path.is_some();
    match state.analyzer.analyze(request.path.as_deref()).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => {
            let status = status_for(&e, explicit);
            error!("Analysis request failed ({}): {}", status, e);
            error_response(status, e.to_string(), e.stage())
        }
    }
}

/// Download a persisted report as a text attachment.
pub async fn download_report(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    let not_found = || error_response(StatusCode::NOT_FOUND, "Report not found".to_string(), None);

    if !is_report_name(&name) {
        return not_found();
    }

    // No reports directory yet means no reports
    let canonical_dir = match tokio::fs::canonicalize(&state.reports_dir).await {
        Ok(p) => p,
        Err(_) => return not_found(),
    };

    let canonical_file = match tokio::fs::canonicalize(canonical_dir.join(&name)).await {
        Ok(p) => p,
        Err(_) => return not_found(),
    };

    if !canonical_file.starts_with(&canonical_dir) {
        return not_found();
    }

    let content = match tokio::fs::read(&canonical_file).await {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to read report {}: {}", name, e);
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to read report".to_string(),
                None,
            );
        }
    };

    (
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", name),
            ),
        ],
        content,
    )
        .into_response()
}

/// Liveness check.
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
