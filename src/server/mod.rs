//! HTTP server exposing the analysis pipeline.
//!
//! - `POST /api/analyze` runs one analysis and returns the result as JSON
//! - `GET /api/reports/:name` downloads a persisted report
//! - `GET /health` reports liveness

mod handlers;
mod routes;

pub use handlers::status_for;
pub use routes::create_router;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use crate::analysis::Analyzer;
use crate::config::Settings;

/// Shared state for the web server.
#[derive(Clone)]
pub struct AppState {
    pub analyzer: Arc<Analyzer>,
    pub reports_dir: PathBuf,
}

impl AppState {
    pub fn new(settings: &Settings) -> anyhow::Result<Self> {
        Ok(Self {
            analyzer: Arc::new(Analyzer::from_settings(settings)?),
            reports_dir: settings.reports_dir.clone(),
        })
    }
}

/// Start the web server.
pub async fn serve(settings: &Settings, host: &str, port: u16) -> anyhow::Result<()> {
    let state = AppState::new(settings)?;
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    tracing::info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use std::time::Duration;
    use tempfile::TempDir;
    use tower::ServiceExt;

    use crate::analysis::{FsReportStore, ReportPersister};
    use crate::llm::{LlmError, PromptBuilder, TextGenerator};
    use crate::source::SourceResolver;

    #[derive(Clone, Copy)]
    enum Failure {
        Unavailable,
        Timeout,
    }

    /// Answers by prompt kind; optionally fails every call.
    struct CannedGenerator {
        failure: Option<Failure>,
    }

    #[async_trait]
    impl TextGenerator for CannedGenerator {
        async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
            match self.failure {
                Some(Failure::Unavailable) => {
                    return Err(LlmError::BackendUnavailable {
                        endpoint: "http://localhost:11434".to_string(),
                        message: "connection refused".to_string(),
                    })
                }
                Some(Failure::Timeout) => return Err(LlmError::Timeout(Duration::from_secs(1))),
                None => {}
            }
            Ok(if prompt.starts_with("Summarize") {
                "Short summary.".to_string()
            } else if prompt.starts_with("Extract") {
                "- one\n- two".to_string()
            } else {
                "POS".to_string()
            })
        }
    }

    fn setup_test_app(failure: Option<Failure>, with_default: bool) -> (axum::Router, TempDir) {
        let dir = TempDir::new().unwrap();
        let storage = dir.path().join("public");
        let reports = dir.path().join("storage/reports");
        std::fs::create_dir_all(&storage).unwrap();
        if with_default {
            std::fs::write(storage.join("ejemplo1.txt"), "Default text.").unwrap();
        }
        std::fs::write(storage.join("other.txt"), "Other text.").unwrap();

        let analyzer = Analyzer::new(
            SourceResolver::new(&storage, "ejemplo1.txt"),
            PromptBuilder::default(),
            Arc::new(CannedGenerator { failure }),
            ReportPersister::new(Arc::new(FsReportStore::new(&reports))),
        )
        .with_stage_timeout(Some(Duration::from_secs(5)));

        let state = AppState {
            analyzer: Arc::new(analyzer),
            reports_dir: reports,
        };
        (create_router(state), dir)
    }

    fn post_analyze(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/analyze")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _dir) = setup_test_app(None, true);
        let response = app.oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_analyze_default_with_empty_body() {
        let (app, dir) = setup_test_app(None, true);
        let response = app.oneshot(post_analyze("")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = json_body(response).await;
        assert_eq!(json["analyzedFile"], "ejemplo1.txt");
        assert_eq!(json["summary"]["text"], "Short summary.");
        assert_eq!(json["summary"]["sentiment"], "POS");
        assert_eq!(json["key_points"]["text"], "- one\n- two");

        let saved = json["savedFilePath"].as_str().unwrap();
        assert!(dir.path().join("storage/reports").join(saved).is_file());
    }

    #[tokio::test]
    async fn test_analyze_explicit_path() {
        let (app, _dir) = setup_test_app(None, true);
        let response = app
            .oneshot(post_analyze(r#"{"path": "other.txt"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["analyzedFile"], "other.txt");
    }

    #[tokio::test]
    async fn test_analyze_rejects_traversal() {
        let (app, _dir) = setup_test_app(None, true);
        let response = app
            .oneshot(post_analyze(r#"{"path": "../../etc/passwd"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_body(response).await;
        assert!(json["error"].as_str().unwrap().contains("invalid reference"));
        assert!(json.get("stage").is_none());
    }

    #[tokio::test]
    async fn test_analyze_missing_file_statuses() {
        let (app, _dir) = setup_test_app(None, true);
        let response = app
            .oneshot(post_analyze(r#"{"path": "missing.txt"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        // A missing default source is a server-side problem
        let (app, _dir) = setup_test_app(None, false);
        let response = app.oneshot(post_analyze("{}")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_analyze_malformed_body() {
        let (app, _dir) = setup_test_app(None, true);
        let response = app.oneshot(post_analyze("{not json")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_analyze_generation_failures() {
        let (app, _dir) = setup_test_app(Some(Failure::Unavailable), true);
        let response = app.oneshot(post_analyze("")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(json_body(response).await["stage"], "summary");

        let (app, _dir) = setup_test_app(Some(Failure::Timeout), true);
        let response = app.oneshot(post_analyze("")).await.unwrap();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn test_download_report() {
        let (app, _dir) = setup_test_app(None, true);
        let response = app.clone().oneshot(post_analyze("")).await.unwrap();
        let saved = json_body(response).await["savedFilePath"]
            .as_str()
            .unwrap()
            .to_string();

        let response = app
            .oneshot(get(&format!("/api/reports/{}", saved)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
        assert!(response.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .starts_with("attachment"));

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.starts_with("Análisis de: ejemplo1.txt"));
    }

    #[tokio::test]
    async fn test_download_rejects_traversal_and_unknown() {
        let (app, dir) = setup_test_app(None, true);
        std::fs::write(dir.path().join("analysis_secret.txt"), "secret").unwrap();

        for uri in [
            "/api/reports/..%2Fanalysis_secret.txt",
            "/api/reports/analysis_missing.txt",
            "/api/reports/notes.txt",
        ] {
            let response = app.clone().oneshot(get(uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", uri);
        }
    }
}
