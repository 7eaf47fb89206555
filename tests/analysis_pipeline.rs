//! End-to-end analysis against a mock Ollama backend.

use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use textdigest::analysis::{AnalysisError, Stage};
use textdigest::config::{AnalysisConfig, Settings};
use textdigest::llm::{LlmConfig, LlmError};
use textdigest::{Analyzer, ExecutionStrategy};

const SOURCE_TEXT: &str = "The product launch exceeded expectations across all regions.";

fn ollama_reply(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "model": "tinyllama",
        "response": text,
        "done": true
    }))
}

async fn mock_backend() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_string_contains("Summarize this text"))
        .and(body_partial_json(json!({
            "model": "tinyllama",
            "stream": false,
            "options": {"num_ctx": 2048, "num_thread": 4}
        })))
        .respond_with(ollama_reply("Launch exceeded targets.\n"))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_string_contains("Extract the TOP 3 KEY POINTS"))
        .respond_with(ollama_reply("  - Strong regional sales"))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_string_contains("Classify the sentiment"))
        .and(body_string_contains("Launch exceeded targets."))
        .respond_with(ollama_reply("POS"))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_string_contains("Classify the sentiment"))
        .and(body_string_contains("- Strong regional sales"))
        .respond_with(ollama_reply(" NEU "))
        .expect(1)
        .mount(&server)
        .await;

    server
}

fn settings_for(dir: &TempDir, endpoint: &str) -> Settings {
    let storage = dir.path().join("public");
    std::fs::create_dir_all(&storage).unwrap();
    std::fs::write(storage.join("ejemplo1.txt"), SOURCE_TEXT).unwrap();

    Settings {
        storage_dir: storage,
        reports_dir: dir.path().join("storage/reports"),
        llm: LlmConfig::default().with_endpoint(endpoint),
        analysis: AnalysisConfig::default(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_end_to_end_scenario() {
    for strategy in [ExecutionStrategy::Sequential, ExecutionStrategy::Concurrent] {
        let server = mock_backend().await;
        let dir = TempDir::new().unwrap();
        let settings = settings_for(&dir, &server.uri());

        let result = Analyzer::from_settings(&settings)
            .unwrap()
            .with_strategy(strategy)
            .analyze(None)
            .await
            .unwrap();

        assert_eq!(result.source, "ejemplo1.txt");
        assert_eq!(result.summary.text, "Launch exceeded targets.");
        assert_eq!(result.summary.sentiment, "POS");
        assert_eq!(result.key_points.text, "- Strong regional sales");
        assert_eq!(result.key_points.sentiment, "NEU");

        let name = result.report_ref.clone().expect("report should be saved");
        let report = std::fs::read_to_string(settings.reports_dir.join(&name)).unwrap();
        assert_eq!(
            report,
            "Análisis de: ejemplo1.txt\n\n\
             Resumen:\nLaunch exceeded targets.\n\n\
             Puntos Clave:\n- Strong regional sales\n\n\
             Sentimiento (Resumen): POS\n\
             Sentimiento (Puntos Clave): NEU"
        );

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["savedFilePath"], name);
        assert_eq!(json["key_points"]["sentiment"], "NEU");

        // Four calls, one per mock
        server.verify().await;
    }
}

#[tokio::test]
async fn test_backend_down_fails_at_summary() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let endpoint = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let dir = TempDir::new().unwrap();
    let settings = settings_for(&dir, &endpoint);

    let err = Analyzer::from_settings(&settings)
        .unwrap()
        .analyze(None)
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Some(Stage::Summary));
    assert!(matches!(
        err,
        AnalysisError::Generation {
            source: LlmError::BackendUnavailable { .. },
            ..
        }
    ));
    assert!(!settings.reports_dir.exists());
}

#[tokio::test]
async fn test_backend_error_status_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(500).set_body_string("model crashed"))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let settings = settings_for(&dir, &server.uri());

    let err = Analyzer::from_settings(&settings)
        .unwrap()
        .analyze(Some("ejemplo1.txt"))
        .await
        .unwrap_err();

    match err {
        AnalysisError::Generation {
            stage: Stage::Summary,
            source: LlmError::BackendError { status, body },
        } => {
            assert_eq!(status, 500);
            assert_eq!(body, "model crashed");
        }
        other => panic!("unexpected error: {:?}", other),
    }
    // Sequential mode stops at the first failure
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}
