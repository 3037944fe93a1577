//! HTTP prediction client against a local stand-in service

mod helpers;

use axum::{
    extract::Path,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use helpers::{TestApp, TestOptions};
use qcflow_server::db;
use qcflow_server::services::{HttpPredictionClient, InsightKind, PredictionError, PredictionService};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

async fn batch_handler(Path(batch): Path<String>) -> Response {
    match batch.as_str() {
        "AB12" => Json(json!({
            "batchNumber": "AB12",
            "product": "Augmentin 60ml",
            "confidence": 0.91,
            "loss": 0.08,
            "rootCause": "Lab Error-buffer",
            "evidence": [{ "name": "pH", "value": 7.9, "min": 6.5, "max": 7.5, "status": "high" }],
            "capa": ["Prepare fresh buffer"],
        }))
        .into_response(),
        // snake_case payloads from older service builds
        "CD34" => Json(json!({
            "batch_number": "CD34",
            "confidence": 0.5,
            "root_cause": "Process Issue-mixing",
        }))
        .into_response(),
        "AB 12" => Json(json!({
            "batchNumber": "AB 12",
            "confidence": 0.4,
            "rootCause": "Operator Error-weighing",
        }))
        .into_response(),
        "GARBAGE" => "definitely not json".into_response(),
        "average" => Json(json!({ "averageConfidence": 0.8 })).into_response(),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "model offline").into_response(),
    }
}

/// Start the stand-in on an ephemeral port and return its base URL
async fn spawn_service() -> String {
    let app = Router::new()
        .route("/:batch", get(batch_handler))
        .route(
            "/lab/hplc_performance",
            get(|| async { Json(json!({ "columns": [{ "id": "C1", "efficiency": 0.97 }] })) }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}/", addr)
}

/// Service that answers every batch without echoing the batch number
async fn spawn_minimal_service() -> String {
    let app = Router::new().route(
        "/:batch",
        get(|| async {
            Json(json!({
                "rootCause": "Lab Error-buffer",
                "confidence": 0.87,
                "evidence": [],
                "capa": ["Retrain staff"],
            }))
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}/", addr)
}

fn client(base_url: &str) -> HttpPredictionClient {
    HttpPredictionClient::new(base_url, Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_predict_parses_camel_case_payload() {
    let base = spawn_service().await;

    let result = client(&base).predict("AB12").await.unwrap();

    assert_eq!(result.batch_number, "AB12");
    assert_eq!(result.root_cause, "Lab Error-buffer");
    assert_eq!(result.evidence.len(), 1);
    assert_eq!(result.evidence[0].max, Some(7.5));
    assert_eq!(result.capa, vec!["Prepare fresh buffer".to_string()]);
}

#[tokio::test]
async fn test_predict_accepts_snake_case_and_defaults() {
    let base = spawn_service().await;

    let result = client(&base).predict("CD34").await.unwrap();

    assert_eq!(result.batch_number, "CD34");
    assert_eq!(result.root_cause, "Process Issue-mixing");
    assert!(result.product.is_empty());
    assert!(result.capa.is_empty());
}

#[tokio::test]
async fn test_batch_number_is_encoded_in_path() {
    let base = spawn_service().await;

    let result = client(&base).predict("AB 12").await.unwrap();

    assert_eq!(result.root_cause, "Operator Error-weighing");
}

#[tokio::test]
async fn test_error_status_maps_to_api_error() {
    let base = spawn_service().await;

    let err = client(&base).predict("XX00").await.unwrap_err();

    match err {
        PredictionError::Api(status, body) => {
            assert_eq!(status, 500);
            assert_eq!(body, "model offline");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_malformed_body_maps_to_parse_error() {
    let base = spawn_service().await;

    let err = client(&base).predict("GARBAGE").await.unwrap_err();

    assert!(matches!(err, PredictionError::Parse(_)));
}

#[tokio::test]
async fn test_unreachable_service_maps_to_network_error() {
    // Bind then drop to get a port nothing listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = client(&format!("http://{}", addr)).predict("AB12").await.unwrap_err();

    assert!(matches!(err, PredictionError::Network(_)));
}

#[tokio::test]
async fn test_insights_are_passed_through() {
    let base = spawn_service().await;
    let client = client(&base);

    let body = client.insight(InsightKind::HplcPerformance).await.unwrap();
    assert_eq!(body["columns"][0]["id"], "C1");

    let body = client.insight(InsightKind::Average).await.unwrap();
    assert_eq!(body["averageConfidence"], 0.8);
}

#[tokio::test]
async fn test_payload_without_batch_number_is_accepted() {
    let base = spawn_minimal_service().await;

    let result = client(&base).predict("AB12").await.unwrap();

    assert!(result.batch_number.is_empty());
    assert_eq!(result.root_cause, "Lab Error-buffer");
    assert_eq!(result.confidence, 0.87);
    assert_eq!(result.capa, vec!["Retrain staff".to_string()]);
}

#[tokio::test]
async fn test_analysis_over_http_without_batch_echo() {
    let base = spawn_minimal_service().await;
    let t = TestApp::with_options(TestOptions {
        prediction: Some(Arc::new(client(&base))),
        ..TestOptions::default()
    })
    .await;
    t.add_process("AB12").await;
    let token = t.login("manager1").await;

    let (status, body) = t
        .post("/api/root-cause/AB12/analyze", &token, json!({}))
        .await;

    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["state"], "analysis-complete");
    assert_eq!(body["prediction"]["batchNumber"], "AB12");
    assert_eq!(body["prediction"]["product"], "Augmentin 60ml");
    assert_eq!(body["notification"]["relatedData"]["type"], "capa");

    let process = db::processes::get_by_batch(&t.pool, "AB12").await.unwrap().unwrap();
    assert!(process.is_analyzed);
    assert_eq!(t.predictor.calls(), 0);
}
