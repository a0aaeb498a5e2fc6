//! Integration test: prediction API endpoints

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use lead_conversion::data::read_csv;
use lead_conversion::ml::TrainingEngine;
use lead_conversion::web::{create_router, AppState};
use serde_json::{json, Value};
use std::path::Path;
use tower::ServiceExt;

fn test_app(models_dir: &Path) -> axum::Router {
    create_router(AppState::new(models_dir), None)
}

async fn post_json(app: axum::Router, body: String) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/predict_lead_conversion")
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

/// A trained model in `<root>/models` plus one unlabeled lead from its data.
fn trained(root: &Path) -> (std::path::PathBuf, Value) {
    let config = common::config_in(root);
    common::write_quotes(&config.data.raw_data_path, 40);
    TrainingEngine::new(&config).run().unwrap();

    let raw = read_csv(common::quotes_csv(40).as_bytes()).unwrap();
    let mut lead = raw.record(2).unwrap();
    lead.remove("has_subscribed");
    (config.server.models_dir, Value::Object(lead))
}

#[tokio::test]
async fn test_index() {
    let dir = tempfile::tempdir().unwrap();
    let response = test_app(dir.path())
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"Welcome to the lead conversion prediction API!");
}

#[tokio::test]
async fn test_missing_input_data() {
    let dir = tempfile::tempdir().unwrap();
    let (status, body) = post_json(
        test_app(dir.path()),
        json!({"model_name": "trained_model.json"}).to_string(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Validation error: Invalid payload. Model or input data not provided.");
}

#[tokio::test]
async fn test_malformed_body() {
    let dir = tempfile::tempdir().unwrap();
    let (status, body) = post_json(test_app(dir.path()), "{not json".to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Invalid payload"));
}

#[tokio::test]
async fn test_model_name_cannot_escape_models_dir() {
    let dir = tempfile::tempdir().unwrap();
    let (status, _) = post_json(
        test_app(dir.path()),
        json!({"model_name": "../config.toml", "input_data": {"provider": "acme"}}).to_string(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_model() {
    let dir = tempfile::tempdir().unwrap();
    let (status, body) = post_json(
        test_app(dir.path()),
        json!({"model_name": "missing.json", "input_data": {"provider": "acme"}}).to_string(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Model 'missing.json' not found");
}

#[tokio::test]
async fn test_predict_single_record() {
    let dir = tempfile::tempdir().unwrap();
    let (models_dir, lead) = trained(dir.path());

    let (status, body) = post_json(
        test_app(&models_dir),
        json!({"model_name": "trained_model.json", "input_data": lead}).to_string(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let predictions = body["predictions"].as_array().unwrap();
    assert_eq!(predictions.len(), 1);
    assert!(predictions[0] == 0 || predictions[0] == 1);
}

#[tokio::test]
async fn test_predict_batch_and_schema_error() {
    let dir = tempfile::tempdir().unwrap();
    let (models_dir, lead) = trained(dir.path());

    let (status, body) = post_json(
        test_app(&models_dir),
        json!({"model_name": "trained_model.json", "input_data": [lead.clone(), lead.clone()]})
            .to_string(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["predictions"].as_array().unwrap().len(), 2);

    let mut incomplete = lead;
    incomplete.as_object_mut().unwrap().remove("vehicle_group");
    let (status, _) = post_json(
        test_app(&models_dir),
        json!({"model_name": "trained_model.json", "input_data": incomplete}).to_string(),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_blank_strings_are_imputed_like_csv() {
    let dir = tempfile::tempdir().unwrap();
    let (models_dir, mut lead) = trained(dir.path());
    let record = lead.as_object_mut().unwrap();
    record.insert("annual_price_intermediate".to_string(), json!(""));
    record.insert("main_driver_bonus".to_string(), json!("NA"));

    let (status, body) = post_json(
        test_app(&models_dir),
        json!({"model_name": "trained_model.json", "input_data": lead}).to_string(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["predictions"].as_array().unwrap().len(), 1);
}
