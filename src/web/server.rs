use anyhow::Result;
use axum::{
    extract::{rejection::JsonRejection, State},
    routing::{get, post},
    Json, Router,
};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::error::ApiError;
use crate::config::Config;
use crate::data::Table;
use crate::error::LeadError;
use crate::ml::LeadPredictor;

pub const PREDICT_ROUTE: &str = "/predict_lead_conversion";
const INVALID_PAYLOAD: &str = "Invalid payload. Model or input data not provided.";

#[derive(Debug, Clone)]
pub struct AppState {
    pub models_dir: PathBuf,
}

impl AppState {
    pub fn new(models_dir: impl Into<PathBuf>) -> Self {
        Self {
            models_dir: models_dir.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PredictRequest {
    // `model` is accepted for older callers.
    #[serde(alias = "model")]
    pub model_name: String,
    #[serde(default)]
    pub input_data: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PredictResponse {
    pub predictions: Vec<i64>,
}

pub fn create_router(state: AppState, metrics: Option<PrometheusHandle>) -> Router {
    let mut router = Router::new()
        .route("/", get(index))
        .route(PREDICT_ROUTE, post(predict_lead_conversion));

    if let Some(handle) = metrics {
        router = router.route(
            "/metrics",
            get(move || std::future::ready(handle.render())),
        );
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

async fn index() -> &'static str {
    info!("Received request at index");
    "Welcome to the lead conversion prediction API!"
}

/// Model identifiers name a file directly inside the models directory.
pub fn resolve_model_path(models_dir: &Path, model_name: &str) -> Result<PathBuf, LeadError> {
    let valid = model_name
        .chars()
        .next()
        .map_or(false, |c| c.is_ascii_alphanumeric())
        && model_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        && !model_name.contains("..");

    if !valid {
        return Err(LeadError::Validation(format!(
            "invalid model identifier '{}'",
            model_name
        )));
    }
    Ok(models_dir.join(model_name))
}

fn is_present(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::String(s) => !s.is_empty(),
        serde_json::Value::Array(items) => !items.is_empty(),
        serde_json::Value::Object(map) => !map.is_empty(),
        serde_json::Value::Number(_) => true,
    }
}

fn parse_request(payload: serde_json::Value) -> Result<PredictRequest, LeadError> {
    let invalid = || LeadError::Validation(INVALID_PAYLOAD.to_string());

    let request: PredictRequest = serde_json::from_value(payload).map_err(|_| invalid())?;
    if request.model_name.is_empty() || !is_present(&request.input_data) {
        return Err(invalid());
    }
    Ok(request)
}

async fn predict_lead_conversion(
    State(state): State<AppState>,
    payload: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    let request_id = Uuid::new_v4();
    let span = info_span!("predict", %request_id);

    async move {
        let started = Instant::now();
        let result = handle_prediction(&state, payload).await;

        match &result {
            Ok(response) => {
                counter!("predictions_total").increment(response.predictions.len() as u64);
                histogram!("prediction_latency_seconds").record(started.elapsed().as_secs_f64());
            }
            Err(err) => {
                counter!("prediction_errors_total").increment(1);
                warn!(error = %err, "Prediction request rejected");
            }
        }
        result.map(Json)
    }
    .instrument(span)
    .await
}

async fn handle_prediction(
    state: &AppState,
    payload: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<PredictResponse, ApiError> {
    let Json(payload) = payload.map_err(|rejection| {
        error!(reason = %rejection.body_text(), "Invalid payload");
        LeadError::Validation(INVALID_PAYLOAD.to_string())
    })?;

    let request = parse_request(payload).map_err(|err| {
        error!("Invalid payload. Model or input data not provided.");
        err
    })?;
    info!(model = %request.model_name, "Received prediction request");

    // Reject traversal before touching the filesystem
    let model_path = resolve_model_path(&state.models_dir, &request.model_name)?;
    let input = Table::from_json(&request.input_data)?;

    // Deserializing and running the forest is CPU-bound.
    let predictions = tokio::task::spawn_blocking(move || {
        let predictor = LeadPredictor::load(&model_path)?;
        predictor.predict(&input, true)
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))??;

    info!(count = predictions.len(), "Prediction complete");
    Ok(PredictResponse { predictions })
}

fn init_metrics(config: &Config) -> Option<PrometheusHandle> {
    if !config.server.prometheus_enabled {
        info!("Prometheus metrics exporter disabled via configuration");
        return None;
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            describe_counter!("predictions_total", "Labels returned by the prediction route");
            describe_counter!("prediction_errors_total", "Prediction requests answered with an error");
            describe_histogram!("prediction_latency_seconds", "Time spent serving a prediction");
            Some(handle)
        }
        Err(err) => {
            warn!("Failed to install Prometheus metrics exporter: {}", err);
            None
        }
    }
}

pub async fn serve(config: &Config) -> Result<()> {
    let metrics = init_metrics(config);
    let app = create_router(AppState::new(&config.server.models_dir), metrics);

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!("Starting the application on http://{}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received, stopping server...");
            }
        })
        .await?;
    Ok(())
}
