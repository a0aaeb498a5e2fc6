use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::error::LeadError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Lead(#[from] LeadError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Lead(LeadError::Validation(_)) => StatusCode::BAD_REQUEST,
            ApiError::Lead(LeadError::Schema(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Lead(LeadError::FileAccess { .. }) => StatusCode::NOT_FOUND,
            ApiError::Lead(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Lead(LeadError::FileAccess { path, .. }) => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                format!("Model '{}' not found", name)
            }
            _ if status.is_server_error() => {
                tracing::error!(detail = %self, "Prediction failed");
                "An internal error occurred".to_string()
            }
            _ => self.to_string(),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
