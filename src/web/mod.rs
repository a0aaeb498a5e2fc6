pub mod error;
pub mod server;

pub use error::ApiError;
pub use server::{create_router, resolve_model_path, serve, AppState, PredictRequest, PredictResponse};
