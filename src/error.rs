use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LeadError {
    #[error("Cannot access {}: {source}", path.display())]
    FileAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Training failed: {0}")]
    Training(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LeadError {
    pub fn file_access(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LeadError::FileAccess {
            path: path.into(),
            source,
        }
    }

    pub fn missing_column(column: &str) -> Self {
        LeadError::Schema(format!("expected column '{}' is absent", column))
    }
}

impl From<csv::Error> for LeadError {
    fn from(err: csv::Error) -> Self {
        LeadError::Parse(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LeadError>;
