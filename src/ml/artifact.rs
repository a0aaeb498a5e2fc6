use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::info;

use super::models::RandomForest;
use crate::error::{LeadError, Result};
use crate::preprocessing::{FittedTransformer, SCHEMA_VERSION};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub schema_version: u32,
    pub feature_names: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub transformer: FittedTransformer,
    pub model: RandomForest,
}

impl ModelArtifact {
    pub fn new(transformer: FittedTransformer, model: RandomForest) -> Self {
        Self {
            schema_version: transformer.schema().version,
            feature_names: transformer.feature_names(),
            created_at: Utc::now(),
            transformer,
            model,
        }
    }

    /// Checks that the stored schema, feature layout and model agree.
    pub fn validate(&self) -> Result<()> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(LeadError::Schema(format!(
                "artifact schema version {} is not supported (expected {})",
                self.schema_version, SCHEMA_VERSION
            )));
        }
        if self.feature_names != self.transformer.feature_names() {
            return Err(LeadError::Schema(
                "artifact feature names disagree with its transformer".to_string(),
            ));
        }
        if self.model.n_features() != self.feature_names.len() {
            return Err(LeadError::Schema(format!(
                "model was fitted on {} features, artifact lists {}",
                self.model.n_features(),
                self.feature_names.len()
            )));
        }
        Ok(())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| LeadError::file_access(parent, e))?;
        }

        let file = File::create(path).map_err(|e| LeadError::file_access(path, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush().map_err(|e| LeadError::file_access(path, e))?;

        info!(path = %path.display(), trees = self.model.n_trees(), "Saved model artifact");
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| LeadError::file_access(path, e))?;

        let artifact: ModelArtifact = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| LeadError::Parse(format!("invalid model file {}: {}", path.display(), e)))?;
        artifact.validate()?;
        Ok(artifact)
    }
}
