use std::time::Instant;
use tracing::info;

use super::models::{MaxFeatures, RandomForest};
use crate::data::Table;
use crate::error::{LeadError, Result};

#[derive(Debug, Clone)]
pub struct TrainerSettings {
    pub n_estimators: usize,
    pub seed: Option<u64>,
    pub max_depth: Option<usize>,
    pub max_features: MaxFeatures,
    pub bootstrap: bool,
}

impl Default for TrainerSettings {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            seed: None,
            max_depth: None,
            max_features: MaxFeatures::Sqrt,
            bootstrap: true,
        }
    }
}

/// Fits a random forest on a preprocessed feature table.
pub fn train_model(features: &Table, labels: &[f64], settings: &TrainerSettings) -> Result<RandomForest> {
    if features.is_empty() {
        return Err(LeadError::Training("no training rows after preprocessing".to_string()));
    }

    let x = features.to_matrix()?;
    let mut model = RandomForest::new(settings.n_estimators)
        .with_max_features(settings.max_features)
        .with_bootstrap(settings.bootstrap);
    if let Some(seed) = settings.seed {
        model = model.with_random_state(seed);
    }
    if let Some(depth) = settings.max_depth {
        model = model.with_max_depth(depth);
    }

    let started = Instant::now();
    model.fit(&x, labels)?;
    info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        trees = model.n_trees(),
        "Model trained"
    );
    Ok(model)
}
