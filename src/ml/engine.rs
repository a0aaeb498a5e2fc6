use std::fs;
use std::path::PathBuf;
use tracing::info;

use super::artifact::ModelArtifact;
use super::evaluation::{accuracy, ClassificationReport};
use super::predictor::LeadPredictor;
use super::trainer::{train_model, TrainerSettings};
use crate::config::Config;
use crate::data::{load_csv, train_test_split, Table};
use crate::error::{LeadError, Result};
use crate::preprocessing::{split_label, FeatureSchema, Preprocessor};

/// End-to-end training run: load, preprocess, split, fit, persist, evaluate.
pub struct TrainingEngine {
    config: Config,
    schema: FeatureSchema,
}

#[derive(Debug, Clone)]
pub struct TrainingSummary {
    pub accuracy: f64,
    pub report: ClassificationReport,
    pub n_train: usize,
    pub n_test: usize,
    pub model_path: PathBuf,
}

impl TrainingSummary {
    pub fn render(&self) -> String {
        format!(
            "Model accuracy: {}\nClassification Report:\n{}",
            self.accuracy, self.report
        )
    }
}

impl TrainingEngine {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
            schema: FeatureSchema::lead_quotes(),
        }
    }

    pub fn run(&self) -> Result<TrainingSummary> {
        let raw = load_csv(&self.config.data.raw_data_path)?;
        self.run_on(&raw)
    }

    pub fn run_on(&self, raw: &Table) -> Result<TrainingSummary> {
        let data = &self.config.data;
        let training = &self.config.training;

        // Fit the transformer on the full table and dump the result
        let preprocessor =
            Preprocessor::new(self.schema.clone()).with_dump_path(&data.preprocessed_path);
        let (transformer, prepared) = preprocessor.fit_transform(raw)?;

        // Hold out the test split
        let (features, labels) = split_label(&prepared, &self.schema.label)?;
        let split = train_test_split(features.n_rows(), training.test_size, training.seed)
            .map_err(|e| LeadError::Training(e.to_string()))?;

        let x_train = features.take_rows(&split.train);
        let y_train: Vec<f64> = split.train.iter().map(|&i| labels[i]).collect();
        let x_test = features.take_rows(&split.test);
        let y_test: Vec<i64> = split.test.iter().map(|&i| labels[i] as i64).collect();

        x_test.write_csv(&data.test_features_path)?;
        info!(
            train = x_train.n_rows(),
            test = x_test.n_rows(),
            path = %data.test_features_path.display(),
            "Split data"
        );

        // Train and persist
        let settings = TrainerSettings {
            n_estimators: training.n_estimators,
            seed: Some(training.seed),
            max_depth: training.max_depth,
            max_features: training.max_features,
            bootstrap: training.bootstrap,
        };
        let model = train_model(&x_train, &y_train, &settings)?;

        let artifact = ModelArtifact::new(transformer, model);
        let model_path = self.config.model_path();
        artifact.save(&model_path)?;

        // Evaluate on the held-out rows, already preprocessed
        let predictor = LeadPredictor::from_artifact(artifact);
        let y_pred = predictor.predict(&x_test, false)?;

        let summary = TrainingSummary {
            accuracy: accuracy(&y_test, &y_pred),
            report: ClassificationReport::compute(&y_test, &y_pred),
            n_train: x_train.n_rows(),
            n_test: x_test.n_rows(),
            model_path,
        };

        let rendered = summary.render();
        info!(accuracy = summary.accuracy, "Model evaluated");
        info!("\n{}", rendered);
        self.write_results(&rendered)?;

        Ok(summary)
    }

    fn write_results(&self, rendered: &str) -> Result<()> {
        let path = &self.config.training.results_path;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| LeadError::file_access(parent, e))?;
        }
        fs::write(path, rendered).map_err(|e| LeadError::file_access(path, e))?;
        info!(path = %path.display(), "Wrote evaluation results");
        Ok(())
    }
}
