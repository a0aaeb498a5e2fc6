use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::ml::MaxFeatures;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub data: DataConfig,
    pub training: TrainingConfig,
    pub server: ServerConfig,
    pub client: ClientConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DataConfig {
    pub raw_data_path: PathBuf,
    pub preprocessed_path: PathBuf,
    pub test_features_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub test_size: f64,
    pub seed: u64,
    pub n_estimators: usize,
    /// Unbounded when absent.
    pub max_depth: Option<usize>,
    pub max_features: MaxFeatures,
    pub bootstrap: bool,
    pub model_name: String,
    pub results_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub models_dir: PathBuf,
    pub prometheus_enabled: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    pub url: String,
    pub model_name: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            raw_data_path: PathBuf::from("data/long_quotes.csv"),
            preprocessed_path: PathBuf::from("data/preprocessed_data.csv"),
            test_features_path: PathBuf::from("data/X_test.csv"),
        }
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            test_size: 0.2,
            seed: 42,
            n_estimators: 100,
            max_depth: None,
            max_features: MaxFeatures::Sqrt,
            bootstrap: true,
            model_name: "trained_model.json".to_string(),
            results_path: PathBuf::from("results/evaluation.txt"),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            models_dir: PathBuf::from("models"),
            prometheus_enabled: true,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:5000/predict_lead_conversion".to_string(),
            model_name: "trained_model.json".to_string(),
        }
    }
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// Reads `path` when it exists, otherwise falls back to the built-in defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_file(path)
        } else {
            info!(path = %path.display(), "Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    pub fn model_path(&self) -> PathBuf {
        self.server.models_dir.join(&self.training.model_name)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_standard_locations() {
        let config = Config::default();
        assert_eq!(config.data.raw_data_path, PathBuf::from("data/long_quotes.csv"));
        assert_eq!(config.model_path(), PathBuf::from("models/trained_model.json"));
        assert_eq!(config.bind_address(), "0.0.0.0:5000");
        assert_eq!(config.training.seed, 42);
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let config: Config = toml::from_str(
            r#"
            [server]
            port = 5001

            [training]
            n_estimators = 10
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 5001);
        assert_eq!(config.training.max_features, MaxFeatures::Sqrt);
        assert!(config.training.bootstrap);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.training.n_estimators, 10);
        assert!((config.training.test_size - 0.2).abs() < 1e-12);
    }

    #[test]
    fn forest_options_from_toml() {
        let config: Config = toml::from_str(
            r#"
            [training]
            max_depth = 8
            max_features = { fixed = 5 }
            bootstrap = false
            "#,
        )
        .unwrap();
        assert_eq!(config.training.max_depth, Some(8));
        assert_eq!(config.training.max_features, MaxFeatures::Fixed(5));
        assert!(!config.training.bootstrap);

        let config: Config = toml::from_str("[training]\nmax_features = \"log2\"\n").unwrap();
        assert_eq!(config.training.max_features, MaxFeatures::Log2);
    }

    #[test]
    fn missing_file_falls_back() {
        let config = Config::load_or_default("does/not/exist.toml").unwrap();
        assert_eq!(config.server.port, 5000);
    }
}
