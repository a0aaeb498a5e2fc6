//! The fixed preprocessing sequence shared by training and serving.
//!
//! Training calls [`Preprocessor::fit_transform`], which learns the categorical
//! vocabularies and scaling parameters and returns them as a [`FittedTransformer`].
//! Serving replays the same steps with [`FittedTransformer::transform`], never refitting.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

use super::encoder::CategoricalEncoder;
use super::scaler::StandardScaler;
use super::schema::FeatureSchema;
use super::transforms;
use crate::data::{Table, Value};
use crate::error::{LeadError, Result};

pub struct Preprocessor {
    schema: FeatureSchema,
    dump_path: Option<PathBuf>,
}

/// Learned preprocessing state, persisted alongside the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedTransformer {
    schema: FeatureSchema,
    encoder: CategoricalEncoder,
    scaler: StandardScaler,
}

impl Preprocessor {
    pub fn new(schema: FeatureSchema) -> Self {
        Self {
            schema,
            dump_path: None,
        }
    }

    /// Writes the fully preprocessed training table to `path` after fitting.
    pub fn with_dump_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.dump_path = Some(path.into());
        self
    }

    /// Learns the transformer from a raw training table and returns the model-ready
    /// table (features followed by the label column).
    pub fn fit_transform(&self, raw: &Table) -> Result<(FittedTransformer, Table)> {
        let schema = &self.schema;
        require_columns(raw, schema)?;
        raw.require_column(&schema.label)?;

        let mut table = raw.clone();
        normalize_timestamps(&mut table, schema)?;
        derive_duration(&mut table, schema)?;
        prune_columns(&mut table, schema);

        fill_categorical(&mut table, schema)?;
        let mut encoder = CategoricalEncoder::new(schema.unknown_sentinel.clone());
        encoder.fit(&table, &schema.categorical)?;
        encoder.transform(&mut table)?;

        extract_numerical(&mut table, schema)?;
        let mut scaler = StandardScaler::new();
        scaler.fit(&table, &schema.numerical)?;
        scaler.transform(&mut table)?;

        map_intensities(&mut table, schema)?;
        table.map_column(&schema.label, |v| {
            transforms::parse_label(v).map_or(Value::Missing, Value::Number)
        })?;

        let mut output_columns = schema.feature_names();
        output_columns.push(schema.label.clone());
        let mut table = project(&table, &output_columns)?;
        let dropped = table.drop_missing();

        info!(
            rows_in = raw.n_rows(),
            rows_out = table.n_rows(),
            dropped,
            "Finished with preprocessing"
        );

        if let Some(path) = &self.dump_path {
            table.write_csv(path)?;
            info!(path = %path.display(), "Wrote preprocessed data");
        }

        let fitted = FittedTransformer {
            schema: schema.clone(),
            encoder,
            scaler,
        };
        Ok((fitted, table))
    }
}

impl FittedTransformer {
    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn feature_names(&self) -> Vec<String> {
        self.schema.feature_names()
    }

    /// Applies the learned transformation to raw records. A label column, if present,
    /// is ignored; rows left with a missing feature are dropped.
    pub fn transform(&self, raw: &Table) -> Result<Table> {
        let schema = &self.schema;
        require_columns(raw, schema)?;

        let mut table = raw.clone();
        normalize_timestamps(&mut table, schema)?;
        derive_duration(&mut table, schema)?;
        prune_columns(&mut table, schema);

        fill_categorical(&mut table, schema)?;
        self.encoder.transform(&mut table)?;

        extract_numerical(&mut table, schema)?;
        self.scaler.transform(&mut table)?;

        map_intensities(&mut table, schema)?;

        let mut table = project(&table, &schema.feature_names())?;
        let dropped = table.drop_missing();
        debug!(rows = table.n_rows(), dropped, "Preprocessed input records");
        Ok(table)
    }
}

/// Separates the label column from a preprocessed training table.
pub fn split_label(table: &Table, label: &str) -> Result<(Table, Vec<f64>)> {
    let labels = table
        .column(label)?
        .into_iter()
        .map(|v| {
            v.as_number()
                .ok_or_else(|| LeadError::Schema(format!("non-numeric label {:?}", v)))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut features = table.clone();
    features.drop_columns(&[label]);
    Ok((features, labels))
}

fn require_columns(table: &Table, schema: &FeatureSchema) -> Result<()> {
    for column in schema.required_inputs() {
        table.require_column(column)?;
    }
    Ok(())
}

fn normalize_timestamps(table: &mut Table, schema: &FeatureSchema) -> Result<()> {
    table.map_column(&schema.submitted_at, transforms::normalize_submitted)?;
    table.map_column(&schema.effective_start_date, transforms::normalize_effective)
}

fn derive_duration(table: &mut Table, schema: &FeatureSchema) -> Result<()> {
    let submitted = table.column(&schema.submitted_at)?;
    let effective = table.column(&schema.effective_start_date)?;

    let days: Vec<Value> = effective
        .into_iter()
        .zip(submitted)
        .map(|(eff, sub)| match (eff.as_timestamp(), sub.as_timestamp()) {
            (Some(e), Some(s)) => Value::Number(transforms::day_difference(e, s) as f64),
            _ => Value::Missing,
        })
        .collect();

    table.set_column(&schema.duration_column, days)
}

fn prune_columns(table: &mut Table, schema: &FeatureSchema) {
    let dropped: Vec<&str> = schema.dropped.iter().map(String::as_str).collect();
    table.drop_columns(&dropped);
}

fn fill_categorical(table: &mut Table, schema: &FeatureSchema) -> Result<()> {
    for column in &schema.categorical {
        table.map_column(column, |v| {
            if v.is_missing() {
                Value::Text(schema.unknown_sentinel.clone())
            } else {
                v.clone()
            }
        })?;
    }
    Ok(())
}

fn extract_numerical(table: &mut Table, schema: &FeatureSchema) -> Result<()> {
    for column in &schema.numerical {
        table.map_column(column, |v| {
            transforms::extract_numeric(v).map_or(Value::Missing, Value::Number)
        })?;
    }
    Ok(())
}

fn map_intensities(table: &mut Table, schema: &FeatureSchema) -> Result<()> {
    for column in &schema.intensity {
        table.map_column(column, transforms::map_intensity)?;
    }
    Ok(())
}

fn project(table: &Table, columns: &[String]) -> Result<Table> {
    let names: Vec<&str> = columns.iter().map(String::as_str).collect();
    table.select(&names)
}
