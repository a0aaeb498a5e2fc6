use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::data::{Table, Value};
use crate::error::{LeadError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColumnStats {
    /// Training mean of the observed values; `None` when the column had none.
    pub fill: Option<f64>,
    pub mean: f64,
    pub scale: f64,
}

/// Learned once on the training table, then applied unchanged to every later batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    params: BTreeMap<String, ColumnStats>,
}

impl StandardScaler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fit(&mut self, table: &Table, columns: &[String]) -> Result<()> {
        for column in columns {
            let observed: Vec<f64> = table
                .column(column)?
                .into_iter()
                .filter_map(Value::as_number)
                .collect();

            let stats = if observed.is_empty() {
                warn!(column = %column, "No observed values, column stays missing");
                ColumnStats {
                    fill: None,
                    mean: 0.0,
                    scale: 1.0,
                }
            } else {
                let fill = observed.iter().mean();
                let n_missing = table.n_rows() - observed.len();
                let filled: Vec<f64> = observed
                    .iter()
                    .copied()
                    .chain(std::iter::repeat(fill).take(n_missing))
                    .collect();

                let mean = filled.iter().mean();
                let std = filled.iter().population_std_dev();
                ColumnStats {
                    fill: Some(fill),
                    mean,
                    scale: if std.is_finite() && std > 0.0 { std } else { 1.0 },
                }
            };

            debug!(column = %column, ?stats, "Fitted scaler");
            self.params.insert(column.clone(), stats);
        }
        Ok(())
    }

    /// Fills missing cells with the training mean and rescales every fitted column.
    pub fn transform(&self, table: &mut Table) -> Result<()> {
        for (column, stats) in &self.params {
            table.map_column(column, |v| {
                match v.as_number().or(stats.fill) {
                    Some(x) => Value::Number((x - stats.mean) / stats.scale),
                    None => Value::Missing,
                }
            })?;
        }
        Ok(())
    }

    pub fn inverse_transform(&self, table: &mut Table) -> Result<()> {
        for (column, stats) in &self.params {
            table.map_column(column, |v| match v.as_number() {
                Some(z) => Value::Number(z * stats.scale + stats.mean),
                None => Value::Missing,
            })?;
        }
        Ok(())
    }

    pub fn stats(&self, column: &str) -> Result<&ColumnStats> {
        self.params.get(column).ok_or_else(|| {
            LeadError::Schema(format!("scaler was not fitted on column '{}'", column))
        })
    }
}
