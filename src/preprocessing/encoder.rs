use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::data::{Table, Value};
use crate::error::{LeadError, Result};

/// Per-column vocabularies learned at training time. Codes are the positions of the
/// categories in sorted order, so the same value always receives the same code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalEncoder {
    sentinel: String,
    classes: BTreeMap<String, Vec<String>>,
}

impl CategoricalEncoder {
    pub fn new(sentinel: impl Into<String>) -> Self {
        Self {
            sentinel: sentinel.into(),
            classes: BTreeMap::new(),
        }
    }

    /// Category a cell falls into; missing cells become the sentinel.
    fn category_of(&self, value: &Value) -> String {
        match value {
            Value::Text(s) => s.clone(),
            Value::Number(v) if v.is_nan() => self.sentinel.clone(),
            Value::Number(v) => v.to_string(),
            Value::Timestamp(ts) => ts.to_rfc3339(),
            Value::Missing => self.sentinel.clone(),
        }
    }

    pub fn fit(&mut self, table: &Table, columns: &[String]) -> Result<()> {
        for column in columns {
            let vocabulary: BTreeSet<String> = table
                .column(column)?
                .into_iter()
                .map(|v| self.category_of(v))
                .collect();

            debug!(column = %column, categories = vocabulary.len(), "Fitted categorical vocabulary");
            self.classes
                .insert(column.clone(), vocabulary.into_iter().collect());
        }
        Ok(())
    }

    /// Code for `category` in `column`. Unseen categories take the sentinel's code when the
    /// sentinel was learned, otherwise the first code past the vocabulary.
    pub fn code(&self, column: &str, category: &str) -> Result<usize> {
        let classes = self.classes.get(column).ok_or_else(|| {
            LeadError::Schema(format!("encoder was not fitted on column '{}'", column))
        })?;

        Ok(classes
            .binary_search_by(|c| c.as_str().cmp(category))
            .or_else(|_| {
                classes
                    .binary_search_by(|c| c.as_str().cmp(self.sentinel.as_str()))
            })
            .unwrap_or(classes.len()))
    }

    /// Replaces each fitted column with its integer codes.
    pub fn transform(&self, table: &mut Table) -> Result<()> {
        for column in self.classes.keys() {
            let codes = table
                .column(column)?
                .into_iter()
                .map(|v| self.code(column, &self.category_of(v)).map(|c| Value::Number(c as f64)))
                .collect::<Result<Vec<_>>>()?;
            table.set_column(column, codes)?;
        }
        Ok(())
    }

    pub fn classes(&self, column: &str) -> Option<&[String]> {
        self.classes.get(column).map(Vec::as_slice)
    }
}
