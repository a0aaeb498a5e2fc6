use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

use super::table::{Table, Value};
use crate::error::{LeadError, Result};

/// Loads a headed CSV file. Every non-missing cell is kept as text; typing happens
/// during preprocessing.
pub fn load_csv(path: impl AsRef<Path>) -> Result<Table> {
    let path = path.as_ref();
    info!(path = %path.display(), "Loading data");

    let file = File::open(path).map_err(|e| LeadError::file_access(path, e))?;
    let table = read_csv(file)?;

    info!(rows = table.n_rows(), columns = table.n_cols(), "Data loaded");
    Ok(table)
}

pub fn read_csv<R: Read>(reader: R) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(reader);

    let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut table = Table::new(columns);

    for record in reader.records() {
        let record = record?;
        let row = record.iter().map(Value::from_raw_text).collect();
        table.push_row(row)?;
    }

    debug!(rows = table.n_rows(), "Parsed CSV records");
    Ok(table)
}
