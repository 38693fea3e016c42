//! Write functions - serialize tables to CSV

use crate::ingestion::table::Table;
use anyhow::{Context, Result};
use serde_json::Value;
use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Serialize the full table: header row, then one line per row.
/// Null cells are empty fields; nested values are written as compact JSON.
pub fn to_csv_string(table: &Table) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());

    if !table.columns().is_empty() {
        writer.write_record(table.columns())?;
    }

    for row in table.rows() {
        writer.write_record(row.iter().map(|cell| csv_field(cell).into_owned()))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush CSV writer: {}", e))?;

    String::from_utf8(bytes).context("CSV output is not valid UTF-8")
}

fn csv_field(value: &Value) -> Cow<'_, str> {
    match value {
        Value::Null => Cow::Borrowed(""),
        Value::String(s) => Cow::Borrowed(s),
        Value::Bool(b) => Cow::Borrowed(if *b { "true" } else { "false" }),
        Value::Number(n) => Cow::Owned(n.to_string()),
        nested => Cow::Owned(nested.to_string()),
    }
}

/// Write the CSV for `table` to `dir/filename`, creating `dir` if needed
pub fn write_csv_file(table: &Table, dir: &Path, filename: &str) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;

    let path = dir.join(filename);
    let csv_data = to_csv_string(table)?;
    fs::write(&path, csv_data).with_context(|| format!("Failed to write {:?}", path))?;

    info!("Wrote {} rows to {:?}", table.len(), path);

    Ok(path)
}
