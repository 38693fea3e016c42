//! Column-schema table used between pipeline stages
//!
//! Upstream records share no fixed schema, so a `Table` carries its column
//! list explicitly and every row is aligned to it. Cells a source record did
//! not provide are `Value::Null`.

use crate::ingestion::types::Record;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Table {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a table from records; columns appear in first-seen order
    pub fn from_records(records: impl IntoIterator<Item = Record>) -> Self {
        let mut table = Table::default();
        for record in records {
            table.push_record(record);
        }
        table
    }

    /// Append a record, widening the schema for keys not seen before
    pub fn push_record(&mut self, record: Record) {
        let mut row = vec![Value::Null; self.columns.len()];
        for (key, value) in record {
            match self.column_index(&key) {
                Some(idx) => row[idx] = value,
                None => {
                    self.columns.push(key);
                    for existing in &mut self.rows {
                        existing.push(Value::Null);
                    }
                    row.push(value);
                }
            }
        }
        self.rows.push(row);
    }

    /// Append a row aligned to the current columns, padding short rows with null
    pub fn push_row(&mut self, mut row: Vec<Value>) {
        row.resize(self.columns.len(), Value::Null);
        self.rows.push(row);
    }

    /// Stack tables in order; the schema is the union of all columns
    pub fn concat(tables: impl IntoIterator<Item = Table>) -> Table {
        let mut combined = Table::default();
        for table in tables {
            let positions: Vec<usize> = table
                .columns
                .iter()
                .map(|name| combined.ensure_column(name))
                .collect();
            let width = combined.columns.len();
            for row in table.rows {
                let mut aligned = vec![Value::Null; width];
                for (value, &pos) in row.into_iter().zip(&positions) {
                    aligned[pos] = value;
                }
                combined.rows.push(aligned);
            }
        }
        combined
    }

    fn ensure_column(&mut self, name: &str) -> usize {
        if let Some(idx) = self.column_index(name) {
            return idx;
        }
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.push(Value::Null);
        }
        self.columns.len() - 1
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Subset of `wanted` actually present, in the given order
    pub fn present_columns<'a>(&self, wanted: &[&'a str]) -> Vec<&'a str> {
        wanted
            .iter()
            .copied()
            .filter(|name| self.has_column(name))
            .collect()
    }

    pub fn cell(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).map(|r| &r[idx])
    }

    /// Add a column filled with `value` if it does not exist yet
    pub fn fill_column_if_absent(&mut self, name: &str, value: Value) -> bool {
        if self.has_column(name) {
            return false;
        }
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.push(value.clone());
        }
        true
    }

    /// Rewrite every cell of one column; returns false if the column is absent
    pub fn map_column<F>(&mut self, name: &str, mut f: F) -> bool
    where
        F: FnMut(&Value) -> Value,
    {
        let Some(idx) = self.column_index(name) else {
            return false;
        };
        for row in &mut self.rows {
            row[idx] = f(&row[idx]);
        }
        true
    }

    /// Stable ascending sort on the given columns, nulls last per key.
    /// Keys naming absent columns are ignored.
    pub fn sort_by_columns(&mut self, keys: &[&str]) {
        let indices: Vec<usize> = keys.iter().filter_map(|k| self.column_index(k)).collect();
        if indices.is_empty() {
            return;
        }
        self.rows.sort_by(|a, b| {
            indices
                .iter()
                .map(|&i| compare_cells(&a[i], &b[i]))
                .find(|ord| *ord != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });
    }

    /// First `n` rows with the same schema
    pub fn head(&self, n: usize) -> Table {
        Table {
            columns: self.columns.clone(),
            rows: self.rows.iter().take(n).cloned().collect(),
        }
    }

    /// Reorder columns so `name` comes first; false if it is absent
    pub fn move_column_to_front(&mut self, name: &str) -> bool {
        let Some(idx) = self.column_index(name) else {
            return false;
        };
        if idx == 0 {
            return true;
        }
        let column = self.columns.remove(idx);
        self.columns.insert(0, column);
        for row in &mut self.rows {
            let value = row.remove(idx);
            row.insert(0, value);
        }
        true
    }

    /// Rename every column through `f`, failing on the first collision
    pub fn rename_columns<F>(&mut self, mut f: F) -> Result<(), String>
    where
        F: FnMut(&str) -> String,
    {
        let mut seen: HashMap<String, usize> = HashMap::new();
        let mut renamed = Vec::with_capacity(self.columns.len());
        for (idx, name) in self.columns.iter().enumerate() {
            let new_name = f(name);
            if seen.insert(new_name.clone(), idx).is_some() {
                return Err(new_name);
            }
            renamed.push(new_name);
        }
        self.columns = renamed;
        Ok(())
    }

    /// Rows as JSON objects, keys in column order
    pub fn to_records(&self) -> Vec<Record> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect::<Map<String, Value>>()
            })
            .collect()
    }
}

/// Ordering used for sorting mixed JSON cells.
/// Null sorts after everything; numbers before strings before other values.
pub fn compare_cells(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Greater,
        (_, Value::Null) => Ordering::Less,
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(f64::NAN), y.as_f64().unwrap_or(f64::NAN));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => type_rank(a)
            .cmp(&type_rank(b))
            .then_with(|| a.to_string().cmp(&b.to_string())),
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Number(_) => 0,
        Value::String(_) => 1,
        Value::Bool(_) => 2,
        Value::Array(_) => 3,
        Value::Object(_) => 4,
        Value::Null => 5,
    }
}
