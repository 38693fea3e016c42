//! Shape functions - combine, normalize, sort and preview downloaded tables

use crate::ingestion::parse::normalize_timestamp;
use crate::ingestion::table::Table;
use crate::ingestion::types::{DataCategory, Record};
use serde_json::Value;
use tracing::{debug, info};

/// Rows returned inline with a download response
pub const PREVIEW_LIMIT: usize = 100;

pub const TIME_COLUMN: &str = "dataTime";
pub const STATION_COLUMN: &str = "stationCode";

/// How many entities a download covered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityMode {
    Single,
    Multi(DataCategory),
}

impl EntityMode {
    pub fn new(category: DataCategory, multi: bool) -> Self {
        if multi {
            EntityMode::Multi(category)
        } else {
            EntityMode::Single
        }
    }

    /// Sort keys in priority order
    pub fn sort_keys(&self) -> Vec<&'static str> {
        match self {
            EntityMode::Single => vec![STATION_COLUMN, TIME_COLUMN],
            EntityMode::Multi(category) => {
                vec![category.entity_column(), STATION_COLUMN, TIME_COLUMN]
            }
        }
    }

    /// Column pulled to the front of the preview
    pub fn front_column(&self) -> Option<&'static str> {
        match self {
            EntityMode::Single => None,
            EntityMode::Multi(category) => Some(category.entity_column()),
        }
    }
}

/// Canonicalize the time column in place; returns how many cells became null
pub fn normalize_time_column(table: &mut Table) -> usize {
    let mut nulled = 0;
    table.map_column(TIME_COLUMN, |value| match normalize_timestamp(value) {
        Some(ts) => Value::String(ts),
        None => {
            if !value.is_null() {
                nulled += 1;
            }
            Value::Null
        }
    });
    nulled
}

/// Concatenate per-entity tables, normalize timestamps and sort for `mode`
pub fn combine(tables: Vec<Table>, mode: EntityMode) -> Table {
    let mut table = Table::concat(tables);

    let nulled = normalize_time_column(&mut table);
    if nulled > 0 {
        debug!("{} timestamps could not be parsed and were cleared", nulled);
    }

    let keys = table.present_columns(&mode.sort_keys());
    if !keys.is_empty() {
        info!("Sorting {} rows by {:?}", table.len(), keys);
        table.sort_by_columns(&keys);
    }

    table
}

/// First `limit` rows as JSON objects; absent cells are explicit nulls
pub fn preview(table: &Table, limit: usize, front_column: Option<&str>) -> Vec<Record> {
    let mut head = table.head(limit);
    if let Some(column) = front_column {
        head.move_column_to_front(column);
    }
    head.to_records()
}
