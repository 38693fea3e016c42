//! Pivot transformer - one row per station, one mean column per year
//!
//! Station metadata is aggregated from every row that carries a station
//! code, and the yearly means are joined onto that list afterwards. A
//! station whose readings are all missing or undated therefore still shows
//! up, with empty year columns.

use crate::ingestion::parse::{parse_number, station_code, timestamp_year};
use crate::ingestion::table::Table;
use crate::ingestion::types::DataCategory;
use serde_json::{Number, Value};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::{info, warn};

pub const STATION_CODE: &str = "stationcode";
pub const OBSERVATION: &str = "datavalue";
pub const OBSERVED_AT: &str = "datatime";

/// Metadata taking the first non-null value per station
const FIRST_FIELDS: &[&str] = &["stationname", "stationtype", "unit", "agencyname", "state"];

/// Metadata averaged per station
const MEAN_FIELDS: &[&str] = &["latitude", "longitude", "wellaltitude", "welldepth"];

#[derive(Debug, Error, PartialEq)]
pub enum PivotError {
    #[error("no station code column")]
    MissingStationCode,

    #[error("duplicate column after lowercasing: {0}")]
    DuplicateColumn(String),

    #[error("no row carries a station code")]
    NoStations,
}

/// Result of a pivot request. The unpivoted variant is the degraded mode:
/// the caller still gets the original table, plus the reason.
#[derive(Debug)]
pub enum PivotOutcome {
    Pivoted(Table),
    Unpivoted { table: Table, reason: PivotError },
}

impl PivotOutcome {
    pub fn is_pivoted(&self) -> bool {
        matches!(self, PivotOutcome::Pivoted(_))
    }

    pub fn warning(&self) -> Option<String> {
        match self {
            PivotOutcome::Pivoted(_) => None,
            PivotOutcome::Unpivoted { reason, .. } => {
                Some(format!("Yearly pivot unavailable ({}); returning raw rows", reason))
            }
        }
    }

    pub fn into_table(self) -> Table {
        match self {
            PivotOutcome::Pivoted(table) | PivotOutcome::Unpivoted { table, .. } => table,
        }
    }
}

/// Pivot `table`, falling back to the untouched input on failure
pub fn pivot_or_original(table: Table, category: DataCategory) -> PivotOutcome {
    match pivot_yearly(&table, category) {
        Ok(pivoted) => {
            info!(
                "Pivoted {} rows into {} stations",
                table.len(),
                pivoted.len()
            );
            PivotOutcome::Pivoted(pivoted)
        }
        Err(reason) => {
            warn!("Pivot failed, returning original table: {}", reason);
            PivotOutcome::Unpivoted { table, reason }
        }
    }
}

#[derive(Default)]
struct StationAccum {
    first: Vec<Option<Value>>,
    sums: Vec<(f64, usize)>,
    years: BTreeMap<i32, (f64, usize)>,
}

/// Regroup raw readings into one row per station code.
///
/// Output columns: `stationcode`, the first-value metadata present in the
/// input, the averaged position fields present, then one column per year in
/// ascending order. Rows are ordered by station code.
pub fn pivot_yearly(table: &Table, category: DataCategory) -> Result<Table, PivotError> {
    let mut table = table.clone();
    table
        .rename_columns(|name| name.to_lowercase())
        .map_err(PivotError::DuplicateColumn)?;

    let code_idx = table
        .column_index(STATION_CODE)
        .ok_or(PivotError::MissingStationCode)?;

    let first_fields: Vec<&str> = FIRST_FIELDS
        .iter()
        .chain(category.pivot_fields())
        .copied()
        .filter(|name| table.has_column(name))
        .collect();
    let mean_fields = table.present_columns(MEAN_FIELDS);

    let first_idx: Vec<usize> = first_fields
        .iter()
        .filter_map(|name| table.column_index(name))
        .collect();
    let mean_idx: Vec<usize> = mean_fields
        .iter()
        .filter_map(|name| table.column_index(name))
        .collect();
    let value_idx = table.column_index(OBSERVATION);
    let time_idx = table.column_index(OBSERVED_AT);

    let mut stations: BTreeMap<String, StationAccum> = BTreeMap::new();
    let mut all_years: BTreeSet<i32> = BTreeSet::new();
    let mut dropped = 0usize;

    for row in table.rows() {
        let Some(code) = station_code(&row[code_idx]) else {
            dropped += 1;
            continue;
        };

        let accum = stations.entry(code).or_insert_with(|| StationAccum {
            first: vec![None; first_idx.len()],
            sums: vec![(0.0, 0); mean_idx.len()],
            years: BTreeMap::new(),
        });

        for (slot, &idx) in accum.first.iter_mut().zip(&first_idx) {
            if slot.is_none() && !row[idx].is_null() {
                *slot = Some(row[idx].clone());
            }
        }

        for (slot, &idx) in accum.sums.iter_mut().zip(&mean_idx) {
            if let Some(n) = parse_number(&row[idx]) {
                slot.0 += n;
                slot.1 += 1;
            }
        }

        let reading = value_idx.and_then(|i| parse_number(&row[i]));
        let year = time_idx.and_then(|i| timestamp_year(&row[i]));
        if let (Some(reading), Some(year)) = (reading, year) {
            let entry = accum.years.entry(year).or_insert((0.0, 0));
            entry.0 += reading;
            entry.1 += 1;
            all_years.insert(year);
        }
    }

    if dropped > 0 {
        info!("Dropped {} rows without a station code", dropped);
    }
    if stations.is_empty() {
        return Err(PivotError::NoStations);
    }

    let mut columns = vec![STATION_CODE.to_string()];
    columns.extend(first_fields.iter().map(|s| s.to_string()));
    columns.extend(mean_fields.iter().map(|s| s.to_string()));
    columns.extend(all_years.iter().map(|y| y.to_string()));

    let mut pivoted = Table::new(columns);
    for (code, accum) in stations {
        let mut row = Vec::with_capacity(pivoted.columns().len());
        row.push(Value::String(code));
        row.extend(
            accum
                .first
                .into_iter()
                .map(|v| v.unwrap_or_else(|| Value::String(String::new()))),
        );
        row.extend(accum.sums.iter().map(|&(sum, count)| mean_value(sum, count)));
        row.extend(all_years.iter().map(|year| match accum.years.get(year) {
            Some(&(sum, count)) => mean_value(sum, count),
            None => Value::Null,
        }));
        pivoted.push_row(row);
    }

    Ok(pivoted)
}

fn mean_value(sum: f64, count: usize) -> Value {
    if count == 0 {
        return Value::Null;
    }
    Number::from_f64(sum / count as f64)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table(rows: Vec<Value>) -> Table {
        Table::from_records(rows.into_iter().map(|v| v.as_object().cloned().unwrap()))
    }

    fn readings() -> Table {
        table(vec![
            json!({"stationCode": " W1 ", "stationName": "Wadgaon", "district": "Pune",
                   "latitude": 18.0, "dataTime": "2019-01-01 00:00:00", "dataValue": 2.0}),
            json!({"stationCode": "W1", "stationName": "Wadgaon", "district": "Pune",
                   "latitude": "18.5", "dataTime": "2019-06-01 00:00:00", "dataValue": 4.0}),
            json!({"stationCode": "W1", "stationName": null, "district": "Pune",
                   "latitude": 18.0, "dataTime": "2020-01-01 00:00:00", "dataValue": 10.0}),
            json!({"stationCode": "A7", "stationName": null, "district": null,
                   "latitude": null, "dataTime": "2020-01-01 00:00:00", "dataValue": null}),
            json!({"stationCode": null, "stationName": "Ghost", "district": "Pune",
                   "latitude": 1.0, "dataTime": "2020-01-01 00:00:00", "dataValue": 99.0}),
            json!({"stationCode": "Z3", "stationName": "Zari", "district": "Satara",
                   "latitude": 17.0, "dataTime": "bad", "dataValue": 5.0}),
        ])
    }

    #[test]
    fn test_pivot_columns_and_order() {
        let pivoted = pivot_yearly(&readings(), DataCategory::Admin).unwrap();

        assert_eq!(
            pivoted.columns(),
            &["stationcode", "stationname", "district", "latitude", "2019", "2020"]
        );
        let codes: Vec<&Value> = (0..pivoted.len())
            .map(|i| pivoted.cell(i, "stationcode").unwrap())
            .collect();
        assert_eq!(codes, vec![&json!("A7"), &json!("W1"), &json!("Z3")]);
    }

    #[test]
    fn test_pivot_yearly_means() {
        let pivoted = pivot_yearly(&readings(), DataCategory::Admin).unwrap();

        // W1 is row 1
        assert_eq!(pivoted.cell(1, "2019"), Some(&json!(3.0)));
        assert_eq!(pivoted.cell(1, "2020"), Some(&json!(10.0)));
        assert_eq!(pivoted.cell(1, "stationname"), Some(&json!("Wadgaon")));
        let latitude = pivoted.cell(1, "latitude").unwrap().as_f64().unwrap();
        assert!((latitude - 18.1666).abs() < 0.001);
    }

    #[test]
    fn test_pivot_keeps_stations_without_yearly_values() {
        let pivoted = pivot_yearly(&readings(), DataCategory::Admin).unwrap();

        assert_eq!(pivoted.len(), 3);
        // A7 has no reading, Z3 has no valid timestamp
        assert_eq!(pivoted.cell(0, "2019"), Some(&Value::Null));
        assert_eq!(pivoted.cell(0, "2020"), Some(&Value::Null));
        assert_eq!(pivoted.cell(2, "2020"), Some(&Value::Null));
        // Text metadata nulls are exported as empty strings
        assert_eq!(pivoted.cell(0, "stationname"), Some(&json!("")));
        assert_eq!(pivoted.cell(0, "district"), Some(&json!("")));
        assert_eq!(pivoted.cell(0, "latitude"), Some(&Value::Null));
    }

    #[test]
    fn test_pivot_every_station_exactly_once() {
        let input = readings();
        let pivoted = pivot_yearly(&input, DataCategory::Admin).unwrap();

        let mut expected: Vec<String> = (0..input.len())
            .filter_map(|i| station_code(input.cell(i, "stationCode").unwrap()))
            .collect();
        expected.sort();
        expected.dedup();

        let actual: Vec<String> = (0..pivoted.len())
            .map(|i| pivoted.cell(i, "stationcode").unwrap().as_str().unwrap().to_string())
            .collect();

        assert_eq!(actual, expected);
    }

    #[test]
    fn test_basin_fields() {
        let input = table(vec![json!({
            "StationCode": "R1", "Basin": "Krishna", "Tributary": "Bhima",
            "District": "Pune", "DataTime": "2021-03-01 00:00:00", "DataValue": 1.25
        })]);

        let pivoted = pivot_yearly(&input, DataCategory::Basin).unwrap();

        assert_eq!(
            pivoted.columns(),
            &["stationcode", "basin", "tributary", "2021"]
        );
    }

    #[test]
    fn test_missing_station_column_falls_back() {
        let input = table(vec![json!({"stationName": "X", "dataValue": 1})]);

        let outcome = pivot_or_original(input.clone(), DataCategory::Admin);

        assert!(!outcome.is_pivoted());
        assert!(outcome.warning().is_some());
        match outcome {
            PivotOutcome::Unpivoted { table, reason } => {
                assert_eq!(reason, PivotError::MissingStationCode);
                assert_eq!(table, input);
            }
            PivotOutcome::Pivoted(_) => panic!("Expected Unpivoted"),
        }
    }

    #[test]
    fn test_duplicate_columns_fall_back() {
        let input = table(vec![json!({"stationCode": "A", "stationcode": "B"})]);

        let outcome = pivot_or_original(input, DataCategory::Admin);

        match outcome {
            PivotOutcome::Unpivoted { reason, .. } => {
                assert_eq!(reason, PivotError::DuplicateColumn("stationcode".to_string()));
            }
            PivotOutcome::Pivoted(_) => panic!("Expected Unpivoted"),
        }
    }

    #[test]
    fn test_no_station_codes_falls_back() {
        let input = table(vec![json!({"stationCode": "  ", "dataValue": 1})]);

        assert_eq!(
            pivot_yearly(&input, DataCategory::Admin),
            Err(PivotError::NoStations)
        );
    }
}
