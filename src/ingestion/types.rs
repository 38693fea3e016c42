//! Core data types for the download pipeline
//! Mostly plain data; behavior lives in the pipeline stages

use serde_json::{Map, Value};

/// One upstream observation row, keyed by whatever columns the API returned
pub type Record = Map<String, Value>;

/// Decoded body of one paginated response - tagged union
///
/// The upstream service answers with either a bare list of records or a
/// mapping that carries the list under some key (`data`, `content`, ...).
#[derive(Debug, Clone, PartialEq)]
pub enum PagePayload {
    List(Vec<Value>),
    Wrapped(Map<String, Value>),
}

/// Dataset hierarchy the caller is browsing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataCategory {
    /// State -> district
    Admin,
    /// River basin -> tributary
    Basin,
}

impl DataCategory {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(DataCategory::Admin),
            "basin" => Some(DataCategory::Basin),
            _ => None,
        }
    }

    /// Form field holding the parent name (state or river basin)
    pub fn parent_field(&self) -> &'static str {
        match self {
            DataCategory::Admin => "stateName",
            DataCategory::Basin => "riverName",
        }
    }

    /// Form field holding the comma-delimited entity list
    pub fn child_field(&self) -> &'static str {
        match self {
            DataCategory::Admin => "districtName",
            DataCategory::Basin => "tributaryName",
        }
    }

    /// Query parameter the parent name is sent upstream as
    pub fn parent_param(&self) -> &'static str {
        match self {
            DataCategory::Admin => "stateName",
            DataCategory::Basin => "basinName",
        }
    }

    /// Query parameter each entity name is sent upstream as
    pub fn child_param(&self) -> &'static str {
        self.child_field()
    }

    /// Column identifying the entity in upstream records
    pub fn entity_column(&self) -> &'static str {
        match self {
            DataCategory::Admin => "district",
            DataCategory::Basin => "tributary",
        }
    }

    /// Filename label used when every entity was requested
    pub fn all_entities_label(&self) -> &'static str {
        match self {
            DataCategory::Admin => "All_Districts",
            DataCategory::Basin => "All_Tributaries",
        }
    }

    /// Station metadata columns kept per category when pivoting (lowercase)
    pub fn pivot_fields(&self) -> &'static [&'static str] {
        match self {
            DataCategory::Admin => &["district", "tehsil", "block"],
            DataCategory::Basin => &["basin", "subbasin", "tributary"],
        }
    }
}

impl std::fmt::Display for DataCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataCategory::Admin => write!(f, "admin"),
            DataCategory::Basin => write!(f, "basin"),
        }
    }
}

/// Knobs shared by every paginated run
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub page_size: u32,
    pub max_pages: u32, // 0 = no limit
    pub pacing_delay: std::time::Duration,
}
