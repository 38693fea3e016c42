//! Download orchestration - validate a request, fetch every entity, shape
//! the result into preview + CSV

use crate::ingestion::aggregate::{fetch_entities, EntityName, EntityTarget};
use crate::ingestion::fetch::{FetchError, UpstreamClient};
use crate::ingestion::pivot::pivot_or_original;
use crate::ingestion::shape::{self, EntityMode, PREVIEW_LIMIT};
use crate::ingestion::table::Table;
use crate::ingestion::types::{DataCategory, FetchSettings, Record};
use crate::ingestion::utils::{
    filename_component, is_truthy, split_entities, upstream_district_name,
};
use crate::ingestion::write::to_csv_string;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

pub const NO_DATA_FILENAME: &str = "no_data.csv";

/// Upstream dataset whose basin endpoint is spelled without the space
const RIVER_WATER_LEVEL: (&str, &str) = ("River Water Level", "River WaterLevel");

/// Raw download fields as sent by the browser form (or a JSON body)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadForm {
    pub data_category: Option<String>,
    pub dataset_name: Option<String>,
    pub agency_name: Option<String>,
    #[serde(rename = "startdate")]
    pub start_date: Option<String>,
    #[serde(rename = "enddate")]
    pub end_date: Option<String>,
    pub state_name: Option<String>,
    pub district_name: Option<String>,
    pub river_name: Option<String>,
    pub tributary_name: Option<String>,
    pub pivot: Option<Value>,
}

#[derive(Debug, Error, PartialEq)]
pub enum DownloadError {
    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    #[error("Invalid data category: {0}")]
    InvalidCategory(String),
}

/// A validated download request
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadPlan {
    pub category: DataCategory,
    pub dataset_name: String,
    pub agency_name: String,
    /// State (admin) or river basin (basin)
    pub parent_name: String,
    pub entities: Vec<String>,
    pub multi_entity: bool,
    pub start_date: String,
    pub end_date: String,
    pub pivot: bool,
}

fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl DownloadForm {
    /// Validate, naming every missing field at once
    pub fn into_plan(self) -> Result<DownloadPlan, DownloadError> {
        let mut missing = Vec::new();

        let base = [
            ("dataCategory", &self.data_category),
            ("datasetName", &self.dataset_name),
            ("agencyName", &self.agency_name),
            ("startdate", &self.start_date),
            ("enddate", &self.end_date),
        ];
        for (name, field) in base {
            if present(field).is_none() {
                missing.push(name);
            }
        }

        let category = present(&self.data_category).map(|raw| (raw, DataCategory::parse(raw)));

        let unset: Option<String> = None;
        let (parent, children) = match category {
            Some((_, Some(DataCategory::Admin))) => (&self.state_name, &self.district_name),
            Some((_, Some(DataCategory::Basin))) => (&self.river_name, &self.tributary_name),
            _ => (&unset, &unset),
        };

        let (entities, multi_entity) = split_entities(children.as_deref().unwrap_or(""));
        if let Some((_, Some(category))) = category {
            if present(parent).is_none() {
                missing.push(category.parent_field());
            }
            if entities.is_empty() {
                missing.push(category.child_field());
            }
        }

        if !missing.is_empty() {
            return Err(DownloadError::MissingFields(missing));
        }

        let category = match category {
            Some((_, Some(category))) => category,
            Some((raw, None)) => return Err(DownloadError::InvalidCategory(raw.to_string())),
            None => return Err(DownloadError::MissingFields(vec!["dataCategory"])),
        };

        let text = |field: &Option<String>| present(field).unwrap_or_default().to_string();

        Ok(DownloadPlan {
            category,
            dataset_name: text(&self.dataset_name),
            agency_name: text(&self.agency_name),
            parent_name: text(parent),
            entities,
            multi_entity,
            start_date: text(&self.start_date),
            end_date: text(&self.end_date),
            pivot: self.pivot.as_ref().map(is_truthy).unwrap_or(false),
        })
    }
}

impl DownloadPlan {
    pub fn mode(&self) -> EntityMode {
        EntityMode::new(self.category, self.multi_entity)
    }

    /// Path segments of the upstream dataset endpoint
    pub fn dataset_path(&self) -> Vec<String> {
        match self.category {
            DataCategory::Admin => vec!["Dataset".to_string(), self.dataset_name.clone()],
            DataCategory::Basin => {
                let name = if self.dataset_name == RIVER_WATER_LEVEL.0 {
                    RIVER_WATER_LEVEL.1.to_string()
                } else {
                    self.dataset_name.clone()
                };
                vec!["Dataset".to_string(), "Basin".to_string(), name]
            }
        }
    }

    pub fn base_query(&self) -> Vec<(String, String)> {
        vec![
            ("agencyName".to_string(), self.agency_name.clone()),
            (
                self.category.parent_param().to_string(),
                self.parent_name.clone(),
            ),
        ]
    }

    pub fn body_params(&self, page_size: u32) -> Vec<(String, String)> {
        vec![
            ("startdate".to_string(), self.start_date.clone()),
            ("enddate".to_string(), self.end_date.clone()),
            ("size".to_string(), page_size.to_string()),
            ("download".to_string(), "true".to_string()),
        ]
    }

    /// Requested names paired with their upstream spelling
    pub fn entity_names(&self) -> Vec<EntityName> {
        self.entities
            .iter()
            .map(|name| match self.category {
                DataCategory::Admin => EntityName {
                    requested: name.clone(),
                    upstream: upstream_district_name(name, &self.parent_name),
                },
                DataCategory::Basin => EntityName::same(name),
            })
            .collect()
    }

    pub fn target(
        &self,
        client: &UpstreamClient,
        settings: &FetchSettings,
    ) -> Result<EntityTarget, FetchError> {
        Ok(EntityTarget {
            url: client.endpoint(self.dataset_path())?,
            base_query: self.base_query(),
            child_param: self.category.child_param(),
            entity_column: self.category.entity_column(),
            body: self.body_params(settings.page_size),
        })
    }

    pub fn filename(&self) -> String {
        let child = if self.multi_entity {
            self.category.all_entities_label().to_string()
        } else {
            filename_component(self.entities.first().map(String::as_str).unwrap_or_default())
        };
        let suffix = if self.pivot { "_yearly" } else { "" };
        format!(
            "{}_{}_data_{}{}.csv",
            filename_component(&self.dataset_name),
            self.category,
            child,
            suffix
        )
    }
}

/// Response body of a download
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DownloadOutput {
    pub preview: Vec<Record>,
    pub csv_data: String,
    pub total_records: usize,
    pub filename: String,
    pub pivoted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    /// Entities whose requests failed outright
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_entities: Vec<String>,
    /// Entities whose rows stop where pagination hit an error
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub incomplete_entities: Vec<String>,
}

impl DownloadOutput {
    pub fn empty() -> Self {
        DownloadOutput {
            preview: Vec::new(),
            csv_data: String::new(),
            total_records: 0,
            filename: NO_DATA_FILENAME.to_string(),
            pivoted: false,
            warning: None,
            failed_entities: Vec::new(),
            incomplete_entities: Vec::new(),
        }
    }
}

/// Final table of a download plus how it was produced
#[derive(Debug)]
pub struct DownloadTable {
    pub table: Table,
    pub pivoted: bool,
    pub warning: Option<String>,
    pub failed_entities: Vec<String>,
    pub incomplete_entities: Vec<String>,
}

/// Fetch and shape a plan's data; `None` when no entity produced rows
pub async fn collect(
    client: &UpstreamClient,
    settings: &FetchSettings,
    plan: &DownloadPlan,
) -> Result<Option<DownloadTable>, FetchError> {
    let target = plan.target(client, settings)?;
    let entities = plan.entity_names();

    info!(
        "Download {} '{}' for {} entities",
        plan.category,
        plan.dataset_name,
        entities.len()
    );

    let aggregate = fetch_entities(client, &target, &entities, settings).await;
    let failed_entities: Vec<String> = aggregate.failed().into_iter().map(String::from).collect();
    let incomplete_entities: Vec<String> = aggregate
        .incomplete()
        .into_iter()
        .map(String::from)
        .collect();

    if !aggregate.has_data() {
        warn!("No data could be downloaded for the selected criteria");
        return Ok(None);
    }

    let mode = plan.mode();
    let table = shape::combine(aggregate.into_tables(), mode);

    let (table, pivoted, warning) = if plan.pivot {
        let outcome = pivot_or_original(table, plan.category);
        let pivoted = outcome.is_pivoted();
        let warning = outcome.warning();
        (outcome.into_table(), pivoted, warning)
    } else {
        (table, false, None)
    };

    Ok(Some(DownloadTable {
        table,
        pivoted,
        warning,
        failed_entities,
        incomplete_entities,
    }))
}

/// Run a download end to end and build the response body
pub async fn run(
    client: &UpstreamClient,
    settings: &FetchSettings,
    plan: &DownloadPlan,
) -> anyhow::Result<DownloadOutput> {
    let Some(result) = collect(client, settings, plan).await? else {
        return Ok(DownloadOutput::empty());
    };

    let front = plan.mode().front_column();
    let preview = shape::preview(&result.table, PREVIEW_LIMIT, front);
    let csv_data = to_csv_string(&result.table)?;

    info!(
        "Prepared {} records ({} in preview)",
        result.table.len(),
        preview.len()
    );

    Ok(DownloadOutput {
        preview,
        csv_data,
        total_records: result.table.len(),
        filename: plan.filename(),
        pivoted: result.pivoted,
        warning: result.warning,
        failed_entities: result.failed_entities,
        incomplete_entities: result.incomplete_entities,
    })
}
