//! Catalog lookups - the upstream lists behind the selection dropdowns

use crate::ingestion::fetch::{FetchError, UpstreamClient};
use serde_json::{json, Value};
use tracing::info;

/// One upstream catalog query
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Datasets,
    States {
        dataset_code: Value,
    },
    Districts {
        state_code: Value,
        dataset_code: Value,
    },
    Rivers {
        dataset_code: Value,
    },
    Tributaries {
        basin_code: Value,
        dataset_code: Value,
    },
    Agencies {
        district_id: Value,
        dataset_code: Value,
        tributary_id: Value,
    },
}

impl Lookup {
    pub fn name(&self) -> &'static str {
        match self {
            Lookup::Datasets => "datasets",
            Lookup::States { .. } => "states",
            Lookup::Districts { .. } => "districts",
            Lookup::Rivers { .. } => "rivers",
            Lookup::Tributaries { .. } => "tributaries",
            Lookup::Agencies { .. } => "agencies",
        }
    }

    /// Upstream path segments
    pub fn path(&self) -> [&'static str; 2] {
        match self {
            Lookup::Datasets => ["DataSet", "DataSetList"],
            Lookup::States { .. } => ["masterState", "StateList"],
            Lookup::Districts { .. } => ["masterDistrict", "getDistrictbyState"],
            Lookup::Rivers { .. } => ["basin", "getMasterBasin"],
            Lookup::Tributaries { .. } => ["masterTributary", "getMasterTributary"],
            Lookup::Agencies { .. } => ["masterAgency", "AgencyListInAnyCase"],
        }
    }

    /// JSON body the upstream endpoint expects
    pub fn payload(&self) -> Value {
        match self {
            Lookup::Datasets => json!({
                "headers": {"normalizedNames": {}, "lazyUpdate": null}
            }),
            Lookup::States { dataset_code } | Lookup::Rivers { dataset_code } => {
                json!({ "datasetcode": dataset_code })
            }
            Lookup::Districts {
                state_code,
                dataset_code,
            } => json!({ "statecode": state_code, "datasetcode": dataset_code }),
            Lookup::Tributaries {
                basin_code,
                dataset_code,
            } => json!({ "basincode": basin_code, "datasetcode": dataset_code }),
            Lookup::Agencies {
                district_id,
                dataset_code,
                tributary_id,
            } => json!({
                "district_id": district_id,
                "datasetcode": dataset_code,
                "localriverid": 0,
                "tributaryid": tributary_id,
            }),
        }
    }
}

/// Run a lookup and return the `data` list of the response (empty if absent)
pub async fn fetch_lookup(
    client: &UpstreamClient,
    lookup: &Lookup,
) -> Result<Vec<Value>, FetchError> {
    client.refresh_session().await;

    let url = client.endpoint(lookup.path())?;
    let body = client.post_json(&url, &lookup.payload()).await?;
    let items = extract_data_list(body);

    info!("Lookup {} returned {} entries", lookup.name(), items.len());

    Ok(items)
}

fn extract_data_list(body: Value) -> Vec<Value> {
    match body {
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}
