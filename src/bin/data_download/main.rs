//! Command-line download - runs the same pipeline as `/download-data` and
//! writes the CSV to disk
//!
//! Usage: data-download dataCategory=admin "datasetName=Ground Water Level" \
//!            agencyName=CGWB stateName=Goa "districtName=North Goa" \
//!            startdate=2020-01-01 enddate=2020-12-31 [pivot=true]

use anyhow::{bail, Context, Result};
use serde_json::{Map, Value};
use std::env;
use tracing::{info, warn};
use wris_backend::config::Config;
use wris_backend::ingestion::download::{self, DownloadForm};
use wris_backend::ingestion::fetch::UpstreamClient;
use wris_backend::ingestion::write::write_csv_file;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .init();

    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    info!("Configuration loaded");

    let args: Vec<String> = env::args().skip(1).collect();
    let form = parse_args(&args)?;
    let plan = form.into_plan()?;

    let client = UpstreamClient::new(
        &config.base_url,
        config.request_timeout,
        config.lookup_timeout,
    )
    .context("Failed to build upstream client")?;
    let settings = config.fetch_settings();

    info!("=== {} download: {} ===", plan.category, plan.dataset_name);

    let Some(result) = download::collect(&client, &settings, &plan).await? else {
        warn!("No data could be downloaded for the selected criteria");
        return Ok(());
    };

    if let Some(warning) = &result.warning {
        warn!("{}", warning);
    }
    if !result.failed_entities.is_empty() {
        warn!("Failed entities: {}", result.failed_entities.join(", "));
    }
    if !result.incomplete_entities.is_empty() {
        warn!(
            "Incomplete entities (pagination stopped early): {}",
            result.incomplete_entities.join(", ")
        );
    }

    let path = write_csv_file(&result.table, &config.output_dir, &plan.filename())?;
    info!("✓ {} records written to {:?}", result.table.len(), path);

    Ok(())
}

/// Turn `key=value` arguments into a download form
fn parse_args(args: &[String]) -> Result<DownloadForm> {
    let mut fields = Map::new();
    for arg in args {
        let Some((key, value)) = arg.split_once('=') else {
            bail!("Expected key=value, got {:?}", arg);
        };
        fields.insert(key.trim().to_string(), Value::String(value.to_string()));
    }
    serde_json::from_value(Value::Object(fields)).context("Invalid download arguments")
}
