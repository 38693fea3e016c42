//! Multi-entity aggregation - one paginated run per district or tributary

use crate::ingestion::fetch::{
    fetch_paginated, FetchError, PageRequest, StopReason, UpstreamClient,
};
use crate::ingestion::table::Table;
use crate::ingestion::types::FetchSettings;
use reqwest::Url;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Fixed part of the per-entity request
#[derive(Debug, Clone)]
pub struct EntityTarget {
    pub url: Url,
    pub base_query: Vec<(String, String)>,
    /// Query parameter the entity name is substituted into
    pub child_param: &'static str,
    /// Column the entity name is written to when upstream rows lack it
    pub entity_column: &'static str,
    pub body: Vec<(String, String)>,
}

/// One requested entity: the name the caller used and the name sent upstream
#[derive(Debug, Clone, PartialEq)]
pub struct EntityName {
    pub requested: String,
    pub upstream: String,
}

impl EntityName {
    pub fn same(name: &str) -> Self {
        EntityName {
            requested: name.to_string(),
            upstream: name.to_string(),
        }
    }
}

#[derive(Debug)]
pub enum EntityOutcome {
    /// Rows were collected; `complete` is false if pagination ended on an error
    Fetched { table: Table, complete: bool },
    /// Upstream had no rows for this entity
    Empty,
    /// Nothing collected because the first request failed
    Failed(FetchError),
}

#[derive(Debug)]
pub struct EntityResult {
    pub entity: String,
    pub outcome: EntityOutcome,
}

/// Results of every entity, in request order
#[derive(Debug, Default)]
pub struct Aggregate {
    pub results: Vec<EntityResult>,
}

impl Aggregate {
    pub fn has_data(&self) -> bool {
        self.results
            .iter()
            .any(|r| matches!(r.outcome, EntityOutcome::Fetched { .. }))
    }

    pub fn failed(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, EntityOutcome::Failed(_)))
            .map(|r| r.entity.as_str())
            .collect()
    }

    /// Entities that returned rows but whose pagination ended on an error
    pub fn incomplete(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, EntityOutcome::Fetched { complete: false, .. }))
            .map(|r| r.entity.as_str())
            .collect()
    }

    /// Tables of entities that produced rows, in request order
    pub fn into_tables(self) -> Vec<Table> {
        self.results
            .into_iter()
            .filter_map(|r| match r.outcome {
                EntityOutcome::Fetched { table, .. } => Some(table),
                _ => None,
            })
            .collect()
    }
}

/// Spaces out successive entity requests; the first one goes out immediately
#[derive(Debug)]
pub struct Pacer {
    delay: Duration,
    started: bool,
}

impl Pacer {
    pub fn new(delay: Duration) -> Self {
        Pacer {
            delay,
            started: false,
        }
    }

    pub async fn wait(&mut self) {
        if self.started && !self.delay.is_zero() {
            debug!("Pacing for {:?}", self.delay);
            tokio::time::sleep(self.delay).await;
        }
        self.started = true;
    }
}

/// Fetch every entity in turn, pausing between requests.
/// A failing entity is recorded and skipped; it never aborts the others.
pub async fn fetch_entities(
    client: &UpstreamClient,
    target: &EntityTarget,
    entities: &[EntityName],
    settings: &FetchSettings,
) -> Aggregate {
    let mut aggregate = Aggregate::default();
    let mut pacer = Pacer::new(settings.pacing_delay);

    for entity in entities {
        pacer.wait().await;

        info!("Fetching data for {}: {}", target.child_param, entity.requested);

        let mut query = target.base_query.clone();
        query.push((target.child_param.to_string(), entity.upstream.clone()));

        let request = PageRequest {
            url: target.url.clone(),
            query,
            body: target.body.clone(),
        };

        let run = fetch_paginated(client, &request, settings.max_pages).await;
        let complete = run.is_complete();
        let pages = run.pages;

        let outcome = match (run.stop, run.records.is_empty()) {
            (StopReason::Failed(e), true) => {
                warn!("No data for {}: {}", entity.requested, e);
                EntityOutcome::Failed(e)
            }
            (_, true) => {
                info!("No data found for {}, skipping", entity.requested);
                EntityOutcome::Empty
            }
            (_, false) => {
                let mut table = Table::from_records(run.records);
                table.fill_column_if_absent(
                    target.entity_column,
                    Value::String(entity.requested.clone()),
                );
                if !complete {
                    warn!(
                        "Partial data for {}: {} rows before pagination failed",
                        entity.requested,
                        table.len()
                    );
                }
                info!(
                    "Downloaded {} records for {} ({} pages)",
                    table.len(),
                    entity.requested,
                    pages
                );
                EntityOutcome::Fetched { table, complete }
            }
        };

        aggregate.results.push(EntityResult {
            entity: entity.requested.clone(),
            outcome,
        });
    }

    aggregate
}
