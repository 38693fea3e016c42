mod common;

use common::{client, date, MockPage, MockUpstream};
use serde_json::json;
use std::time::{Duration, Instant};
use wris_backend::ingestion::aggregate::{
    fetch_entities, EntityName, EntityOutcome, EntityTarget,
};
use wris_backend::ingestion::fetch::{FetchError, UpstreamClient};
use wris_backend::ingestion::FetchSettings;

fn target(client: &UpstreamClient) -> EntityTarget {
    EntityTarget {
        url: client.endpoint(["Dataset", "Ground Water Level"]).unwrap(),
        base_query: vec![
            ("agencyName".to_string(), "CGWB".to_string()),
            ("stateName".to_string(), "Maharashtra".to_string()),
        ],
        child_param: "districtName",
        entity_column: "district",
        body: vec![("size".to_string(), "2".to_string())],
    }
}

fn names(entities: &[&str]) -> Vec<EntityName> {
    entities.iter().map(|name| EntityName::same(name)).collect()
}

fn paced(delay: Duration) -> FetchSettings {
    FetchSettings {
        page_size: 2,
        max_pages: 0,
        pacing_delay: delay,
    }
}

#[tokio::test]
async fn test_network_failure_is_isolated_to_its_entity() {
    let mock = MockUpstream::new()
        .with_pages(
            "Pune",
            vec![MockPage::Json(json!([{"stationCode": "W1", "dataTime": date(2020, 1, 1)}]))],
        )
        .with_pages("Gone", vec![MockPage::Disconnect]);
    let base = mock.spawn().await;
    let client = client(&base);

    let aggregate = fetch_entities(
        &client,
        &target(&client),
        &names(&["Pune", "Gone"]),
        &paced(Duration::ZERO),
    )
    .await;

    assert!(matches!(
        aggregate.results[0].outcome,
        EntityOutcome::Fetched { complete: true, .. }
    ));
    assert!(matches!(
        aggregate.results[1].outcome,
        EntityOutcome::Failed(FetchError::Network(_))
    ));
    assert_eq!(aggregate.failed(), vec!["Gone"]);

    let tables = aggregate.into_tables();
    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0].cell(0, "district"), Some(&json!("Pune")));
}

#[tokio::test]
async fn test_entities_are_spaced_by_pacing_delay() {
    let mock = MockUpstream::new();
    let base = mock.clone().spawn().await;
    let client = client(&base);
    let delay = Duration::from_millis(150);

    let start = Instant::now();
    let aggregate = fetch_entities(
        &client,
        &target(&client),
        &names(&["A", "B", "C"]),
        &paced(delay),
    )
    .await;

    assert!(start.elapsed() >= delay * 2);
    assert_eq!(aggregate.results.len(), 3);
    assert_eq!(mock.page_calls().len(), 3);
}

#[tokio::test]
async fn test_single_entity_is_not_paced() {
    let base = MockUpstream::new().spawn().await;
    let client = client(&base);
    let delay = Duration::from_secs(5);

    let start = Instant::now();
    fetch_entities(&client, &target(&client), &names(&["A"]), &paced(delay)).await;

    assert!(start.elapsed() < delay);
}
