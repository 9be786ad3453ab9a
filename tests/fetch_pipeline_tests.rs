use std::time::Duration;
use wherenow_birds::request::API_TOKEN_HEADER;
use wherenow_birds::{
    BirdError, BirdObservationAggregator, Coordinate, FixedLocation, ObservationKind, RetryPolicy,
};

mod common;
use common::{StubTransport, eventually, sighting, sightings_json, species_page, test_config};

const RECENT: &str = "/recent?";
const NOTABLE: &str = "/recent/notable?";

#[tokio::test]
async fn test_recent_fetch_end_to_end_with_duplicate_suppressed() {
    let (stub, gate) = StubTransport::gated();
    let server_order = vec![
        sighting("amerob", "L1", "2024-05-01 08:00"),
        sighting("blujay", "L2", "2024-05-01 07:00"),
        sighting("norcar", "L3", "2024-04-30 18:00"),
    ];
    stub.respond_ok(RECENT, &sightings_json(&server_order));

    let aggregator = BirdObservationAggregator::new(stub.clone(), test_config());
    let mut updates = aggregator.subscribe_sightings();
    let nyc = Coordinate::new(40.7128, -74.0060);

    assert!(aggregator.spawn_fetch_recent(nyc, 25));
    assert!(aggregator.is_fetching(ObservationKind::Recent));
    assert!(!aggregator.spawn_fetch_recent(nyc, 25));

    gate.add_permits(10);
    updates.changed().await.unwrap();

    let published = aggregator.sightings();
    assert_eq!(*published, server_order);
    assert_eq!(stub.calls(), 1);
    assert!(!aggregator.is_fetching(ObservationKind::Recent));

    let request = &stub.requests()[0];
    assert!(request.url.contains("lat=40.7128&lng=-74.006&sort=date"));
    assert!(request.url.contains("dist=25"));
    assert_eq!(
        request.headers,
        vec![(API_TOKEN_HEADER.to_string(), "test-token".to_string())]
    );
}

#[tokio::test]
async fn test_awaiting_fetch_bypasses_in_flight_flag() {
    let (stub, gate) = StubTransport::gated();
    stub.respond_ok(RECENT, &sightings_json(&[sighting("amerob", "L1", "1")]));
    let aggregator = BirdObservationAggregator::new(stub.clone(), test_config());
    let here = Coordinate::new(1.0, 2.0);

    assert!(aggregator.spawn_fetch_recent(here, 5));
    gate.add_permits(10);
    let direct = aggregator.fetch_recent(here, 5).await.unwrap();

    assert_eq!(direct.len(), 1);
    eventually(|| stub.calls() == 2).await;
}

#[tokio::test]
async fn test_awaiting_fetch_distinguishes_empty_from_failure() {
    let stub = StubTransport::new();
    stub.respond_ok(RECENT, "[]");
    stub.respond_status(NOTABLE, 503);
    let aggregator = BirdObservationAggregator::new(stub.clone(), test_config());
    let here = Coordinate::new(1.0, 2.0);

    assert_eq!(aggregator.fetch_recent(here, 5).await, Ok(Vec::new()));

    let err = aggregator.fetch_notable(here, 5, false).await.unwrap_err();
    assert!(matches!(err, BirdError::Status { status: 503, .. }));

    // Awaiting calls never schedule a retry.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(stub.calls(), 2);
}

#[tokio::test]
async fn test_failed_fetch_retries_at_fallback_coordinate() {
    let stub = StubTransport::new();
    stub.respond_status(RECENT, 500);
    stub.respond_ok(RECENT, &sightings_json(&[sighting("amerob", "L1", "1")]));

    let location = FixedLocation::new(Coordinate::new(51.5, -0.1));
    let aggregator = BirdObservationAggregator::with_location(stub.clone(), location, test_config());
    let mut updates = aggregator.subscribe_sightings();

    assert!(aggregator.spawn_fetch_recent(Coordinate::new(40.0, -70.0), 10));
    updates.changed().await.unwrap();

    assert_eq!(aggregator.sightings().len(), 1);
    let requests = stub.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].url.contains("lat=40&lng=-70"));
    assert!(requests[1].url.contains("lat=51.5&lng=-0.1"));
}

#[tokio::test]
async fn test_decode_failure_is_retried_with_original_coordinate() {
    let stub = StubTransport::new();
    stub.respond_ok(RECENT, "<html>maintenance</html>");
    stub.respond_ok(RECENT, &sightings_json(&[sighting("amerob", "L1", "1")]));
    let aggregator = BirdObservationAggregator::new(stub.clone(), test_config());
    let mut updates = aggregator.subscribe_sightings();

    aggregator.spawn_fetch_recent(Coordinate::new(10.5, 20.5), 3);
    updates.changed().await.unwrap();

    let requests = stub.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].url, requests[1].url);
}

#[tokio::test]
async fn test_retries_are_bounded() {
    let stub = StubTransport::new();
    stub.respond_status(NOTABLE, 500);
    let config = test_config().with_retry(
        RetryPolicy::default()
            .with_max_retries(2)
            .with_delay(Duration::from_millis(5)),
    );
    let aggregator = BirdObservationAggregator::new(stub.clone(), config);

    aggregator.spawn_fetch_notable(Coordinate::new(0.0, 0.0), 5, false);
    eventually(|| stub.calls() == 3).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(stub.calls(), 3);
    assert!(!aggregator.is_fetching(ObservationKind::Notable));
    assert!(aggregator.notable_sightings().is_empty());
}

#[tokio::test]
async fn test_recent_and_notable_guards_are_independent() {
    let (stub, gate) = StubTransport::gated();
    stub.respond_ok(RECENT, "[]");
    stub.respond_ok(NOTABLE, "[]");
    let aggregator = BirdObservationAggregator::new(stub.clone(), test_config());
    let here = Coordinate::new(1.0, 1.0);

    assert!(aggregator.spawn_fetch_recent(here, 5));
    assert!(aggregator.spawn_fetch_notable(here, 5, false));
    assert!(!aggregator.spawn_fetch_notable(here, 5, false));

    gate.add_permits(10);
    eventually(|| {
        !aggregator.is_fetching(ObservationKind::Recent)
            && !aggregator.is_fetching(ObservationKind::Notable)
    })
    .await;
    assert_eq!(stub.calls_matching(RECENT), 1);
    assert_eq!(stub.calls_matching(NOTABLE), 1);
}

#[tokio::test]
async fn test_notable_fetch_collapses_and_enriches_once_per_species() {
    let stub = StubTransport::new();
    let raw = vec![
        sighting("snoowl", "L1", "2024-01-01 08:00"),
        sighting("gyrfal", "L2", "2024-01-01 09:00"),
        sighting("snoowl", "L1", "2024-01-02 08:00"),
        sighting("snoowl", "L3", "2024-01-02 10:00"),
    ];
    stub.respond_ok(NOTABLE, &sightings_json(&raw));
    stub.respond_ok(
        "/species/snoowl",
        &species_page(&[(1, "photo", "Alice"), (2, "audio", "Bob")]),
    );
    stub.respond_ok("/species/gyrfal", &species_page(&[(3, "photo", "Cara")]));

    let aggregator = BirdObservationAggregator::new(stub.clone(), test_config());
    let notable = aggregator
        .fetch_notable(Coordinate::new(64.1, -21.9), 50, true)
        .await
        .unwrap();

    let dates: Vec<&str> = notable.iter().map(|s| s.obs_dt.as_str()).collect();
    assert_eq!(
        dates,
        vec!["2024-01-01 09:00", "2024-01-02 08:00", "2024-01-02 10:00"]
    );
    assert_eq!(*aggregator.notable_sightings(), notable);

    eventually(|| aggregator.catalog().len() == 3).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(stub.calls_matching("/species/snoowl"), 1);
    assert_eq!(stub.calls_matching("/species/gyrfal"), 1);
    assert!(aggregator.sightings().is_empty());
}

#[tokio::test]
async fn test_background_notable_fetch_enriches_catalog() {
    let stub = StubTransport::new();
    let raw = vec![
        sighting("snoowl", "L1", "2024-01-01 08:00"),
        sighting("snoowl", "L2", "2024-01-01 09:00"),
        sighting("gyrfal", "L3", "2024-01-01 10:00"),
    ];
    stub.respond_ok(NOTABLE, &sightings_json(&raw));
    stub.respond_ok(
        "/species/snoowl",
        &species_page(&[(1, "photo", "Alice"), (2, "audio", "Bob")]),
    );
    stub.respond_ok("/species/gyrfal", &species_page(&[(3, "photo", "Cara")]));
    let aggregator = BirdObservationAggregator::new(stub.clone(), test_config());
    let catalog_updates = aggregator.subscribe_catalog();

    assert!(aggregator.spawn_fetch_notable(Coordinate::new(64.1, -21.9), 50, true));
    eventually(|| catalog_updates.borrow().len() == 3).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(aggregator.notable_sightings().len(), 3);
    assert!(aggregator.catalog().contains_species("snoowl"));
    assert!(aggregator.catalog().contains_species("gyrfal"));
    assert_eq!(stub.calls_matching(NOTABLE), 1);
    assert_eq!(stub.calls_matching("/species/snoowl"), 1);
    assert_eq!(stub.calls_matching("/species/gyrfal"), 1);
}

#[tokio::test]
async fn test_reset_sightings_leaves_catalog() {
    let stub = StubTransport::new();
    stub.respond_ok(RECENT, &sightings_json(&[sighting("amerob", "L1", "1")]));
    stub.respond_ok(NOTABLE, &sightings_json(&[sighting("snoowl", "L1", "1")]));
    stub.respond_ok("/species/snoowl", &species_page(&[(9, "photo", "Dee")]));
    let aggregator = BirdObservationAggregator::new(stub.clone(), test_config());
    let here = Coordinate::new(1.0, 1.0);

    aggregator.fetch_recent(here, 5).await.unwrap();
    aggregator.fetch_notable(here, 5, true).await.unwrap();
    eventually(|| aggregator.catalog().len() == 1).await;

    aggregator.reset_sightings();
    assert!(aggregator.sightings().is_empty());
    assert!(aggregator.notable_sightings().is_empty());
    assert_eq!(aggregator.catalog().len(), 1);
}
