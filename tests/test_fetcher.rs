mod common;

use std::time::Duration;

use bullion_sync::fetcher::SnapshotFetcher;
use bullion_sync::{ErrorKind, TimeRange};
use common::{FakeGateway, Reply};
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn test_reads_run_concurrently() {
    let gateway = FakeGateway::new();
    *gateway.latest_delay.lock().unwrap() = Duration::from_secs(3);
    gateway.set_history_delay(Duration::from_secs(3));
    let fetcher = SnapshotFetcher::new(gateway.clone(), Duration::from_secs(30));

    let started = Instant::now();
    let outcome = fetcher.fetch(TimeRange::OneWeek).await;

    assert!(started.elapsed() < Duration::from_secs(4));
    assert!(outcome.has_new_data());
    assert_eq!(outcome.range, TimeRange::OneWeek);
    assert_eq!(gateway.last_history_days(), Some(7));
}

#[tokio::test]
async fn test_failed_snapshot_keeps_series() {
    let gateway = FakeGateway::new();
    gateway.set_latest(Reply::Protocol("no price data"));
    let fetcher = SnapshotFetcher::new(gateway, Duration::from_secs(30));

    let outcome = fetcher.fetch(TimeRange::OneMonth).await;
    assert_eq!(outcome.snapshot.as_ref().unwrap_err().kind(), ErrorKind::Protocol);
    assert_eq!(outcome.series.as_ref().unwrap().len(), 5);
    assert!(outcome.has_new_data());

    let failures = outcome.failures();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].starts_with("latest snapshot"));
}

#[tokio::test]
async fn test_shape_mismatch_fails_series_facet_only() {
    let gateway = FakeGateway::new();
    let mut bad = common::raw_series(3, 100.0);
    bad.timestamps.push("2025-01-02T00:00:00".to_string());
    gateway.set_history(Reply::Ok(bad));
    let fetcher = SnapshotFetcher::new(gateway, Duration::from_secs(30));

    let outcome = fetcher.fetch(TimeRange::ThreeMonths).await;
    assert!(outcome.snapshot.is_ok());
    assert_eq!(outcome.series.as_ref().unwrap_err().kind(), ErrorKind::ShapeMismatch);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_is_network_failure() {
    let gateway = FakeGateway::new();
    *gateway.latest_delay.lock().unwrap() = Duration::from_secs(10);
    let fetcher = SnapshotFetcher::new(gateway, Duration::from_secs(2));

    let outcome = fetcher.fetch(TimeRange::OneDay).await;
    let err = outcome.snapshot.as_ref().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Network);
    assert!(err.is_transient());
    assert!(outcome.series.is_ok());
}

#[tokio::test]
async fn test_both_failures_reported() {
    let gateway = FakeGateway::new();
    gateway.set_latest(Reply::Timeout);
    gateway.set_history(Reply::Timeout);
    let fetcher = SnapshotFetcher::new(gateway, Duration::from_secs(30));

    let outcome = fetcher.fetch(TimeRange::OneMonth).await;
    assert!(!outcome.has_new_data());
    assert_eq!(outcome.failures().len(), 2);
}
