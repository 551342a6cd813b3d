mod common;

use std::time::Duration;

use bullion_sync::metrics::{
    derive, derive_for, detect_anomalies, previous_price, series_trend, HighlightTracker,
    ANOMALY_MIN_SAMPLES,
};
use bullion_sync::transform::transform;
use bullion_sync::{Asset, AssetMetrics, DerivedMetric, Direction, Highlight, Trend};
use tokio::time::Instant;

// -- derive ---------------------------------------------------------------

#[test]
fn test_rise_of_ten_percent() {
    let m = derive(110.0, 100.0);
    assert_eq!(m.delta, 10.0);
    assert_eq!(m.direction, Direction::Up);
    assert_eq!(m.formatted_percent(), "+10.00%");
}

#[test]
fn test_fall_of_ten_percent() {
    let m = derive(90.0, 100.0);
    assert_eq!(m.delta, -10.0);
    assert_eq!(m.direction, Direction::Down);
    assert_eq!(m.formatted_percent(), "-10.00%");
}

#[test]
fn test_zero_delta_classifies_as_up() {
    let m = derive(100.0, 100.0);
    assert_eq!(m.delta, 0.0);
    assert_eq!(m.direction, Direction::Up);
    assert_eq!(m.formatted_percent(), "+0.00%");
}

#[test]
fn test_zero_previous_is_neutral() {
    let m = derive(2345.67, 0.0);
    assert_eq!(m, DerivedMetric::NEUTRAL);
    assert_eq!(m.formatted_percent(), "0.00%");
}

#[test]
fn test_percent_rounds_to_two_decimals() {
    let m = derive(101.2345, 100.0);
    assert_eq!(m.formatted_percent(), "+1.23%");
    let m = derive(99.55, 100.0);
    assert_eq!(m.formatted_percent(), "-0.45%");
}

#[test]
fn test_missing_side_is_neutral() {
    assert_eq!(derive_for(None, Some(1.0)), DerivedMetric::NEUTRAL);
    assert_eq!(derive_for(Some(1.0), None), DerivedMetric::NEUTRAL);
}

// -- Baseline selection ---------------------------------------------------

#[test]
fn test_previous_price_uses_second_to_last_record() {
    let records = transform(&common::raw_series(4, 100.0)).unwrap();
    assert_eq!(previous_price(&records, Asset::Gold, Some(1.0)), Some(102.0));
}

#[test]
fn test_previous_price_falls_back_with_short_series() {
    let records = transform(&common::raw_series(1, 100.0)).unwrap();
    assert_eq!(previous_price(&records, Asset::Gold, Some(98.0)), Some(98.0));
    assert_eq!(previous_price(&[], Asset::Gold, None), None);
}

#[test]
fn test_compute_metrics_against_series() {
    let records = transform(&common::raw_series(5, 1990.0)).unwrap();
    let current = common::snapshot(2000.0, 25.0, Some(950.0));
    let metrics = AssetMetrics::compute(Some(&current), &records, None);

    // second-to-last gold sample is 1993.0
    assert!((metrics.gold.delta - 7.0).abs() < 1e-9);
    assert_eq!(metrics.gold.direction, Direction::Up);
    assert_eq!(metrics.silver.direction, Direction::Up);
    assert_eq!(metrics.silver.formatted_percent(), "+0.00%");
}

#[test]
fn test_missing_platinum_yields_neutral_metric() {
    let records = transform(&common::raw_series(5, 1990.0)).unwrap();
    let current = common::snapshot(2000.0, 25.0, None);
    let metrics = AssetMetrics::compute(Some(&current), &records, None);
    assert_eq!(metrics.platinum, DerivedMetric::NEUTRAL);
    assert_eq!(metrics.get(Asset::Platinum).direction, Direction::Neutral);
}

#[test]
fn test_no_snapshot_means_all_neutral() {
    let metrics = AssetMetrics::compute(None, &[], None);
    assert_eq!(metrics, AssetMetrics::default());
}

// -- Highlights -----------------------------------------------------------

#[test]
fn test_first_observation_does_not_highlight() {
    let now = Instant::now();
    let mut tracker = HighlightTracker::new();
    tracker.observe(Asset::Gold, Some(100.0), now, Duration::from_millis(500));
    assert_eq!(tracker.state(Asset::Gold, now), Highlight::None);
}

#[test]
fn test_highlight_lights_then_expires() {
    let now = Instant::now();
    let window = Duration::from_millis(500);
    let mut tracker = HighlightTracker::new();
    tracker.observe(Asset::Gold, Some(100.0), now, window);
    tracker.observe(Asset::Gold, Some(101.0), now, window);
    tracker.observe(Asset::Silver, Some(25.0), now, window);
    tracker.observe(Asset::Silver, Some(24.0), now, window);

    assert_eq!(tracker.state(Asset::Gold, now), Highlight::Positive);
    assert_eq!(tracker.state(Asset::Silver, now), Highlight::Negative);
    assert_eq!(tracker.next_expiry(now), Some(now + window));

    let later = now + Duration::from_millis(501);
    assert_eq!(tracker.state(Asset::Gold, later), Highlight::None);
    assert_eq!(tracker.next_expiry(later), None);
}

#[test]
fn test_unchanged_price_keeps_highlight_off() {
    let now = Instant::now();
    let window = Duration::from_millis(500);
    let mut tracker = HighlightTracker::new();
    tracker.observe(Asset::Gold, Some(100.0), now, window);
    tracker.observe(Asset::Gold, Some(100.0), now, window);
    assert_eq!(tracker.state(Asset::Gold, now), Highlight::None);
}

// -- Trend and anomalies --------------------------------------------------

#[test]
fn test_rising_series_trend() {
    let records = transform(&common::raw_series(10, 100.0)).unwrap();
    let summary = series_trend(&records, Asset::Gold);
    assert_eq!(summary.trend, Trend::Rising);
    // first half mean 102, second half mean 107
    assert_eq!(summary.change_percent, Some(4.9));
}

#[test]
fn test_flat_series_trend() {
    let records = transform(&common::raw_series(10, 100.0)).unwrap();
    let summary = series_trend(&records, Asset::Silver);
    assert_eq!(summary.trend, Trend::Flat);
    assert_eq!(summary.change_percent, Some(0.0));
}

#[test]
fn test_falling_series_trend() {
    let mut raw = common::raw_series(4, 0.0);
    raw.gold_prices = vec![110.0, 108.0, 100.0, 98.0];
    let records = transform(&raw).unwrap();
    assert_eq!(series_trend(&records, Asset::Gold).trend, Trend::Falling);
}

#[test]
fn test_single_point_has_insufficient_data() {
    let records = transform(&common::raw_series(1, 100.0)).unwrap();
    assert_eq!(series_trend(&records, Asset::Gold).trend, Trend::InsufficientData);
}

#[test]
fn test_anomaly_detection_flags_spike() {
    let mut raw = common::raw_series(20, 0.0);
    raw.gold_prices = vec![100.0; 20];
    raw.gold_prices[12] = 200.0;
    let records = transform(&raw).unwrap();

    let anomalies = detect_anomalies(&records, Asset::Gold);
    assert_eq!(anomalies.len(), 1);
    assert_eq!(anomalies[0].index, 12);
    assert_eq!(anomalies[0].price, 200.0);
    assert!(anomalies[0].deviation > 3.0);
}

#[test]
fn test_anomaly_detection_needs_enough_samples() {
    let mut raw = common::raw_series(ANOMALY_MIN_SAMPLES - 1, 0.0);
    raw.gold_prices = vec![100.0; ANOMALY_MIN_SAMPLES - 1];
    raw.gold_prices[3] = 10_000.0;
    let records = transform(&raw).unwrap();
    assert!(detect_anomalies(&records, Asset::Gold).is_empty());
}
