mod common;

use bullion_sync::models::RawSeries;
use bullion_sync::transform::transform;
use bullion_sync::ErrorKind;

#[test]
fn test_records_follow_input_order() {
    let raw = common::raw_series(5, 1990.0);
    let records = transform(&raw).unwrap();

    assert_eq!(records.len(), 5);
    let golds: Vec<f64> = records.iter().map(|r| r.gold).collect();
    assert_eq!(golds, vec![1990.0, 1991.0, 1992.0, 1993.0, 1994.0]);
    assert_eq!(records[0].silver, 25.0);
    assert_eq!(records[0].platinum, Some(950.0));
}

#[test]
fn test_transform_is_deterministic() {
    let raw = common::raw_series(6, 1990.0);
    assert_eq!(transform(&raw).unwrap(), transform(&raw).unwrap());
}

#[test]
fn test_reordering_inputs_reorders_records() {
    let raw = common::raw_series(5, 1990.0);
    let order = [3, 0, 4, 1, 2];
    let permuted = RawSeries {
        timestamps: order.iter().map(|&i| raw.timestamps[i].clone()).collect(),
        gold_prices: order.iter().map(|&i| raw.gold_prices[i]).collect(),
        silver_prices: order.iter().map(|&i| raw.silver_prices[i]).collect(),
        platinum_prices: raw
            .platinum_prices
            .as_ref()
            .map(|p| order.iter().map(|&i| p[i]).collect()),
        count: raw.count,
    };

    let records = transform(&raw).unwrap();
    let reordered = transform(&permuted).unwrap();
    let expected: Vec<_> = order.iter().map(|&i| records[i].clone()).collect();
    assert_eq!(reordered, expected);
}

#[test]
fn test_labels_use_month_day_hour_minute() {
    let raw = RawSeries {
        timestamps: vec![
            "2025-01-05T10:30:00".to_string(),
            "2025-03-15T08:05:00.123456".to_string(),
            "2025-12-31T23:59:00Z".to_string(),
        ],
        gold_prices: vec![1.0, 2.0, 3.0],
        silver_prices: vec![1.0, 2.0, 3.0],
        platinum_prices: None,
        count: Some(3),
    };
    let records = transform(&raw).unwrap();
    let labels: Vec<&str> = records.iter().map(|r| r.label.as_str()).collect();
    assert_eq!(labels, vec!["01/05 10:30", "03/15 08:05", "12/31 23:59"]);
    assert!(records.iter().all(|r| r.timestamp.is_some()));
}

#[test]
fn test_unparseable_timestamp_keeps_raw_text() {
    let raw = RawSeries {
        timestamps: vec!["yesterday".to_string()],
        gold_prices: vec![1.0],
        silver_prices: vec![1.0],
        platinum_prices: None,
        count: None,
    };
    let records = transform(&raw).unwrap();
    assert_eq!(records[0].label, "yesterday");
    assert_eq!(records[0].timestamp, None);
}

#[test]
fn test_missing_platinum_array_is_none_everywhere() {
    let mut raw = common::raw_series(3, 100.0);
    raw.platinum_prices = None;
    let records = transform(&raw).unwrap();
    assert!(records.iter().all(|r| r.platinum.is_none()));
}

#[test]
fn test_platinum_holes_are_preserved() {
    let mut raw = common::raw_series(3, 100.0);
    raw.platinum_prices = Some(vec![Some(950.0), None, Some(952.0)]);
    let records = transform(&raw).unwrap();
    assert_eq!(records[1].platinum, None);
    assert_eq!(records[2].platinum, Some(952.0));
}

#[test]
fn test_mismatched_gold_length_is_rejected() {
    let mut raw = common::raw_series(3, 100.0);
    raw.gold_prices.pop();
    let err = transform(&raw).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ShapeMismatch);
    assert!(err.to_string().contains("gold_prices"));
}

#[test]
fn test_mismatched_platinum_length_is_rejected() {
    let mut raw = common::raw_series(3, 100.0);
    raw.platinum_prices = Some(vec![Some(1.0)]);
    let err = transform(&raw).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ShapeMismatch);
}

#[test]
fn test_empty_series_is_empty() {
    let records = transform(&RawSeries::default()).unwrap();
    assert!(records.is_empty());
}

#[test]
fn test_history_payload_decodes_from_json() {
    let raw: RawSeries = serde_json::from_value(serde_json::json!({
        "timestamps": ["2025-01-05T10:30:00", "2025-01-05T11:30:00"],
        "gold_prices": [2000.5, 2001.0],
        "silver_prices": [25.1, 25.2],
        "platinum_prices": [null, 950.0],
        "count": 2
    }))
    .unwrap();
    let records = transform(&raw).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].platinum, None);
    assert_eq!(records[1].label, "01/05 11:30");
}
