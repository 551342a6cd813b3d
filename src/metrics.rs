//! Derived comparison metrics.
//!
//! Everything here is synchronous and side-effect free. The state store calls
//! in whenever the snapshot or series changes; nothing is persisted.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::models::{Asset, PriceSnapshot, TimeSeriesRecord};

/// Relative change (percent) beyond which a series half-over-half comparison
/// counts as rising or falling.
pub const TREND_THRESHOLD_PERCENT: f64 = 2.0;

/// Minimum number of samples before anomaly detection runs.
pub const ANOMALY_MIN_SAMPLES: usize = 10;

/// Distance from the mean, in standard deviations, that marks an anomaly.
pub const ANOMALY_SIGMA: f64 = 3.0;

// ---------------------------------------------------------------------------
// DerivedMetric
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
    Neutral,
}

/// Change of one asset between two observations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DerivedMetric {
    pub delta: f64,
    pub percent: f64,
    pub direction: Direction,
}

impl DerivedMetric {
    /// The metric reported when there is nothing valid to compare against.
    pub const NEUTRAL: DerivedMetric = DerivedMetric {
        delta: 0.0,
        percent: 0.0,
        direction: Direction::Neutral,
    };

    /// Percent change with two decimals and an explicit sign.
    ///
    /// `+1.23%` / `-0.45%`; the neutral metric renders as `0.00%`.
    pub fn formatted_percent(&self) -> String {
        match self.direction {
            Direction::Neutral => "0.00%".to_string(),
            Direction::Up => format!("+{:.2}%", self.percent.abs()),
            Direction::Down => format!("-{:.2}%", self.percent.abs()),
        }
    }
}

impl fmt::Display for DerivedMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:+.2} ({})", self.delta, self.formatted_percent())
    }
}

/// Compare `current` against `previous`.
///
/// A zero (or non-finite) previous value yields [`DerivedMetric::NEUTRAL`].
/// A zero delta is classified as [`Direction::Up`].
pub fn derive(current: f64, previous: f64) -> DerivedMetric {
    if previous == 0.0 || !previous.is_finite() || !current.is_finite() {
        return DerivedMetric::NEUTRAL;
    }
    let delta = current - previous;
    DerivedMetric {
        delta,
        percent: delta / previous * 100.0,
        direction: if delta >= 0.0 {
            Direction::Up
        } else {
            Direction::Down
        },
    }
}

/// Pick the comparison baseline for `asset`.
///
/// The second-to-last series record when the series has at least two
/// records, otherwise `fallback` (the previously held snapshot price).
pub fn previous_price(
    records: &[TimeSeriesRecord],
    asset: Asset,
    fallback: Option<f64>,
) -> Option<f64> {
    if records.len() >= 2 {
        if let Some(price) = records[records.len() - 2].price(asset) {
            return Some(price);
        }
    }
    fallback
}

/// Metric for one asset, neutral when either side is missing.
pub fn derive_for(current: Option<f64>, previous: Option<f64>) -> DerivedMetric {
    match (current, previous) {
        (Some(c), Some(p)) => derive(c, p),
        _ => DerivedMetric::NEUTRAL,
    }
}

/// Derived metrics for all three assets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AssetMetrics {
    pub gold: DerivedMetric,
    pub silver: DerivedMetric,
    pub platinum: DerivedMetric,
}

impl Default for AssetMetrics {
    fn default() -> Self {
        Self {
            gold: DerivedMetric::NEUTRAL,
            silver: DerivedMetric::NEUTRAL,
            platinum: DerivedMetric::NEUTRAL,
        }
    }
}

impl AssetMetrics {
    /// Compute every asset's metric from the current snapshot, the series and
    /// the snapshot it superseded.
    pub fn compute(
        current: Option<&PriceSnapshot>,
        records: &[TimeSeriesRecord],
        previous: Option<&PriceSnapshot>,
    ) -> Self {
        let one = |asset: Asset| {
            let now = current.and_then(|s| s.price(asset));
            let before = previous_price(records, asset, previous.and_then(|s| s.price(asset)));
            derive_for(now, before)
        };
        Self {
            gold: one(Asset::Gold),
            silver: one(Asset::Silver),
            platinum: one(Asset::Platinum),
        }
    }

    pub fn get(&self, asset: Asset) -> &DerivedMetric {
        match asset {
            Asset::Gold => &self.gold,
            Asset::Silver => &self.silver,
            Asset::Platinum => &self.platinum,
        }
    }
}

// ---------------------------------------------------------------------------
// Transient highlight
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Highlight {
    #[default]
    None,
    Positive,
    Negative,
}

#[derive(Debug, Clone, Copy)]
struct HighlightEntry {
    last_price: f64,
    tone: Highlight,
    until: Instant,
}

/// Per-asset "value just changed" flags.
///
/// Only the last rendered price per asset is remembered. When a new
/// observation differs from it, the asset lights up `Positive` or `Negative`
/// until the window expires, then reads as `None` again.
#[derive(Debug, Clone, Default)]
pub struct HighlightTracker {
    entries: HashMap<Asset, HighlightEntry>,
}

impl HighlightTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly observed price for `asset` at `now`.
    ///
    /// The first observation of an asset never highlights. A missing price
    /// leaves the asset untouched.
    pub fn observe(&mut self, asset: Asset, price: Option<f64>, now: Instant, window: Duration) {
        let Some(price) = price else {
            return;
        };
        match self.entries.get_mut(&asset) {
            Some(entry) if entry.last_price != price => {
                entry.tone = if price > entry.last_price {
                    Highlight::Positive
                } else {
                    Highlight::Negative
                };
                entry.until = now + window;
                entry.last_price = price;
            }
            Some(_) => {}
            None => {
                self.entries.insert(
                    asset,
                    HighlightEntry {
                        last_price: price,
                        tone: Highlight::None,
                        until: now,
                    },
                );
            }
        }
    }

    /// Record every asset of `snapshot`.
    pub fn observe_snapshot(&mut self, snapshot: &PriceSnapshot, now: Instant, window: Duration) {
        for asset in Asset::ALL {
            self.observe(asset, snapshot.price(asset), now, window);
        }
    }

    /// Highlight for `asset` as of `now`.
    pub fn state(&self, asset: Asset, now: Instant) -> Highlight {
        match self.entries.get(&asset) {
            Some(entry) if now < entry.until => entry.tone,
            _ => Highlight::None,
        }
    }

    /// When the latest active highlight switches off, if any is lit at `now`.
    pub fn next_expiry(&self, now: Instant) -> Option<Instant> {
        self.entries
            .values()
            .filter(|e| e.tone != Highlight::None && now < e.until)
            .map(|e| e.until)
            .max()
    }
}

// ---------------------------------------------------------------------------
// Series-level analysis
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Rising,
    Falling,
    Flat,
    InsufficientData,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrendSummary {
    pub trend: Trend,
    /// Second-half mean relative to first-half mean, in percent.
    pub change_percent: Option<f64>,
}

/// Compare the mean of the first half of the series with the second half.
pub fn series_trend(records: &[TimeSeriesRecord], asset: Asset) -> TrendSummary {
    let prices: Vec<f64> = records.iter().filter_map(|r| r.price(asset)).collect();
    if prices.len() < 2 {
        return TrendSummary {
            trend: Trend::InsufficientData,
            change_percent: None,
        };
    }

    let mid = prices.len() / 2;
    let first = mean(&prices[..mid]);
    let second = mean(&prices[mid..]);
    if first == 0.0 {
        return TrendSummary {
            trend: Trend::Flat,
            change_percent: Some(0.0),
        };
    }

    let change = (second - first) / first * 100.0;
    let trend = if change > TREND_THRESHOLD_PERCENT {
        Trend::Rising
    } else if change < -TREND_THRESHOLD_PERCENT {
        Trend::Falling
    } else {
        Trend::Flat
    };
    TrendSummary {
        trend,
        change_percent: Some((change * 100.0).round() / 100.0),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Anomaly {
    pub asset: Asset,
    pub index: usize,
    pub label: String,
    pub price: f64,
    /// Distance from the mean in standard deviations.
    pub deviation: f64,
}

/// Flag records whose price lies more than [`ANOMALY_SIGMA`] population
/// standard deviations from the series mean.
///
/// Needs at least [`ANOMALY_MIN_SAMPLES`] prices for `asset`; a flat series
/// has no anomalies.
pub fn detect_anomalies(records: &[TimeSeriesRecord], asset: Asset) -> Vec<Anomaly> {
    let prices: Vec<f64> = records.iter().filter_map(|r| r.price(asset)).collect();
    if prices.len() < ANOMALY_MIN_SAMPLES {
        return Vec::new();
    }

    let mu = mean(&prices);
    let sigma = (prices.iter().map(|p| (p - mu).powi(2)).sum::<f64>() / prices.len() as f64).sqrt();
    if sigma == 0.0 {
        return Vec::new();
    }

    records
        .iter()
        .enumerate()
        .filter_map(|(index, r)| {
            let price = r.price(asset)?;
            let deviation = (price - mu).abs() / sigma;
            (deviation > ANOMALY_SIGMA).then(|| Anomaly {
                asset,
                index,
                label: r.label.clone(),
                price,
                deviation,
            })
        })
        .collect()
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}
