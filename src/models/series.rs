use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::snapshot::Asset;

// ---------------------------------------------------------------------------
// RawSeries — Parallel arrays as served by the history endpoint
// ---------------------------------------------------------------------------

/// Historical payload as the gateway returns it: one array per field, all
/// indexed by sample.
///
/// `platinum_prices` may be missing entirely, or present with `null` holes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSeries {
    #[serde(default)]
    pub timestamps: Vec<String>,
    #[serde(default)]
    pub gold_prices: Vec<f64>,
    #[serde(default)]
    pub silver_prices: Vec<f64>,
    #[serde(default)]
    pub platinum_prices: Option<Vec<Option<f64>>>,
    #[serde(default)]
    pub count: Option<usize>,
}

// ---------------------------------------------------------------------------
// TimeSeriesRecord — One unified sample point
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesRecord {
    /// Human-readable time label (`%m/%d %H:%M`), or the raw timestamp text
    /// when it could not be parsed.
    pub label: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    pub gold: f64,
    pub silver: f64,
    pub platinum: Option<f64>,
}

impl TimeSeriesRecord {
    pub fn price(&self, asset: Asset) -> Option<f64> {
        match asset {
            Asset::Gold => Some(self.gold),
            Asset::Silver => Some(self.silver),
            Asset::Platinum => self.platinum,
        }
    }
}
