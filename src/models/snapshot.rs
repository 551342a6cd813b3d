use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

// ---------------------------------------------------------------------------
// Asset — The three tracked metals
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Asset {
    Gold,
    Silver,
    Platinum,
}

impl Asset {
    pub const ALL: [Asset; 3] = [Asset::Gold, Asset::Silver, Asset::Platinum];

    pub fn name(self) -> &'static str {
        match self {
            Asset::Gold => "gold",
            Asset::Silver => "silver",
            Asset::Platinum => "platinum",
        }
    }
}

// ---------------------------------------------------------------------------
// PerAssetStats — Trailing-window statistics for one metal
// ---------------------------------------------------------------------------

/// Statistics over the upstream trailing window (30 days) for one metal.
///
/// The gateway serializes missing aggregates as `null`; those decode to `0.0`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PerAssetStats {
    #[serde(default, deserialize_with = "nullable_f64")]
    pub avg: f64,
    #[serde(default, deserialize_with = "nullable_f64")]
    pub max: f64,
    #[serde(default, deserialize_with = "nullable_f64")]
    pub min: f64,
    #[serde(default, deserialize_with = "nullable_f64")]
    pub std: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub median: Option<f64>,
}

// ---------------------------------------------------------------------------
// Statistics — The statistics block of the latest snapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    #[serde(default)]
    pub gold: PerAssetStats,
    #[serde(default)]
    pub silver: PerAssetStats,
    #[serde(default)]
    pub platinum: Option<PerAssetStats>,
    #[serde(default)]
    pub period: Option<String>,
    #[serde(default)]
    pub data_points: Option<u32>,
    #[serde(default, deserialize_with = "optional_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Statistics {
    pub fn for_asset(&self, asset: Asset) -> Option<&PerAssetStats> {
        match asset {
            Asset::Gold => Some(&self.gold),
            Asset::Silver => Some(&self.silver),
            Asset::Platinum => self.platinum.as_ref(),
        }
    }
}

// ---------------------------------------------------------------------------
// PriceSnapshot — Point-in-time read of current prices
// ---------------------------------------------------------------------------

/// A single point-in-time price read.
///
/// Immutable once received; the state store replaces it wholesale when the
/// next successful fetch delivers a newer one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub gold_price: f64,
    pub silver_price: f64,
    #[serde(default)]
    pub platinum_price: Option<f64>,
    #[serde(deserialize_with = "required_timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub source: Option<String>,
    /// Filled in by the fetcher from the sibling `statistics` block.
    #[serde(default)]
    pub statistics: Option<Statistics>,
}

impl PriceSnapshot {
    /// Price of `asset` in this snapshot. Platinum may be absent.
    pub fn price(&self, asset: Asset) -> Option<f64> {
        match asset {
            Asset::Gold => Some(self.gold_price),
            Asset::Silver => Some(self.silver_price),
            Asset::Platinum => self.platinum_price,
        }
    }
}

// ---------------------------------------------------------------------------
// Timestamp helpers
// ---------------------------------------------------------------------------

/// Parse a gateway timestamp.
///
/// Accepts RFC 3339 (`2025-01-05T10:30:00Z`, `...+08:00`) and naive ISO-8601
/// with or without fractional seconds (`2025-01-05T10:30:00.123456`). Naive
/// values are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn nullable_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0))
}

fn required_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", raw)))
}

pub(crate) fn optional_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?
        .as_deref()
        .and_then(parse_timestamp))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn parses_naive_iso_with_fraction() {
        let ts = parse_timestamp("2025-01-05T10:30:00.123456").unwrap();
        assert_eq!((ts.month(), ts.day(), ts.hour(), ts.minute()), (1, 5, 10, 30));
    }

    #[test]
    fn parses_rfc3339_with_offset() {
        let ts = parse_timestamp("2025-01-05T18:30:00+08:00").unwrap();
        assert_eq!(ts.hour(), 10);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn snapshot_decodes_null_platinum_and_stats() {
        let snap: PriceSnapshot = serde_json::from_value(serde_json::json!({
            "id": 7,
            "timestamp": "2025-01-05T10:30:00",
            "gold_price": 2950.0,
            "silver_price": 36.5,
            "platinum_price": null,
            "source": "bank",
            "created_at": "2025-01-05T10:30:01"
        }))
        .unwrap();
        assert_eq!(snap.price(Asset::Platinum), None);
        assert_eq!(snap.price(Asset::Gold), Some(2950.0));
        assert!(snap.statistics.is_none());
    }

    #[test]
    fn stats_treat_null_aggregates_as_zero() {
        let stats: Statistics = serde_json::from_value(serde_json::json!({
            "gold": {"avg": 1.5, "max": 2.0, "min": 1.0, "std": 0.5},
            "silver": {"avg": null, "max": null, "min": null, "std": null},
            "period": "monthly"
        }))
        .unwrap();
        assert_eq!(stats.silver.avg, 0.0);
        assert!(stats.platinum.is_none());
        assert_eq!(stats.for_asset(Asset::Gold).unwrap().max, 2.0);
    }
}
