//! Conversion of the history endpoint's parallel arrays into ordered records.

use crate::error::{DashboardError, Result};
use crate::models::{parse_timestamp, RawSeries, TimeSeriesRecord};

/// Fixed label format for every record.
pub const LABEL_FORMAT: &str = "%m/%d %H:%M";

/// Build one [`TimeSeriesRecord`] per sample in `raw`.
///
/// All arrays must have the same length as `timestamps`; a missing platinum
/// array is fine and yields `None` in every record, but a present one of the
/// wrong length is a [`DashboardError::ShapeMismatch`]. Output order equals
/// input order. No records are dropped, merged or reordered.
pub fn transform(raw: &RawSeries) -> Result<Vec<TimeSeriesRecord>> {
    let expected = raw.timestamps.len();
    check_len("gold_prices", expected, raw.gold_prices.len())?;
    check_len("silver_prices", expected, raw.silver_prices.len())?;
    if let Some(platinum) = &raw.platinum_prices {
        check_len("platinum_prices", expected, platinum.len())?;
    }

    let records = raw
        .timestamps
        .iter()
        .enumerate()
        .map(|(i, ts)| {
            let parsed = parse_timestamp(ts);
            TimeSeriesRecord {
                label: parsed
                    .map(|dt| dt.format(LABEL_FORMAT).to_string())
                    .unwrap_or_else(|| ts.clone()),
                timestamp: parsed,
                gold: raw.gold_prices[i],
                silver: raw.silver_prices[i],
                platinum: raw
                    .platinum_prices
                    .as_ref()
                    .and_then(|p| p[i]),
            }
        })
        .collect();

    Ok(records)
}

fn check_len(field: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(DashboardError::ShapeMismatch {
            field,
            expected,
            actual,
        });
    }
    Ok(())
}
