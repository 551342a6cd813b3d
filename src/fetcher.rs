//! Concurrent acquisition of the latest snapshot and the historical series.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config;
use crate::error::{DashboardError, Result};
use crate::gateway::Gateway;
use crate::models::{LatestSnapshot, TimeRange, TimeSeriesRecord};
use crate::transform::transform;

// ---------------------------------------------------------------------------
// FetchOutcome
// ---------------------------------------------------------------------------

/// Result of one fetch cycle, one independent result per facet.
///
/// A failure in one facet never discards a success in the other.
#[derive(Debug)]
pub struct FetchOutcome {
    pub range: TimeRange,
    pub snapshot: Result<LatestSnapshot>,
    pub series: Result<Vec<TimeSeriesRecord>>,
}

impl FetchOutcome {
    /// Whether at least one facet delivered data.
    pub fn has_new_data(&self) -> bool {
        self.snapshot.is_ok() || self.series.is_ok()
    }

    /// Per-facet failure messages, in `latest`, `history` order.
    pub fn failures(&self) -> Vec<String> {
        let mut out = Vec::new();
        if let Err(e) = &self.snapshot {
            out.push(format!("latest snapshot: {}", e));
        }
        if let Err(e) = &self.series {
            out.push(format!("historical series: {}", e));
        }
        out
    }
}

// ---------------------------------------------------------------------------
// SnapshotFetcher
// ---------------------------------------------------------------------------

/// Issues the two gateway reads of a refresh cycle concurrently.
pub struct SnapshotFetcher {
    gateway: Arc<dyn Gateway>,
    timeout: Duration,
}

impl SnapshotFetcher {
    /// `timeout` bounds each read on its own; expiry counts as a failure of
    /// that facet.
    pub fn new(gateway: Arc<dyn Gateway>, timeout: Duration) -> Self {
        Self { gateway, timeout }
    }

    /// Fetch the latest snapshot and the series for `range`.
    ///
    /// Both reads are in flight at the same time; completion order does not
    /// matter. The raw series is transformed here so a shape mismatch is
    /// reported as a failure of the series facet.
    pub async fn fetch(&self, range: TimeRange) -> FetchOutcome {
        let days = range.days();
        let (snapshot, history) = tokio::join!(
            bounded(config::LATEST_PATH, self.timeout, self.gateway.latest()),
            bounded(config::HISTORY_PATH, self.timeout, self.gateway.history(days)),
        );

        let series = history.and_then(|raw| transform(&raw));

        match (&snapshot, &series) {
            (Ok(_), Ok(records)) => {
                debug!(days, points = records.len(), "fetched snapshot and series")
            }
            (Err(e), Ok(_)) => warn!(days, error = %e, "latest snapshot failed, series fetched"),
            (Ok(_), Err(e)) => warn!(days, error = %e, "historical series failed, snapshot fetched"),
            (Err(a), Err(b)) => warn!(days, latest = %a, history = %b, "both reads failed"),
        }

        FetchOutcome {
            range,
            snapshot,
            series,
        }
    }
}

/// Run `fut`, turning an elapsed deadline into [`DashboardError::Timeout`].
pub(crate) async fn bounded<T, F>(endpoint: &str, after: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => Err(DashboardError::Timeout {
            endpoint: endpoint.to_string(),
            after,
        }),
    }
}
