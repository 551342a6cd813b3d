use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DashboardError, Result};
use crate::models::insight::{Insight, InsightPayload};
use crate::models::snapshot::{PriceSnapshot, Statistics};

// ---------------------------------------------------------------------------
// Envelope — `{status, data, message}` wrapper shared by every read
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    pub status: String,
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
}

impl<T: DeserializeOwned> Envelope<T> {
    /// Unwrap the envelope.
    ///
    /// A `success` status yields the (possibly absent) `data`; any other
    /// status is a protocol failure carrying the server's message.
    pub fn into_data(self, endpoint: &str) -> Result<Option<T>> {
        if self.status.eq_ignore_ascii_case("success") {
            Ok(self.data)
        } else {
            Err(DashboardError::protocol(
                endpoint,
                self.message
                    .unwrap_or_else(|| format!("status '{}'", self.status)),
            ))
        }
    }
}

/// Extract a readable message from a non-2xx response body.
///
/// Handles `{"detail": {"message": ..}}`, `{"detail": ".."}`, a bare
/// `{"message": ..}`, and falls back to the raw body text.
pub fn error_message(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let from_json = parsed.as_ref().and_then(|v| {
        let detail = v.get("detail").unwrap_or(v);
        detail
            .get("message")
            .and_then(|m| m.as_str())
            .or_else(|| detail.as_str())
            .map(|s| s.to_string())
    });
    match from_json {
        Some(msg) => msg,
        None if body.trim().is_empty() => "empty response body".to_string(),
        None => body.trim().to_string(),
    }
}

// ---------------------------------------------------------------------------
// Latest snapshot
// ---------------------------------------------------------------------------

/// `data` block of `GET /latest`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LatestPayload {
    #[serde(default)]
    pub prices: Option<PriceSnapshot>,
    #[serde(default)]
    pub statistics: Option<Statistics>,
    #[serde(default)]
    pub ai_analysis: Option<InsightPayload>,
    /// Set instead of the data blocks when the backend failed to read its
    /// store but still answered with a success envelope.
    #[serde(default)]
    pub error: Option<String>,
}

impl LatestPayload {
    pub fn into_snapshot(self, endpoint: &str) -> Result<LatestSnapshot> {
        match self.error {
            Some(message) => Err(DashboardError::protocol(endpoint, message)),
            None => Ok(LatestSnapshot::from(self)),
        }
    }
}

/// Decoded latest read: prices (with statistics folded in) and commentary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LatestSnapshot {
    pub prices: Option<PriceSnapshot>,
    pub insight: Option<Insight>,
}

impl LatestSnapshot {
    pub fn is_empty(&self) -> bool {
        self.prices.is_none() && self.insight.is_none()
    }
}

impl From<LatestPayload> for LatestSnapshot {
    fn from(payload: LatestPayload) -> Self {
        let statistics = payload.statistics;
        let prices = payload.prices.map(|mut p| {
            if p.statistics.is_none() {
                p.statistics = statistics;
            }
            p
        });
        LatestSnapshot {
            prices,
            insight: payload.ai_analysis.and_then(Insight::from_payload),
        }
    }
}

// ---------------------------------------------------------------------------
// Manual collection
// ---------------------------------------------------------------------------

/// `data` block of `POST /collect`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CollectPayload {
    #[serde(default)]
    pub ai_analysis: Option<InsightPayload>,
    #[serde(default)]
    pub prices: Option<Value>,
    #[serde(default)]
    pub analysis: Option<Value>,
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub coordinator_running: bool,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status.eq_ignore_ascii_case("healthy")
    }
}
