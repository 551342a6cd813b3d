//! Client for the remote price gateway.
//!
//! [`Gateway`] is the seam between the synchronization pipeline and the
//! network. [`HttpGateway`] implements it over `reqwest`; tests substitute an
//! in-memory implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderValue;
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config;
use crate::error::{DashboardError, Result};
use crate::models::{
    error_message, CollectPayload, Envelope, HealthStatus, Insight, InsightPayload, LatestPayload,
    LatestSnapshot, PriceSnapshot, RawSeries, Statistics,
};

/// Operations the remote gateway offers.
///
/// Every read decodes the `{status, data}` envelope. Reads that can
/// legitimately have nothing yet (an empty backend) return `Ok(None)`.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// `GET /latest`: prices, statistics and the most recent commentary.
    async fn latest(&self) -> Result<LatestSnapshot>;

    /// `GET /history?days=N`: parallel price arrays for the last `days` days.
    async fn history(&self, days: u32) -> Result<RawSeries>;

    /// `POST /collect`: run a collection and analysis pass on the server.
    ///
    /// Returns the freshly produced commentary, if the server included one.
    async fn collect(&self, credential: &SecretString) -> Result<Option<Insight>>;

    /// `GET /health`.
    async fn health(&self) -> Result<HealthStatus>;

    /// `GET /prices/current`.
    async fn current_prices(&self) -> Result<Option<PriceSnapshot>>;

    /// `GET /statistics/monthly`.
    async fn monthly_statistics(&self) -> Result<Option<Statistics>>;

    /// `GET /ai-analysis/latest`.
    async fn latest_insight(&self) -> Result<Option<Insight>>;
}

// ---------------------------------------------------------------------------
// HttpGateway
// ---------------------------------------------------------------------------

/// `reqwest`-backed [`Gateway`].
pub struct HttpGateway {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpGateway {
    /// Create a client for the gateway at `base_url`.
    ///
    /// `timeout` bounds every request; an expired request surfaces as
    /// [`DashboardError::Timeout`].
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("bullion-sync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send `request` and return the raw JSON body of a 2xx response.
    async fn send(&self, endpoint: &str, request: RequestBuilder) -> Result<Value> {
        let response = request
            .send()
            .await
            .map_err(|e| self.classify(endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DashboardError::protocol(
                endpoint,
                format!("HTTP {}: {}", status.as_u16(), error_message(&body)),
            ));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| self.classify(endpoint, e))
    }

    async fn get_envelope<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>> {
        let request = self.client.get(self.url(endpoint)).query(query);
        let body = self.send(endpoint, request).await?;
        let envelope: Envelope<T> = serde_json::from_value(body)?;
        envelope.into_data(endpoint)
    }

    fn classify(&self, endpoint: &str, err: reqwest::Error) -> DashboardError {
        if err.is_timeout() {
            DashboardError::Timeout {
                endpoint: endpoint.to_string(),
                after: self.timeout,
            }
        } else {
            DashboardError::Http(err)
        }
    }
}

/// Reject windows the history endpoint would refuse.
pub(crate) fn validate_days(days: u32) -> Result<()> {
    if days == 0 || days > config::MAX_HISTORY_DAYS {
        return Err(DashboardError::Config(format!(
            "history window must be between 1 and {} days, got {}",
            config::MAX_HISTORY_DAYS,
            days
        )));
    }
    Ok(())
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn latest(&self) -> Result<LatestSnapshot> {
        let payload: Option<LatestPayload> = self.get_envelope(config::LATEST_PATH, &[]).await?;
        match payload {
            Some(payload) => payload.into_snapshot(config::LATEST_PATH),
            None => Ok(LatestSnapshot::default()),
        }
    }

    async fn history(&self, days: u32) -> Result<RawSeries> {
        validate_days(days)?;
        let query = [("days", days.to_string())];
        self.get_envelope::<RawSeries>(config::HISTORY_PATH, &query)
            .await?
            .ok_or_else(|| {
                DashboardError::protocol(config::HISTORY_PATH, "response carried no data")
            })
    }

    async fn collect(&self, credential: &SecretString) -> Result<Option<Insight>> {
        let mut key = HeaderValue::from_str(credential.expose_secret())?;
        key.set_sensitive(true);

        let request = self
            .client
            .post(self.url(config::COLLECT_PATH))
            .header(config::API_KEY_HEADER, key);
        let body = self.send(config::COLLECT_PATH, request).await?;
        let envelope: Envelope<CollectPayload> = serde_json::from_value(body)?;

        Ok(envelope
            .into_data(config::COLLECT_PATH)?
            .and_then(|d| d.ai_analysis)
            .and_then(Insight::from_payload))
    }

    async fn health(&self) -> Result<HealthStatus> {
        let request = self.client.get(self.url(config::HEALTH_PATH));
        let body = self.send(config::HEALTH_PATH, request).await?;
        // Health is served bare by current backends; older ones wrapped it.
        let inner = match body.get("data") {
            Some(data) if data.is_object() => data.clone(),
            _ => body,
        };
        Ok(serde_json::from_value(inner)?)
    }

    async fn current_prices(&self) -> Result<Option<PriceSnapshot>> {
        self.get_envelope(config::CURRENT_PRICES_PATH, &[]).await
    }

    async fn monthly_statistics(&self) -> Result<Option<Statistics>> {
        self.get_envelope(config::MONTHLY_STATISTICS_PATH, &[]).await
    }

    async fn latest_insight(&self) -> Result<Option<Insight>> {
        let payload: Option<InsightPayload> =
            self.get_envelope(config::LATEST_INSIGHT_PATH, &[]).await?;
        Ok(payload.and_then(Insight::from_payload))
    }
}
