//! Shared test fixtures for the bullion-sync integration tests.
//!
//! Provides `FakeGateway`, an in-memory `Gateway` with scripted replies,
//! per-endpoint delays and call counters, plus builders for snapshots,
//! series and insights.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bullion_sync::gateway::Gateway;
use bullion_sync::models::{
    HealthStatus, LatestSnapshot, RawSeries, Statistics, StructuredInsight,
};
use bullion_sync::{Dashboard, DashboardError, Insight, PriceSnapshot, Result, Settings};
use chrono::{TimeZone, Utc};
use secrecy::SecretString;

/// Scripted reply for one endpoint. Sticky until replaced.
#[derive(Debug, Clone)]
pub enum Reply<T> {
    Ok(T),
    Protocol(&'static str),
    Timeout,
}

impl<T> Reply<T> {
    fn into_result(self, endpoint: &str) -> Result<T> {
        match self {
            Reply::Ok(value) => Ok(value),
            Reply::Protocol(message) => Err(DashboardError::Protocol {
                endpoint: endpoint.to_string(),
                message: message.to_string(),
            }),
            Reply::Timeout => Err(DashboardError::Timeout {
                endpoint: endpoint.to_string(),
                after: Duration::from_secs(30),
            }),
        }
    }
}

pub struct FakeGateway {
    pub latest: Mutex<Reply<LatestSnapshot>>,
    pub history: Mutex<Reply<RawSeries>>,
    pub collect: Mutex<Reply<Option<Insight>>>,
    pub latest_delay: Mutex<Duration>,
    pub history_delay: Mutex<Duration>,
    pub collect_delay: Mutex<Duration>,
    pub latest_calls: AtomicUsize,
    pub history_calls: AtomicUsize,
    pub collect_calls: AtomicUsize,
    /// `days` argument of every history call, in call order.
    pub history_days: Mutex<Vec<u32>>,
    /// Credentials seen by `collect`, exposed for assertions.
    pub credentials: Mutex<Vec<String>>,
}

impl FakeGateway {
    /// A gateway serving `latest(2000.0, 25.0, Some(950.0))` and a 5-point
    /// series.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            latest: Mutex::new(Reply::Ok(latest(2000.0, 25.0, Some(950.0)))),
            history: Mutex::new(Reply::Ok(raw_series(5, 1990.0))),
            collect: Mutex::new(Reply::Ok(Some(structured_insight("Gold is steady.")))),
            latest_delay: Mutex::new(Duration::ZERO),
            history_delay: Mutex::new(Duration::ZERO),
            collect_delay: Mutex::new(Duration::ZERO),
            latest_calls: AtomicUsize::new(0),
            history_calls: AtomicUsize::new(0),
            collect_calls: AtomicUsize::new(0),
            history_days: Mutex::new(Vec::new()),
            credentials: Mutex::new(Vec::new()),
        })
    }

    pub fn set_latest(&self, reply: Reply<LatestSnapshot>) {
        *self.latest.lock().unwrap() = reply;
    }

    pub fn set_history(&self, reply: Reply<RawSeries>) {
        *self.history.lock().unwrap() = reply;
    }

    pub fn set_collect(&self, reply: Reply<Option<Insight>>) {
        *self.collect.lock().unwrap() = reply;
    }

    pub fn set_history_delay(&self, delay: Duration) {
        *self.history_delay.lock().unwrap() = delay;
    }

    pub fn set_collect_delay(&self, delay: Duration) {
        *self.collect_delay.lock().unwrap() = delay;
    }

    pub fn latest_calls(&self) -> usize {
        self.latest_calls.load(Ordering::SeqCst)
    }

    pub fn history_calls(&self) -> usize {
        self.history_calls.load(Ordering::SeqCst)
    }

    pub fn collect_calls(&self) -> usize {
        self.collect_calls.load(Ordering::SeqCst)
    }

    pub fn last_history_days(&self) -> Option<u32> {
        self.history_days.lock().unwrap().last().copied()
    }
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

#[async_trait]
impl Gateway for FakeGateway {
    async fn latest(&self) -> Result<LatestSnapshot> {
        self.latest_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.latest_delay.lock().unwrap();
        pause(delay).await;
        let reply = self.latest.lock().unwrap().clone();
        reply.into_result("/latest")
    }

    async fn history(&self, days: u32) -> Result<RawSeries> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        self.history_days.lock().unwrap().push(days);
        let delay = *self.history_delay.lock().unwrap();
        pause(delay).await;
        let reply = self.history.lock().unwrap().clone();
        reply.into_result("/history")
    }

    async fn collect(&self, credential: &SecretString) -> Result<Option<Insight>> {
        use secrecy::ExposeSecret;
        self.collect_calls.fetch_add(1, Ordering::SeqCst);
        self.credentials
            .lock()
            .unwrap()
            .push(credential.expose_secret().to_string());
        let delay = *self.collect_delay.lock().unwrap();
        pause(delay).await;
        let reply = self.collect.lock().unwrap().clone();
        reply.into_result("/collect")
    }

    async fn health(&self) -> Result<HealthStatus> {
        Ok(HealthStatus {
            status: "healthy".to_string(),
            coordinator_running: true,
        })
    }

    async fn current_prices(&self) -> Result<Option<PriceSnapshot>> {
        Ok(Some(snapshot(2001.0, 25.5, None)))
    }

    async fn monthly_statistics(&self) -> Result<Option<Statistics>> {
        Ok(None)
    }

    async fn latest_insight(&self) -> Result<Option<Insight>> {
        Ok(Some(structured_insight("Latest commentary.")))
    }
}

// -- Fixtures -----------------------------------------------------------------

pub fn snapshot(gold: f64, silver: f64, platinum: Option<f64>) -> PriceSnapshot {
    PriceSnapshot {
        gold_price: gold,
        silver_price: silver,
        platinum_price: platinum,
        timestamp: Utc.with_ymd_and_hms(2025, 1, 5, 10, 30, 0).unwrap(),
        source: Some("test".to_string()),
        statistics: None,
    }
}

pub fn latest(gold: f64, silver: f64, platinum: Option<f64>) -> LatestSnapshot {
    LatestSnapshot {
        prices: Some(snapshot(gold, silver, platinum)),
        insight: None,
    }
}

/// `n` hourly samples starting 2025-01-01 00:00, gold rising by 1.0 per step
/// from `gold_start`, silver flat at 25.0, platinum flat at 950.0.
pub fn raw_series(n: usize, gold_start: f64) -> RawSeries {
    RawSeries {
        timestamps: (0..n)
            .map(|i| format!("2025-01-01T{:02}:00:00", i % 24))
            .collect(),
        gold_prices: (0..n).map(|i| gold_start + i as f64).collect(),
        silver_prices: vec![25.0; n],
        platinum_prices: Some(vec![Some(950.0); n]),
        count: Some(n),
    }
}

pub fn structured_insight(market_analysis: &str) -> Insight {
    Insight::Structured(StructuredInsight {
        market_analysis: market_analysis.to_string(),
        trend_prediction: "Sideways.".to_string(),
        ..Default::default()
    })
}

/// Defaults, untouched by the environment or any config file.
pub fn settings() -> Settings {
    Settings::default()
}

/// A dashboard over `gateway` with the periodic loop off.
pub fn manual_dashboard(gateway: Arc<FakeGateway>) -> Dashboard {
    Dashboard::builder()
        .settings(settings())
        .gateway(gateway)
        .api_key("test-key")
        .auto_refresh(false)
        .build()
        .unwrap()
}
