//! Live price synchronization for a precious-metals dashboard.
//!
//! A [`Dashboard`] periodically pulls the latest gold/silver/platinum snapshot
//! and a historical series from a remote gateway, merges both into one
//! consistent [`DashboardState`], and derives per-asset comparison metrics,
//! change highlights and series trends for a presentation layer to render.
//! A manual trigger asks the gateway to collect and analyze fresh data.
//!
//! # Quick start
//!
//! ```no_run
//! use bullion_sync::{Dashboard, TimeRange};
//!
//! # async fn run() -> bullion_sync::Result<()> {
//! let dashboard = Dashboard::builder().build()?;
//!
//! // Switch the chart window; the old series stays until the new one lands
//! dashboard.set_range(TimeRange::OneWeek);
//!
//! let view = dashboard.view();
//! println!("gold {}", view.metrics.gold);
//!
//! dashboard.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod fetcher;
pub mod gateway;
pub mod metrics;
pub mod models;
pub mod scheduler;
pub mod state;
pub mod transform;

pub use config::Settings;
pub use error::{DashboardError, ErrorKind, Result};
pub use gateway::{Gateway, HttpGateway};
pub use metrics::{AssetMetrics, DerivedMetric, Direction, Highlight, Trend, TrendSummary};
pub use models::{Asset, Insight, PriceSnapshot, TimeRange, TimeSeriesRecord};
pub use scheduler::{TriggerOutcome, TriggerResult};
pub use state::{CycleOutcome, DashboardState, DashboardView, StateStore};

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::info;

use crate::fetcher::{bounded, SnapshotFetcher};
use crate::models::{HealthStatus, Statistics};
use crate::scheduler::{RefreshScheduler, Synchronizer, TriggerGate};

// ---------------------------------------------------------------------------
// DashboardBuilder
// ---------------------------------------------------------------------------

/// Builder for configuring and constructing a [`Dashboard`].
///
/// Use [`Dashboard::builder()`] to obtain a builder, chain configuration
/// methods, and call [`build()`](DashboardBuilder::build).
pub struct DashboardBuilder {
    settings: Option<Settings>,
    config_path: Option<PathBuf>,
    base_url: Option<String>,
    api_key: Option<SecretString>,
    refresh_interval: Option<Duration>,
    request_timeout: Option<Duration>,
    highlight_duration: Option<Duration>,
    range: Option<TimeRange>,
    gateway: Option<Arc<dyn Gateway>>,
    auto_refresh: bool,
}

impl Default for DashboardBuilder {
    fn default() -> Self {
        Self {
            settings: None,
            config_path: None,
            base_url: None,
            api_key: None,
            refresh_interval: None,
            request_timeout: None,
            highlight_duration: None,
            range: None,
            gateway: None,
            auto_refresh: true,
        }
    }
}

impl DashboardBuilder {
    /// Use `settings` as-is instead of loading them from disk and the
    /// environment.
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Read settings from this TOML file instead of the default location.
    pub fn config_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Credential for the manual analysis trigger.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        let key: String = key.into();
        self.api_key = Some(SecretString::new(key.into()));
        self
    }

    /// Cadence of the periodic refresh. Defaults to 120 seconds.
    pub fn refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = Some(interval);
        self
    }

    /// Upper bound on every gateway call. Defaults to 30 seconds.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn highlight_duration(mut self, duration: Duration) -> Self {
        self.highlight_duration = Some(duration);
        self
    }

    /// Range selected at startup. Defaults to [`TimeRange::OneMonth`].
    pub fn range(mut self, range: TimeRange) -> Self {
        self.range = Some(range);
        self
    }

    /// Talk to `gateway` instead of the HTTP gateway at the base URL.
    pub fn gateway(mut self, gateway: Arc<dyn Gateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// Whether to spawn the periodic refresh loop. Defaults to `true`.
    ///
    /// Without it, data only arrives through [`Dashboard::refresh_now`] and
    /// the manual trigger.
    pub fn auto_refresh(mut self, enabled: bool) -> Self {
        self.auto_refresh = enabled;
        self
    }

    /// Build the dashboard.
    ///
    /// With auto refresh enabled this must be called from within a tokio
    /// runtime; the first refresh starts immediately.
    pub fn build(self) -> Result<Dashboard> {
        let mut settings = match self.settings {
            Some(settings) => settings,
            None => Settings::load(self.config_path.as_deref())?,
        };
        if let Some(url) = self.base_url {
            settings.base_url = config::normalize_base_url(&url);
        }
        if let Some(key) = self.api_key {
            settings.api_key = Some(key);
        }
        if let Some(interval) = self.refresh_interval {
            settings.refresh_interval = interval;
        }
        if let Some(timeout) = self.request_timeout {
            settings.request_timeout = timeout;
        }
        if let Some(duration) = self.highlight_duration {
            settings.highlight_duration = duration;
        }
        if let Some(range) = self.range {
            settings.default_range = range;
        }
        settings.validate()?;

        let gateway: Arc<dyn Gateway> = match self.gateway {
            Some(gateway) => gateway,
            None => Arc::new(HttpGateway::new(
                &settings.base_url,
                settings.request_timeout,
            )?),
        };

        let store = Arc::new(StateStore::new(
            settings.default_range,
            settings.highlight_duration,
        ));
        let fetcher = SnapshotFetcher::new(Arc::clone(&gateway), settings.request_timeout);
        let sync = Arc::new(Synchronizer::new(fetcher, Arc::clone(&store)));
        let gate = TriggerGate::new(
            Arc::clone(&gateway),
            Arc::clone(&sync),
            settings.request_timeout,
        );

        let scheduler = if self.auto_refresh {
            tokio::runtime::Handle::try_current().map_err(|_| {
                DashboardError::Config(
                    "auto refresh needs a running tokio runtime".to_string(),
                )
            })?;
            Some(RefreshScheduler::spawn(
                Arc::clone(&sync),
                settings.refresh_interval,
            ))
        } else {
            None
        };

        info!(
            base_url = %settings.base_url,
            range = %settings.default_range,
            auto_refresh = self.auto_refresh,
            "dashboard started"
        );

        Ok(Dashboard {
            store,
            sync,
            gate,
            gateway,
            scheduler,
            credential: settings.api_key.map(Arc::new),
            base_url: settings.base_url,
            request_timeout: settings.request_timeout,
        })
    }
}

// ---------------------------------------------------------------------------
// Dashboard
// ---------------------------------------------------------------------------

/// One live dashboard instance.
///
/// Owns the state store, the refresh loop and the manual trigger gate.
/// Dropping it (or calling [`shutdown`](Dashboard::shutdown)) stops the loop;
/// results of fetches still in flight are discarded.
pub struct Dashboard {
    store: Arc<StateStore>,
    sync: Arc<Synchronizer>,
    gate: TriggerGate,
    gateway: Arc<dyn Gateway>,
    scheduler: Option<RefreshScheduler>,
    credential: Option<Arc<SecretString>>,
    base_url: String,
    request_timeout: Duration,
}

impl Dashboard {
    /// Create a new builder for configuring the dashboard.
    pub fn builder() -> DashboardBuilder {
        DashboardBuilder::default()
    }

    // -- State access ------------------------------------------------------

    /// The current state. Never observed half-merged.
    pub fn state(&self) -> Arc<DashboardState> {
        self.store.snapshot()
    }

    /// Render-ready projection of the current state.
    pub fn view(&self) -> DashboardView {
        self.store.snapshot().view(Instant::now())
    }

    /// Receiver notified with the new revision after every state change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.store.subscribe()
    }

    // -- Refresh -----------------------------------------------------------

    /// Run one refresh cycle and wait for it to be merged.
    pub async fn refresh_now(&self) -> CycleOutcome {
        self.sync.refresh_once().await
    }

    /// Ask the background loop to refresh as soon as possible.
    ///
    /// Does nothing when auto refresh is disabled.
    pub fn request_refresh(&self) {
        if let Some(scheduler) = &self.scheduler {
            scheduler.request_refresh();
        }
    }

    /// Select the historical window and refetch for it.
    ///
    /// The series shown so far stays in state, flagged stale, until the new
    /// one arrives. Returns whether the selection changed.
    pub fn set_range(&self, range: TimeRange) -> bool {
        let changed = self.store.set_range(range);
        if changed {
            info!(%range, "range changed");
            self.request_refresh();
        }
        changed
    }

    // -- Manual analysis ---------------------------------------------------

    /// Ask the gateway to collect and analyze now, using the configured
    /// credential.
    ///
    /// A call made while another is in flight issues no second request; it
    /// resolves with the first call's result.
    pub async fn trigger_manual_analysis(&self) -> TriggerResult {
        let credential = self
            .credential
            .clone()
            .ok_or_else(|| Arc::new(DashboardError::MissingCredential))?;
        self.gate.trigger(credential).await
    }

    /// [`trigger_manual_analysis`](Self::trigger_manual_analysis) with an
    /// explicit credential.
    pub async fn trigger_manual_analysis_with(&self, credential: SecretString) -> TriggerResult {
        self.gate.trigger(Arc::new(credential)).await
    }

    /// Start a manual analysis only if none is running; otherwise fail with
    /// [`DashboardError::ConcurrentTriggerRejected`].
    pub async fn try_trigger_manual_analysis(&self) -> TriggerResult {
        let credential = self
            .credential
            .clone()
            .ok_or_else(|| Arc::new(DashboardError::MissingCredential))?;
        self.gate.try_trigger(credential).await
    }

    pub fn manual_analysis_in_flight(&self) -> bool {
        self.gate.is_in_flight()
    }

    // -- Auxiliary reads ---------------------------------------------------

    pub async fn health(&self) -> Result<HealthStatus> {
        bounded(config::HEALTH_PATH, self.request_timeout, self.gateway.health()).await
    }

    pub async fn current_prices(&self) -> Result<Option<PriceSnapshot>> {
        bounded(
            config::CURRENT_PRICES_PATH,
            self.request_timeout,
            self.gateway.current_prices(),
        )
        .await
    }

    pub async fn monthly_statistics(&self) -> Result<Option<Statistics>> {
        bounded(
            config::MONTHLY_STATISTICS_PATH,
            self.request_timeout,
            self.gateway.monthly_statistics(),
        )
        .await
    }

    pub async fn latest_insight(&self) -> Result<Option<Insight>> {
        bounded(
            config::LATEST_INSIGHT_PATH,
            self.request_timeout,
            self.gateway.latest_insight(),
        )
        .await
    }

    // -- Teardown ----------------------------------------------------------

    /// Stop the refresh loop and wait for it to exit.
    ///
    /// The store is closed first, so a cycle that finishes during shutdown
    /// leaves the state untouched.
    pub async fn shutdown(mut self) {
        self.store.close();
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.shutdown().await;
        }
        info!("dashboard shut down");
    }
}

impl Drop for Dashboard {
    fn drop(&mut self) {
        self.store.close();
    }
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

impl fmt::Display for Dashboard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.store.snapshot();
        write!(
            f,
            "Dashboard(base_url={}, range={}, revision={}, auto_refresh={})",
            self.base_url,
            state.selected_range,
            state.revision,
            self.scheduler.is_some()
        )
    }
}
