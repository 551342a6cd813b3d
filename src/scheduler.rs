//! Periodic refresh and the manual analysis trigger.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use secrecy::SecretString;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config;
use crate::error::DashboardError;
use crate::fetcher::{bounded, SnapshotFetcher};
use crate::gateway::Gateway;
use crate::models::Insight;
use crate::state::{CycleOutcome, RefreshTicket, StateStore};

// ---------------------------------------------------------------------------
// Synchronizer
// ---------------------------------------------------------------------------

/// One fetch-and-merge cycle, shared by the periodic loop, explicit refresh
/// requests and the manual trigger.
pub struct Synchronizer {
    fetcher: SnapshotFetcher,
    store: Arc<StateStore>,
}

impl Synchronizer {
    pub fn new(fetcher: SnapshotFetcher, store: Arc<StateStore>) -> Self {
        Self { fetcher, store }
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    /// Fetch the selected range and merge the result into the store.
    ///
    /// Dropping the returned future mid-fetch hands the ticket back, so the
    /// store leaves the fetching phase.
    pub async fn refresh_once(&self) -> CycleOutcome {
        let Some(ticket) = self.store.begin_refresh() else {
            return CycleOutcome::Discarded;
        };
        debug!(cycle = ticket.cycle, range = %ticket.range, "refresh started");
        let mut pending = PendingCycle {
            store: &self.store,
            ticket: Some(ticket),
        };
        let outcome = self.fetcher.fetch(ticket.range).await;
        pending.ticket = None;
        self.store.apply_fetch_result(ticket, outcome)
    }
}

/// Ticket of a cycle whose result has not been applied yet.
struct PendingCycle<'a> {
    store: &'a StateStore,
    ticket: Option<RefreshTicket>,
}

impl Drop for PendingCycle<'_> {
    fn drop(&mut self) {
        if let Some(ticket) = self.ticket.take() {
            self.store.abandon_refresh(ticket);
        }
    }
}

// ---------------------------------------------------------------------------
// RefreshScheduler
// ---------------------------------------------------------------------------

/// Background task that runs [`Synchronizer::refresh_once`] on a fixed
/// cadence.
///
/// The first cycle starts immediately. A [`request_refresh`] runs a cycle
/// right away and restarts the cadence from there. Dropping the scheduler
/// stops the loop; [`shutdown`] additionally waits for it to exit.
///
/// [`request_refresh`]: RefreshScheduler::request_refresh
/// [`shutdown`]: RefreshScheduler::shutdown
pub struct RefreshScheduler {
    shutdown: watch::Sender<bool>,
    wake: Arc<Notify>,
    handle: Option<JoinHandle<()>>,
}

impl RefreshScheduler {
    /// Spawn the loop on the current tokio runtime.
    pub fn spawn(sync: Arc<Synchronizer>, period: Duration) -> Self {
        let (shutdown, mut stop) = watch::channel(false);
        let wake = Arc::new(Notify::new());
        let wake_rx = Arc::clone(&wake);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(period_secs = period.as_secs_f64(), "refresh scheduler started");

            loop {
                tokio::select! {
                    biased;
                    _ = stop.changed() => break,
                    _ = ticker.tick() => {
                        sync.refresh_once().await;
                    }
                    _ = wake_rx.notified() => {
                        sync.refresh_once().await;
                        ticker.reset();
                    }
                }
                if *stop.borrow() {
                    break;
                }
            }
            info!("refresh scheduler stopped");
        });

        Self {
            shutdown,
            wake,
            handle: Some(handle),
        }
    }

    /// Ask the loop to run a cycle now. Requests made while a cycle is running
    /// coalesce into one follow-up cycle.
    pub fn request_refresh(&self) {
        self.wake.notify_one();
    }

    /// Stop the loop and wait for it to exit. A cycle already running is
    /// allowed to finish.
    pub async fn shutdown(mut self) {
        self.shutdown.send_replace(true);
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "refresh scheduler task ended abnormally");
            }
        }
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

// ---------------------------------------------------------------------------
// TriggerGate — Manual analysis with mutual exclusion
// ---------------------------------------------------------------------------

/// What a completed manual trigger produced.
#[derive(Debug, Clone)]
pub struct TriggerOutcome {
    /// Commentary returned by the collection call, already shown in state.
    pub insight: Option<Insight>,
    /// Outcome of the reconciling refresh that followed.
    pub refresh: CycleOutcome,
}

/// Shared among every caller that joined the same trigger.
pub type TriggerResult = std::result::Result<TriggerOutcome, Arc<DashboardError>>;

type InFlight = Shared<BoxFuture<'static, TriggerResult>>;

/// Serializes manual collection requests.
///
/// At most one `POST /collect` is in flight. A caller arriving while one runs,
/// including during the reconciling refresh that follows it, joins it and
/// receives the same result. The work runs on its own task, so the lock is
/// released even if every caller stops waiting.
pub struct TriggerGate {
    gateway: Arc<dyn Gateway>,
    sync: Arc<Synchronizer>,
    timeout: Duration,
    slot: Arc<Mutex<Option<InFlight>>>,
}

impl TriggerGate {
    pub fn new(gateway: Arc<dyn Gateway>, sync: Arc<Synchronizer>, timeout: Duration) -> Self {
        Self {
            gateway,
            sync,
            timeout,
            slot: Arc::new(Mutex::new(None)),
        }
    }

    pub fn is_in_flight(&self) -> bool {
        lock(&self.slot).is_some()
    }

    /// Run a manual collection, or join the one already running.
    pub async fn trigger(&self, credential: Arc<SecretString>) -> TriggerResult {
        let in_flight = {
            let mut slot = lock(&self.slot);
            match slot.clone() {
                Some(running) => {
                    debug!("joining in-flight manual analysis");
                    running
                }
                None => {
                    let started = self.start(credential);
                    *slot = Some(started.clone());
                    started
                }
            }
        };
        in_flight.await
    }

    /// Like [`trigger`](Self::trigger), but fails with
    /// [`DashboardError::ConcurrentTriggerRejected`] instead of joining.
    pub async fn try_trigger(&self, credential: Arc<SecretString>) -> TriggerResult {
        let started = {
            let mut slot = lock(&self.slot);
            if slot.is_some() {
                debug!("manual analysis rejected, one is already in flight");
                return Err(Arc::new(DashboardError::ConcurrentTriggerRejected));
            }
            let started = self.start(credential);
            *slot = Some(started.clone());
            started
        };
        started.await
    }

    /// Must be called with the slot locked.
    fn start(&self, credential: Arc<SecretString>) -> InFlight {
        let store = Arc::clone(self.sync.store());
        store.set_manual_analysis_in_flight(true);
        info!("manual analysis started");

        let gateway = Arc::clone(&self.gateway);
        let sync = Arc::clone(&self.sync);
        let slot = Arc::clone(&self.slot);
        let timeout = self.timeout;

        let work = tokio::spawn(async move {
            let collected =
                bounded(config::COLLECT_PATH, timeout, gateway.collect(&credential)).await;

            let result = match collected {
                Ok(insight) => {
                    if let Some(insight) = &insight {
                        store.overlay_insight(insight.clone());
                    }
                    let refresh = sync.refresh_once().await;
                    info!(?refresh, "manual analysis completed");
                    Ok(TriggerOutcome { insight, refresh })
                }
                Err(e) => {
                    warn!(error = %e, "manual analysis failed");
                    Err(Arc::new(e))
                }
            };

            lock(&slot).take();
            store.set_manual_analysis_in_flight(false);
            result
        });

        let slot = Arc::clone(&self.slot);
        let store = Arc::clone(self.sync.store());
        async move {
            match work.await {
                Ok(result) => result,
                Err(e) => {
                    lock(&slot).take();
                    store.set_manual_analysis_in_flight(false);
                    Err(Arc::new(DashboardError::from(e)))
                }
            }
        }
        .boxed()
        .shared()
    }
}

fn lock(slot: &Mutex<Option<InFlight>>) -> std::sync::MutexGuard<'_, Option<InFlight>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
