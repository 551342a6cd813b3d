//! The reconciled dashboard state and the only code allowed to mutate it.
//!
//! [`StateStore`] keeps the current [`DashboardState`] behind an
//! `arc_swap::ArcSwap`. Every mutation clones the current value, edits the
//! clone and swaps it in with a compare-and-swap, retrying if another writer
//! got there first. Readers always see a whole state, never a half-merged
//! one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::fetcher::FetchOutcome;
use crate::metrics::{
    detect_anomalies, series_trend, Anomaly, AssetMetrics, Highlight, HighlightTracker,
    TrendSummary,
};
use crate::models::{Asset, Insight, PriceSnapshot, TimeRange, TimeSeriesRecord};

// ---------------------------------------------------------------------------
// Cycle bookkeeping
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshPhase {
    Idle,
    Fetching,
}

/// How a finished fetch cycle was reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleOutcome {
    /// At least one facet delivered data and it was merged.
    Applied,
    /// Nothing new arrived; previous data kept and an error recorded.
    Errored,
    /// The result was dropped: superseded by a newer cycle, or the store was
    /// closed.
    Discarded,
}

/// Handed out by [`StateStore::begin_refresh`]; identifies one fetch cycle
/// and the range it must request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshTicket {
    pub cycle: u64,
    pub range: TimeRange,
}

// ---------------------------------------------------------------------------
// DashboardState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DashboardState {
    pub snapshot: Option<PriceSnapshot>,
    /// The snapshot `snapshot` replaced, used as a comparison baseline when
    /// the series is too short.
    pub previous_snapshot: Option<PriceSnapshot>,
    pub series: Vec<TimeSeriesRecord>,
    /// Range the held `series` was fetched for.
    pub series_range: Option<TimeRange>,
    pub insight: Option<Insight>,
    pub loading: bool,
    pub error: Option<String>,
    /// Failures of individual facets during the last cycle, including partial
    /// successes that leave `error` unset.
    pub facet_errors: Vec<String>,
    pub last_update: Option<DateTime<Utc>>,
    pub selected_range: TimeRange,
    pub manual_analysis_in_flight: bool,
    pub phase: RefreshPhase,
    pub last_outcome: Option<CycleOutcome>,
    pub metrics: AssetMetrics,
    pub highlights: HighlightTracker,
    /// Bumped on every mutation that changes something.
    pub revision: u64,
    applied_cycle: u64,
    in_flight: u32,
    closed: bool,
}

impl DashboardState {
    /// Initial state: nothing held, `loading` set.
    pub fn new(selected_range: TimeRange) -> Self {
        Self {
            snapshot: None,
            previous_snapshot: None,
            series: Vec::new(),
            series_range: None,
            insight: None,
            loading: true,
            error: None,
            facet_errors: Vec::new(),
            last_update: None,
            selected_range,
            manual_analysis_in_flight: false,
            phase: RefreshPhase::Idle,
            last_outcome: None,
            metrics: AssetMetrics::default(),
            highlights: HighlightTracker::new(),
            revision: 0,
            applied_cycle: 0,
            in_flight: 0,
            closed: false,
        }
    }

    pub fn has_data(&self) -> bool {
        self.snapshot.is_some() || !self.series.is_empty() || self.insight.is_some()
    }

    /// True when the held series belongs to a range other than the selected
    /// one. The old series stays visible until the new one lands.
    pub fn series_is_stale(&self) -> bool {
        self.series_range
            .is_some_and(|range| range != self.selected_range)
    }

    pub fn highlight(&self, asset: Asset, now: Instant) -> Highlight {
        self.highlights.state(asset, now)
    }

    pub fn insight_text(&self) -> Option<String> {
        self.insight.as_ref().map(Insight::render)
    }

    /// Everything a presentation layer needs, resolved at `now`.
    pub fn view(&self, now: Instant) -> DashboardView {
        DashboardView {
            snapshot: self.snapshot.clone(),
            series: self.series.clone(),
            series_stale: self.series_is_stale(),
            insight_text: self.insight_text(),
            metrics: self.metrics,
            highlights: AssetHighlights {
                gold: self.highlight(Asset::Gold, now),
                silver: self.highlight(Asset::Silver, now),
                platinum: self.highlight(Asset::Platinum, now),
            },
            trends: Asset::ALL
                .iter()
                .map(|&a| (a, series_trend(&self.series, a)))
                .collect(),
            anomalies: Asset::ALL
                .iter()
                .flat_map(|&a| detect_anomalies(&self.series, a))
                .collect(),
            loading: self.loading,
            error: self.error.clone(),
            last_update: self.last_update,
            selected_range: self.selected_range,
            manual_analysis_in_flight: self.manual_analysis_in_flight,
        }
    }
}

// ---------------------------------------------------------------------------
// DashboardView — Read-only projection for rendering
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct AssetHighlights {
    pub gold: Highlight,
    pub silver: Highlight,
    pub platinum: Highlight,
}

impl AssetHighlights {
    pub fn get(&self, asset: Asset) -> Highlight {
        match asset {
            Asset::Gold => self.gold,
            Asset::Silver => self.silver,
            Asset::Platinum => self.platinum,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub snapshot: Option<PriceSnapshot>,
    pub series: Vec<TimeSeriesRecord>,
    pub series_stale: bool,
    pub insight_text: Option<String>,
    pub metrics: AssetMetrics,
    pub highlights: AssetHighlights,
    pub trends: Vec<(Asset, TrendSummary)>,
    pub anomalies: Vec<Anomaly>,
    pub loading: bool,
    pub error: Option<String>,
    pub last_update: Option<DateTime<Utc>>,
    pub selected_range: TimeRange,
    pub manual_analysis_in_flight: bool,
}

// ---------------------------------------------------------------------------
// StateStore
// ---------------------------------------------------------------------------

/// Owner of the [`DashboardState`] and its mutation rules.
pub struct StateStore {
    state: ArcSwap<DashboardState>,
    next_cycle: AtomicU64,
    highlight_window: Duration,
    changes: watch::Sender<u64>,
}

impl StateStore {
    pub fn new(selected_range: TimeRange, highlight_window: Duration) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            state: ArcSwap::from_pointee(DashboardState::new(selected_range)),
            next_cycle: AtomicU64::new(0),
            highlight_window,
            changes,
        }
    }

    /// The current state. Cheap; later mutations do not affect the returned
    /// value.
    pub fn snapshot(&self) -> Arc<DashboardState> {
        self.state.load_full()
    }

    /// Receiver that observes the revision number after every mutation.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    /// Stop accepting mutations. Results of cycles still in flight are
    /// discarded when they arrive.
    ///
    /// The flag lives in the swapped state, so a mutation racing with
    /// `close` either lands before it or fails its compare-and-swap and sees
    /// the store closed. Closing does not bump `revision`.
    pub fn close(&self) {
        let mut current = self.state.load_full();
        loop {
            if current.closed {
                return;
            }
            let mut next = DashboardState::clone(&current);
            next.closed = true;
            let prev = self.state.compare_and_swap(&current, Arc::new(next));
            if Arc::ptr_eq(&*prev, &current) {
                info!("state store closed");
                return;
            }
            current = arc_swap::Guard::into_inner(prev);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state.load().closed
    }

    /// Apply `f` to a copy of the current state and swap it in atomically.
    ///
    /// `f` returns its result and whether it changed anything. An unchanged
    /// state is neither swapped nor published. Returns `None` without
    /// mutating once the store is closed.
    fn mutate<R>(&self, mut f: impl FnMut(&mut DashboardState) -> (R, bool)) -> Option<R> {
        let mut current = self.state.load_full();
        loop {
            if current.closed {
                return None;
            }
            let mut next = DashboardState::clone(&current);
            let (result, changed) = f(&mut next);
            if !changed {
                return Some(result);
            }
            next.revision = current.revision + 1;
            let revision = next.revision;

            let prev = self.state.compare_and_swap(&current, Arc::new(next));
            if Arc::ptr_eq(&*prev, &current) {
                self.changes.send_replace(revision);
                return Some(result);
            }
            current = arc_swap::Guard::into_inner(prev);
        }
    }

    fn release_cycle(state: &mut DashboardState) {
        state.in_flight = state.in_flight.saturating_sub(1);
        if state.in_flight == 0 {
            state.phase = RefreshPhase::Idle;
        }
    }

    /// Start a fetch cycle.
    ///
    /// Sets `loading` only while nothing is held yet, so later cycles refresh
    /// without a loading flash. Returns `None` once closed.
    pub fn begin_refresh(&self) -> Option<RefreshTicket> {
        let cycle = self.next_cycle.fetch_add(1, Ordering::SeqCst) + 1;
        self.mutate(|state| {
            state.in_flight += 1;
            state.phase = RefreshPhase::Fetching;
            if !state.has_data() {
                state.loading = true;
            }
            let ticket = RefreshTicket {
                cycle,
                range: state.selected_range,
            };
            (ticket, true)
        })
    }

    /// Give back a ticket whose fetch was cancelled before it produced a
    /// result, so the store does not stay in [`RefreshPhase::Fetching`].
    pub fn abandon_refresh(&self, ticket: RefreshTicket) {
        debug!(cycle = ticket.cycle, "refresh cancelled before completion");
        self.mutate(|state| {
            Self::release_cycle(state);
            ((), true)
        });
    }

    /// Merge the result of the cycle identified by `ticket`.
    ///
    /// - A cycle older than the newest applied one is discarded.
    /// - A failed facet keeps the previously held value.
    /// - The series is only taken if it was fetched for the range that is
    ///   still selected.
    /// - A series fetched for a stale range does not count as delivered.
    /// - Any delivered facet clears `error` and stamps `last_update`; if
    ///   neither delivered, `error` describes why.
    pub fn apply_fetch_result(&self, ticket: RefreshTicket, outcome: FetchOutcome) -> CycleOutcome {
        let now = Instant::now();
        let wall_now = Utc::now();
        let window = self.highlight_window;

        let result = self.mutate(|state| {
            Self::release_cycle(state);

            if ticket.cycle < state.applied_cycle {
                return (CycleOutcome::Discarded, true);
            }
            state.applied_cycle = ticket.cycle;
            state.facet_errors = outcome.failures();

            let mut delivered = false;

            if let Ok(latest) = &outcome.snapshot {
                delivered = true;
                if let Some(prices) = &latest.prices {
                    state.highlights.observe_snapshot(prices, now, window);
                    if state.snapshot.as_ref() != Some(prices) {
                        state.previous_snapshot = state.snapshot.replace(prices.clone());
                    }
                }
                if let Some(insight) = &latest.insight {
                    state.insight = Some(insight.clone());
                }
            }

            if let Ok(records) = &outcome.series {
                if ticket.range == state.selected_range {
                    delivered = true;
                    state.series = records.clone();
                    state.series_range = Some(ticket.range);
                }
            }

            state.loading = false;
            state.metrics = AssetMetrics::compute(
                state.snapshot.as_ref(),
                &state.series,
                state.previous_snapshot.as_ref(),
            );

            let outcome_kind = if delivered {
                state.error = None;
                state.last_update = Some(wall_now);
                CycleOutcome::Applied
            } else {
                state.error = Some(format!(
                    "Unable to refresh prices: {}",
                    state.facet_errors.join("; ")
                ));
                CycleOutcome::Errored
            };
            state.last_outcome = Some(outcome_kind);
            (outcome_kind, true)
        });

        match result {
            Some(CycleOutcome::Discarded) => {
                debug!(cycle = ticket.cycle, "discarded result of superseded cycle")
            }
            Some(CycleOutcome::Errored) => warn!(cycle = ticket.cycle, "refresh produced no new data"),
            Some(CycleOutcome::Applied) => debug!(cycle = ticket.cycle, "refresh applied"),
            None => debug!(cycle = ticket.cycle, "discarded result after teardown"),
        }
        result.unwrap_or(CycleOutcome::Discarded)
    }

    /// Select a new historical window.
    ///
    /// The held series is invalidated but kept for display until a fetch for
    /// the new range lands. Returns whether the selection changed.
    pub fn set_range(&self, range: TimeRange) -> bool {
        self.mutate(|state| {
            if state.selected_range == range {
                return (false, false);
            }
            state.selected_range = range;
            (true, true)
        })
        .unwrap_or(false)
    }

    pub fn set_manual_analysis_in_flight(&self, in_flight: bool) {
        self.mutate(|state| {
            let changed = state.manual_analysis_in_flight != in_flight;
            state.manual_analysis_in_flight = in_flight;
            ((), changed)
        });
    }

    /// Show `insight` immediately, ahead of the reconciling refresh.
    pub fn overlay_insight(&self, insight: Insight) {
        self.mutate(|state| {
            let changed = state.insight.as_ref() != Some(&insight);
            state.insight = Some(insight.clone());
            ((), changed)
        });
    }
}
