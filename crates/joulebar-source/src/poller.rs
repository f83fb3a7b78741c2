//! One poll cycle: fetch a snapshot, fold it into the dashboard.
//!
//! The caller owns the timer. [`Poller::poll`] refuses to start while a
//! previous cycle is still waiting on its fetch, and does nothing while the
//! dashboard is hidden, so a slow endpoint never piles up requests.
use std::sync::atomic::{AtomicBool, Ordering};

use joulebar_core::{Dashboard, DashboardError, Reading};
use parking_lot::{Mutex, MutexGuard};

use crate::error::FetchError;
use crate::source::MeasurementSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// An earlier poll has not completed yet.
    InFlight,
    /// The display surface is not visible.
    Hidden,
}

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("snapshot rejected: {0}")]
    Rejected(#[from] DashboardError),
}

#[derive(Debug)]
pub enum PollOutcome {
    Updated(Reading),
    Skipped(SkipReason),
    /// The cycle failed; the previous reading is still current.
    Failed(PollError),
}

impl PollOutcome {
    pub fn reading(&self) -> Option<&Reading> {
        match self {
            PollOutcome::Updated(reading) => Some(reading),
            _ => None,
        }
    }
}

/// Clears the in-flight flag when the cycle ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Poller<S> {
    source: S,
    dashboard: Mutex<Dashboard>,
    in_flight: AtomicBool,
    visible: AtomicBool,
}

impl<S: MeasurementSource> Poller<S> {
    pub fn new(source: S, dashboard: Dashboard) -> Self {
        Self {
            source,
            dashboard: Mutex::new(dashboard),
            in_flight: AtomicBool::new(false),
            visible: AtomicBool::new(true),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn set_visible(&self, visible: bool) {
        let was = self.visible.swap(visible, Ordering::AcqRel);
        if was != visible {
            tracing::debug!(visible, "dashboard visibility changed");
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::Acquire)
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Run one cycle.
    pub async fn poll(&self) -> PollOutcome {
        if !self.is_visible() {
            return PollOutcome::Skipped(SkipReason::Hidden);
        }
        let Some(_cycle) = InFlight::acquire(&self.in_flight) else {
            tracing::debug!(source = self.source.name(), "previous poll still running; skipping");
            return PollOutcome::Skipped(SkipReason::InFlight);
        };

        let snapshot = match self.source.fetch().await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                tracing::warn!(source = self.source.name(), error = %err, "fetch failed");
                return PollOutcome::Failed(err.into());
            }
        };

        let mut dashboard = self.dashboard.lock();
        match dashboard.apply(snapshot) {
            Ok(reading) => PollOutcome::Updated(reading.clone()),
            Err(err) => {
                tracing::warn!(source = self.source.name(), error = %err, "snapshot rejected");
                PollOutcome::Failed(err.into())
            }
        }
    }

    /// Lock the dashboard for reading charts or resetting. Do not hold the
    /// guard across an await.
    pub fn dashboard(&self) -> MutexGuard<'_, Dashboard> {
        self.dashboard.lock()
    }
}
