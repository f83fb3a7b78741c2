//! The per-poll aggregation step.
//!
//! [`Dashboard::apply`] turns one snapshot into a [`Reading`]: since-start
//! totals, the instantaneous rate, the comparison entry and the renewable
//! summary. State only advances when the whole step succeeds, so a rejected
//! snapshot leaves the previous reading on screen.
use std::time::{Duration, Instant};

use indexmap::IndexMap;

use crate::activity::ActivityHistory;
use crate::baseline::BaselineTracker;
use crate::comparison::{ComparisonEntry, ComparisonTable};
use crate::delta::{DeltaComputer, AGGREGATE_SOURCE};
use crate::error::{DashboardError, Result};
use crate::renewable::{ratio_over_window, RenewableSummary};
use crate::series::{self, ChartMode, ChartSeries, SeriesOptions, DEFAULT_BUCKET_WIDTH};
use crate::snapshot::{Snapshot, SourceId};
use crate::units::{format_energy, format_power, format_ratio, UnitMode};

/// Placeholder shown while a value is not yet available.
pub const PENDING: &str = "…";

/// Derived display state for one completed poll.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub taken_at: Instant,
    /// Rate computed from consecutive snapshots; `None` on the first poll.
    pub rate_watts: Option<f64>,
    /// Rate the endpoint reported itself, if any.
    pub reported_watts: Option<f64>,
    /// Joules since the baseline, per source.
    pub since_start: IndexMap<SourceId, f64>,
    pub comparison: ComparisonEntry,
    pub renewable: Option<RenewableSummary>,
}

impl Reading {
    /// Best available instantaneous power.
    pub fn watts(&self) -> Option<f64> {
        self.rate_watts.or(self.reported_watts)
    }

    pub fn total(&self, source: &str) -> f64 {
        self.since_start.get(source).copied().unwrap_or(0.0)
    }
}

/// Formatted strings for a display surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayText {
    pub now: String,
    pub total: String,
    pub emoji: String,
    pub comparison: String,
    pub renewable_window: String,
    pub renewable_now: String,
}

/// Owns baseline and delta state for one dashboard.
#[derive(Debug)]
pub struct Dashboard {
    table: ComparisonTable,
    aggregate: String,
    bucket_width: Duration,
    baseline: BaselineTracker,
    delta: DeltaComputer,
    latest: Option<Snapshot>,
    reading: Option<Reading>,
}

impl Dashboard {
    pub fn new(table: ComparisonTable) -> Self {
        Self {
            table,
            aggregate: AGGREGATE_SOURCE.to_string(),
            bucket_width: DEFAULT_BUCKET_WIDTH,
            baseline: BaselineTracker::new(),
            delta: DeltaComputer::new(AGGREGATE_SOURCE),
            latest: None,
            reading: None,
        }
    }

    pub fn with_bucket_width(mut self, width: Duration) -> Self {
        self.bucket_width = width;
        self
    }

    /// Use a source other than `"all"` for the rate, total and comparison.
    pub fn with_aggregate_source(mut self, source: impl Into<String>) -> Self {
        self.aggregate = source.into();
        self.delta = DeltaComputer::new(self.aggregate.clone());
        self
    }

    pub fn aggregate_source(&self) -> &str {
        &self.aggregate
    }

    pub fn table(&self) -> &ComparisonTable {
        &self.table
    }

    /// Swap the comparison table, e.g. after loading a newer revision.
    pub fn set_table(&mut self, table: ComparisonTable) {
        self.table = table;
    }

    /// Fold one snapshot into the dashboard.
    ///
    /// The first snapshot after construction or [`reset`](Self::reset)
    /// becomes the baseline. On error nothing is committed.
    pub fn apply(&mut self, snapshot: Snapshot) -> Result<&Reading> {
        if snapshot.joules(&self.aggregate).is_none() {
            return Err(DashboardError::InvalidArgument(format!(
                "snapshot has no {:?} source",
                self.aggregate
            )));
        }

        let first = !self.baseline.is_initialized();
        let mut baseline = BaselineTracker::new();
        let tracker = if first {
            baseline.initialize(&snapshot);
            &baseline
        } else {
            &self.baseline
        };

        let since_start: IndexMap<SourceId, f64> = snapshot
            .sources
            .keys()
            .map(|id| (id.clone(), tracker.since_start(&snapshot, id)))
            .collect();
        let total = since_start.get(&self.aggregate).copied().unwrap_or(0.0);
        if total < 0.0 {
            return Err(DashboardError::CounterRegressed {
                counter: self.aggregate.clone(),
                joules: -total,
            });
        }
        let comparison = self.table.classify(total)?.clone();

        let rate_watts = if first { None } else { self.delta.peek(&snapshot) };
        let renewable = self.renewable_for(&snapshot);

        let reading = Reading {
            taken_at: snapshot.timestamp,
            rate_watts,
            reported_watts: snapshot.watts(&self.aggregate),
            since_start,
            comparison,
            renewable,
        };

        if first {
            self.baseline = baseline;
            tracing::info!(source = %self.aggregate, "baseline recorded");
        }
        self.delta.advance(&snapshot);
        self.latest = Some(snapshot);
        Ok(&*self.reading.insert(reading))
    }

    fn renewable_for(&self, snapshot: &Snapshot) -> Option<RenewableSummary> {
        let usage = snapshot.sources.get(&self.aggregate)?.long_term_joules.as_ref()?;
        let mix = snapshot.generation_mix.as_ref()?;
        match ratio_over_window(usage, mix) {
            Ok(summary) => Some(summary),
            Err(err) => {
                tracing::warn!(error = %err, "renewable ratio unavailable for this snapshot");
                None
            }
        }
    }

    /// Last successfully derived reading.
    pub fn reading(&self) -> Option<&Reading> {
        self.reading.as_ref()
    }

    /// Snapshot behind the last reading.
    pub fn latest(&self) -> Option<&Snapshot> {
        self.latest.as_ref()
    }

    /// Chart data for `mode` from the latest snapshot.
    pub fn chart(
        &self,
        mode: ChartMode,
        unit_mode: UnitMode,
        activity: Option<&ActivityHistory>,
    ) -> Option<ChartSeries> {
        let snapshot = self.latest.as_ref()?;
        let opts = SeriesOptions {
            unit_mode,
            totals: self.reading.as_ref().map(|r| &r.since_start),
            activity,
            bucket_width: self.bucket_width,
        };
        series::build(mode, snapshot, &opts)
    }

    /// Display strings for the last reading, or `None` before the first poll.
    pub fn display(&self, unit_mode: UnitMode) -> Option<DisplayText> {
        let reading = self.reading.as_ref()?;
        let (renewable_window, renewable_now) = match reading.renewable {
            Some(summary) => (
                summary
                    .window_ratio
                    .map(format_ratio)
                    .unwrap_or_else(|| PENDING.to_string()),
                format_ratio(summary.current_ratio),
            ),
            None => (PENDING.to_string(), PENDING.to_string()),
        };
        Some(DisplayText {
            now: reading
                .watts()
                .map(format_power)
                .unwrap_or_else(|| PENDING.to_string()),
            total: format_energy(reading.total(&self.aggregate), unit_mode),
            emoji: reading.comparison.emoji.clone(),
            comparison: reading.comparison.text.clone(),
            renewable_window,
            renewable_now,
        })
    }

    /// Forget the baseline and previous snapshot.
    pub fn reset(&mut self) {
        self.baseline.reset();
        self.delta.reset();
        self.latest = None;
        self.reading = None;
        tracing::info!("dashboard reset; next snapshot becomes the baseline");
    }
}
