use std::time::Instant;

use crate::snapshot::Snapshot;

/// Source id of the aggregate package counter.
pub const AGGREGATE_SOURCE: &str = "all";

/// Joules-per-second between two cumulative readings.
///
/// A zero (or negative) interval yields `0.0` rather than infinity.
pub fn rate_between(previous_joules: f64, current_joules: f64, elapsed_secs: f64) -> f64 {
    if elapsed_secs <= 0.0 {
        return 0.0;
    }
    (current_joules - previous_joules) / elapsed_secs
}

#[derive(Debug, Clone, Copy)]
struct Previous {
    timestamp: Instant,
    joules: Option<f64>,
}

/// Derives the instantaneous rate of one source from consecutive snapshots.
///
/// The rate is `None` until two snapshots have been seen: reporting `0.0`
/// for the very first cycle would draw a false drop on the chart.
#[derive(Debug)]
pub struct DeltaComputer {
    source: String,
    previous: Option<Previous>,
}

impl Default for DeltaComputer {
    fn default() -> Self {
        Self::new(AGGREGATE_SOURCE)
    }
}

impl DeltaComputer {
    /// Create a computer that tracks the counter of `source`.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            previous: None,
        }
    }

    /// Source id whose rate is computed.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Remember `snapshot` as the previous reading without computing a rate.
    pub fn prime(&mut self, snapshot: &Snapshot) {
        self.previous = Some(Previous {
            timestamp: snapshot.timestamp,
            joules: snapshot.joules(&self.source),
        });
    }

    /// Rate between the previous snapshot and `current`, without advancing.
    pub fn peek(&self, current: &Snapshot) -> Option<f64> {
        let previous = self.previous?;
        let before = previous.joules?;
        let now = current.joules(&self.source)?;
        let elapsed = current
            .timestamp
            .checked_duration_since(previous.timestamp)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        Some(rate_between(before, now, elapsed))
    }

    /// Compute the rate against the previous snapshot, then make `current`
    /// the new previous.
    pub fn advance(&mut self, current: &Snapshot) -> Option<f64> {
        let rate = self.peek(current);
        self.prime(current);
        rate
    }

    /// Whether a previous snapshot is available to compute a rate against.
    pub fn has_previous(&self) -> bool {
        self.previous.is_some()
    }

    /// Forget the previous snapshot; the next rate is `None` again.
    pub fn reset(&mut self) {
        self.previous = None;
    }
}
