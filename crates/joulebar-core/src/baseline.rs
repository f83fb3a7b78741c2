use std::time::Instant;

use indexmap::IndexMap;

use crate::snapshot::{Snapshot, SourceId};

/// The first snapshot observed after (re)initialization.
#[derive(Debug, Clone, PartialEq)]
pub struct Baseline {
    pub taken_at: Instant,
    pub joules: IndexMap<SourceId, f64>,
}

/// Remembers the baseline used to zero "since start" totals.
///
/// The baseline is set once and never mutated; [`reset`](Self::reset) is the
/// only way to replace it.
#[derive(Debug, Default)]
pub struct BaselineTracker {
    baseline: Option<Baseline>,
}

impl BaselineTracker {
    /// Create a tracker with no baseline yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `snapshot` as the baseline.
    ///
    /// Returns `false` without touching anything if a baseline already exists.
    pub fn initialize(&mut self, snapshot: &Snapshot) -> bool {
        if self.baseline.is_some() {
            return false;
        }
        self.baseline = Some(Baseline {
            taken_at: snapshot.timestamp,
            joules: snapshot.per_source_joules(),
        });
        true
    }

    /// Whether a baseline has been recorded since construction or the last reset.
    pub fn is_initialized(&self) -> bool {
        self.baseline.is_some()
    }

    /// The recorded baseline, if any.
    pub fn baseline(&self) -> Option<&Baseline> {
        self.baseline.as_ref()
    }

    /// Joules used by `source` since the baseline was taken.
    ///
    /// A source absent from the baseline (or no baseline at all) is offset by
    /// zero; a source absent from `current` reports zero.
    pub fn since_start(&self, current: &Snapshot, source: &str) -> f64 {
        let Some(now) = current.joules(source) else {
            return 0.0;
        };
        let start = self
            .baseline
            .as_ref()
            .and_then(|b| b.joules.get(source).copied())
            .unwrap_or(0.0);
        now - start
    }

    /// Discard the baseline; the next snapshot becomes the new one.
    pub fn reset(&mut self) {
        self.baseline = None;
    }
}
