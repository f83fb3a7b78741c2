use std::time::Instant;

use indexmap::IndexMap;
use joulebar_core::snapshot::{Snapshot, SourceId};
use joulebar_source::MeasurementSource;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::BenchError;
use crate::work::WorkUnit;

pub const DEFAULT_TRIALS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarnessState {
    Idle,
    WarmingUp,
    /// Zero-based index of the trial being captured.
    Measuring { trial: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrialTiming {
    /// Seconds the work unit took, capture excluded.
    pub wall: f64,
    /// User CPU seconds the measured endpoint's process spent, when its
    /// snapshots report process clocks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<f64>,
}

/// Energy each source saw during one execution of the work unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkTrial {
    #[serde(rename = "internal")]
    pub internal_delta: IndexMap<SourceId, f64>,
    #[serde(rename = "external")]
    pub external_delta: IndexMap<SourceId, f64>,
    pub time: TrialTiming,
}

/// Per-source joules between two captures of the same source.
///
/// Each side keeps its own keys; a key missing from `before` is skipped.
fn deltas(before: &Snapshot, after: &Snapshot) -> IndexMap<SourceId, f64> {
    after
        .sources
        .iter()
        .filter_map(|(id, reading)| before.joules(id).map(|b| (id.clone(), reading.joules - b)))
        .collect()
}

fn user_time(before: &Snapshot, after: &Snapshot) -> Option<f64> {
    Some(after.process_time?.user - before.process_time?.user)
}

/// Resets the harness to `Idle` when a run ends early or normally.
struct BackToIdle<'a>(&'a Mutex<HarnessState>);

impl Drop for BackToIdle<'_> {
    fn drop(&mut self) {
        *self.0.lock() = HarnessState::Idle;
    }
}

/// Runs a work unit repeatedly while capturing two sources around it.
pub struct BenchmarkHarness<I, E> {
    internal: I,
    external: E,
    trials: usize,
    state: Mutex<HarnessState>,
}

impl<I: MeasurementSource, E: MeasurementSource> BenchmarkHarness<I, E> {
    pub fn new(internal: I, external: E) -> Self {
        Self {
            internal,
            external,
            trials: DEFAULT_TRIALS,
            state: Mutex::new(HarnessState::Idle),
        }
    }

    pub fn with_trials(mut self, trials: usize) -> Self {
        self.trials = trials;
        self
    }

    pub fn trials(&self) -> usize {
        self.trials
    }

    pub fn state(&self) -> HarnessState {
        *self.state.lock()
    }

    fn enter(&self, next: HarnessState) {
        *self.state.lock() = next;
    }

    /// One warm-up execution, then the configured number of trials.
    ///
    /// Any capture or execution failure aborts the run; the harness is
    /// `Idle` again afterwards either way.
    pub async fn run(&self, unit: Option<&dyn WorkUnit>) -> Result<Vec<BenchmarkTrial>, BenchError> {
        let Some(unit) = unit else {
            return Err(BenchError::no_work_unit());
        };
        {
            let mut state = self.state.lock();
            if *state != HarnessState::Idle {
                return Err(BenchError::InvalidState("a benchmark is already running".into()));
            }
            *state = HarnessState::WarmingUp;
        }
        let _idle = BackToIdle(&self.state);

        tracing::info!(unit = unit.label(), trials = self.trials, "benchmark warm-up");
        unit.run_to_completion().await?;

        let mut trials = Vec::with_capacity(self.trials);
        for trial in 0..self.trials {
            self.enter(HarnessState::Measuring { trial });
            let record = self.measure(unit).await?;
            tracing::info!(
                trial,
                internal = record.internal_delta.get("all").copied(),
                wall = record.time.wall,
                "trial captured"
            );
            trials.push(record);
        }
        Ok(trials)
    }

    async fn capture(&self) -> Result<(Snapshot, Snapshot), BenchError> {
        let (internal, external) = tokio::join!(self.internal.fetch(), self.external.fetch());
        let internal = internal.map_err(|source| BenchError::Fetch {
            source_name: self.internal.name().to_string(),
            source,
        })?;
        let external = external.map_err(|source| BenchError::Fetch {
            source_name: self.external.name().to_string(),
            source,
        })?;
        Ok((internal, external))
    }

    async fn measure(&self, unit: &dyn WorkUnit) -> Result<BenchmarkTrial, BenchError> {
        let (internal_before, external_before) = self.capture().await?;
        let started = Instant::now();
        unit.run_to_completion().await?;
        let wall = started.elapsed().as_secs_f64();
        let (internal_after, external_after) = self.capture().await?;

        Ok(BenchmarkTrial {
            internal_delta: deltas(&internal_before, &internal_after),
            external_delta: deltas(&external_before, &external_after),
            time: TrialTiming {
                wall,
                user: user_time(&internal_before, &internal_after),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use joulebar_core::{ProcessTime, SourceReading};
    use joulebar_source::FetchError;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Counter that grows by `step` joules on every fetch.
    struct Counter {
        name: &'static str,
        keys: &'static [&'static str],
        step: f64,
        fetches: AtomicUsize,
        fail_after: Option<usize>,
        clocks: bool,
    }

    impl Counter {
        fn new(name: &'static str, keys: &'static [&'static str], step: f64) -> Self {
            Self {
                name,
                keys,
                step,
                fetches: AtomicUsize::new(0),
                fail_after: None,
                clocks: false,
            }
        }
    }

    #[async_trait]
    impl MeasurementSource for Counter {
        fn name(&self) -> &str {
            self.name
        }

        async fn fetch(&self) -> Result<Snapshot, FetchError> {
            let n = self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.fail_after.is_some_and(|limit| n >= limit) {
                return Err(FetchError::InvalidUrl("probe went away".into()));
            }
            let mut snap = Snapshot::new(Instant::now());
            if self.clocks {
                snap = snap.with_process_time(ProcessTime {
                    wall: n as f64,
                    user: n as f64 * 0.5,
                });
            }
            for key in self.keys {
                snap = snap.with_source(key, SourceReading::new(*key, n as f64 * self.step));
            }
            Ok(snap)
        }
    }

    struct Noop {
        runs: AtomicUsize,
        fail: AtomicBool,
    }

    #[async_trait]
    impl WorkUnit for Noop {
        fn label(&self) -> &str {
            "noop"
        }

        async fn run_to_completion(&self) -> Result<(), BenchError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(BenchError::WorkFailed {
                    label: "noop".into(),
                    status: "exit status: 1".into(),
                });
            }
            Ok(())
        }
    }

    fn unit() -> Noop {
        Noop {
            runs: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        }
    }

    fn harness() -> BenchmarkHarness<Counter, Counter> {
        BenchmarkHarness::new(
            Counter::new("internal", &["all", "cpu"], 5.0),
            Counter::new("external", &["mcp0ch2"], 7.0),
        )
    }

    #[tokio::test]
    async fn ten_trials_with_non_negative_deltas() {
        let h = harness();
        let work = unit();
        let trials = h.run(Some(&work)).await.unwrap();

        assert_eq!(trials.len(), 10);
        for trial in &trials {
            assert!(trial.internal_delta.values().all(|d| *d >= 0.0));
            assert!(trial.external_delta.values().all(|d| *d >= 0.0));
            assert!(trial.time.wall >= 0.0);
        }
        assert_eq!(trials[0].internal_delta.keys().collect::<Vec<_>>(), vec!["all", "cpu"]);
        assert_eq!(trials[0].external_delta.keys().collect::<Vec<_>>(), vec!["mcp0ch2"]);
        // Warm-up plus one execution per trial.
        assert_eq!(work.runs.load(Ordering::SeqCst), 11);
        assert_eq!(h.state(), HarnessState::Idle);
    }

    #[tokio::test]
    async fn user_time_comes_from_internal_process_clocks() {
        let mut internal = Counter::new("internal", &["all"], 5.0);
        internal.clocks = true;
        let h = BenchmarkHarness::new(internal, Counter::new("external", &["all"], 7.0)).with_trials(2);
        let trials = h.run(Some(&unit())).await.unwrap();
        // One fetch before and one after: the clock advances half a second.
        assert!(trials.iter().all(|t| t.time.user == Some(0.5)));

        let without = harness().with_trials(1).run(Some(&unit())).await.unwrap();
        assert_eq!(without[0].time.user, None);
    }

    #[tokio::test]
    async fn missing_work_unit_is_invalid_state() {
        let h = harness();
        let err = h.run(None).await.unwrap_err();
        assert_eq!(err.to_string(), crate::error::SELECT_WORK_UNIT);
        assert_eq!(h.internal.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failing_work_returns_to_idle() {
        let h = harness().with_trials(3);
        let work = unit();
        work.fail.store(true, Ordering::SeqCst);
        assert!(matches!(
            h.run(Some(&work)).await,
            Err(BenchError::WorkFailed { .. })
        ));
        assert_eq!(h.state(), HarnessState::Idle);
        assert_eq!(work.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn capture_failure_aborts_run() {
        let mut external = Counter::new("external", &["all"], 1.0);
        external.fail_after = Some(3);
        let h = BenchmarkHarness::new(Counter::new("internal", &["all"], 1.0), external);
        let err = h.run(Some(&unit())).await.unwrap_err();
        match err {
            BenchError::Fetch { source_name, .. } => assert_eq!(source_name, "external"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(h.state(), HarnessState::Idle);
    }

    #[test]
    fn trial_serializes_in_wire_shape() {
        let trial = BenchmarkTrial {
            internal_delta: [("all".to_string(), 12.5)].into_iter().collect(),
            external_delta: [("mcp0ch2".to_string(), 13.0)].into_iter().collect(),
            time: TrialTiming {
                wall: 1.5,
                user: Some(0.75),
            },
        };
        let json = serde_json::to_value(&trial).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "internal": { "all": 12.5 },
                "external": { "mcp0ch2": 13.0 },
                "time": { "wall": 1.5, "user": 0.75 }
            })
        );
    }

    #[test]
    fn deltas_skip_keys_missing_before() {
        let before = Snapshot::new(Instant::now()).with_source("all", SourceReading::new("all", 1.0));
        let after = Snapshot::new(Instant::now())
            .with_source("all", SourceReading::new("all", 4.0))
            .with_source("gpu", SourceReading::new("gpu", 2.0));
        let d = deltas(&before, &after);
        assert_eq!(d.len(), 1);
        assert_eq!(d["all"], 3.0);
    }
}
