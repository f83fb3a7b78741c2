//! Paired-trial benchmarks: the dashboard's own measurement against an
//! independently running probe.

pub mod error;
pub mod harness;
pub mod report;
pub mod work;

pub use error::{BenchError, SELECT_WORK_UNIT};
pub use harness::{BenchmarkHarness, BenchmarkTrial, HarnessState, TrialTiming, DEFAULT_TRIALS};
pub use report::{BenchmarkReport, SeriesStats};
pub use work::{CommandWorkUnit, ExecutionSignals, SignaledWorkUnit, WorkUnit};
