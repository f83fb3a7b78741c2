use joulebar_source::FetchError;

/// Shown when a benchmark is started without choosing what to run.
pub const SELECT_WORK_UNIT: &str = "Select the work unit to run for the benchmark first.";

#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    #[error("{0}")]
    InvalidState(String),
    #[error("capture from {source_name} failed: {source}")]
    Fetch {
        source_name: String,
        #[source]
        source: FetchError,
    },
    #[error("invalid work command: {0:?}")]
    InvalidCommand(String),
    #[error("failed to start {label}: {source}")]
    Spawn {
        label: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{label} exited unsuccessfully ({status})")]
    WorkFailed { label: String, status: String },
    #[error("execution signal channel closed before {label} finished")]
    SignalsClosed { label: String },
}

impl BenchError {
    pub(crate) fn no_work_unit() -> Self {
        BenchError::InvalidState(SELECT_WORK_UNIT.to_string())
    }
}
