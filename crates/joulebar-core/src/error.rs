use thiserror::Error;

pub type Result<T> = std::result::Result<T, DashboardError>;

/// Failures surfaced synchronously by the aggregation engine.
///
/// None of these are fatal: callers keep the last good reading and carry on.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DashboardError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("division by zero: {0}")]
    DivisionByZero(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// The cumulative counter dropped below the baseline, usually because
    /// the measuring process restarted. Only a reset recovers.
    #[error("counter went backwards: {counter} is {joules} J below its baseline")]
    CounterRegressed { counter: String, joules: f64 },
}
