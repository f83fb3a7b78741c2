//! Core model for the joulebar energy dashboard.
//!
//! Everything here is synchronous and renderer-agnostic: snapshots come in,
//! baseline and delta bookkeeping turns them into readings, and the series
//! builders produce chart data that any surface can draw. Fetching lives in
//! `joulebar-source`; drawing lives in `joulebar-ui`.

pub mod activity;
pub mod baseline;
pub mod comparison;
pub mod dashboard;
pub mod delta;
pub mod error;
pub mod execution;
pub mod logging;
pub mod renewable;
pub mod series;
pub mod session;
pub mod snapshot;
pub mod units;

pub use dashboard::{Dashboard, DisplayText, Reading};
pub use error::{DashboardError, Result};
pub use snapshot::{MetricsPayload, ProcessTime, Snapshot, SourceReading};
