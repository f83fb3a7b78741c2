//! Snapshot sources and the poll step that feeds the dashboard.

pub mod error;
pub mod http;
pub mod poller;
pub mod source;

pub use error::FetchError;
pub use http::HttpSource;
pub use poller::{PollError, PollOutcome, Poller, SkipReason};
pub use source::MeasurementSource;
